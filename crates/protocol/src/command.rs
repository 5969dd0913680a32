//! Outbound commands and their JSON encoding

use halot_crypto::{TokenError, derive_token};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Local failures raised while building a command, before anything is sent
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid password: {0}")]
    Token(#[from] TokenError),

    #[error("{field} out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Missing/empty input or an unusable password
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, ProtocolError::InvalidArgument(_) | ProtocolError::Token(_))
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, ProtocolError::OutOfRange { .. })
    }
}

/// The `cmd` tags understood by the printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandTag {
    VersionCheck,
    GetPrintStatus,
    StartPrint,
    StartFile,
    StartData,
    CheckData,
    PrintStop,
    PrintPause,
    PrintParaSet,
}

impl CommandTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandTag::VersionCheck => "VERSION_CHECK",
            CommandTag::GetPrintStatus => "GET_PRINT_STATUS",
            CommandTag::StartPrint => "START_PRINT",
            CommandTag::StartFile => "START_FILE",
            CommandTag::StartData => "START_DATA",
            CommandTag::CheckData => "CHECK_DATA",
            CommandTag::PrintStop => "PRINT_STOP",
            CommandTag::PrintPause => "PRINT_PAUSE",
            CommandTag::PrintParaSet => "PRINT_PARA_SET",
        }
    }

    /// Parse a wire tag; unknown tags yield `None`
    pub fn from_wire(tag: &str) -> Option<Self> {
        let tag = match tag {
            "VERSION_CHECK" => CommandTag::VersionCheck,
            "GET_PRINT_STATUS" => CommandTag::GetPrintStatus,
            "START_PRINT" => CommandTag::StartPrint,
            "START_FILE" => CommandTag::StartFile,
            "START_DATA" => CommandTag::StartData,
            "CHECK_DATA" => CommandTag::CheckData,
            "PRINT_STOP" => CommandTag::PrintStop,
            "PRINT_PAUSE" => CommandTag::PrintPause,
            "PRINT_PARA_SET" => CommandTag::PrintParaSet,
            _ => return None,
        };
        Some(tag)
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allowed bottom exposure layer count
pub const BOTTOM_EXPOSURE_LAYERS: RangeInclusive<u32> = 1..=10;
/// Allowed light-off delay (s)
pub const LIGHT_OFF_DELAY: RangeInclusive<u32> = 0..=20;
/// Allowed motor speed (mm/s)
pub const MOTOR_SPEED: RangeInclusive<u32> = 1..=10;
/// Allowed initial exposure (s)
pub const INITIAL_EXPOSURE: RangeInclusive<u32> = 1..=70;
/// Allowed print exposure (s)
pub const PRINT_EXPOSURE: RangeInclusive<f64> = 0.5..=10.0;
/// Allowed rising height (mm)
pub const RISING_HEIGHT: RangeInclusive<u32> = 8..=20;

/// Print parameters for `PRINT_PARA_SET`
///
/// Only honoured by the printer while a print is processing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrintParameters {
    /// Number of initial (bottom) layers
    #[serde(rename = "bottomExposureNum", serialize_with = "as_decimal")]
    pub bottom_exposure_layers: u32,

    /// Light-off delay in seconds
    #[serde(rename = "delayLight", serialize_with = "as_decimal")]
    pub light_off_delay: u32,

    /// Motor speed in mm/s
    #[serde(rename = "eleSpeed", serialize_with = "as_decimal")]
    pub motor_speed: u32,

    /// Exposure of the bottom layers in seconds
    #[serde(rename = "initExposure", serialize_with = "as_decimal")]
    pub initial_exposure: u32,

    /// Exposure of regular layers in seconds
    #[serde(rename = "printExposure", serialize_with = "as_decimal")]
    pub print_exposure: f64,

    /// Rising height in mm
    #[serde(rename = "printHeight", serialize_with = "as_decimal")]
    pub rising_height: u32,
}

impl PrintParameters {
    /// Check every field against the range the printer accepts
    pub fn validate(&self) -> Result<(), ProtocolError> {
        check_range(
            "bottomExposureLayerCount",
            self.bottom_exposure_layers,
            &BOTTOM_EXPOSURE_LAYERS,
        )?;
        check_range("lightOffDelay", self.light_off_delay, &LIGHT_OFF_DELAY)?;
        check_range("motorSpeed", self.motor_speed, &MOTOR_SPEED)?;
        check_range("initialExposure", self.initial_exposure, &INITIAL_EXPOSURE)?;
        check_range("printExposure", self.print_exposure, &PRINT_EXPOSURE)?;
        check_range("risingHeight", self.rising_height, &RISING_HEIGHT)?;
        Ok(())
    }
}

fn check_range<T>(field: &'static str, value: T, range: &RangeInclusive<T>) -> Result<(), ProtocolError>
where
    T: PartialOrd + fmt::Display,
{
    // NaN fails `contains`, which is what we want
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ProtocolError::OutOfRange {
            field,
            value: value.to_string(),
            min: range.start().to_string(),
            max: range.end().to_string(),
        })
    }
}

/// `START_FILE` announcement preceding a binary upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAnnouncement {
    pub filename: String,

    /// Transfer key echoed back in START_FILE / START_DATA / CHECK_DATA replies
    pub key: String,

    #[serde(serialize_with = "as_decimal")]
    pub offset: u64,

    #[serde(serialize_with = "as_decimal")]
    pub size: u64,
}

impl FileAnnouncement {
    /// Announce `data` under `filename`, starting at offset 0
    pub fn new(filename: impl Into<String>, data: &[u8]) -> Self {
        let filename = filename.into();
        let key = transfer_key(&filename, data);

        Self {
            filename,
            key,
            offset: 0,
            size: data.len() as u64,
        }
    }
}

/// Derive an opaque lowercase-hex transfer key from the upload's identity
pub fn transfer_key(filename: &str, data: &[u8]) -> String {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(filename.as_bytes());
    hasher.update(&(data.len() as u64).to_le_bytes());
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Outbound command
///
/// Serialises to a flat JSON object tagged by `cmd`; numeric values are
/// rendered as decimal strings, which is what the printer's parser expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd")]
pub enum Command {
    #[serde(rename = "VERSION_CHECK")]
    VersionCheck,

    #[serde(rename = "GET_PRINT_STATUS")]
    GetPrintStatus,

    #[serde(rename = "START_PRINT")]
    StartPrint { filename: String },

    #[serde(rename = "PRINT_STOP")]
    StopPrint,

    #[serde(rename = "PRINT_PAUSE")]
    PausePrint,

    #[serde(rename = "PRINT_PARA_SET")]
    SetPrintParameter(PrintParameters),

    #[serde(rename = "START_FILE")]
    StartFile(FileAnnouncement),
}

impl Command {
    pub fn tag(&self) -> CommandTag {
        match self {
            Command::VersionCheck => CommandTag::VersionCheck,
            Command::GetPrintStatus => CommandTag::GetPrintStatus,
            Command::StartPrint { .. } => CommandTag::StartPrint,
            Command::StopPrint => CommandTag::PrintStop,
            Command::PausePrint => CommandTag::PrintPause,
            Command::SetPrintParameter(_) => CommandTag::PrintParaSet,
            Command::StartFile(_) => CommandTag::StartFile,
        }
    }

    /// Every command except `VERSION_CHECK` carries a token
    pub fn requires_token(&self) -> bool {
        !matches!(self, Command::VersionCheck)
    }

    /// Check arguments without touching the password
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Command::StartPrint { filename } if filename.is_empty() => Err(
                ProtocolError::InvalidArgument("filename must not be empty".to_string()),
            ),
            Command::StartFile(announcement) if announcement.filename.is_empty() => Err(
                ProtocolError::InvalidArgument("filename must not be empty".to_string()),
            ),
            Command::StartFile(announcement) if announcement.size == 0 => Err(
                ProtocolError::InvalidArgument("file content must not be empty".to_string()),
            ),
            Command::SetPrintParameter(params) => params.validate(),
            _ => Ok(()),
        }
    }

    /// Build the JSON object for this command, with a fresh token when required
    pub fn to_json(&self, password: &str) -> Result<Value, ProtocolError> {
        self.validate()?;

        let mut value = serde_json::to_value(self)?;

        if self.requires_token() {
            let token = derive_token(password)?;
            if let Value::Object(map) = &mut value {
                map.insert("token".to_string(), Value::String(token.into_string()));
            }
        }

        Ok(value)
    }

    /// Encode to the text payload sent over the wire
    pub fn encode(&self, password: &str) -> Result<String, ProtocolError> {
        let value = self.to_json(password)?;
        Ok(serde_json::to_string(&value)?)
    }
}

fn as_decimal<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: fmt::Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use halot_crypto::derive_token;

    fn params() -> PrintParameters {
        PrintParameters {
            bottom_exposure_layers: 4,
            light_off_delay: 1,
            motor_speed: 3,
            initial_exposure: 40,
            print_exposure: 2.5,
            rising_height: 8,
        }
    }

    #[test]
    fn test_version_check_has_no_token() {
        let value = Command::VersionCheck.to_json("").unwrap();
        assert_eq!(value, serde_json::json!({ "cmd": "VERSION_CHECK" }));
    }

    #[test]
    fn test_status_request_carries_token() {
        let value = Command::GetPrintStatus.to_json("1234").unwrap();
        assert_eq!(value["cmd"], "GET_PRINT_STATUS");
        assert_eq!(value["token"], derive_token("1234").unwrap().as_str());
    }

    #[test]
    fn test_start_print_encoding() {
        let command = Command::StartPrint {
            filename: "model.cxdlpv4".to_string(),
        };
        let text = command.encode("1234").unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["cmd"], "START_PRINT");
        assert_eq!(value["filename"], "model.cxdlpv4");
        assert_eq!(value["token"], "lTAPwGi4umM=");
    }

    #[test]
    fn test_parameters_are_decimal_strings() {
        let value = Command::SetPrintParameter(params()).to_json("1234").unwrap();

        assert_eq!(value["cmd"], "PRINT_PARA_SET");
        assert_eq!(value["bottomExposureNum"], "4");
        assert_eq!(value["delayLight"], "1");
        assert_eq!(value["eleSpeed"], "3");
        assert_eq!(value["initExposure"], "40");
        assert_eq!(value["printExposure"], "2.5");
        assert_eq!(value["printHeight"], "8");
        assert!(value["token"].is_string());
    }

    #[test]
    fn test_integral_exposure_has_no_fraction() {
        let mut p = params();
        p.print_exposure = 3.0;
        let value = Command::SetPrintParameter(p).to_json("1234").unwrap();
        assert_eq!(value["printExposure"], "3");
    }

    #[test]
    fn test_motor_speed_boundaries() {
        for speed in [0, 11] {
            let mut p = params();
            p.motor_speed = speed;
            let err = p.validate().unwrap_err();
            assert!(err.is_out_of_range(), "speed {speed}");
        }
        for speed in [1, 10] {
            let mut p = params();
            p.motor_speed = speed;
            assert!(p.validate().is_ok(), "speed {speed}");
        }
    }

    #[test]
    fn test_parameter_boundaries() {
        let mut p = params();
        p.bottom_exposure_layers = 1;
        assert!(p.validate().is_ok());
        p.bottom_exposure_layers = 10;
        assert!(p.validate().is_ok());
        p.bottom_exposure_layers = 0;
        assert!(p.validate().is_err());
        p.bottom_exposure_layers = 11;
        assert!(p.validate().is_err());

        let mut p = params();
        p.light_off_delay = 20;
        assert!(p.validate().is_ok());
        p.light_off_delay = 21;
        assert!(p.validate().is_err());

        let mut p = params();
        p.initial_exposure = 70;
        assert!(p.validate().is_ok());
        p.initial_exposure = 0;
        assert!(p.validate().is_err());

        let mut p = params();
        p.print_exposure = 0.5;
        assert!(p.validate().is_ok());
        p.print_exposure = 0.49;
        assert!(p.validate().is_err());
        p.print_exposure = f64::NAN;
        assert!(p.validate().is_err());

        let mut p = params();
        p.rising_height = 8;
        assert!(p.validate().is_ok());
        p.rising_height = 20;
        assert!(p.validate().is_ok());
        p.rising_height = 7;
        assert!(p.validate().is_err());
        p.rising_height = 21;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_out_of_range_is_raised_before_token() {
        let mut p = params();
        p.motor_speed = 0;
        // An unusable password must not mask the range error
        let err = Command::SetPrintParameter(p).encode("").unwrap_err();
        assert!(err.is_out_of_range());
        assert!(err.to_string().contains("motorSpeed"));
    }

    #[test]
    fn test_invalid_password_rejected() {
        let err = Command::StopPrint.encode("123456789").unwrap_err();
        assert!(err.is_invalid_argument());

        let err = Command::PausePrint.encode("").unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_empty_filename_rejected() {
        let err = Command::StartPrint {
            filename: String::new(),
        }
        .encode("1234")
        .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_start_file_announcement() {
        let data = vec![7u8; 1024];
        let announcement = FileAnnouncement::new("part.cxdlpv4", &data);
        let value = Command::StartFile(announcement.clone()).to_json("1234").unwrap();

        assert_eq!(value["cmd"], "START_FILE");
        assert_eq!(value["filename"], "part.cxdlpv4");
        assert_eq!(value["key"], announcement.key.as_str());
        assert_eq!(value["offset"], "0");
        assert_eq!(value["size"], "1024");
        assert!(value["token"].is_string());
    }

    #[test]
    fn test_empty_upload_rejected() {
        let announcement = FileAnnouncement::new("part.cxdlpv4", &[]);
        let err = Command::StartFile(announcement).encode("1234").unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_transfer_key() {
        let a = transfer_key("a.cxdlpv4", b"data");
        assert_eq!(a, transfer_key("a.cxdlpv4", b"data"));
        assert_ne!(a, transfer_key("b.cxdlpv4", b"data"));
        assert_ne!(a, transfer_key("a.cxdlpv4", b"datb"));
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_tag_round_trip() {
        for tag in [
            CommandTag::VersionCheck,
            CommandTag::GetPrintStatus,
            CommandTag::StartPrint,
            CommandTag::StartFile,
            CommandTag::StartData,
            CommandTag::CheckData,
            CommandTag::PrintStop,
            CommandTag::PrintPause,
            CommandTag::PrintParaSet,
        ] {
            assert_eq!(CommandTag::from_wire(tag.as_str()), Some(tag));
        }
        assert_eq!(CommandTag::from_wire("FOO"), None);
        assert_eq!(Command::PausePrint.tag(), CommandTag::PrintPause);
    }
}
