//! Printer status snapshots

use crate::fields::{self, Object};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Machine state reported in `printStatus`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PrintStatus {
    /// Idle
    #[serde(rename = "PRINT_GENERAL")]
    General,
    #[serde(rename = "PRINT_PROCESSING")]
    Processing,
    #[serde(rename = "PRINT_STOPPING")]
    Stopping,
    #[serde(rename = "PRINT_STOP")]
    Stopped,
    #[serde(rename = "PRINT_COMPLETING")]
    Completing,
    #[serde(rename = "PRINT_COMPLETE")]
    Complete,
    /// The token attached to the request was not accepted
    #[serde(rename = "TOKEN_ERROR")]
    TokenError,
    /// `printStatus` was missing or not recognised
    #[serde(rename = "UNKNOWN_ERROR")]
    UnknownError,
}

impl PrintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrintStatus::General => "PRINT_GENERAL",
            PrintStatus::Processing => "PRINT_PROCESSING",
            PrintStatus::Stopping => "PRINT_STOPPING",
            PrintStatus::Stopped => "PRINT_STOP",
            PrintStatus::Completing => "PRINT_COMPLETING",
            PrintStatus::Complete => "PRINT_COMPLETE",
            PrintStatus::TokenError => "TOKEN_ERROR",
            PrintStatus::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Parse a wire tag, falling back to `UnknownError`
    pub fn from_wire(tag: &str) -> Self {
        match tag {
            "PRINT_GENERAL" => PrintStatus::General,
            "PRINT_PROCESSING" => PrintStatus::Processing,
            "PRINT_STOPPING" => PrintStatus::Stopping,
            "PRINT_STOP" => PrintStatus::Stopped,
            "PRINT_COMPLETING" => PrintStatus::Completing,
            "PRINT_COMPLETE" => PrintStatus::Complete,
            "TOKEN_ERROR" => PrintStatus::TokenError,
            _ => PrintStatus::UnknownError,
        }
    }

    /// A job has ended, either stopped or completed
    pub fn is_terminal(&self) -> bool {
        matches!(self, PrintStatus::Stopped | PrintStatus::Complete)
    }
}

impl fmt::Display for PrintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `GET_PRINT_STATUS` reply
///
/// Every optional field is `None` when the printer omitted it or sent an
/// empty value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrinterStatus {
    pub print_status: PrintStatus,

    /// File of the current job
    pub filename: Option<String>,

    /// Total layers of the job
    pub slice_layer_count: Option<u32>,

    /// Layer currently being printed
    pub current_slice_layer: Option<u32>,

    /// Remaining time in seconds
    pub print_remain_time: Option<u32>,

    /// Bottom layer exposure in seconds
    pub initial_exposure: Option<u32>,

    /// Light-off delay in seconds
    pub light_off_delay: Option<u32>,

    /// Regular layer exposure in seconds
    pub print_exposure: Option<f64>,

    /// Rising height in mm
    pub rising_height: Option<u32>,

    /// Motor speed in mm/s
    pub motor_speed: Option<u32>,

    pub bottom_exposure_layers: Option<u32>,

    /// Layer thickness in mm
    pub layer_thickness: Option<f64>,

    /// Resin identifier as reported by the printer
    pub resin: Option<String>,
}

impl PrinterStatus {
    /// Snapshot with only the status tag set
    pub fn new(print_status: PrintStatus) -> Self {
        Self {
            print_status,
            filename: None,
            slice_layer_count: None,
            current_slice_layer: None,
            print_remain_time: None,
            initial_exposure: None,
            light_off_delay: None,
            print_exposure: None,
            rising_height: None,
            motor_speed: None,
            bottom_exposure_layers: None,
            layer_thickness: None,
            resin: None,
        }
    }

    pub(crate) fn from_json(obj: &Object) -> Self {
        let print_status = fields::text(obj, "printStatus")
            .map(|tag| PrintStatus::from_wire(&tag))
            .unwrap_or(PrintStatus::UnknownError);

        Self {
            print_status,
            filename: fields::text(obj, "filename").filter(|s| !s.is_empty()),
            slice_layer_count: fields::number(obj, "sliceLayerCount"),
            current_slice_layer: fields::number(obj, "curSliceLayer"),
            print_remain_time: fields::number(obj, "printRemainTime"),
            initial_exposure: fields::number(obj, "initExposure"),
            light_off_delay: fields::number(obj, "delayLight"),
            print_exposure: fields::number(obj, "printExposure"),
            rising_height: fields::number(obj, "printHeight"),
            motor_speed: fields::number(obj, "eleSpeed"),
            bottom_exposure_layers: fields::number(obj, "bottomExposureNum"),
            layer_thickness: fields::number(obj, "layerThickness"),
            resin: fields::text(obj, "resin").filter(|s| !s.is_empty()),
        }
    }

    pub fn is_printing(&self) -> bool {
        self.print_status == PrintStatus::Processing
    }

    /// Fraction of layers done, when both layer counts are known
    pub fn progress(&self) -> Option<f64> {
        let total = self.slice_layer_count?;
        let current = self.current_slice_layer?;
        if total == 0 {
            return None;
        }
        Some((current as f64 / total as f64).min(1.0))
    }
}

/// The two most recent status snapshots
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusPair {
    pub previous: Option<Arc<PrinterStatus>>,
    pub latest: Option<Arc<PrinterStatus>>,
}

impl StatusPair {
    /// The print status differs between the two snapshots
    pub fn status_changed(&self) -> bool {
        match (&self.previous, &self.latest) {
            (Some(prev), Some(latest)) => prev.print_status != latest.print_status,
            (None, Some(_)) => true,
            _ => false,
        }
    }
}
