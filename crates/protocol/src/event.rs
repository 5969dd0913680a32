//! Typed events raised by the client

use crate::status::PrinterStatus;
use serde::Serialize;
use std::sync::Arc;

/// Status reported by `PRINT_STOP`, `PRINT_PAUSE` and `PRINT_PARA_SET` on success
pub const CMD_SUCCESS: &str = "CMD_SUCCESS";
/// Status reported on failure
pub const CMD_FAIL: &str = "CMD_FAIL";
/// `START_PRINT` status when the job was accepted
pub const STARTED: &str = "STARTED";
/// `START_PRINT` status when the file failed its check
pub const CHECK_FALSE: &str = "CHECK_FALSE";

/// Connection loss details
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisconnectInfo {
    pub reason: String,

    /// No further reconnection attempts will be made
    pub terminal: bool,
}

/// Acknowledgment of stop, pause/resume and parameter changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandAck {
    /// `CMD_SUCCESS` or `CMD_FAIL`
    pub status: String,
}

impl CommandAck {
    pub fn succeeded(&self) -> bool {
        self.status == CMD_SUCCESS
    }
}

/// Acknowledgment of `START_PRINT`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartPrintAck {
    /// `STARTED` or `CHECK_FALSE`
    pub status: String,
    pub filename: String,
}

impl StartPrintAck {
    pub fn is_started(&self) -> bool {
        self.status == STARTED
    }
}

/// Reply to a `START_FILE` announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileTransfer {
    pub filename: String,
    pub key: String,
    pub offset: u64,
    pub size: u64,
    pub compress: bool,

    /// 0 is success
    pub error_code: i64,
}

impl FileTransfer {
    pub fn is_ok(&self) -> bool {
        self.error_code == 0
    }
}

/// Upload progress (`START_DATA`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferProgress {
    pub key: String,
    pub received: u64,
    pub size: u64,

    /// 0 is success
    pub error_code: i64,
}

impl TransferProgress {
    pub fn is_ok(&self) -> bool {
        self.error_code == 0
    }

    pub fn fraction(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        (self.received as f64 / self.size as f64).min(1.0)
    }

    pub fn is_complete(&self) -> bool {
        self.size > 0 && self.received >= self.size
    }
}

/// Final upload verification (`CHECK_DATA`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileCheck {
    pub key: String,

    /// 0 is success
    pub check_state: i64,
}

impl FileCheck {
    pub fn is_ok(&self) -> bool {
        self.check_state == 0
    }
}

/// Everything a client can observe
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected,
    Disconnected(DisconnectInfo),
    /// The printer answered a status request with `TOKEN_ERROR`
    TokenRejected,
    Version(String),
    Status(Arc<PrinterStatus>),
    FileTransferStarted(FileTransfer),
    FileTransferProgress(TransferProgress),
    FileChecked(FileCheck),
    PrintStarted(StartPrintAck),
    PrintPaused(CommandAck),
    PrintStopped(CommandAck),
    ParameterSet(CommandAck),
}

/// Discriminant of [`Event`], used for filtered subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    TokenRejected,
    Version,
    Status,
    FileTransferStarted,
    FileTransferProgress,
    FileChecked,
    PrintStarted,
    PrintPaused,
    PrintStopped,
    ParameterSet,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connected => EventKind::Connected,
            Event::Disconnected(_) => EventKind::Disconnected,
            Event::TokenRejected => EventKind::TokenRejected,
            Event::Version(_) => EventKind::Version,
            Event::Status(_) => EventKind::Status,
            Event::FileTransferStarted(_) => EventKind::FileTransferStarted,
            Event::FileTransferProgress(_) => EventKind::FileTransferProgress,
            Event::FileChecked(_) => EventKind::FileChecked,
            Event::PrintStarted(_) => EventKind::PrintStarted,
            Event::PrintPaused(_) => EventKind::PrintPaused,
            Event::PrintStopped(_) => EventKind::PrintStopped,
            Event::ParameterSet(_) => EventKind::ParameterSet,
        }
    }

    /// Transfer key for upload-related events
    pub fn transfer_key(&self) -> Option<&str> {
        match self {
            Event::FileTransferStarted(t) => Some(&t.key),
            Event::FileTransferProgress(p) => Some(&p.key),
            Event::FileChecked(c) => Some(&c.key),
            _ => None,
        }
    }
}
