//! Halot Client Library
//!
//! Async client for Halot resin printers (Mage Pro and relatives) over their
//! local WebSocket interface:
//! - `ProtocolClient`: connection lifecycle, commands and file upload
//! - `EventSubscription`: ordered, optionally filtered event streams
//! - `ClientConfig`: TOML configuration

pub mod client;
pub mod config;
pub mod error;
pub mod events;

pub use client::{ProtocolClient, camera_video_uri};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use events::EventSubscription;

pub use halot_protocol::{
    CommandAck, DisconnectInfo, Event, EventKind, FileCheck, FileTransfer, PrintParameters,
    PrintStatus, PrinterStatus, StartPrintAck, StatusPair, TransferProgress,
};
pub use halot_transport::ConnectionState;
