//! Client errors

use halot_protocol::ProtocolError;
use halot_transport::TransportError;
use thiserror::Error;

/// Errors returned synchronously by client operations
///
/// Anything the printer reports after a command was sent arrives as an
/// [`Event`](halot_protocol::Event) instead.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Not connected to printer")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(TransportError),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NotConnected => ClientError::NotConnected,
            other => ClientError::Transport(other),
        }
    }
}

impl ClientError {
    /// Missing/empty input or an unusable password
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, ClientError::Protocol(e) if e.is_invalid_argument())
    }

    /// A print parameter outside its allowed range
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, ClientError::Protocol(e) if e.is_out_of_range())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
