//! Frame - one discrete message on the printer connection

use bytes::Bytes;

/// A single WebSocket message, as seen by the protocol layer
///
/// Text frames carry JSON objects (commands and replies); binary frames carry
/// raw file content during an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text(text.into())
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        Frame::Binary(data.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert_eq!(Frame::text("{}"), Frame::Text("{}".to_string()));
        assert_eq!(
            Frame::binary(vec![1u8, 2, 3]),
            Frame::Binary(Bytes::from_static(&[1, 2, 3]))
        );
    }
}
