//! Inbound message dispatch and status tracking

use crate::command::CommandTag;
use crate::event::{
    CommandAck, Event, FileCheck, FileTransfer, StartPrintAck, TransferProgress,
};
use crate::fields::{self, Object};
use crate::frame::Frame;
use crate::status::{PrintStatus, PrinterStatus, StatusPair};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Turns inbound frames into events and keeps the last two status snapshots
///
/// The dispatcher is the only writer of the snapshot pair. Readers get a
/// cloned [`StatusPair`], so they never observe a half-rotated state.
#[derive(Debug, Default)]
pub struct MessageDispatcher {
    status: RwLock<StatusPair>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Previous and latest snapshot, read together
    pub fn status(&self) -> StatusPair {
        self.status.read().clone()
    }

    pub fn latest(&self) -> Option<Arc<PrinterStatus>> {
        self.status.read().latest.clone()
    }

    pub fn previous(&self) -> Option<Arc<PrinterStatus>> {
        self.status.read().previous.clone()
    }

    /// Handle one frame; yields at most one event
    ///
    /// Binary, malformed and unrecognised frames are dropped without error.
    pub fn handle(&self, frame: &Frame) -> Option<Event> {
        match frame {
            Frame::Text(text) => self.handle_text(text),
            Frame::Binary(data) => {
                trace!("Ignoring binary frame: {} bytes", data.len());
                None
            }
        }
    }

    fn handle_text(&self, text: &str) -> Option<Event> {
        let obj = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(obj)) => obj,
            Ok(_) => {
                debug!("Dropping non-object frame");
                return None;
            }
            Err(e) => {
                debug!("Dropping malformed frame: {}", e);
                return None;
            }
        };

        if let Some(version) = fields::text(&obj, "version") {
            return Some(Event::Version(version));
        }

        let Some(cmd) = fields::text(&obj, "cmd") else {
            debug!("Dropping frame without cmd");
            return None;
        };

        let Some(tag) = CommandTag::from_wire(&cmd) else {
            debug!("Ignoring unknown command: {}", cmd);
            return None;
        };

        trace!("Received {} reply", tag);

        let event = match tag {
            CommandTag::GetPrintStatus => return Some(self.update_status(&obj)),
            CommandTag::StartPrint => Some(Event::PrintStarted(StartPrintAck {
                status: fields::text(&obj, "status").unwrap_or_default(),
                filename: fields::text(&obj, "filename").unwrap_or_default(),
            })),
            CommandTag::StartFile => parse_file_transfer(&obj).map(Event::FileTransferStarted),
            CommandTag::StartData => parse_progress(&obj).map(Event::FileTransferProgress),
            CommandTag::CheckData => parse_check(&obj).map(Event::FileChecked),
            CommandTag::PrintStop => Some(Event::PrintStopped(parse_ack(&obj))),
            CommandTag::PrintPause => Some(Event::PrintPaused(parse_ack(&obj))),
            CommandTag::PrintParaSet => Some(Event::ParameterSet(parse_ack(&obj))),
            // Version replies are recognised by their `version` field above
            CommandTag::VersionCheck => None,
        };

        if event.is_none() {
            debug!("Dropping incomplete {} reply", tag);
        }

        event
    }

    /// Rotate the snapshot pair, then pick the event
    fn update_status(&self, obj: &Object) -> Event {
        let snapshot = Arc::new(PrinterStatus::from_json(obj));

        {
            let mut pair = self.status.write();
            pair.previous = pair.latest.take();
            pair.latest = Some(snapshot.clone());
        }

        if snapshot.print_status == PrintStatus::TokenError {
            warn!("Printer rejected the authentication token");
            Event::TokenRejected
        } else {
            Event::Status(snapshot)
        }
    }
}

fn parse_ack(obj: &Object) -> CommandAck {
    CommandAck {
        status: fields::text(obj, "status").unwrap_or_default(),
    }
}

fn parse_file_transfer(obj: &Object) -> Option<FileTransfer> {
    Some(FileTransfer {
        filename: fields::text(obj, "filename").unwrap_or_default(),
        key: fields::text(obj, "key")?,
        offset: fields::number(obj, "offset")?,
        size: fields::number(obj, "size")?,
        compress: fields::flag(obj, "compress").unwrap_or(false),
        error_code: fields::number(obj, "errorcode")?,
    })
}

fn parse_progress(obj: &Object) -> Option<TransferProgress> {
    Some(TransferProgress {
        key: fields::text(obj, "key")?,
        received: fields::number(obj, "received")?,
        size: fields::number(obj, "size")?,
        error_code: fields::number(obj, "errorcode")?,
    })
}

fn parse_check(obj: &Object) -> Option<FileCheck> {
    Some(FileCheck {
        key: fields::text(obj, "key")?,
        check_state: fields::number(obj, "checkstate")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(value: Value) -> Frame {
        Frame::text(value.to_string())
    }

    fn status_frame(status: &str, layer: u32) -> Frame {
        text(json!({
            "cmd": "GET_PRINT_STATUS",
            "printStatus": status,
            "curSliceLayer": layer.to_string(),
            "sliceLayerCount": "100"
        }))
    }

    #[test]
    fn test_version() {
        let dispatcher = MessageDispatcher::new();
        let event = dispatcher.handle(&text(json!({ "version": "1.2.3" })));
        assert_eq!(event, Some(Event::Version("1.2.3".to_string())));
        assert_eq!(dispatcher.status(), StatusPair::default());
    }

    #[test]
    fn test_version_wins_over_cmd() {
        let dispatcher = MessageDispatcher::new();
        let event = dispatcher.handle(&text(json!({
            "version": "2.0",
            "cmd": "GET_PRINT_STATUS",
            "printStatus": "PRINT_GENERAL"
        })));
        assert_eq!(event, Some(Event::Version("2.0".to_string())));
        assert!(dispatcher.latest().is_none());
    }

    #[test]
    fn test_status_rotation() {
        let dispatcher = MessageDispatcher::new();
        assert!(dispatcher.latest().is_none());
        assert!(dispatcher.previous().is_none());

        for layer in 1..=4 {
            let before = dispatcher.latest();
            let event = dispatcher.handle(&status_frame("PRINT_PROCESSING", layer));

            let pair = dispatcher.status();
            assert_eq!(pair.previous, before);
            assert_eq!(pair.latest.as_ref().unwrap().current_slice_layer, Some(layer));
            assert_eq!(event, Some(Event::Status(pair.latest.clone().unwrap())));
        }
    }

    #[test]
    fn test_token_error() {
        let dispatcher = MessageDispatcher::new();
        dispatcher.handle(&status_frame("PRINT_GENERAL", 0));

        let event = dispatcher.handle(&text(json!({
            "cmd": "GET_PRINT_STATUS",
            "printStatus": "TOKEN_ERROR"
        })));

        assert_eq!(event, Some(Event::TokenRejected));
        let pair = dispatcher.status();
        assert_eq!(pair.latest.unwrap().print_status, PrintStatus::TokenError);
        assert_eq!(pair.previous.unwrap().print_status, PrintStatus::General);
    }

    #[test]
    fn test_missing_print_status() {
        let dispatcher = MessageDispatcher::new();
        let event = dispatcher.handle(&text(json!({ "cmd": "GET_PRINT_STATUS" })));

        let latest = dispatcher.latest().unwrap();
        assert_eq!(latest.print_status, PrintStatus::UnknownError);
        assert_eq!(event, Some(Event::Status(latest)));
    }

    #[test]
    fn test_start_print_ack() {
        let dispatcher = MessageDispatcher::new();
        let event = dispatcher.handle(&text(json!({
            "cmd": "START_PRINT",
            "status": "STARTED",
            "filename": "model.cxdlpv4"
        })));

        assert_eq!(
            event,
            Some(Event::PrintStarted(StartPrintAck {
                status: "STARTED".to_string(),
                filename: "model.cxdlpv4".to_string(),
            }))
        );
    }

    #[test]
    fn test_command_acks() {
        let dispatcher = MessageDispatcher::new();
        let ack = |cmd: &str, status: &str| {
            dispatcher.handle(&text(json!({ "cmd": cmd, "status": status })))
        };

        assert_eq!(
            ack("PRINT_STOP", "CMD_SUCCESS"),
            Some(Event::PrintStopped(CommandAck { status: "CMD_SUCCESS".to_string() }))
        );
        assert_eq!(
            ack("PRINT_PAUSE", "CMD_FAIL"),
            Some(Event::PrintPaused(CommandAck { status: "CMD_FAIL".to_string() }))
        );
        assert_eq!(
            ack("PRINT_PARA_SET", "CMD_SUCCESS"),
            Some(Event::ParameterSet(CommandAck { status: "CMD_SUCCESS".to_string() }))
        );
    }

    #[test]
    fn test_file_transfer_events() {
        let dispatcher = MessageDispatcher::new();

        let started = dispatcher.handle(&text(json!({
            "cmd": "START_FILE",
            "filename": "model.cxdlpv4",
            "key": "1a2b",
            "offset": "0",
            "size": "2048",
            "compress": false,
            "errorcode": 0
        })));
        assert_eq!(
            started,
            Some(Event::FileTransferStarted(FileTransfer {
                filename: "model.cxdlpv4".to_string(),
                key: "1a2b".to_string(),
                offset: 0,
                size: 2048,
                compress: false,
                error_code: 0,
            }))
        );

        let progress = dispatcher.handle(&text(json!({
            "cmd": "START_DATA",
            "key": "1a2b",
            "received": "1024",
            "size": "2048",
            "errorcode": 0
        })));
        assert_eq!(
            progress,
            Some(Event::FileTransferProgress(TransferProgress {
                key: "1a2b".to_string(),
                received: 1024,
                size: 2048,
                error_code: 0,
            }))
        );

        let check = dispatcher.handle(&text(json!({
            "cmd": "CHECK_DATA",
            "key": "1a2b",
            "checkstate": 0
        })));
        assert_eq!(
            check,
            Some(Event::FileChecked(FileCheck {
                key: "1a2b".to_string(),
                check_state: 0,
            }))
        );
    }

    #[test]
    fn test_incomplete_transfer_reply_dropped() {
        let dispatcher = MessageDispatcher::new();
        let event = dispatcher.handle(&text(json!({
            "cmd": "START_DATA",
            "key": "1a2b",
            "received": "lots"
        })));
        assert_eq!(event, None);
    }

    #[test]
    fn test_unknown_and_malformed() {
        let dispatcher = MessageDispatcher::new();

        assert_eq!(dispatcher.handle(&text(json!({ "cmd": "FOO" }))), None);
        assert_eq!(dispatcher.handle(&text(json!({ "hello": 1 }))), None);
        assert_eq!(dispatcher.handle(&text(json!([1, 2, 3]))), None);
        assert_eq!(dispatcher.handle(&Frame::text("{not json")), None);
        assert_eq!(dispatcher.handle(&Frame::binary(vec![0u8; 16])), None);
        assert_eq!(dispatcher.status(), StatusPair::default());
    }

    #[test]
    fn test_readers_never_see_torn_pair() {
        let dispatcher = Arc::new(MessageDispatcher::new());

        let writer = {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || {
                for layer in 0..2000 {
                    dispatcher.handle(&status_frame("PRINT_PROCESSING", layer));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                std::thread::spawn(move || {
                    for _ in 0..2000 {
                        let pair = dispatcher.status();
                        if let (Some(prev), Some(latest)) = (&pair.previous, &pair.latest) {
                            assert!(!Arc::ptr_eq(prev, latest));
                            assert_eq!(
                                prev.current_slice_layer.map(|l| l + 1),
                                latest.current_slice_layer
                            );
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
