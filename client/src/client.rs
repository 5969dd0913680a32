//! Printer protocol client

use crate::config::ClientConfig;
use crate::error::Result;
use crate::events::EventSubscription;
use async_trait::async_trait;
use bytes::Bytes;
use halot_protocol::{
    Command, DisconnectInfo, Event, EventKind, FileAnnouncement, Frame, MessageDispatcher,
    PrintParameters, PrinterStatus, ProtocolError, StatusPair,
};
use halot_transport::{Connection, ConnectionState, FrameDispatcher, TransportEvent};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Routes transport traffic through the message dispatcher to subscribers
struct EventHub {
    dispatcher: MessageDispatcher,
    events: broadcast::Sender<Event>,
}

impl EventHub {
    fn publish(&self, event: Event) {
        trace!("Publishing {:?} event", event.kind());
        // No subscribers is fine; the snapshot is still kept.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl FrameDispatcher for EventHub {
    async fn dispatch(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { reconnect } => {
                info!("Printer connected (reconnect: {})", reconnect);
                self.publish(Event::Connected);
            }
            TransportEvent::Disconnected { reason, terminal } => {
                info!("Printer disconnected: {} (terminal: {})", reason, terminal);
                self.publish(Event::Disconnected(DisconnectInfo { reason, terminal }));
            }
            TransportEvent::Frame(frame) => {
                if let Some(event) = self.dispatcher.handle(&frame) {
                    self.publish(event);
                }
            }
        }
    }
}

/// Client for one Halot printer
///
/// All command methods are fire-and-forget: they return once the frame has
/// been handed to the socket, and the printer's answer arrives later as an
/// [`Event`]. Replies carry no request id, so two in-flight commands of the
/// same kind cannot be told apart.
pub struct ProtocolClient {
    address: String,
    password: RwLock<String>,
    connection: Connection,
    hub: Arc<EventHub>,
}

impl ProtocolClient {
    /// Client for the printer at `address` on the default port
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self::with_config(ClientConfig::new(address, password))
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(config.events.capacity.max(1));
        let connection = Connection::new(config.transport_config());

        Self {
            address: config.printer.address,
            password: RwLock::new(config.printer.password),
            connection,
            hub: Arc::new(EventHub {
                dispatcher: MessageDispatcher::new(),
                events,
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Replace the password used for subsequent commands
    pub fn set_password(&self, password: impl Into<String>) {
        *self.password.write() = password.into();
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Wait until the connection reaches `state`; false on timeout
    pub async fn wait_for_state(&self, state: ConnectionState, timeout: Duration) -> bool {
        let mut rx = self.connection.subscribe_state();
        tokio::time::timeout(timeout, rx.wait_for(|current| *current == state))
            .await
            .is_ok_and(|result| result.is_ok())
    }

    /// Subscribe to every event
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription::new(self.hub.events.subscribe(), None)
    }

    /// Subscribe to the given event kinds only
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventSubscription {
        EventSubscription::new(self.hub.events.subscribe(), Some(kinds.to_vec()))
    }

    /// Previous and latest printer status
    pub fn status(&self) -> StatusPair {
        self.hub.dispatcher.status()
    }

    pub fn latest_status(&self) -> Option<Arc<PrinterStatus>> {
        self.hub.dispatcher.latest()
    }

    pub fn previous_status(&self) -> Option<Arc<PrinterStatus>> {
        self.hub.dispatcher.previous()
    }

    /// Open the connection
    ///
    /// Emits [`Event::Connected`] on success. Later drops are retried in the
    /// background until the configured reconnect timeout elapses.
    pub async fn connect(&self) -> Result<()> {
        info!("Connecting to printer at {}", self.address);
        self.connection.connect(self.hub.clone()).await?;
        Ok(())
    }

    /// Close the connection and stop reconnecting
    pub async fn dispose(&self) {
        self.connection.close().await;
    }

    /// Ask for the firmware version (sent without a token)
    pub async fn check_version(&self) -> Result<()> {
        self.send_command(Command::VersionCheck).await
    }

    pub async fn get_printer_status(&self) -> Result<()> {
        self.send_command(Command::GetPrintStatus).await
    }

    /// Start printing a file already stored on the printer
    pub async fn start_print(&self, filename: &str) -> Result<()> {
        self.send_command(Command::StartPrint {
            filename: filename.to_string(),
        })
        .await
    }

    /// Stop the job; the platform returns home
    pub async fn stop_print(&self) -> Result<()> {
        self.send_command(Command::StopPrint).await
    }

    pub async fn pause_print(&self) -> Result<()> {
        self.send_command(Command::PausePrint).await
    }

    /// Resume a paused job
    ///
    /// The printer toggles on `PRINT_PAUSE`, so this sends the same command as
    /// [`pause_print`](Self::pause_print).
    pub async fn resume_print(&self) -> Result<()> {
        self.pause_print().await
    }

    /// Change print parameters of the running job
    pub async fn set_print_parameter(&self, params: PrintParameters) -> Result<()> {
        self.send_command(Command::SetPrintParameter(params)).await
    }

    /// Upload a file read to the end from `reader`
    ///
    /// Returns the transfer key that the printer's upload events carry.
    pub async fn send_file<R>(&self, filename: &str, mut reader: R) -> Result<String>
    where
        R: AsyncRead + Unpin,
    {
        if filename.is_empty() {
            return Err(empty_filename().into());
        }

        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;

        self.send_file_bytes(filename, data).await
    }

    /// Upload `data` as `filename`
    ///
    /// The `START_FILE` announcement and the binary content go out back to
    /// back. There is no resumption; a failed upload has to be sent again.
    pub async fn send_file_bytes(&self, filename: &str, data: impl Into<Bytes>) -> Result<String> {
        if filename.is_empty() {
            return Err(empty_filename().into());
        }

        let data: Bytes = data.into();
        let announcement = FileAnnouncement::new(filename, &data);
        let key = announcement.key.clone();

        let command = Command::StartFile(announcement);
        let text = command.encode(&self.password.read().clone())?;

        info!(
            "Uploading {} ({} bytes, key {})",
            filename,
            data.len(),
            key
        );

        self.connection
            .send_all(vec![Frame::text(text), Frame::binary(data)])
            .await?;

        Ok(key)
    }

    /// RTSP URI of the built-in camera
    pub fn camera_video_uri(&self) -> String {
        camera_video_uri(&self.address)
    }

    async fn send_command(&self, command: Command) -> Result<()> {
        let password = self.password.read().clone();
        let text = command.encode(&password)?;

        debug!("Sending {} ({} bytes)", command.tag(), text.len());
        self.connection.send(Frame::text(text)).await?;

        Ok(())
    }
}

fn empty_filename() -> ProtocolError {
    ProtocolError::InvalidArgument("filename must not be empty".to_string())
}

/// RTSP URI of the camera of the printer at `address`
pub fn camera_video_uri(address: &str) -> String {
    if address.parse::<std::net::Ipv6Addr>().is_ok() {
        format!("rtsp://[{}]/ch0_0", address)
    } else {
        format!("rtsp://{}/ch0_0", address)
    }
}
