//! Supervised printer connection with bounded reconnection

use crate::ws_client::{
    WsClient, WsClientConfig, WsClientError, WsSink, WsSource, message_to_frame, send_frame,
};
use crate::SharedFrameDispatcher;
use futures::{SinkExt, StreamExt};
use halot_protocol::Frame;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection already started")]
    AlreadyStarted,

    #[error(transparent)]
    Client(#[from] WsClientError),
}

/// Lifecycle of the printer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Closed by the caller or reconnection gave up
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// What the connection reports to its dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected {
        /// Re-established after a drop
        reconnect: bool,
    },
    Frame(Frame),
    Disconnected {
        reason: String,
        /// Reconnection has stopped; the connection is closed
        terminal: bool,
    },
}

/// Connection and reconnection settings
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub client: WsClientConfig,

    /// Give up reconnecting once a drop has lasted this long
    pub reconnect_timeout: Duration,

    /// First delay between reconnect attempts (doubles per failure)
    pub reconnect_delay: Duration,

    /// Upper bound for the reconnect delay
    pub max_reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            client: WsClientConfig::default(),
            reconnect_timeout: Duration::from_secs(600),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

struct Shared {
    config: ConnectionConfig,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Connection state: {} -> {}", previous, state);
        }
    }

    /// Move to `Connecting` unless a connection is already underway
    fn claim_connecting(&self) -> bool {
        self.state.send_if_modified(|state| match state {
            ConnectionState::Connecting | ConnectionState::Connected => false,
            ConnectionState::Disconnected | ConnectionState::Closed => {
                debug!("Connection state: {} -> {}", state, ConnectionState::Connecting);
                *state = ConnectionState::Connecting;
                true
            }
        })
    }
}

/// Persistent connection to one printer
///
/// Inbound frames and lifecycle changes go to the dispatcher passed to
/// [`Connection::connect`]. Sends fail fast with
/// [`TransportError::NotConnected`] whenever no socket is up; nothing is
/// queued.
pub struct Connection {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
    dispatcher: Mutex<Option<SharedFrameDispatcher>>,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            shared: Arc::new(Shared {
                config,
                sink: tokio::sync::Mutex::new(None),
                state,
            }),
            task: Mutex::new(None),
            dispatcher: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Open the connection and start the reader task
    ///
    /// Fails if the first attempt fails; automatic reconnection only covers
    /// drops of an established connection. Only one connection exists at a
    /// time: a call made while another is connecting, connected or
    /// reconnecting fails with [`TransportError::AlreadyStarted`].
    pub async fn connect(&self, dispatcher: SharedFrameDispatcher) -> Result<(), TransportError> {
        if self.task.lock().as_ref().is_some_and(|task| !task.is_finished()) {
            return Err(TransportError::AlreadyStarted);
        }

        if !self.shared.claim_connecting() {
            return Err(TransportError::AlreadyStarted);
        }

        let client = match WsClient::connect(&self.shared.config.client).await {
            Ok(client) => client,
            Err(e) => {
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };

        let (sink, source) = client.split();
        *self.shared.sink.lock().await = Some(sink);
        self.shared.set_state(ConnectionState::Connected);

        dispatcher
            .dispatch(TransportEvent::Connected { reconnect: false })
            .await;

        *self.dispatcher.lock() = Some(dispatcher.clone());
        let handle = tokio::spawn(supervise(self.shared.clone(), source, dispatcher));
        *self.task.lock() = Some(handle);

        Ok(())
    }

    /// Send one frame
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let mut guard = self.shared.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
        send_frame(sink, frame).await?;
        Ok(())
    }

    /// Send frames back to back; no other send can interleave
    pub async fn send_all(&self, frames: Vec<Frame>) -> Result<(), TransportError> {
        let mut guard = self.shared.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
        for frame in frames {
            send_frame(sink, frame).await?;
        }
        Ok(())
    }

    /// Stop the reader task and close the socket
    ///
    /// If the connection was still live or reconnecting, the dispatcher gets
    /// a terminal [`TransportEvent::Disconnected`].
    pub async fn close(&self) {
        let task = self.task.lock().take();
        let was_running = task.as_ref().is_some_and(|task| !task.is_finished());
        if let Some(task) = task {
            task.abort();
        }
        let dispatcher = self.dispatcher.lock().take();

        if let Some(mut sink) = self.shared.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!("Error while closing connection: {}", e);
            }
        }

        self.shared.set_state(ConnectionState::Closed);
        info!("Connection closed");

        if let (true, Some(dispatcher)) = (was_running, dispatcher) {
            dispatcher
                .dispatch(TransportEvent::Disconnected {
                    reason: "closed by client".to_string(),
                    terminal: true,
                })
                .await;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn supervise(shared: Arc<Shared>, mut source: WsSource, dispatcher: SharedFrameDispatcher) {
    loop {
        let reason = read_frames(&mut source, &dispatcher).await;

        shared.sink.lock().await.take();
        shared.set_state(ConnectionState::Disconnected);
        warn!("Connection lost: {}", reason);

        dispatcher
            .dispatch(TransportEvent::Disconnected {
                reason,
                terminal: false,
            })
            .await;

        match reconnect(&shared).await {
            Some(new_source) => {
                source = new_source;
                dispatcher
                    .dispatch(TransportEvent::Connected { reconnect: true })
                    .await;
            }
            None => {
                shared.set_state(ConnectionState::Closed);
                dispatcher
                    .dispatch(TransportEvent::Disconnected {
                        reason: format!(
                            "reconnect timeout of {:?} exceeded",
                            shared.config.reconnect_timeout
                        ),
                        terminal: true,
                    })
                    .await;
                return;
            }
        }
    }
}

/// Forward frames until the stream ends; returns the reason it ended
async fn read_frames(source: &mut WsSource, dispatcher: &SharedFrameDispatcher) -> String {
    loop {
        match source.next().await {
            Some(Ok(Message::Close(frame))) => {
                return match frame {
                    Some(frame) => format!("closed by printer: {} {}", frame.code, frame.reason.as_str()),
                    None => "closed by printer".to_string(),
                };
            }
            Some(Ok(msg)) => match message_to_frame(msg) {
                Ok(Some(frame)) => {
                    let kind = if matches!(frame, Frame::Text(_)) { "text" } else { "binary" };
                    trace!("Received {} frame", kind);
                    dispatcher.dispatch(TransportEvent::Frame(frame)).await;
                }
                Ok(None) => continue,
                Err(e) => return e.to_string(),
            },
            Some(Err(e)) => return e.to_string(),
            None => return "connection ended".to_string(),
        }
    }
}

/// Retry with exponential backoff until connected or the timeout elapses
async fn reconnect(shared: &Shared) -> Option<WsSource> {
    let config = &shared.config;
    let deadline = Instant::now() + config.reconnect_timeout;
    let mut delay = config.reconnect_delay;
    let mut attempt = 0u32;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!("Giving up reconnecting after {} attempt(s)", attempt);
            return None;
        }

        let jitter = Duration::from_millis(fastrand::u64(0..=delay.as_millis() as u64 / 4));
        tokio::time::sleep((delay + jitter).min(remaining)).await;

        if Instant::now() >= deadline {
            continue;
        }

        attempt += 1;
        shared.set_state(ConnectionState::Connecting);

        match WsClient::connect(&config.client).await {
            Ok(client) => {
                let (sink, source) = client.split();
                *shared.sink.lock().await = Some(sink);
                shared.set_state(ConnectionState::Connected);
                info!("Reconnected after {} attempt(s)", attempt);
                return Some(source);
            }
            Err(e) => {
                shared.set_state(ConnectionState::Disconnected);
                warn!("Reconnect attempt {} failed: {}", attempt, e);
            }
        }

        delay = (delay * 2).min(config.max_reconnect_delay);
    }
}
