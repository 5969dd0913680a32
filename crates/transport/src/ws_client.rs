//! WebSocket client for the printer endpoint

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use halot_protocol::Frame;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_with_config,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::Request,
        protocol::WebSocketConfig,
    },
};
use tracing::{debug, info, trace};

/// Port the printer listens on
pub const DEFAULT_PORT: u16 = 18188;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WsStream, Message>;
pub type WsSource = SplitStream<WsStream>;

#[derive(Error, Debug)]
pub enum WsClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// WebSocket client configuration
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// Target WebSocket URL
    pub url: String,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Largest inbound message accepted
    pub max_message_size: usize,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            max_message_size: 64 << 20,
        }
    }
}

/// Build the printer endpoint URL, bracketing IPv6 literals
pub fn printer_url(address: &str, port: u16) -> String {
    if address.parse::<std::net::Ipv6Addr>().is_ok() {
        format!("ws://[{}]:{}", address, port)
    } else {
        format!("ws://{}:{}", address, port)
    }
}

/// WebSocket client wrapper
pub struct WsClient {
    stream: WsStream,
}

impl WsClient {
    /// Connect to the printer
    ///
    /// No keep-alive pings are scheduled; liveness is judged by the TCP
    /// connection alone.
    pub async fn connect(config: &WsClientConfig) -> Result<Self, WsClientError> {
        let request = Self::build_request(config)?;

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(config.max_message_size);

        debug!("Connecting to {}", config.url);

        let (stream, response) = tokio::time::timeout(
            config.connect_timeout,
            connect_async_with_config(request, Some(ws_config), false),
        )
        .await
        .map_err(|_| WsClientError::Timeout(config.connect_timeout))?
        .map_err(|e| WsClientError::ConnectionFailed(e.to_string()))?;

        info!(
            "Connected to printer at {}, status: {}",
            config.url,
            response.status()
        );

        Ok(Self { stream })
    }

    fn build_request(config: &WsClientConfig) -> Result<Request<()>, WsClientError> {
        config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| WsClientError::InvalidUrl(e.to_string()))
    }

    /// Split into write and read halves
    pub fn split(self) -> (WsSink, WsSource) {
        self.stream.split()
    }
}

/// Send one frame on any message sink
pub async fn send_frame<S>(sink: &mut S, frame: Frame) -> Result<(), WsClientError>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let msg = match frame {
        Frame::Text(text) => {
            trace!("Sending text frame: {} bytes", text.len());
            Message::Text(text.into())
        }
        Frame::Binary(data) => {
            trace!("Sending binary frame: {} bytes", data.len());
            Message::Binary(data)
        }
    };

    sink.send(msg)
        .await
        .map_err(|e| WsClientError::SendFailed(e.to_string()))
}

/// Map a WebSocket message to a protocol frame
///
/// Control messages yield `Ok(None)`; a close message ends the stream.
/// Pongs to server pings are queued by tungstenite itself.
pub fn message_to_frame(msg: Message) -> Result<Option<Frame>, WsClientError> {
    match msg {
        Message::Text(text) => Ok(Some(Frame::Text(text.as_str().to_owned()))),
        Message::Binary(data) => Ok(Some(Frame::Binary(data))),
        Message::Close(_) => Err(WsClientError::ConnectionClosed),
        _ => Ok(None),
    }
}
