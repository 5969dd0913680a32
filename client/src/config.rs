//! Client configuration

use anyhow::Result;
use halot_transport::{ConnectionConfig, DEFAULT_PORT, WsClientConfig, printer_url};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    /// Printer address and credentials
    #[serde(default)]
    pub printer: PrinterConfig,

    /// Connection and reconnection behaviour
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Event delivery
    #[serde(default)]
    pub events: EventConfig,
}

impl ClientConfig {
    /// Configuration for `address` with default connection settings
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            printer: PrinterConfig {
                address: address.into(),
                password: password.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// WebSocket endpoint of the printer
    pub fn url(&self) -> String {
        printer_url(&self.printer.address, self.printer.port)
    }

    /// Settings handed to the transport
    pub fn transport_config(&self) -> ConnectionConfig {
        let conn = &self.connection;
        ConnectionConfig {
            client: WsClientConfig {
                url: self.url(),
                connect_timeout: Duration::from_secs(conn.connect_timeout),
                max_message_size: conn.max_message_size,
            },
            reconnect_timeout: Duration::from_secs(conn.reconnect_timeout),
            reconnect_delay: Duration::from_millis(conn.reconnect_delay_ms),
            max_reconnect_delay: Duration::from_secs(conn.max_reconnect_delay),
        }
    }
}

/// Printer address and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct PrinterConfig {
    /// IP address or host name
    #[serde(default)]
    pub address: String,

    /// WebSocket port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Printer password (at most 8 characters)
    #[serde(default)]
    pub password: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: default_port(),
            password: String::new(),
        }
    }
}

/// Connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSettings {
    /// Connection timeout (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Stop reconnecting after this long without a connection (seconds)
    #[serde(default = "default_reconnect_timeout")]
    pub reconnect_timeout: u64,

    /// Initial delay between reconnect attempts (milliseconds)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Maximum delay between reconnect attempts (seconds)
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay: u64,

    /// Largest inbound message (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_reconnect_timeout() -> u64 {
    600 // 10 minutes
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_delay() -> u64 {
    30
}

fn default_max_message_size() -> usize {
    64 << 20
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            reconnect_timeout: default_reconnect_timeout(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay: default_max_reconnect_delay(),
            max_message_size: default_max_message_size(),
        }
    }
}

/// Event delivery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    /// Events buffered per subscriber before the slowest one starts lagging
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}
