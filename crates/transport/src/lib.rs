//! Halot Transport - WebSocket layer
//!
//! This crate provides:
//! - A thin WebSocket client for the printer's `ws://<host>:18188` endpoint
//! - A supervised connection with bounded automatic reconnection
//! - The `FrameDispatcher` hook through which inbound traffic is delivered

mod connection;
mod ws_client;

pub use connection::*;
pub use ws_client::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Receives connection lifecycle notifications and inbound frames
///
/// Called serially from the connection's reader task.
#[async_trait]
pub trait FrameDispatcher: Send + Sync {
    async fn dispatch(&self, event: TransportEvent);
}

pub type SharedFrameDispatcher = Arc<dyn FrameDispatcher>;
