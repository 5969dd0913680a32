//! Halot Protocol - Commands, inbound messages and printer state
//!
//! This crate defines the JSON-over-WebSocket protocol spoken by Halot resin
//! printers:
//! - `Command`: outbound requests, encoded with an authentication token
//! - `Frame`: one text or binary message on the connection
//! - `Event`: typed notifications decoded from inbound frames
//! - `MessageDispatcher`: frame classification and status snapshot tracking

mod command;
mod dispatcher;
mod event;
mod fields;
mod frame;
mod status;

pub use command::*;
pub use dispatcher::*;
pub use event::*;
pub use frame::*;
pub use status::*;
