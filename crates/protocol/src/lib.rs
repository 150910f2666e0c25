//! Switchboard Protocol
//!
//! Shared types for communication between the Switchboard server, the
//! operator console, and the customer widget. These types are serialized
//! as JSON over HTTP and over the operator WebSocket.

use uuid::Uuid;

// Re-exports
pub mod client;
pub mod console;
pub mod types;

pub use client::*;
pub use console::{ConsoleCommand, ConsoleEvent};
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
