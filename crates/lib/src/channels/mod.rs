//! Chat transports.
//!
//! `ChatTransport` is the boundary the router talks to: sending, display-name lookup, and an
//! inbound listener that pushes canonical messages into the router's inbox.

mod console;
mod transport;

pub use console::{ConsoleChannel, CONSOLE_CHAT_ID, CONSOLE_USER_ID};
pub use transport::{ChatTransport, TransportError};
