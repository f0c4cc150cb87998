//! Transport boundary: what the router needs from a chat platform.

use crate::message::Message;
use crate::router::Inbox;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("send to chat {chat_id} failed: {reason}")]
    Send { chat_id: String, reason: String },
}

/// Handle to a chat platform connection (send, name lookup, inbound listener).
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport id (e.g. "console").
    fn id(&self) -> &str;

    /// Deliver one message. A set `message_id` means reply in thread to that message;
    /// otherwise post a new message to `chat_id`.
    async fn send_message(&self, message: &Message) -> Result<(), TransportError>;

    /// Human-readable name for a user id or chat id. None when unknown or unavailable.
    async fn display_name(&self, _id: &str) -> Option<String> {
        None
    }

    /// Start pushing inbound messages into `inbox`. Transports without a listener return None.
    fn start_inbound(self: Arc<Self>, _inbox: Inbox) -> Option<JoinHandle<()>> {
        None
    }

    /// Stop the inbound listener.
    fn stop(&self) {}
}
