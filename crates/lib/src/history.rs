//! Per-chat conversation history used to build reply context.
//!
//! Chats are keyed by chat id and hold messages in arrival order. History is only ever
//! appended to; it is seeded at startup from the conversation log.

use crate::message::Message;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Unique chat identifier (opaque platform string).
pub type ChatId = String;

/// chat id -> messages in chronological order.
pub type History = HashMap<ChatId, Vec<Message>>;

/// In-memory history store (append, recent window, snapshot).
pub struct HistoryStore {
    inner: RwLock<History>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::from_history(History::new())
    }

    /// Seed the store with history reconstructed from the log.
    pub fn from_history(history: History) -> Self {
        Self {
            inner: RwLock::new(history),
        }
    }

    /// Append a message to its chat, creating the chat on first use.
    pub async fn append(&self, message: Message) {
        self.inner
            .write()
            .await
            .entry(message.chat_id.clone())
            .or_default()
            .push(message);
    }

    /// The last `window` messages of a chat, oldest first. Empty for unknown chats.
    pub async fn recent(&self, chat_id: &str, window: usize) -> Vec<Message> {
        let g = self.inner.read().await;
        match g.get(chat_id) {
            Some(messages) => {
                let start = messages.len().saturating_sub(window);
                messages[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// Full message list of a chat (clone).
    pub async fn messages(&self, chat_id: &str) -> Vec<Message> {
        self.inner
            .read()
            .await
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }
}
