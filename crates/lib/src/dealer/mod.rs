//! Message dealer: decides whether an inbound message gets a reply and produces it.
//!
//! `ResponseGenerator` is the single seam the router calls. `MessageDealer` answers with the
//! LLM backend using a bounded window of chat history; `EchoGenerator` is the canned variant.

pub mod context;
mod echo;
pub mod policy;

pub use context::{Counterpart, HISTORY_WINDOW};
pub use echo::EchoGenerator;

use crate::channels::ChatTransport;
use crate::history::HistoryStore;
use crate::llm::{ChatMessage, LlmBackend, LlmError};
use crate::message::{ChatType, Message};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum DealerError {
    #[error("reply generation failed: {0}")]
    Llm(#[from] LlmError),
}

/// Turns one inbound message into an optional reply.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate_reply(&self, message: Message) -> Result<Option<Message>, DealerError>;
}

/// LLM-backed responder that owns the per-chat history.
pub struct MessageDealer {
    bot_name: String,
    history: HistoryStore,
    backend: Arc<dyn LlmBackend>,
    /// Name lookups for the system prompt hint; None means no hint.
    directory: Option<Arc<dyn ChatTransport>>,
}

impl MessageDealer {
    pub fn new(
        bot_name: impl Into<String>,
        backend: Arc<dyn LlmBackend>,
        history: HistoryStore,
    ) -> Self {
        Self {
            bot_name: bot_name.into(),
            history,
            backend,
            directory: None,
        }
    }

    /// Resolve counterpart names through this transport.
    pub fn with_directory(mut self, directory: Arc<dyn ChatTransport>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn needs_reply(&self, message: &Message) -> bool {
        policy::needs_reply(message, &self.bot_name)
    }

    /// Ordered model input for `message`: system prompt, up to `HISTORY_WINDOW` prior
    /// messages of the chat, then the message itself.
    pub async fn build_context(&self, message: &Message) -> Vec<ChatMessage> {
        let window = self.history.recent(&message.chat_id, HISTORY_WINDOW).await;
        let counterpart = self.counterpart(message).await;
        context::assemble(&self.bot_name, counterpart.as_ref(), &window, message)
    }

    async fn counterpart(&self, message: &Message) -> Option<Counterpart> {
        let directory = self.directory.as_ref()?;
        let (id, group) = match message.chat_type {
            ChatType::Direct => (message.sender_id.as_str(), false),
            ChatType::Group => (message.chat_id.as_str(), true),
            ChatType::Unknown => return None,
        };
        let name = directory
            .display_name(id)
            .await
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())?;
        Some(if group {
            Counterpart::Group(name)
        } else {
            Counterpart::Person(name)
        })
    }
}

#[async_trait]
impl ResponseGenerator for MessageDealer {
    async fn generate_reply(&self, message: Message) -> Result<Option<Message>, DealerError> {
        if !self.needs_reply(&message) {
            log::debug!(
                "dealer: no reply needed for {:?} message in {}",
                message.chat_type,
                message.chat_id
            );
            self.history.append(message).await;
            return Ok(None);
        }

        let context = self.build_context(&message).await;
        let text = self.backend.chat(context).await?;
        let thread = policy::thread_target(&message, &self.bot_name);
        let reply = message.reply(self.bot_name.clone(), text, thread);

        self.history.append(message).await;
        self.history.append(reply.clone()).await;
        Ok(Some(reply))
    }
}
