//! Canned responder: answers "Received: <text>" under the same reply policy, no model, no history.

use crate::dealer::{policy, DealerError, ResponseGenerator};
use crate::message::Message;
use async_trait::async_trait;

pub struct EchoGenerator {
    bot_name: String,
}

impl EchoGenerator {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
        }
    }
}

#[async_trait]
impl ResponseGenerator for EchoGenerator {
    async fn generate_reply(&self, message: Message) -> Result<Option<Message>, DealerError> {
        if !policy::needs_reply(&message, &self.bot_name) {
            return Ok(None);
        }
        let text = format!("Received: {}", message.text_or_placeholder());
        let thread = policy::thread_target(&message, &self.bot_name);
        Ok(Some(message.reply(self.bot_name.clone(), text, thread)))
    }
}
