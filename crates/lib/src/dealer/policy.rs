//! Reply policy: which messages get an answer, and whether the answer is threaded.

use crate::message::{ChatType, Message};

/// True when the bot is the first party mentioned. Exact, case-sensitive display-name match.
pub fn mentions_bot_first(msg: &Message, bot_name: &str) -> bool {
    msg.first_mention() == Some(bot_name)
}

/// Direct chats are always answered; group chats only when the bot is mentioned first.
/// Unknown chat types are never answered.
pub fn needs_reply(msg: &Message, bot_name: &str) -> bool {
    match msg.chat_type {
        ChatType::Direct => true,
        ChatType::Group => mentions_bot_first(msg, bot_name),
        ChatType::Unknown => false,
    }
}

/// Message id to reply in thread to: only for group messages addressed to the bot.
/// Direct replies are posted as new messages.
pub fn thread_target(msg: &Message, bot_name: &str) -> Option<String> {
    match msg.chat_type {
        ChatType::Group if mentions_bot_first(msg, bot_name) => msg.message_id.clone(),
        _ => None,
    }
}
