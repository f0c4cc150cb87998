//! Prompt assembly: system instruction, the last few turns of the chat, then the new message.

use crate::llm::{ChatMessage, Role};
use crate::message::Message;

/// Number of prior messages of the chat included in every prompt.
pub const HISTORY_WINDOW: usize = 3;

/// Who the bot is talking to, when the transport can name them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Counterpart {
    Person(String),
    Group(String),
}

/// Messages the bot authored are the assistant's turns; everyone else is the user.
pub fn role_for(msg: &Message, bot_name: &str) -> Role {
    if msg.sender_id == bot_name {
        Role::Assistant
    } else {
        Role::User
    }
}

pub fn system_prompt(bot_name: &str, counterpart: Option<&Counterpart>) -> String {
    let mut out = format!("You are {}, a helpful assistant in a chat app.", bot_name);
    match counterpart {
        Some(Counterpart::Person(name)) => {
            out.push_str(&format!(" You are chatting with {}.", name));
        }
        Some(Counterpart::Group(name)) => {
            out.push_str(&format!(" You are in the group chat \"{}\".", name));
        }
        None => {}
    }
    out
}

/// Build the ordered model input: system message, `window` (oldest first), then `current`.
pub fn assemble(
    bot_name: &str,
    counterpart: Option<&Counterpart>,
    window: &[Message],
    current: &Message,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(window.len() + 2);
    messages.push(ChatMessage::system(system_prompt(bot_name, counterpart)));
    for m in window {
        messages.push(ChatMessage {
            role: role_for(m, bot_name),
            content: m.text_or_placeholder().to_string(),
        });
    }
    messages.push(ChatMessage::user(current.text_or_placeholder()));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ChatType;

    #[test]
    fn bot_turns_are_assistant() {
        let bot = Message::text("oc_1", ChatType::Direct, "Kiwi", "hello");
        let user = Message::text("oc_1", ChatType::Direct, "ou_1", "hi");
        assert_eq!(role_for(&bot, "Kiwi"), Role::Assistant);
        assert_eq!(role_for(&user, "Kiwi"), Role::User);
    }

    #[test]
    fn system_prompt_hint_is_optional() {
        assert_eq!(
            system_prompt("Kiwi", None),
            "You are Kiwi, a helpful assistant in a chat app."
        );
        assert!(system_prompt("Kiwi", Some(&Counterpart::Person("Eddy".into())))
            .ends_with("You are chatting with Eddy."));
        assert!(system_prompt("Kiwi", Some(&Counterpart::Group("Ops".into())))
            .contains("group chat \"Ops\""));
    }

    #[test]
    fn assemble_orders_system_window_current() {
        let window = vec![
            Message::text("oc_1", ChatType::Direct, "ou_1", "one"),
            Message::text("oc_1", ChatType::Direct, "Kiwi", "two"),
        ];
        let current = Message::text("oc_1", ChatType::Direct, "ou_1", "three");
        let ctx = assemble("Kiwi", None, &window, &current);
        let roles: Vec<Role> = ctx.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(ctx[3].content, "three");
    }
}
