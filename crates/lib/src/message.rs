//! Canonical chat message: what transports produce, the router queues, the dealer answers,
//! and the conversation log stores.

use crate::timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Text substituted for message kinds the bot cannot read.
pub const UNSUPPORTED_CONTENT_PLACEHOLDER: &str = "Failed to parse, please send text message";

/// Kind of conversation a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// One-to-one chat between the bot and a user (platform spelling "p2p").
    #[serde(rename = "p2p", alias = "direct")]
    Direct,
    Group,
    /// Anything the platform adds later; never answered.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Post,
    File,
    #[serde(other)]
    Other,
}

/// Platform identifiers of a mentioned party.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub union_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// A party explicitly addressed in a message (e.g. `@Kiwi`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    /// Placeholder key inside the text (e.g. `@_user_1`).
    pub key: String,
    #[serde(alias = "name")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_key: Option<String>,
    #[serde(default, alias = "id")]
    pub ids: MentionIds,
}

/// One chat message, inbound or outbound. Never mutated once built; replies are copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub chat_id: String,
    pub chat_type: ChatType,
    /// Platform user id, or the bot's name for messages the bot authored.
    pub sender_id: String,
    /// Set only when the message should be sent as a threaded reply to this id.
    #[serde(default)]
    pub message_id: Option<String>,
    pub message_type: MessageType,
    /// For text messages `{"text": "..."}`; other kinds are passed through as-is.
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentions: Option<Vec<Mention>>,
    pub timestamp: String,
    pub update_time: String,
}

impl Message {
    /// A new text message stamped with the current time. Not threaded.
    pub fn text(
        chat_id: impl Into<String>,
        chat_type: ChatType,
        sender_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let now = timestamp::now_iso();
        Self {
            chat_id: chat_id.into(),
            chat_type,
            sender_id: sender_id.into(),
            message_id: None,
            message_type: MessageType::Text,
            content: json!({ "text": text.into() }),
            mentions: None,
            timestamp: now.clone(),
            update_time: now,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_mentions(mut self, mentions: Vec<Mention>) -> Self {
        self.mentions = Some(mentions);
        self
    }

    /// The literal text of a text message; None for other kinds or a malformed payload.
    pub fn text_content(&self) -> Option<&str> {
        if self.message_type != MessageType::Text {
            return None;
        }
        self.content.get("text").and_then(Value::as_str)
    }

    /// Text for display or prompting: the message text, or the placeholder for unreadable content.
    pub fn text_or_placeholder(&self) -> &str {
        self.text_content().unwrap_or(UNSUPPORTED_CONTENT_PLACEHOLDER)
    }

    /// Display name of the first mentioned party, if any.
    pub fn first_mention(&self) -> Option<&str> {
        self.mentions
            .as_deref()
            .and_then(|m| m.first())
            .map(|m| m.display_name.as_str())
    }

    /// Build a text reply in the same chat, authored by `sender_id`.
    /// `thread_reply_to` sets `message_id`; pass None to post a new message.
    pub fn reply(
        &self,
        sender_id: impl Into<String>,
        text: impl Into<String>,
        thread_reply_to: Option<String>,
    ) -> Self {
        let now = timestamp::now_iso();
        Self {
            chat_id: self.chat_id.clone(),
            chat_type: self.chat_type,
            sender_id: sender_id.into(),
            message_id: thread_reply_to,
            message_type: MessageType::Text,
            content: json!({ "text": text.into() }),
            mentions: None,
            timestamp: now.clone(),
            update_time: now,
        }
    }

    /// Copy with fresh timestamps (used for each firing of a timed event).
    pub fn restamped(&self) -> Self {
        let now = timestamp::now_iso();
        Self {
            timestamp: now.clone(),
            update_time: now,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(name: &str) -> Mention {
        Mention {
            key: "@_user_1".to_string(),
            display_name: name.to_string(),
            tenant_key: None,
            ids: MentionIds::default(),
        }
    }

    #[test]
    fn chat_type_uses_platform_spelling() {
        let m = Message::text("oc_1", ChatType::Direct, "ou_1", "hi");
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["chat_type"], "p2p");
        assert_eq!(v["message_type"], "text");
        assert_eq!(v["content"]["text"], "hi");
        assert!(v["message_id"].is_null());
    }

    #[test]
    fn chat_type_accepts_direct_and_unknown() {
        let direct: ChatType = serde_json::from_str("\"direct\"").unwrap();
        assert_eq!(direct, ChatType::Direct);
        let topic: ChatType = serde_json::from_str("\"topic_group\"").unwrap();
        assert_eq!(topic, ChatType::Unknown);
    }

    #[test]
    fn non_text_content_degrades_to_placeholder() {
        let mut m = Message::text("oc_1", ChatType::Direct, "ou_1", "ignored");
        m.message_type = MessageType::Image;
        m.content = json!({ "image_key": "img_v3_abc" });
        assert_eq!(m.text_content(), None);
        assert_eq!(m.text_or_placeholder(), UNSUPPORTED_CONTENT_PLACEHOLDER);
    }

    #[test]
    fn unknown_message_type_deserializes_as_other() {
        let raw = r#"{
            "chat_id": "oc_1", "chat_type": "group", "sender_id": "ou_1",
            "message_type": "sticker", "content": {"file_key": "x"},
            "timestamp": "2025-01-14T07:03:43.273", "update_time": "2025-01-14T07:03:43.273"
        }"#;
        let m: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(m.message_type, MessageType::Other);
        assert_eq!(m.message_id, None);
        assert_eq!(m.mentions, None);
    }

    #[test]
    fn mention_accepts_platform_field_names() {
        let raw = r#"{"key": "@_user_1", "name": "Kiwi", "tenant_key": "t1", "id": {"open_id": "ou_bot"}}"#;
        let m: Mention = serde_json::from_str(raw).unwrap();
        assert_eq!(m.display_name, "Kiwi");
        assert_eq!(m.ids.open_id.as_deref(), Some("ou_bot"));
    }

    #[test]
    fn reply_copies_chat_and_replaces_content() {
        let original = Message::text("oc_1", ChatType::Group, "ou_1", "@Kiwi hello")
            .with_message_id("om_1")
            .with_mentions(vec![mention("Kiwi")]);
        let reply = original.reply("Kiwi", "hi there", original.message_id.clone());
        assert_eq!(reply.chat_id, "oc_1");
        assert_eq!(reply.chat_type, ChatType::Group);
        assert_eq!(reply.sender_id, "Kiwi");
        assert_eq!(reply.message_id.as_deref(), Some("om_1"));
        assert_eq!(reply.text_content(), Some("hi there"));
        assert_eq!(reply.mentions, None);
        // original untouched
        assert_eq!(original.text_content(), Some("@Kiwi hello"));
        assert_eq!(original.first_mention(), Some("Kiwi"));
    }
}
