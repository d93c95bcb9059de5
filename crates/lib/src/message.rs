//! Chat data model: messages, conversations, and the persisted index.
//!
//! A conversation is identified by the non-agent participant's user id,
//! regardless of which role is viewing it. Messages are append-only from
//! the client's perspective.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which side of the marketplace this client speaks for: a "user" holds one
/// conversation with support, an "agent" chats with many users at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    /// Lowercase form used in the WebSocket URL path.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
        }
    }

    /// X-Token-Source header value: users authenticate with a Firebase
    /// token, agents with a password-derived one.
    pub fn token_source(self) -> &'static str {
        match self {
            Role::User => "firebase",
            Role::Agent => "password",
        }
    }
}

/// A single chat message. Immutable once sent, except `image`, which is
/// rewritten in place at most once when a remote reference resolves to a
/// cached local file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub sender_id: String,
    pub sender_name: String,
    /// Either a `file://` URI (cached on device), a bare backend filename,
    /// or an absolute URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Message {
    /// New outgoing text message with a generated id, stamped now.
    pub fn new(
        text: impl Into<String>,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            created_at: Utc::now(),
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            image: None,
        }
    }

    /// Same, with an attached image reference.
    pub fn with_image(
        text: impl Into<String>,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        let mut message = Self::new(text, sender_id, sender_name);
        message.image = Some(image.into());
        message
    }
}

/// One conversation: the user-side participant's id, a display name, and the
/// chronological message list. `last_message_text` always mirrors the text
/// of the most recently appended message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub participant_name: String,
    #[serde(default)]
    pub last_message_text: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            participant_name: String::new(),
            last_message_text: String::new(),
            messages: Vec::new(),
        }
    }

    /// Append a message, keeping `last_message_text` in sync. The participant
    /// name is learned from the first message sent by the user-side
    /// participant (the sender whose id equals the conversation id).
    pub fn push(&mut self, message: Message) {
        if self.participant_name.is_empty() && message.sender_id == self.id {
            self.participant_name = message.sender_name.clone();
        }
        self.last_message_text = message.text.clone();
        self.messages.push(message);
    }
}

/// Mapping from conversation id to conversation, persisted as a single
/// serialized blob by the chat cache.
pub type ConversationIndex = HashMap<String, Conversation>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_mirrors_last_message_text() {
        let mut conv = Conversation::new("u1");
        conv.push(Message::new("first", "u1", "Amina"));
        conv.push(Message::new("second", "a1", "Agent"));
        assert_eq!(conv.last_message_text, "second");
        assert_eq!(conv.messages.len(), 2);
    }

    #[test]
    fn participant_name_comes_from_the_user_side() {
        let mut conv = Conversation::new("u1");
        conv.push(Message::new("hello", "a1", "Agent"));
        assert_eq!(conv.participant_name, "");
        conv.push(Message::new("hi", "u1", "Amina"));
        assert_eq!(conv.participant_name, "Amina");
    }

    #[test]
    fn message_serializes_camel_case() {
        let m = Message::new("hi", "u1", "Amina");
        let json = serde_json::to_value(&m).expect("serialize");
        assert!(json.get("senderId").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("image").is_none());
    }
}
