//! Chat wire protocol: JSON text frames over WebSocket.
//!
//! Inbound shape-guessing happens once here; everything downstream of the
//! socket only ever sees `Vec<Message>`.

use crate::message::{Message, Role};
use serde::{Deserialize, Serialize};

/// Outbound frame: `{"type":"chat","message":…}` or `{"type":"ping"}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    Chat { message: Message },
    Ping,
}

/// Inbound frame: either a history replay `{"messages":[…]}` or a single
/// message object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    History { messages: Vec<Message> },
    Single(Message),
}

impl InboundFrame {
    /// Normalize both shapes into an ordered message list.
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            InboundFrame::History { messages } => messages,
            InboundFrame::Single(message) => vec![message],
        }
    }
}

/// Parse one text frame. `None` for frames that are not chat payloads.
pub fn decode_inbound(text: &str) -> Option<Vec<Message>> {
    serde_json::from_str::<InboundFrame>(text)
        .ok()
        .map(InboundFrame::into_messages)
}

/// Connect URL: `{base}/chat/ws/{localId}/{remoteId}/{role}`.
pub fn connect_url(ws_base: &str, local_id: &str, remote_id: &str, role: Role) -> String {
    format!(
        "{}/chat/ws/{}/{}/{}",
        ws_base.trim_end_matches('/'),
        local_id,
        remote_id,
        role.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_single_message_frame() {
        let text = r#"{"id":"m1","text":"hi","createdAt":"2026-01-05T10:00:00Z","senderId":"u1","senderName":"Amina"}"#;
        let messages = decode_inbound(text).expect("decode");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "m1");
    }

    #[test]
    fn decode_history_frame() {
        let text = r#"{"messages":[
            {"id":"m1","text":"hi","createdAt":"2026-01-05T10:00:00Z","senderId":"u1","senderName":"Amina"},
            {"id":"m2","text":"hello","createdAt":"2026-01-05T10:01:00Z","senderId":"a1","senderName":"Agent"}
        ]}"#;
        let messages = decode_inbound(text).expect("decode");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id, "m2");
    }

    #[test]
    fn decode_rejects_non_chat_frames() {
        assert!(decode_inbound(r#"{"type":"pong"}"#).is_none());
        assert!(decode_inbound("not json").is_none());
    }

    #[test]
    fn outbound_frames_have_type_tags() {
        let ping = serde_json::to_string(&OutboundFrame::Ping).expect("serialize");
        assert_eq!(ping, r#"{"type":"ping"}"#);
        let chat = serde_json::to_value(OutboundFrame::Chat {
            message: Message::new("hi", "u1", "Amina"),
        })
        .expect("serialize");
        assert_eq!(chat.get("type").and_then(|v| v.as_str()), Some("chat"));
        assert!(chat.get("message").is_some());
    }

    #[test]
    fn connect_url_includes_role() {
        assert_eq!(
            connect_url("wss://api.farmlink.app/", "u1", "a1", Role::Agent),
            "wss://api.farmlink.app/chat/ws/u1/a1/agent"
        );
    }
}
