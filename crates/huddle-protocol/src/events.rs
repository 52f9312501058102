//! Event types for the Huddle protocol.
//!
//! Events are the fundamental unit of communication. A client sends
//! [`ClientEvent`]s tagged by `action`; the server fans out
//! [`ServerEvent`]s tagged by `type`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Kind of message content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    Voice,
    Video,
}

/// Lifecycle stage of a message.
///
/// Ordered: `Sent < Delivered < Read`. Status only ever moves forward.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    /// Move towards `target`, never backwards.
    #[must_use]
    pub fn advance(self, target: DeliveryStatus) -> DeliveryStatus {
        self.max(target)
    }

    /// Wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
        }
    }
}

/// An event sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Post a message to the session's room.
    SendMessage {
        #[serde(default)]
        message_type: MessageKind,
        #[serde(default)]
        content: String,
        /// Message being replied to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_to: Option<String>,
    },

    /// Typing indicator.
    Typing {
        #[serde(default)]
        is_typing: bool,
    },

    /// Read receipt.
    Read { message_id: String },

    /// Emoji reaction. `remove` withdraws a previous reaction.
    React {
        message_id: String,
        emoji: String,
        #[serde(default, skip_serializing_if = "is_false")]
        remove: bool,
    },
}

impl ClientEvent {
    /// The `action` tag of this event.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::Typing { .. } => "typing",
            ClientEvent::Read { .. } => "read",
            ClientEvent::React { .. } => "react",
        }
    }

    /// Create a text `send_message` event.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        ClientEvent::SendMessage {
            message_type: MessageKind::Text,
            content: content.into(),
            reply_to: None,
        }
    }

    /// Create a `read` event.
    #[must_use]
    pub fn read(message_id: impl Into<String>) -> Self {
        ClientEvent::Read {
            message_id: message_id.into(),
        }
    }

    /// Create a `react` event adding `emoji`.
    #[must_use]
    pub fn react(message_id: impl Into<String>, emoji: impl Into<String>) -> Self {
        ClientEvent::React {
            message_id: message_id.into(),
            emoji: emoji.into(),
            remove: false,
        }
    }
}

/// Sender details embedded in a serialized message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderView {
    pub id: String,
    pub username: String,
    pub avatar: Option<String>,
}

/// A user who reacted with a given emoji.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactorView {
    pub user_id: String,
    pub username: String,
}

/// A message as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: String,
    pub room_id: String,
    pub sender: SenderView,
    pub message_type: MessageKind,
    pub content: String,
    pub reply_to: Option<String>,
    pub status: DeliveryStatus,
    /// Per-room ordering assigned by the store.
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_deleted: bool,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// Reacting users by emoji. Live fan-out leaves this empty.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reactions: BTreeMap<String, Vec<ReactorView>>,
}

/// Category of a non-fatal error reported to the originating session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Unparseable or unknown-shape frame.
    Protocol,
    /// Reference to a message that does not exist in the room.
    Reference,
    /// Operation not permitted for this identity.
    NotAuthorized,
    /// Persistence failed; nothing was broadcast.
    Store,
}

/// An event pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new message in the room.
    Message { data: MessageView },

    /// Someone else is typing.
    Typing {
        user_id: String,
        username: String,
        is_typing: bool,
    },

    /// Presence change.
    Status {
        user_id: String,
        username: String,
        is_online: bool,
    },

    /// Read receipt.
    Read {
        message_id: String,
        user_id: String,
        username: String,
    },

    /// Reaction added, or removed when `removed` is set.
    Reaction {
        message_id: String,
        user_id: String,
        username: String,
        emoji: String,
        #[serde(default, skip_serializing_if = "is_false")]
        removed: bool,
    },

    /// A message was soft-deleted by its sender.
    MessageDeleted { message_id: String },

    /// Error reported only to the originating session.
    Error { code: ErrorCode, message: String },
}

impl ServerEvent {
    /// The `type` tag of this event.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Message { .. } => "message",
            ServerEvent::Typing { .. } => "typing",
            ServerEvent::Status { .. } => "status",
            ServerEvent::Read { .. } => "read",
            ServerEvent::Reaction { .. } => "reaction",
            ServerEvent::MessageDeleted { .. } => "message_deleted",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// Create an error event.
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_message_defaults() {
        let event: ClientEvent = serde_json::from_value(json!({"action": "send_message"})).unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage {
                message_type: MessageKind::Text,
                content: String::new(),
                reply_to: None,
            }
        );
    }

    #[test]
    fn test_send_message_with_reply() {
        let event: ClientEvent = serde_json::from_value(json!({
            "action": "send_message",
            "message_type": "image",
            "content": "look",
            "reply_to": "abc"
        }))
        .unwrap();

        match event {
            ClientEvent::SendMessage {
                message_type,
                reply_to,
                ..
            } => {
                assert_eq!(message_type, MessageKind::Image);
                assert_eq!(reply_to.as_deref(), Some("abc"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_value(json!({"action": "delete_everything"}));
        assert!(result.is_err());

        let result: Result<ClientEvent, _> = serde_json::from_value(json!({"content": "hi"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_status_ordering() {
        assert!(DeliveryStatus::Sent < DeliveryStatus::Delivered);
        assert!(DeliveryStatus::Delivered < DeliveryStatus::Read);
        assert_eq!(
            DeliveryStatus::Read.advance(DeliveryStatus::Delivered),
            DeliveryStatus::Read
        );
        assert_eq!(
            DeliveryStatus::Sent.advance(DeliveryStatus::Read),
            DeliveryStatus::Read
        );
    }

    #[test]
    fn test_server_event_shape() {
        let event = ServerEvent::Reaction {
            message_id: "m1".into(),
            user_id: "u1".into(),
            username: "bob".into(),
            emoji: "👍".into(),
            removed: false,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "reaction");
        assert_eq!(value["emoji"], "👍");
        // `removed` is only present on removals
        assert!(value.get("removed").is_none());

        let value = serde_json::to_value(ServerEvent::error(ErrorCode::NotAuthorized, "no")).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "not_authorized");
    }
}
