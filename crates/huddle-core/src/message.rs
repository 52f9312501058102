//! Messages, read receipts and reactions.

use crate::identity::{Identity, MessageId, RoomId, UserId};
use chrono::{DateTime, SecondsFormat, Utc};
use huddle_protocol::{DeliveryStatus, MessageKind, MessageView, ReactorView, SenderView};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A message about to be persisted.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub sender: Identity,
    pub kind: MessageKind,
    pub content: String,
    /// Already resolved to a message in the same room.
    pub reply_to: Option<MessageId>,
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender: Identity,
    pub kind: MessageKind,
    pub content: String,
    pub reply_to: Option<MessageId>,
    pub status: DeliveryStatus,
    /// Per-room sequence assigned by the store.
    pub sequence: u64,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Materialize a new message with a fresh id and `sent` status.
    #[must_use]
    pub fn create(new: NewMessage, sequence: u64) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::new(),
            room_id: new.room_id,
            sender: new.sender,
            kind: new.kind,
            content: new.content,
            reply_to: new.reply_to,
            status: DeliveryStatus::Sent,
            sequence,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_from(&self, user: &UserId) -> bool {
        self.sender.user_id == *user
    }

    /// Client-facing view. Content of a deleted message is never exposed.
    #[must_use]
    pub fn to_view(&self) -> MessageView {
        MessageView {
            id: self.id.to_string(),
            room_id: self.room_id.to_string(),
            sender: SenderView {
                id: self.sender.user_id.to_string(),
                username: self.sender.username.clone(),
                avatar: self.sender.avatar.clone(),
            },
            message_type: self.kind,
            content: if self.is_deleted {
                String::new()
            } else {
                self.content.clone()
            },
            reply_to: self.reply_to.map(|id| id.to_string()),
            status: self.status,
            sequence: self.sequence,
            is_deleted: self.is_deleted,
            created_at: self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            reactions: BTreeMap::new(),
        }
    }

    /// [`Message::to_view`] with the reactions aggregated by emoji.
    #[must_use]
    pub fn to_view_with_reactions(&self, reactions: &[Reaction]) -> MessageView {
        let mut view = self.to_view();
        view.reactions = group_reactions(reactions)
            .into_iter()
            .map(|(emoji, users)| {
                let users = users
                    .into_iter()
                    .map(|user| ReactorView {
                        user_id: user.user_id.to_string(),
                        username: user.username,
                    })
                    .collect();
                (emoji, users)
            })
            .collect();
        view
    }

    /// At most `max_chars` characters of content, for notifications.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        if self.is_deleted {
            return String::new();
        }
        self.content.chars().take(max_chars).collect()
    }
}

/// Proof that a user has seen a message. Unique per (message, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub read_at: DateTime<Utc>,
}

impl ReadReceipt {
    #[must_use]
    pub fn new(message_id: MessageId, user_id: UserId) -> Self {
        Self {
            message_id,
            user_id,
            read_at: Utc::now(),
        }
    }
}

/// An emoji reaction. Unique per (message, user, emoji).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: MessageId,
    pub user: Identity,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

impl Reaction {
    #[must_use]
    pub fn new(message_id: MessageId, user: Identity, emoji: impl Into<String>) -> Self {
        Self {
            message_id,
            user,
            emoji: emoji.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether two reactions collide on the uniqueness key.
    #[must_use]
    pub fn same_key(&self, other: &Reaction) -> bool {
        self.message_id == other.message_id
            && self.user.user_id == other.user.user_id
            && self.emoji == other.emoji
    }
}

/// Group reactions by emoji, each emoji mapping to its reacting users in
/// the order they reacted.
#[must_use]
pub fn group_reactions(reactions: &[Reaction]) -> BTreeMap<String, Vec<Identity>> {
    let mut ordered: Vec<&Reaction> = reactions.iter().collect();
    ordered.sort_by_key(|r| r.created_at);

    let mut groups: BTreeMap<String, Vec<Identity>> = BTreeMap::new();
    for reaction in ordered {
        let users = groups.entry(reaction.emoji.clone()).or_default();
        if !users.iter().any(|u| u.user_id == reaction.user.user_id) {
            users.push(reaction.user.clone());
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(content: &str) -> Message {
        Message::create(
            NewMessage {
                room_id: RoomId::new(),
                sender: Identity::new(UserId::new(), "alice"),
                kind: MessageKind::Text,
                content: content.to_string(),
                reply_to: None,
            },
            1,
        )
    }

    #[test]
    fn test_new_message_is_sent() {
        let message = sample("hi");
        assert_eq!(message.status, DeliveryStatus::Sent);
        assert!(!message.is_deleted);

        let view = message.to_view();
        assert_eq!(view.content, "hi");
        assert_eq!(view.sender.username, "alice");
        assert_eq!(view.status, DeliveryStatus::Sent);
    }

    #[test]
    fn test_deleted_content_hidden() {
        let mut message = sample("secret");
        message.is_deleted = true;
        message.deleted_at = Some(Utc::now());

        let view = message.to_view();
        assert!(view.is_deleted);
        assert!(view.content.is_empty());
        assert!(message.preview(100).is_empty());
    }

    #[test]
    fn test_preview_truncates_on_chars() {
        let message = sample("héllo wörld");
        assert_eq!(message.preview(5), "héllo");
    }

    #[test]
    fn test_group_reactions() {
        let message_id = MessageId::new();
        let alice = Identity::new(UserId::new(), "alice");
        let bob = Identity::new(UserId::new(), "bob");

        let mut first = Reaction::new(message_id, bob.clone(), "👍");
        first.created_at -= Duration::seconds(10);
        let reactions = vec![
            Reaction::new(message_id, alice.clone(), "👍"),
            first,
            Reaction::new(message_id, alice.clone(), "🎉"),
        ];

        let groups = group_reactions(&reactions);
        assert_eq!(groups.len(), 2);
        let thumbs: Vec<&str> = groups["👍"].iter().map(|u| u.username.as_str()).collect();
        assert_eq!(thumbs, vec!["bob", "alice"]);
        assert_eq!(groups["🎉"].len(), 1);
    }

    #[test]
    fn test_view_carries_reactions() {
        let message = sample("hi");
        let bob = Identity::new(UserId::new(), "bob");
        let reactions = vec![
            Reaction::new(message.id, bob.clone(), "👍"),
            Reaction::new(message.id, bob.clone(), "👍"),
        ];

        let view = message.to_view_with_reactions(&reactions);
        assert_eq!(view.reactions.len(), 1);
        assert_eq!(view.reactions["👍"].len(), 1);
        assert_eq!(view.reactions["👍"][0].user_id, bob.user_id.to_string());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["reactions"]["👍"][0]["username"], "bob");
        // Absent when nobody reacted
        assert!(serde_json::to_value(message.to_view()).unwrap().get("reactions").is_none());
    }
}
