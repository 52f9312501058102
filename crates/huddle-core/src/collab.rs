//! Interfaces to the collaborators the core consumes but does not own.
//!
//! - [`IdentityProvider`] turns a bearer credential into an [`Identity`]
//! - [`MembershipAuthority`] answers room membership and role questions
//! - [`MessageStore`] is the single source of truth for messages, receipts
//!   and reactions
//! - [`NotificationSink`] takes best-effort out-of-band alerts

use crate::error::{AuthError, StoreError};
use crate::identity::{Identity, MessageId, RoomId, UserId};
use crate::message::{Message, NewMessage, Reaction};
use crate::room::{Membership, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_protocol::DeliveryStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resolves bearer credentials.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a credential to the identity it was issued for.
    async fn resolve(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// Answers membership questions about durable rooms.
#[async_trait]
pub trait MembershipAuthority: Send + Sync {
    /// Role of `user` in `room`, or `None` if not a member.
    async fn check(&self, user: &UserId, room: &RoomId) -> Result<Option<Role>, StoreError>;

    /// All memberships of `room`.
    async fn members(&self, room: &RoomId) -> Result<Vec<Membership>, StoreError>;

    /// All rooms `user` belongs to.
    async fn rooms_of(&self, user: &UserId) -> Result<Vec<RoomId>, StoreError>;

    /// Advance the user's read marker in a room. Never moves it backwards.
    async fn mark_read(
        &self,
        _user: &UserId,
        _room: &RoomId,
        _at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Durable persistence of messages, receipts and reactions.
///
/// Implementations must serialize conflicting writes to the same message
/// at least as strongly as the uniqueness rules require.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message, assigning its id and room sequence.
    async fn create(&self, message: NewMessage) -> Result<Message, StoreError>;

    async fn get(&self, id: &MessageId) -> Result<Option<Message>, StoreError>;

    /// Mark a message deleted, retaining the row. Returns the updated message.
    async fn soft_delete(&self, id: &MessageId) -> Result<Option<Message>, StoreError>;

    /// Move the status forward to `target` (never backwards) and return the
    /// resulting status.
    async fn advance_status(
        &self,
        id: &MessageId,
        target: DeliveryStatus,
    ) -> Result<DeliveryStatus, StoreError>;

    /// Record a read receipt. Returns `false` if one already existed.
    async fn add_receipt(&self, id: &MessageId, user: &UserId) -> Result<bool, StoreError>;

    /// Number of distinct receipts for a message.
    async fn receipt_count(&self, id: &MessageId) -> Result<usize, StoreError>;

    /// Insert a reaction. Returns `false` if the (message, user, emoji)
    /// triple already existed.
    async fn add_reaction(&self, reaction: Reaction) -> Result<bool, StoreError>;

    /// Delete a reaction. Returns `false` if there was nothing to delete.
    async fn remove_reaction(
        &self,
        id: &MessageId,
        user: &UserId,
        emoji: &str,
    ) -> Result<bool, StoreError>;

    async fn reactions(&self, id: &MessageId) -> Result<Vec<Reaction>, StoreError>;
}

/// Kind of out-of-band alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Message,
}

/// A notification sink refused or failed to take an alert.
#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Best-effort delivery of alerts. Must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(
        &self,
        recipient: &UserId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError>;
}
