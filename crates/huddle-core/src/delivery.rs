//! Delivery status engine.
//!
//! Status only moves forward: `sent` on persist, `delivered` once the
//! broadcast reached another user's session, `read` once every member other
//! than the sender holds a receipt.

use crate::collab::{MembershipAuthority, MessageStore};
use crate::dispatcher::PublishReport;
use crate::error::StoreError;
use crate::identity::UserId;
use crate::message::Message;
use crate::room::Membership;
use chrono::Utc;
use huddle_protocol::DeliveryStatus;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of recording a read receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    /// `false` if the reader had already read the message.
    pub newly_recorded: bool,
    /// Status after the receipt, as far as the store reported it.
    pub status: DeliveryStatus,
}

/// Number of receipts needed for a message to count as read: the distinct
/// members of the room other than the sender.
#[must_use]
pub fn read_threshold(members: &[Membership], sender: &UserId) -> usize {
    members
        .iter()
        .map(|m| m.user_id)
        .filter(|u| u != sender)
        .collect::<HashSet<_>>()
        .len()
}

/// Status implied by a receipt count. A room where the sender is alone never
/// reaches `read`.
#[must_use]
pub fn status_for_receipts(receipts: usize, threshold: usize) -> DeliveryStatus {
    if threshold > 0 && receipts >= threshold {
        DeliveryStatus::Read
    } else {
        DeliveryStatus::Delivered
    }
}

/// Applies delivery and read transitions through the message store.
#[derive(Clone)]
pub struct DeliveryEngine {
    store: Arc<dyn MessageStore>,
    membership: Arc<dyn MembershipAuthority>,
}

impl DeliveryEngine {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, membership: Arc<dyn MembershipAuthority>) -> Self {
        Self { store, membership }
    }

    /// Advance to `delivered` if the broadcast reached someone besides the
    /// sender. Returns the stored status.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the status update fails.
    pub async fn on_broadcast(
        &self,
        message: &Message,
        report: &PublishReport,
    ) -> Result<DeliveryStatus, StoreError> {
        if !report.reached_other_than(&message.sender.user_id) {
            return Ok(message.status);
        }
        let status = self
            .store
            .advance_status(&message.id, DeliveryStatus::Delivered)
            .await?;
        debug!(message = %message.id, status = status.as_str(), "Delivery status");
        Ok(status)
    }

    /// Record that `reader` has seen `message` and recompute its status.
    ///
    /// A receipt also proves delivery, so the status is at least `delivered`
    /// afterwards. Duplicate receipts leave the count unchanged. Once the
    /// receipt is stored, later failures are logged and the last known
    /// status is returned.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the receipt could not be recorded.
    pub async fn on_read(
        &self,
        message: &Message,
        reader: &UserId,
    ) -> Result<ReadOutcome, StoreError> {
        let newly_recorded = self.store.add_receipt(&message.id, reader).await?;

        if let Err(err) = self
            .membership
            .mark_read(reader, &message.room_id, Utc::now())
            .await
        {
            warn!(user = %reader, room = %message.room_id, error = %err, "Failed to advance read marker");
        }

        let status = match self.recompute(message).await {
            Ok(status) => status,
            Err(err) => {
                warn!(message = %message.id, error = %err, "Failed to recompute status");
                message.status.max(DeliveryStatus::Delivered)
            }
        };

        Ok(ReadOutcome {
            newly_recorded,
            status,
        })
    }

    async fn recompute(&self, message: &Message) -> Result<DeliveryStatus, StoreError> {
        let members = self.membership.members(&message.room_id).await?;
        let threshold = read_threshold(&members, &message.sender.user_id);
        let receipts = self.store.receipt_count(&message.id).await?;

        let status = self
            .store
            .advance_status(&message.id, status_for_receipts(receipts, threshold))
            .await?;
        debug!(
            message = %message.id,
            receipts,
            threshold,
            status = status.as_str(),
            "Read receipt"
        );
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Identity, RoomId};
    use crate::memory::{MemoryDirectory, MemoryMessageStore};
    use crate::message::NewMessage;
    use crate::testing::FlakyMembership;
    use huddle_protocol::MessageKind;

    #[test]
    fn test_read_threshold_excludes_sender() {
        let room = RoomId::new();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        let members: Vec<_> = [a, b, c]
            .into_iter()
            .map(|u| Membership::new(u, room, Default::default()))
            .collect();

        assert_eq!(read_threshold(&members, &a), 2);
        assert_eq!(read_threshold(&members, &UserId::new()), 3);
        assert_eq!(read_threshold(&members[..1], &a), 0);
    }

    #[test]
    fn test_status_for_receipts() {
        assert_eq!(status_for_receipts(1, 2), DeliveryStatus::Delivered);
        assert_eq!(status_for_receipts(2, 2), DeliveryStatus::Read);
        assert_eq!(status_for_receipts(3, 2), DeliveryStatus::Read);
        assert_eq!(status_for_receipts(0, 0), DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn test_read_after_all_members() {
        let store = Arc::new(MemoryMessageStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        let alice = Identity::new(UserId::new(), "alice");
        let (bob, carol) = (UserId::new(), UserId::new());
        let room = directory.create_group(alice.user_id, None, &[bob, carol]);

        let engine = DeliveryEngine::new(store.clone(), directory.clone());
        let message = store
            .create(NewMessage {
                room_id: room.id,
                sender: alice,
                kind: MessageKind::Text,
                content: "hi".into(),
                reply_to: None,
            })
            .await
            .unwrap();

        let first = engine.on_read(&message, &bob).await.unwrap();
        assert!(first.newly_recorded);
        assert_eq!(first.status, DeliveryStatus::Delivered);

        let again = engine.on_read(&message, &bob).await.unwrap();
        assert!(!again.newly_recorded);
        assert_eq!(again.status, DeliveryStatus::Delivered);

        let last = engine.on_read(&message, &carol).await.unwrap();
        assert_eq!(last.status, DeliveryStatus::Read);

        let after = engine.on_read(&message, &bob).await.unwrap();
        assert_eq!(after.status, DeliveryStatus::Read);
    }

    #[tokio::test]
    async fn test_receipt_survives_membership_failures() {
        let store = Arc::new(MemoryMessageStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        let alice = Identity::new(UserId::new(), "alice");
        let bob = UserId::new();
        let room = directory.create_direct(alice.user_id, bob).unwrap();

        let flaky = Arc::new(FlakyMembership::new(directory.clone(), 1, 1));
        let engine = DeliveryEngine::new(store.clone(), flaky);
        let message = store
            .create(NewMessage {
                room_id: room.id,
                sender: alice,
                kind: MessageKind::Text,
                content: "hi".into(),
                reply_to: None,
            })
            .await
            .unwrap();

        let outcome = engine.on_read(&message, &bob).await.unwrap();
        assert!(outcome.newly_recorded);
        assert_eq!(outcome.status, DeliveryStatus::Delivered);
        assert_eq!(store.receipt_count(&message.id).await.unwrap(), 1);

        // Once membership answers again the stored receipt completes the read
        let retry = engine.on_read(&message, &bob).await.unwrap();
        assert!(!retry.newly_recorded);
        assert_eq!(retry.status, DeliveryStatus::Read);
    }

    #[tokio::test]
    async fn test_broadcast_to_sender_only_stays_sent() {
        let store = Arc::new(MemoryMessageStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        let alice = Identity::new(UserId::new(), "alice");
        let engine = DeliveryEngine::new(store.clone(), directory);

        let message = store
            .create(NewMessage {
                room_id: RoomId::new(),
                sender: alice.clone(),
                kind: MessageKind::Text,
                content: "echo".into(),
                reply_to: None,
            })
            .await
            .unwrap();

        let mut report = PublishReport::default();
        report.users.insert(alice.user_id);
        assert_eq!(
            engine.on_broadcast(&message, &report).await.unwrap(),
            DeliveryStatus::Sent
        );

        report.users.insert(UserId::new());
        assert_eq!(
            engine.on_broadcast(&message, &report).await.unwrap(),
            DeliveryStatus::Delivered
        );
    }
}
