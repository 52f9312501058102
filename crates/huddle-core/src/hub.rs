//! Shared engine state.
//!
//! The [`Hub`] owns the room registry, presence tracker, dispatcher and
//! delivery engine, and holds the collaborators every session talks to. One
//! hub is shared by all sessions of a process.

use crate::collab::{
    IdentityProvider, MembershipAuthority, MessageStore, NotificationKind, NotificationSink,
};
use crate::delivery::DeliveryEngine;
use crate::dispatcher::{Dispatcher, ExcludeRule};
use crate::error::{AuthError, SessionError};
use crate::identity::{Identity, MessageId, RoomId, UserId};
use crate::message::Message;
use crate::presence::PresenceTracker;
use crate::registry::RoomRegistry;
use chrono::Utc;
use huddle_protocol::ServerEvent;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Engine limits.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each session's outbound queue.
    pub outbound_queue: usize,
    /// Maximum characters of message content.
    pub max_content_length: usize,
    /// Maximum characters of a reaction emoji.
    pub max_emoji_length: usize,
    /// Characters of content included in notifications.
    pub notification_preview: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_queue: 256,
            max_content_length: 4096,
            max_emoji_length: 10,
            notification_preview: 100,
        }
    }
}

/// The external collaborators a hub consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub identities: Arc<dyn IdentityProvider>,
    pub membership: Arc<dyn MembershipAuthority>,
    pub store: Arc<dyn MessageStore>,
    pub notifier: Arc<dyn NotificationSink>,
}

/// Live counts for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub rooms: usize,
    pub sessions: usize,
    pub online_users: usize,
}

pub struct Hub {
    collaborators: Collaborators,
    registry: Arc<RoomRegistry>,
    dispatcher: Dispatcher,
    presence: PresenceTracker,
    delivery: DeliveryEngine,
    config: HubConfig,
}

impl Hub {
    #[must_use]
    pub fn new(collaborators: Collaborators, config: HubConfig) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        let delivery = DeliveryEngine::new(
            Arc::clone(&collaborators.store),
            Arc::clone(&collaborators.membership),
        );
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            registry,
            presence: PresenceTracker::new(),
            delivery,
            collaborators,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    #[must_use]
    pub fn delivery(&self) -> &DeliveryEngine {
        &self.delivery
    }

    #[must_use]
    pub fn store(&self) -> &dyn MessageStore {
        self.collaborators.store.as_ref()
    }

    #[must_use]
    pub fn membership(&self) -> &dyn MembershipAuthority {
        self.collaborators.membership.as_ref()
    }

    /// Resolve a bearer credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Missing`] when no credential was supplied, or the
    /// identity provider's rejection.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Identity, AuthError> {
        let credential = credential.ok_or(AuthError::Missing)?;
        self.collaborators.identities.resolve(credential).await
    }

    /// Soft-delete a message on behalf of its sender and tell the room.
    ///
    /// Deleting an already deleted message succeeds without a second
    /// broadcast.
    ///
    /// # Errors
    ///
    /// `Reference` if the message does not exist, `NotAuthorized` if `actor`
    /// did not send it, `Store` if the store fails.
    pub async fn delete_message(
        &self,
        actor: &UserId,
        id: &MessageId,
    ) -> Result<Message, SessionError> {
        let message = self
            .store()
            .get(id)
            .await?
            .ok_or_else(|| SessionError::Reference(id.to_string()))?;

        if !message.is_from(actor) {
            return Err(SessionError::NotAuthorized(
                "only the sender can delete a message".into(),
            ));
        }
        if message.is_deleted {
            return Ok(message);
        }

        let deleted = self
            .store()
            .soft_delete(id)
            .await?
            .ok_or_else(|| SessionError::Reference(id.to_string()))?;

        self.dispatcher.publish(
            &deleted.room_id,
            ServerEvent::MessageDeleted {
                message_id: deleted.id.to_string(),
            },
            ExcludeRule::None,
        );
        debug!(message = %id, user = %actor, "Message deleted");
        Ok(deleted)
    }

    /// Broadcast a presence change to every room of the user.
    ///
    /// Falls back to `room` alone if the membership lookup fails. The change
    /// is dropped if presence has flipped again in the meantime.
    pub(crate) async fn announce_presence(&self, identity: &Identity, room: &RoomId, online: bool) {
        let mut rooms = match self.membership().rooms_of(&identity.user_id).await {
            Ok(rooms) => rooms,
            Err(err) => {
                warn!(user = %identity.user_id, error = %err, "Room lookup failed, announcing to current room only");
                Vec::new()
            }
        };
        if !rooms.contains(room) {
            rooms.push(*room);
        }

        if self.presence.is_online(&identity.user_id) != online {
            debug!(user = %identity.user_id, online, "Presence changed again, skipping announcement");
            return;
        }

        for room in &rooms {
            self.publish_status(identity, room, online);
        }
    }

    pub(crate) fn publish_status(&self, identity: &Identity, room: &RoomId, online: bool) {
        self.dispatcher.publish(
            room,
            ServerEvent::Status {
                user_id: identity.user_id.to_string(),
                username: identity.username.clone(),
                is_online: online,
            },
            ExcludeRule::None,
        );
    }

    /// Alert members of the message's room who are offline and not muted.
    pub(crate) async fn notify_offline_members(&self, message: &Message) {
        let members = match self.membership().members(&message.room_id).await {
            Ok(members) => members,
            Err(err) => {
                warn!(room = %message.room_id, error = %err, "Member lookup failed, skipping notifications");
                return;
            }
        };

        let now = Utc::now();
        let payload = serde_json::json!({
            "room_id": message.room_id.to_string(),
            "message_id": message.id.to_string(),
            "sender": message.sender.username,
            "preview": message.preview(self.config.notification_preview),
        });

        for member in members {
            if message.is_from(&member.user_id)
                || member.is_muted(now)
                || self.presence.is_online(&member.user_id)
            {
                continue;
            }
            if let Err(err) = self.collaborators.notifier.notify(
                &member.user_id,
                NotificationKind::Message,
                payload.clone(),
            ) {
                warn!(user = %member.user_id, error = %err, "Notification failed");
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            rooms: self.registry.room_count(),
            sessions: self.registry.total_sessions(),
            online_users: self.presence.online_count(),
        }
    }
}
