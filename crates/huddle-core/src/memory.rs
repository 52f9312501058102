//! In-memory collaborator implementations.
//!
//! These back the standalone server and the test suites. They honour the
//! same uniqueness and ownership rules a database-backed implementation
//! would enforce with constraints.

use crate::collab::{
    IdentityProvider, MembershipAuthority, MessageStore, NotificationKind, NotificationSink,
    NotifyError,
};
use crate::error::{AuthError, RoomError, StoreError};
use crate::identity::{Identity, MessageId, RoomId, UserId};
use crate::message::{Message, NewMessage, Reaction, ReadReceipt};
use crate::room::{Membership, Role, Room, RoomKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use huddle_protocol::DeliveryStatus;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Maximum number of search results.
pub const SEARCH_LIMIT: usize = 50;

/// In-memory message store.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: DashMap<MessageId, Message>,
    receipts: DashMap<MessageId, HashMap<UserId, ReadReceipt>>,
    reactions: DashMap<MessageId, Vec<Reaction>>,
    sequences: DashMap<RoomId, u64>,
}

impl MemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages, deleted ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages of a room created after `since`, not sent by `user` and not
    /// deleted.
    #[must_use]
    pub fn unread_count(&self, room: &RoomId, user: &UserId, since: DateTime<Utc>) -> usize {
        self.messages
            .iter()
            .filter(|m| {
                m.room_id == *room && !m.is_deleted && !m.is_from(user) && m.created_at > since
            })
            .count()
    }

    /// Case-insensitive substring search over non-deleted messages of a
    /// room, oldest first.
    #[must_use]
    pub fn search(&self, room: &RoomId, query: &str) -> Vec<Message> {
        let needle = query.to_lowercase();
        let mut hits: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| {
                m.room_id == *room && !m.is_deleted && m.content.to_lowercase().contains(&needle)
            })
            .map(|m| m.clone())
            .collect();
        hits.sort_by_key(|m| m.sequence);
        hits.truncate(SEARCH_LIMIT);
        hits
    }

    fn ensure_exists(&self, id: &MessageId) -> Result<(), StoreError> {
        if self.messages.contains_key(id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(*id))
        }
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn create(&self, message: NewMessage) -> Result<Message, StoreError> {
        let sequence = {
            let mut next = self.sequences.entry(message.room_id).or_insert(0);
            *next += 1;
            *next
        };
        let message = Message::create(message, sequence);
        self.messages.insert(message.id, message.clone());
        debug!(message = %message.id, room = %message.room_id, sequence, "Message stored");
        Ok(message)
    }

    async fn get(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        Ok(self.messages.get(id).map(|m| m.clone()))
    }

    async fn soft_delete(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        Ok(self.messages.get_mut(id).map(|mut m| {
            if !m.is_deleted {
                let now = Utc::now();
                m.is_deleted = true;
                m.deleted_at = Some(now);
                m.updated_at = now;
            }
            m.clone()
        }))
    }

    async fn advance_status(
        &self,
        id: &MessageId,
        target: DeliveryStatus,
    ) -> Result<DeliveryStatus, StoreError> {
        let mut message = self
            .messages
            .get_mut(id)
            .ok_or(StoreError::NotFound(*id))?;
        let next = message.status.advance(target);
        if next != message.status {
            message.status = next;
            message.updated_at = Utc::now();
        }
        Ok(next)
    }

    async fn add_receipt(&self, id: &MessageId, user: &UserId) -> Result<bool, StoreError> {
        self.ensure_exists(id)?;
        let mut receipts = self.receipts.entry(*id).or_default();
        if receipts.contains_key(user) {
            return Ok(false);
        }
        receipts.insert(*user, ReadReceipt::new(*id, *user));
        Ok(true)
    }

    async fn receipt_count(&self, id: &MessageId) -> Result<usize, StoreError> {
        Ok(self.receipts.get(id).map(|r| r.len()).unwrap_or(0))
    }

    async fn add_reaction(&self, reaction: Reaction) -> Result<bool, StoreError> {
        self.ensure_exists(&reaction.message_id)?;
        let mut reactions = self.reactions.entry(reaction.message_id).or_default();
        if reactions.iter().any(|r| r.same_key(&reaction)) {
            return Ok(false);
        }
        reactions.push(reaction);
        Ok(true)
    }

    async fn remove_reaction(
        &self,
        id: &MessageId,
        user: &UserId,
        emoji: &str,
    ) -> Result<bool, StoreError> {
        let Some(mut reactions) = self.reactions.get_mut(id) else {
            return Ok(false);
        };
        let before = reactions.len();
        reactions.retain(|r| !(r.user.user_id == *user && r.emoji == emoji));
        Ok(reactions.len() != before)
    }

    async fn reactions(&self, id: &MessageId) -> Result<Vec<Reaction>, StoreError> {
        Ok(self.reactions.get(id).map(|r| r.clone()).unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
struct RoomRecord {
    room: Room,
    members: Vec<Membership>,
    /// Key into `direct_pairs`, kept after members leave.
    pair: Option<(UserId, UserId)>,
}

impl RoomRecord {
    fn new(room: Room) -> Self {
        Self {
            room,
            members: Vec::new(),
            pair: None,
        }
    }

    fn direct(id: RoomId, pair: (UserId, UserId)) -> Self {
        Self {
            pair: Some(pair),
            ..Self::new(Room::with_id(id, RoomKind::Direct, None))
        }
    }

    fn member_mut(&mut self, user: &UserId) -> Option<&mut Membership> {
        self.members.iter_mut().find(|m| m.user_id == *user)
    }

    fn is_member(&self, user: &UserId) -> bool {
        self.members.iter().any(|m| m.user_id == *user)
    }

    fn add(&mut self, user: UserId, role: Role) -> bool {
        if self.is_member(&user) {
            return false;
        }
        self.members.push(Membership::new(user, self.room.id, role));
        true
    }
}

fn pair_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// In-memory room directory acting as the membership authority.
///
/// Lock order is `direct_pairs` before `rooms`.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    rooms: DashMap<RoomId, RoomRecord>,
    direct_pairs: DashMap<(UserId, UserId), RoomId>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn room(&self, id: &RoomId) -> Option<Room> {
        self.rooms.get(id).map(|r| r.room.clone())
    }

    #[must_use]
    pub fn membership(&self, user: &UserId, room: &RoomId) -> Option<Membership> {
        self.rooms
            .get(room)
            .and_then(|r| r.members.iter().find(|m| m.user_id == *user).cloned())
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Get or create the direct room for an unordered pair of users.
    ///
    /// A member who left the existing room is added back.
    ///
    /// # Errors
    ///
    /// Returns an error if both users are the same.
    pub fn create_direct(&self, initiator: UserId, other: UserId) -> Result<Room, RoomError> {
        if initiator == other {
            return Err(RoomError::Invalid("direct room needs two distinct members"));
        }

        let key = pair_key(initiator, other);
        let pair = self.direct_pairs.entry(key).or_insert_with(RoomId::new);
        let room_id = *pair;

        let mut record = self
            .rooms
            .entry(room_id)
            .or_insert_with(|| RoomRecord::direct(room_id, key));
        let created = record.members.is_empty();
        record.add(initiator, if created { Role::Admin } else { Role::Member });
        record.add(other, Role::Member);

        if created {
            debug!(room = %room_id, "Direct room created");
        }
        Ok(record.room.clone())
    }

    /// Create a group room. The creator becomes its admin.
    pub fn create_group(
        &self,
        creator: UserId,
        name: Option<String>,
        members: &[UserId],
    ) -> Room {
        let mut record = RoomRecord::new(Room::new(RoomKind::Group, name));
        record.add(creator, Role::Admin);
        for user in members {
            record.add(*user, Role::Member);
        }

        let room = record.room.clone();
        self.rooms.insert(room.id, record);
        debug!(room = %room.id, "Group room created");
        room
    }

    /// Insert a room with a known identifier and member list.
    ///
    /// # Errors
    ///
    /// Returns an error if the room already exists, or a direct room does not
    /// have exactly two distinct members or duplicates an existing pair.
    pub fn insert_room(&self, room: Room, members: &[(UserId, Role)]) -> Result<(), RoomError> {
        if self.rooms.contains_key(&room.id) {
            return Err(RoomError::Invalid("room already exists"));
        }

        let mut record = RoomRecord::new(room);
        for (user, role) in members {
            record.add(*user, *role);
        }

        if record.room.kind == RoomKind::Direct {
            let [a, b] = record.members.as_slice() else {
                return Err(RoomError::Invalid("direct room needs two distinct members"));
            };
            let key = pair_key(a.user_id, b.user_id);
            match self.direct_pairs.entry(key) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    return Err(RoomError::Invalid("direct room already exists for pair"));
                }
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(record.room.id);
                }
            }
            record.pair = Some(key);
        }

        self.rooms.insert(record.room.id, record);
        Ok(())
    }

    /// Add a member to a group room on behalf of `actor`.
    ///
    /// Returns `false` if the user was already a member.
    ///
    /// # Errors
    ///
    /// Returns an error if the room is missing, not a group, or `actor` is
    /// not one of its admins.
    pub fn add_member(
        &self,
        actor: &UserId,
        room: &RoomId,
        user: UserId,
    ) -> Result<bool, RoomError> {
        let mut record = self.rooms.get_mut(room).ok_or(RoomError::NotFound(*room))?;
        if record.room.kind != RoomKind::Group {
            return Err(RoomError::Invalid("can only add members to group rooms"));
        }
        if !record.members.iter().any(|m| m.user_id == *actor && m.is_admin()) {
            return Err(RoomError::NotAuthorized("only admins can add members"));
        }
        Ok(record.add(user, Role::Member))
    }

    /// Remove `user` from `room`. Returns `true` if the room was deleted
    /// because its last member left.
    ///
    /// # Errors
    ///
    /// Returns an error if the room is missing or the user is not a member.
    pub fn leave(&self, user: &UserId, room: &RoomId) -> Result<bool, RoomError> {
        let (pair, now_empty) = {
            let mut record = self.rooms.get_mut(room).ok_or(RoomError::NotFound(*room))?;
            if !record.is_member(user) {
                return Err(RoomError::NotAuthorized("not a member of this room"));
            }
            record.members.retain(|m| m.user_id != *user);
            (record.pair, record.members.is_empty())
        };
        if !now_empty {
            return Ok(false);
        }

        let removed = match pair {
            // Hold the pair entry so create_direct cannot revive the room
            // between the two removals.
            Some(key) => match self.direct_pairs.entry(key) {
                dashmap::mapref::entry::Entry::Occupied(entry) if entry.get() == room => {
                    let removed = self.rooms.remove_if(room, |_, r| r.members.is_empty());
                    if removed.is_some() {
                        entry.remove();
                    }
                    removed.is_some()
                }
                _ => self.rooms.remove_if(room, |_, r| r.members.is_empty()).is_some(),
            },
            None => self.rooms.remove_if(room, |_, r| r.members.is_empty()).is_some(),
        };

        if removed {
            debug!(room = %room, "Room deleted after last member left");
        }
        Ok(removed)
    }

    /// Mute or unmute notifications for a member, optionally until a deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if the room is missing or the user is not a member.
    pub fn set_muted(
        &self,
        user: &UserId,
        room: &RoomId,
        muted: bool,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), RoomError> {
        let mut record = self.rooms.get_mut(room).ok_or(RoomError::NotFound(*room))?;
        let membership = record
            .member_mut(user)
            .ok_or(RoomError::NotAuthorized("not a member of this room"))?;
        membership.muted = muted;
        membership.muted_until = if muted { until } else { None };
        Ok(())
    }
}

#[async_trait]
impl MembershipAuthority for MemoryDirectory {
    async fn check(&self, user: &UserId, room: &RoomId) -> Result<Option<Role>, StoreError> {
        Ok(self
            .rooms
            .get(room)
            .and_then(|r| r.members.iter().find(|m| m.user_id == *user).map(|m| m.role)))
    }

    async fn members(&self, room: &RoomId) -> Result<Vec<Membership>, StoreError> {
        Ok(self
            .rooms
            .get(room)
            .map(|r| r.members.clone())
            .unwrap_or_default())
    }

    async fn rooms_of(&self, user: &UserId) -> Result<Vec<RoomId>, StoreError> {
        Ok(self
            .rooms
            .iter()
            .filter(|r| r.is_member(user))
            .map(|r| *r.key())
            .collect())
    }

    async fn mark_read(
        &self,
        user: &UserId,
        room: &RoomId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(mut record) = self.rooms.get_mut(room) {
            if let Some(membership) = record.member_mut(user) {
                membership.last_read_at = membership.last_read_at.max(at);
            }
        }
        Ok(())
    }
}

/// Identity provider backed by a fixed token table.
#[derive(Debug, Default, Clone)]
pub struct StaticIdentities {
    tokens: HashMap<String, Identity>,
}

impl StaticIdentities {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for an identity.
    #[must_use]
    pub fn with(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.insert(token, identity);
        self
    }

    pub fn insert(&mut self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentities {
    async fn resolve(&self, credential: &str) -> Result<Identity, AuthError> {
        let token = credential.trim();
        if token.is_empty() || token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(AuthError::Malformed);
        }
        self.tokens.get(token).cloned().ok_or(AuthError::Rejected)
    }
}

/// Notification sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(
        &self,
        recipient: &UserId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        info!(recipient = %recipient, kind = ?kind, payload = %payload, "Notification");
        Ok(())
    }
}

/// A notification handed to a [`ChannelNotificationSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub recipient: UserId,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

/// Notification sink forwarding to a channel drained by a delivery worker.
#[derive(Debug, Clone)]
pub struct ChannelNotificationSink {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotificationSink {
    /// Create a sink and the receiving end of its queue.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelNotificationSink {
    fn notify(
        &self,
        recipient: &UserId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        self.sender
            .send(Notification {
                recipient: *recipient,
                kind,
                payload,
            })
            .map_err(|_| NotifyError("notification worker stopped".into()))
    }
}
