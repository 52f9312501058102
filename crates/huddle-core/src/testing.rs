//! Test fixture: a hub over in-memory collaborators with a three-member room.

use crate::collab::{MembershipAuthority, MessageStore};
use crate::error::StoreError;
use crate::hub::{Collaborators, Hub, HubConfig};
use crate::identity::{Identity, RoomId, UserId};
use crate::memory::{
    ChannelNotificationSink, MemoryDirectory, MemoryMessageStore, Notification, StaticIdentities,
};
use crate::room::{Membership, Role};
use crate::session::{Outbox, Session};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_protocol::ServerEvent;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) struct Fixture {
    pub hub: Arc<Hub>,
    pub store: Arc<MemoryMessageStore>,
    pub directory: Arc<MemoryDirectory>,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
    /// Room with alice (admin), bob and carol. Dave is not a member.
    pub room: RoomId,
    pub alice: Identity,
    pub bob: Identity,
    pub carol: Identity,
    pub dave: Identity,
    identities: Arc<StaticIdentities>,
    notifier: ChannelNotificationSink,
    config: HubConfig,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    pub fn with_config(config: HubConfig) -> Self {
        let users: Vec<Identity> = ["alice", "bob", "carol", "dave"]
            .into_iter()
            .map(|name| Identity::new(UserId::new(), name))
            .collect();
        let identities = users
            .iter()
            .fold(StaticIdentities::new(), |ids, user| {
                ids.with(user.username.clone(), user.clone())
            });

        let directory = Arc::new(MemoryDirectory::new());
        let room = directory.create_group(
            users[0].user_id,
            Some("general".into()),
            &[users[1].user_id, users[2].user_id],
        );

        let store = Arc::new(MemoryMessageStore::new());
        let (notifier, notifications) = ChannelNotificationSink::new();
        let identities = Arc::new(identities);
        let hub = Self::build_hub(
            &identities,
            directory.clone(),
            store.clone(),
            &notifier,
            &config,
        );

        let [alice, bob, carol, dave]: [Identity; 4] = users.try_into().unwrap();

        Self {
            hub,
            store,
            directory,
            notifications,
            room: room.id,
            alice,
            bob,
            carol,
            dave,
            identities,
            notifier,
            config,
        }
    }

    /// Rebuild the hub over a different message store. `self.store` keeps
    /// pointing at the in-memory store.
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.hub = Self::build_hub(
            &self.identities,
            self.directory.clone(),
            store,
            &self.notifier,
            &self.config,
        );
        self
    }

    /// Rebuild the hub over a different membership authority, keeping the
    /// in-memory message store.
    pub fn with_membership(mut self, membership: Arc<dyn MembershipAuthority>) -> Self {
        self.hub = Self::build_hub(
            &self.identities,
            membership,
            self.store.clone(),
            &self.notifier,
            &self.config,
        );
        self
    }

    fn build_hub(
        identities: &Arc<StaticIdentities>,
        membership: Arc<dyn MembershipAuthority>,
        store: Arc<dyn MessageStore>,
        notifier: &ChannelNotificationSink,
        config: &HubConfig,
    ) -> Arc<Hub> {
        Arc::new(Hub::new(
            Collaborators {
                identities: identities.clone(),
                membership,
                store,
                notifier: Arc::new(notifier.clone()),
            },
            config.clone(),
        ))
    }

    /// Open an active session in the fixture room. The token is the username.
    pub async fn connect(&self, token: &str) -> (Session, Outbox) {
        self.connect_to(token, self.room).await
    }

    pub async fn connect_to(&self, token: &str, room: RoomId) -> (Session, Outbox) {
        let (mut session, outbox) = Session::new(self.hub.clone());
        session.accept().unwrap();
        session.authenticate(Some(token)).await.unwrap();
        session.join(room).await.unwrap();
        (session, outbox)
    }
}

/// Everything currently queued in an outbox.
pub(crate) fn drain(outbox: &mut Outbox) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Some(event) = outbox.try_recv() {
        events.push((*event).clone());
    }
    events
}

/// Membership authority whose `mark_read` and `members` calls fail a set
/// number of times before delegating.
pub(crate) struct FlakyMembership {
    inner: Arc<MemoryDirectory>,
    mark_read_failures: AtomicUsize,
    members_failures: AtomicUsize,
}

impl FlakyMembership {
    pub fn new(inner: Arc<MemoryDirectory>, mark_read_failures: usize, members_failures: usize) -> Self {
        Self {
            inner,
            mark_read_failures: AtomicUsize::new(mark_read_failures),
            members_failures: AtomicUsize::new(members_failures),
        }
    }

    fn trip(counter: &AtomicUsize) -> Result<(), StoreError> {
        match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
            Ok(_) => Err(StoreError::Timeout),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl MembershipAuthority for FlakyMembership {
    async fn check(&self, user: &UserId, room: &RoomId) -> Result<Option<Role>, StoreError> {
        self.inner.check(user, room).await
    }

    async fn members(&self, room: &RoomId) -> Result<Vec<Membership>, StoreError> {
        Self::trip(&self.members_failures)?;
        self.inner.members(room).await
    }

    async fn rooms_of(&self, user: &UserId) -> Result<Vec<RoomId>, StoreError> {
        self.inner.rooms_of(user).await
    }

    async fn mark_read(
        &self,
        user: &UserId,
        room: &RoomId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Self::trip(&self.mark_read_failures)?;
        self.inner.mark_read(user, room, at).await
    }
}
