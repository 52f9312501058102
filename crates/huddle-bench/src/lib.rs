//! Shared setup for the Huddle benchmarks.

use huddle_core::memory::{
    MemoryDirectory, MemoryMessageStore, StaticIdentities, TracingNotificationSink,
};
use huddle_core::{
    Collaborators, Dispatcher, Hub, HubConfig, Identity, Message, NewMessage, RoomId,
    RoomRegistry, SessionHandle, SessionId, UserId,
};
use huddle_protocol::{MessageKind, ServerEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// A room with `size` attached sessions whose outbound queues are held open.
pub struct Roster {
    pub registry: Arc<RoomRegistry>,
    pub dispatcher: Dispatcher,
    pub room: RoomId,
    /// Identity of the first session, useful as an excluded originator.
    pub first: UserId,
    receivers: Vec<mpsc::Receiver<Arc<ServerEvent>>>,
}

impl Roster {
    /// One session per user, each with an outbound queue of `queue` events.
    #[must_use]
    pub fn new(size: usize, queue: usize) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        let room = RoomId::new();
        let mut receivers = Vec::with_capacity(size);
        let mut first = None;

        for i in 0..size {
            let identity = Identity::new(UserId::new(), format!("user-{i}"));
            first.get_or_insert(identity.user_id);
            let (tx, rx) = mpsc::channel(queue.max(1));
            registry.attach(
                room,
                SessionHandle::new(SessionId::next(), identity, tx, Arc::new(Notify::new())),
            );
            receivers.push(rx);
        }

        Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            registry,
            room,
            first: first.unwrap_or_default(),
            receivers,
        }
    }

    /// Empty every outbound queue. Returns the number of events drained.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        for rx in &mut self.receivers {
            while rx.try_recv().is_ok() {
                drained += 1;
            }
        }
        drained
    }
}

/// A `message` event carrying `content_len` bytes of text.
#[must_use]
pub fn message_event(content_len: usize) -> ServerEvent {
    let message = Message::create(
        NewMessage {
            room_id: RoomId::new(),
            sender: Identity::new(UserId::new(), "sender"),
            kind: MessageKind::Text,
            content: "x".repeat(content_len),
            reply_to: None,
        },
        1,
    );
    ServerEvent::Message {
        data: message.to_view(),
    }
}

/// A hub over in-memory collaborators with one group room of `members`
/// users. Tokens are `user-{i}`.
#[must_use]
pub fn group_hub(members: usize) -> (Arc<Hub>, RoomId) {
    let users: Vec<Identity> = (0..members.max(1))
        .map(|i| Identity::new(UserId::new(), format!("user-{i}")))
        .collect();
    let identities = users.iter().fold(StaticIdentities::new(), |ids, user| {
        ids.with(user.username.clone(), user.clone())
    });

    let directory = Arc::new(MemoryDirectory::new());
    let others: Vec<UserId> = users[1..].iter().map(|u| u.user_id).collect();
    let room = directory.create_group(users[0].user_id, Some("bench".into()), &others);

    let hub = Hub::new(
        Collaborators {
            identities: Arc::new(identities),
            membership: directory,
            store: Arc::new(MemoryMessageStore::new()),
            notifier: Arc::new(TracingNotificationSink),
        },
        HubConfig {
            outbound_queue: 4096,
            ..HubConfig::default()
        },
    );
    (Arc::new(hub), room.id)
}
