//! Room registry.
//!
//! Maps each room to the live sessions currently joined to it. The registry is
//! purely in-memory and knows nothing about durable membership; callers check
//! membership before attaching.

use crate::identity::{Identity, RoomId, SessionId, UserId};
use dashmap::DashMap;
use huddle_protocol::ServerEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace};

/// Why an event could not be handed to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The outbound queue is full.
    Full,
    /// The session's writer is gone.
    Closed,
}

/// The registry's view of a live session: who it is and how to reach it.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub identity: Identity,
    outbound: mpsc::Sender<Arc<ServerEvent>>,
    kick: Arc<Notify>,
}

impl SessionHandle {
    #[must_use]
    pub fn new(
        id: SessionId,
        identity: Identity,
        outbound: mpsc::Sender<Arc<ServerEvent>>,
        kick: Arc<Notify>,
    ) -> Self {
        Self {
            id,
            identity,
            outbound,
            kick,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.identity.user_id
    }

    /// Queue an event without waiting.
    ///
    /// # Errors
    ///
    /// Fails if the queue is full or the session's writer has gone away.
    pub fn deliver(&self, event: Arc<ServerEvent>) -> Result<(), DeliveryFailure> {
        self.outbound.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DeliveryFailure::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }

    /// Ask the session to terminate.
    pub fn kick(&self) {
        self.kick.notify_one();
    }
}

/// Room to live-session index.
///
/// An entry exists only while it has at least one session.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<RoomId, HashMap<SessionId, SessionHandle>>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to a room. Returns `false` if it was already attached.
    pub fn attach(&self, room: RoomId, handle: SessionHandle) -> bool {
        let session = handle.id;
        let mut sessions = self.rooms.entry(room).or_default();
        let added = sessions.insert(session, handle).is_none();

        debug!(
            room = %room,
            session = %session,
            sessions = sessions.len(),
            "Attached"
        );
        added
    }

    /// Remove a session from a room, pruning the room if it becomes empty.
    ///
    /// Returns `false` if the session was not attached.
    pub fn detach(&self, room: &RoomId, session: SessionId) -> bool {
        let Some(mut sessions) = self.rooms.get_mut(room) else {
            return false;
        };
        let removed = sessions.remove(&session).is_some();
        let remaining = sessions.len();
        drop(sessions);

        if remaining == 0 {
            // A concurrent attach may have refilled the entry.
            if self.rooms.remove_if(room, |_, s| s.is_empty()).is_some() {
                trace!(room = %room, "Pruned empty room");
            }
        }

        if removed {
            debug!(room = %room, session = %session, sessions = remaining, "Detached");
        }
        removed
    }

    /// Snapshot of the sessions in a room.
    #[must_use]
    pub fn members_of(&self, room: &RoomId) -> Vec<SessionHandle> {
        self.rooms
            .get(room)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, room: &RoomId, session: SessionId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|s| s.contains_key(&session))
    }

    /// Number of sessions in a room.
    #[must_use]
    pub fn session_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map(|s| s.len()).unwrap_or(0)
    }

    /// Number of rooms with at least one session.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of attached sessions across all rooms.
    #[must_use]
    pub fn total_sessions(&self) -> usize {
        self.rooms.iter().map(|s| s.len()).sum()
    }
}
