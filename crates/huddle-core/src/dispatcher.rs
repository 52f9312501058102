//! Broadcast dispatcher.
//!
//! Fans an event out to the sessions in a room. Recipients are snapshotted
//! before delivery so a concurrent attach or detach never invalidates the
//! iteration. Delivery is fire-and-forget: a session whose queue is full or
//! closed is kicked and the publish carries on.

use crate::identity::{RoomId, SessionId, UserId};
use crate::registry::{DeliveryFailure, RoomRegistry};
use huddle_protocol::ServerEvent;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{trace, warn};

/// Which sessions a publish skips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludeRule {
    /// Send to every session.
    None,
    /// Skip one session.
    Session(SessionId),
    /// Skip every session of one user.
    User(UserId),
}

impl ExcludeRule {
    fn skips(&self, session: SessionId, user: &UserId) -> bool {
        match self {
            ExcludeRule::None => false,
            ExcludeRule::Session(id) => *id == session,
            ExcludeRule::User(id) => id == user,
        }
    }
}

/// Outcome of one publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Sessions the event was queued for.
    pub delivered: usize,
    /// Distinct users reached.
    pub users: HashSet<UserId>,
    /// Sessions that failed and were kicked.
    pub failed: Vec<SessionId>,
}

impl PublishReport {
    /// Whether any session of a user other than `user` got the event.
    #[must_use]
    pub fn reached_other_than(&self, user: &UserId) -> bool {
        self.users.iter().any(|u| u != user)
    }
}

/// Room fan-out over a [`RoomRegistry`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<RoomRegistry>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Send `event` to every session in `room` not matched by `exclude`.
    pub fn publish(&self, room: &RoomId, event: ServerEvent, exclude: ExcludeRule) -> PublishReport {
        let event = Arc::new(event);
        let recipients = self.registry.members_of(room);
        let mut report = PublishReport::default();

        for handle in recipients {
            if exclude.skips(handle.id, handle.user_id()) {
                continue;
            }
            match handle.deliver(Arc::clone(&event)) {
                Ok(()) => {
                    report.delivered += 1;
                    report.users.insert(*handle.user_id());
                }
                Err(failure) => {
                    warn!(
                        room = %room,
                        session = %handle.id,
                        reason = match failure {
                            DeliveryFailure::Full => "queue full",
                            DeliveryFailure::Closed => "closed",
                        },
                        "Delivery failed, kicking session"
                    );
                    handle.kick();
                    report.failed.push(handle.id);
                }
            }
        }

        trace!(
            room = %room,
            event = event.kind(),
            recipients = report.delivered,
            "Published"
        );
        report
    }
}
