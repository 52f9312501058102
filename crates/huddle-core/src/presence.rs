//! Presence tracking.
//!
//! A user is online while at least one of their sessions is live. Connect and
//! disconnect report only the edges: the first session coming up and the
//! last one going away.

use crate::identity::{SessionId, UserId};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// Presence change resulting from a connect or disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    /// The user's first session came up.
    CameOnline,
    /// The user's last session went away.
    WentOffline,
    /// Online status did not change.
    Unchanged,
}

/// Live sessions of one user.
#[derive(Debug, Clone)]
struct PresenceState {
    sessions: HashSet<SessionId>,
    online_since: DateTime<Utc>,
}

/// A user's presence as reported by [`PresenceTracker::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub sessions: usize,
    pub online_since: DateTime<Utc>,
}

/// Process-wide user to live-session index.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    users: DashMap<UserId, PresenceState>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live session for a user.
    pub fn connect(&self, user: UserId, session: SessionId) -> PresenceChange {
        match self.users.entry(user) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().sessions.insert(session);
                PresenceChange::Unchanged
            }
            Entry::Vacant(entry) => {
                entry.insert(PresenceState {
                    sessions: HashSet::from([session]),
                    online_since: Utc::now(),
                });
                debug!(user = %user, "Presence: online");
                PresenceChange::CameOnline
            }
        }
    }

    /// Forget a session. Unknown sessions are ignored.
    pub fn disconnect(&self, user: &UserId, session: SessionId) -> PresenceChange {
        match self.users.entry(*user) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().sessions.remove(&session);
                if entry.get().sessions.is_empty() {
                    entry.remove();
                    debug!(user = %user, "Presence: offline");
                    PresenceChange::WentOffline
                } else {
                    PresenceChange::Unchanged
                }
            }
            Entry::Vacant(_) => PresenceChange::Unchanged,
        }
    }

    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.users.contains_key(user)
    }

    /// Number of live sessions for a user.
    #[must_use]
    pub fn session_count(&self, user: &UserId) -> usize {
        self.users.get(user).map(|s| s.sessions.len()).unwrap_or(0)
    }

    /// Number of users with at least one live session.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<PresenceEntry> {
        self.users
            .iter()
            .map(|e| PresenceEntry {
                user_id: *e.key(),
                sessions: e.sessions.len(),
                online_since: e.online_since,
            })
            .collect()
    }
}
