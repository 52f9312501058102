//! Rooms and memberships.
//!
//! Rooms are the fan-out unit. Their durable existence and membership are
//! owned by the membership authority; the core only reads them.

use crate::identity::{RoomId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    /// Exactly two distinct members, at most one room per pair.
    Direct,
    /// Arbitrary membership.
    #[default]
    Group,
}

/// A room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub kind: RoomKind,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Create a room with a fresh identifier.
    #[must_use]
    pub fn new(kind: RoomKind, name: Option<String>) -> Self {
        Self::with_id(RoomId::new(), kind, name)
    }

    /// Create a room with a known identifier.
    #[must_use]
    pub fn with_id(id: RoomId, kind: RoomKind, name: Option<String>) -> Self {
        Self {
            id,
            kind,
            name,
            created_at: Utc::now(),
        }
    }
}

/// Role of a member within a room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Member,
}

/// A (user, room) membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub role: Role,
    pub muted: bool,
    pub muted_until: Option<DateTime<Utc>>,
    /// Messages created after this instant count as unread.
    pub last_read_at: DateTime<Utc>,
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    /// Create a membership joined now.
    #[must_use]
    pub fn new(user_id: UserId, room_id: RoomId, role: Role) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            room_id,
            role,
            muted: false,
            muted_until: None,
            last_read_at: now,
            joined_at: now,
        }
    }

    /// Whether notifications are muted at `now`.
    ///
    /// A mute without expiry lasts until lifted.
    #[must_use]
    pub fn is_muted(&self, now: DateTime<Utc>) -> bool {
        self.muted && self.muted_until.map_or(true, |until| now < until)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_mute_expiry() {
        let now = Utc::now();
        let mut membership = Membership::new(UserId::new(), RoomId::new(), Role::Member);
        assert!(!membership.is_muted(now));

        membership.muted = true;
        assert!(membership.is_muted(now));

        membership.muted_until = Some(now + Duration::minutes(5));
        assert!(membership.is_muted(now));
        assert!(!membership.is_muted(now + Duration::minutes(6)));
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), r#""admin""#);
        let kind: RoomKind = serde_json::from_str(r#""direct""#).unwrap();
        assert_eq!(kind, RoomKind::Direct);
    }
}
