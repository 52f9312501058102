//! # huddle-core
//!
//! Session lifecycle, room fan-out and delivery status for the Huddle
//! messaging engine.
//!
//! - **Session** - per-connection state machine handling inbound events
//! - **RoomRegistry** - room to live-session index, the fan-out unit
//! - **Dispatcher** - snapshot-then-deliver broadcast with exclusions
//! - **DeliveryEngine** - monotonic `sent → delivered → read` transitions
//! - **PresenceTracker** - online while a user has any live session
//! - **Hub** - shared state and collaborators for all sessions
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │   Session   │────▶│ Dispatcher  │────▶│ RoomRegistry │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!        │
//!        ├──────────▶ MessageStore / MembershipAuthority
//!        │
//!        ▼
//! ┌─────────────┐     ┌────────────────┐
//! │  Presence   │     │ DeliveryEngine │
//! └─────────────┘     └────────────────┘
//! ```

pub mod collab;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod identity;
pub mod memory;
pub mod message;
pub mod presence;
pub mod registry;
pub mod room;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use collab::{
    IdentityProvider, MembershipAuthority, MessageStore, NotificationKind, NotificationSink,
    NotifyError,
};
pub use delivery::{DeliveryEngine, ReadOutcome};
pub use dispatcher::{Dispatcher, ExcludeRule, PublishReport};
pub use error::{AuthError, RoomError, SessionError, StoreError};
pub use hub::{Collaborators, Hub, HubConfig, HubStats};
pub use identity::{Identity, MessageId, RoomId, SessionId, UserId};
pub use message::{group_reactions, Message, NewMessage, Reaction, ReadReceipt};
pub use presence::{PresenceChange, PresenceTracker};
pub use registry::{RoomRegistry, SessionHandle};
pub use room::{Membership, Role, Room, RoomKind};
pub use session::{Outbox, Session, SessionState};
