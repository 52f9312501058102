//! # huddle-protocol
//!
//! Wire protocol definitions for the Huddle realtime messaging engine.
//!
//! Clients and the server exchange JSON-shaped events over a persistent
//! connection. Inbound events are tagged by an `action` field, outbound
//! events by a `type` field.
//!
//! ## Inbound
//!
//! - `send_message` - Post a message to the room
//! - `typing` - Typing indicator
//! - `read` - Read receipt for a message
//! - `react` - Add (or remove) an emoji reaction
//!
//! ## Example
//!
//! ```rust
//! use huddle_protocol::{codec, ClientEvent, Encoding};
//!
//! let event: ClientEvent =
//!     codec::decode(br#"{"action":"typing","is_typing":true}"#, Encoding::Json).unwrap();
//! assert_eq!(event, ClientEvent::Typing { is_typing: true });
//! ```

pub mod close;
pub mod codec;
pub mod events;

pub use close::CloseCode;
pub use codec::{decode, encode, encode_text, Encoding, ProtocolError};
pub use events::{
    ClientEvent, DeliveryStatus, ErrorCode, MessageKind, MessageView, ReactorView, SenderView,
    ServerEvent,
};
