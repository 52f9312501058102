//! # huddle-transport
//!
//! Connection abstraction for the Huddle messaging engine.
//!
//! A [`Connection`] is one bidirectional, frame-oriented link to a client.
//! The session driver is written against the trait, so it runs unchanged
//! over:
//!
//! - **WebSocket** - axum's upgraded socket (feature `websocket`)
//! - **Memory** - an in-process loopback pair for tests
//!
//! ```rust,ignore
//! use huddle_transport::Connection;
//!
//! async fn echo(mut conn: impl Connection) {
//!     while let Ok(Some(frame)) = conn.recv().await {
//!         if conn.send(frame).await.is_err() {
//!             break;
//!         }
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{Connection, Frame, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;
