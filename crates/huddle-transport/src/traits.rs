//! Connection abstraction.
//!
//! Transports hand the session driver whole frames. Text frames carry JSON,
//! binary frames carry MessagePack.

use async_trait::async_trait;
use bytes::Bytes;
use huddle_protocol::{encode, encode_text, CloseCode, Encoding, ProtocolError};
use serde::Serialize;
use thiserror::Error;

/// One frame on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    /// Encode an event into the frame type matching `encoding`.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    pub fn encode<T: Serialize>(event: &T, encoding: Encoding) -> Result<Self, ProtocolError> {
        Ok(match encoding {
            Encoding::Json => Frame::Text(encode_text(event)?),
            Encoding::MessagePack => Frame::Binary(encode(event, encoding)?),
        })
    }

    /// Raw payload and the encoding it is in.
    #[must_use]
    pub fn payload(&self) -> (&[u8], Encoding) {
        match self {
            Frame::Text(text) => (text.as_bytes(), Encoding::Json),
            Frame::Binary(data) => (data.as_ref(), Encoding::MessagePack),
        }
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload().0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// An active connection to a single client.
///
/// `recv` must be cancel-safe: the driver races it against outbound events.
#[async_trait]
pub trait Connection: Send {
    /// Receive the next frame.
    ///
    /// Returns `None` once the peer has closed the connection.
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError>;

    /// Send a frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Close with a code and reason. Closing twice is a no-op.
    async fn close(&mut self, code: CloseCode, reason: &str) -> Result<(), TransportError>;

    /// Remote address of the peer, if known.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}
