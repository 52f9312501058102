//! Codec for encoding and decoding Huddle events.
//!
//! Text frames carry JSON. Binary frames carry the same event shapes encoded
//! as MessagePack (named fields, so tags survive the trip).

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum encoded event size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Payload encoding used on a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    /// UTF-8 JSON in text frames.
    #[default]
    #[serde(rename = "json")]
    Json,
    /// MessagePack in binary frames.
    #[serde(rename = "msgpack")]
    MessagePack,
}

impl Encoding {
    /// Whether payloads in this encoding travel in binary frames.
    #[must_use]
    pub fn is_binary(self) -> bool {
        matches!(self, Encoding::MessagePack)
    }
}

/// Encode an event.
///
/// # Errors
///
/// Returns an error if serialization fails or the result is too large.
pub fn encode<T: Serialize>(event: &T, encoding: Encoding) -> Result<Bytes, ProtocolError> {
    let payload = match encoding {
        Encoding::Json => serde_json::to_vec(event)?,
        Encoding::MessagePack => rmp_serde::to_vec_named(event)?,
    };

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    Ok(Bytes::from(payload))
}

/// Encode an event as JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails or the result is too large.
pub fn encode_text<T: Serialize>(event: &T) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(event)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(text)
}

/// Decode an event.
///
/// # Errors
///
/// Returns an error if the data is too large or does not match the event shape.
pub fn decode<T: DeserializeOwned>(data: &[u8], encoding: Encoding) -> Result<T, ProtocolError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    let event = match encoding {
        Encoding::Json => serde_json::from_slice(data)?,
        Encoding::MessagePack => rmp_serde::from_slice(data)?,
    };
    Ok(event)
}
