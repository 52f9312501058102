//! Error types for the messaging core.

use crate::identity::{MessageId, RoomId};
use crate::session::SessionState;
use huddle_protocol::{CloseCode, ErrorCode, ServerEvent};
use thiserror::Error;

/// Failures of a collaborator backend (message store, membership authority).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The referenced message does not exist.
    #[error("Message not found: {0}")]
    NotFound(MessageId),

    /// The write did not complete in time.
    #[error("Store operation timed out")]
    Timeout,

    /// The backend is unreachable or failed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Credential problems reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,

    #[error("malformed credential")]
    Malformed,

    #[error("credential rejected")]
    Rejected,
}

/// Room directory errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("Room not found: {0}")]
    NotFound(RoomId),

    #[error("Not authorized: {0}")]
    NotAuthorized(&'static str),

    #[error("Invalid room: {0}")]
    Invalid(&'static str),
}

/// Errors raised while driving a session.
///
/// `Auth` and `Membership` are fatal and end the session. Everything else
/// is reported to the originating session only and the session stays active.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Not a member of room {0}")]
    Membership(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown message reference: {0}")]
    Reference(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session is not active (state: {0:?})")]
    NotActive(SessionState),
}

impl SessionError {
    /// Whether this error terminates the session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Auth(_) | SessionError::Membership(_))
    }

    /// Close code used when this error ends a connection.
    #[must_use]
    pub fn close_code(&self) -> CloseCode {
        match self {
            SessionError::Auth(_) | SessionError::Membership(_) => CloseCode::Policy,
            SessionError::Protocol(_) => CloseCode::ProtocolViolation,
            SessionError::Store(_) => CloseCode::InternalError,
            _ => CloseCode::Normal,
        }
    }

    /// Wire error code for errors reported back to the originator.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            SessionError::Protocol(_) => Some(ErrorCode::Protocol),
            SessionError::Reference(_) => Some(ErrorCode::Reference),
            SessionError::NotAuthorized(_) => Some(ErrorCode::NotAuthorized),
            SessionError::Store(_) => Some(ErrorCode::Store),
            _ => None,
        }
    }

    /// The `error` event sent to the originating session, if any.
    #[must_use]
    pub fn to_event(&self) -> Option<ServerEvent> {
        self.error_code()
            .map(|code| ServerEvent::error(code, self.to_string()))
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Auth(_) => "auth",
            SessionError::Membership(_) => "membership",
            SessionError::Protocol(_) => "protocol",
            SessionError::Reference(_) => "reference",
            SessionError::NotAuthorized(_) => "not_authorized",
            SessionError::Store(_) => "store",
            SessionError::NotActive(_) => "not_active",
        }
    }
}

impl From<huddle_protocol::ProtocolError> for SessionError {
    fn from(err: huddle_protocol::ProtocolError) -> Self {
        SessionError::Protocol(err.to_string())
    }
}
