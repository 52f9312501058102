//! Connection close codes.

/// Close codes sent when the server ends a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    /// Client-initiated or orderly shutdown.
    Normal = 1000,
    /// Malformed or oversized frames.
    ProtocolViolation = 1002,
    /// Authentication or membership was refused.
    Policy = 1008,
    /// A collaborator failed while the connection was being set up.
    InternalError = 1011,
}

impl CloseCode {
    /// Create a `CloseCode` from a raw u16 value.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1000 => Some(Self::Normal),
            1002 => Some(Self::ProtocolViolation),
            1008 => Some(Self::Policy),
            1011 => Some(Self::InternalError),
            _ => None,
        }
    }

    /// Get the raw u16 value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Default close reason for this code.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Normal => "normal closure",
            Self::ProtocolViolation => "protocol violation",
            Self::Policy => "policy violation",
            Self::InternalError => "internal error",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.as_u16(), self.description())
    }
}
