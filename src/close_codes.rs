//! WebSocket close codes as seen by the Chess Arena client.
//!
//! The game server closes the upgrade with `1008` when the `accessToken`
//! cookie is missing or invalid, and with `1011` when it hits an unexpected
//! condition. Both are treated as "credentials may be stale": the session
//! refreshes them once and reconnects once before giving up.

use std::fmt;

/// Classified WebSocket close code (RFC 6455 §7.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    Normal,
    GoingAway,
    ProtocolError,
    Unsupported,
    NoStatus,
    Abnormal,
    InvalidPayload,
    PolicyViolation,
    MessageTooBig,
    MandatoryExtension,
    UnexpectedCondition,
    /// Any code without a dedicated variant (including the 4000–4999
    /// application range).
    Other(u16),
}

impl CloseCode {
    /// Returns the numeric close code.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::ProtocolError => 1002,
            Self::Unsupported => 1003,
            Self::NoStatus => 1005,
            Self::Abnormal => 1006,
            Self::InvalidPayload => 1007,
            Self::PolicyViolation => 1008,
            Self::MessageTooBig => 1009,
            Self::MandatoryExtension => 1010,
            Self::UnexpectedCondition => 1011,
            Self::Other(code) => code,
        }
    }

    /// Returns `true` when the close should trigger a credential refresh and
    /// a single reconnect attempt.
    pub fn requires_reauth(self) -> bool {
        matches!(self, Self::PolicyViolation | Self::UnexpectedCondition)
    }

    /// Returns a human-readable description of this close code.
    pub fn description(self) -> &'static str {
        match self {
            Self::Normal => "The connection was closed normally.",
            Self::GoingAway => "The server is going away or the client navigated away.",
            Self::ProtocolError => "The connection was closed because of a protocol error.",
            Self::Unsupported => "The endpoint received a frame type it cannot accept.",
            Self::NoStatus => "The connection was closed without a status code.",
            Self::Abnormal => "The connection was dropped without a close frame.",
            Self::InvalidPayload => "A message contained data inconsistent with its type.",
            Self::PolicyViolation => {
                "The server rejected the session. Your login may have expired."
            }
            Self::MessageTooBig => "A message was too large for the server to process.",
            Self::MandatoryExtension => "A required WebSocket extension was not negotiated.",
            Self::UnexpectedCondition => {
                "The server hit an unexpected condition and closed the connection."
            }
            Self::Other(_) => "The connection was closed with an application-specific code.",
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1002 => Self::ProtocolError,
            1003 => Self::Unsupported,
            1005 => Self::NoStatus,
            1006 => Self::Abnormal,
            1007 => Self::InvalidPayload,
            1008 => Self::PolicyViolation,
            1009 => Self::MessageTooBig,
            1010 => Self::MandatoryExtension,
            1011 => Self::UnexpectedCondition,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u16())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn numeric_codes_survive_classification() {
        for code in [1000, 1001, 1002, 1003, 1005, 1006, 1007, 1008, 1009, 1010, 1011, 4001] {
            assert_eq!(CloseCode::from(code).as_u16(), code);
        }
    }

    #[test]
    fn only_policy_and_unexpected_condition_require_reauth() {
        assert!(CloseCode::from(1008).requires_reauth());
        assert!(CloseCode::from(1011).requires_reauth());
        assert!(!CloseCode::from(1000).requires_reauth());
        assert!(!CloseCode::from(1001).requires_reauth());
        assert!(!CloseCode::from(1006).requires_reauth());
        assert!(!CloseCode::from(4000).requires_reauth());
    }

    #[test]
    fn display_mentions_numeric_code() {
        let text = CloseCode::PolicyViolation.to_string();
        assert!(text.contains("1008"));
        assert!(text.contains("login"));
    }
}
