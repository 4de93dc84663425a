//! Error types for the Chess Arena client.

use thiserror::Error;

/// Errors that can occur when using the Chess Arena client.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// The server closed the connection with a code that signals the
    /// session credentials were rejected or the server hit an unexpected
    /// condition (see [`CloseCode::requires_reauth`](crate::close_codes::CloseCode::requires_reauth)).
    #[error("connection closed by server (code {code}): {reason}")]
    AbnormalClose {
        /// Raw WebSocket close code.
        code: u16,
        /// Close reason supplied by the server, possibly empty.
        reason: String,
    },

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The configured endpoint is not a valid URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// The auth service answered with a non-success status.
    #[error("auth request failed ({status}): {message}")]
    Auth {
        /// HTTP status code returned by the auth service.
        status: u16,
        /// The `error` field of the response body, or the status text.
        message: String,
    },

    /// Transport-level HTTP failure talking to the auth service.
    #[cfg(feature = "http-auth")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArenaError {
    /// Returns `true` for failures the auth service reported explicitly
    /// (a bad status), as opposed to network flakiness.
    pub fn is_hard_auth_failure(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

/// A specialized [`Result`] type for Chess Arena client operations.
pub type Result<T> = std::result::Result<T, ArenaError>;

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
    fn abnormal_close_display_includes_code() {
        let err = ArenaError::AbnormalClose {
            code: 1008,
            reason: "Invalid authentication".into(),
        };
        assert_eq!(
            err.to_string(),
            "connection closed by server (code 1008): Invalid authentication"
        );
    }

    #[test]
    fn only_status_failures_are_hard() {
        let hard = ArenaError::Auth {
            status: 401,
            message: "invalid refresh token".into(),
        };
        assert!(hard.is_hard_auth_failure());
        assert!(!ArenaError::Timeout.is_hard_auth_failure());
        assert!(!ArenaError::TransportClosed.is_hard_auth_failure());
    }
}
