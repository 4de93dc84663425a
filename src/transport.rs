//! Transport abstraction for the Chess Arena game protocol.
//!
//! The [`Transport`] trait defines a bidirectional text message channel between
//! the client and the game server. Every message is one JSON envelope, so
//! implementations handle framing internally (WebSocket frames in practice).
//!
//! # Connection Setup
//!
//! The session loop owns a [`Connector`] and asks it for a fresh
//! [`Transport`] on every explicit `connect` and on the reconnect that follows
//! a credential refresh. At most one transport is alive at a time.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use chess_arena_client::error::ArenaError;
//! use chess_arena_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), ArenaError> {
//!         // Send the JSON text message over your transport
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ArenaError>> {
//!         // Receive the next JSON text message
//!         // Return None when the connection is closed cleanly
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ArenaError> {
//!         Ok(())
//!     }
//! }
//!
//! #[derive(Clone)]
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&self, url: &str) -> Result<MyTransport, ArenaError> {
//!         Ok(MyTransport {})
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ArenaError;

/// A bidirectional text message transport for the Chess Arena protocol.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON message.
/// Each call to [`recv`](Transport::recv) returns one complete JSON message.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is used
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling it
/// again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::TransportSend`] if the message could not be sent,
    /// or [`ArenaError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), ArenaError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(ArenaError::AbnormalClose { .. }))`: the server closed the
    ///   connection with a code that asks for re-authentication
    /// - `Some(Err(e))`: any other transport error
    /// - `None`: the connection was closed normally
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, ArenaError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), ArenaError>;
}

/// Opens [`Transport`]s on demand.
///
/// The session loop clones the connector into each connection attempt, so
/// implementations should be cheap to clone (share state behind `Arc`).
#[async_trait]
pub trait Connector: Clone + Send + Sync + 'static {
    /// The transport produced by a successful connection.
    type Transport: Transport;

    /// Open a connection to `url` (the game endpoint, including any
    /// `gameId` query parameter).
    ///
    /// # Errors
    ///
    /// Returns an error when the connection cannot be established. The session
    /// records the failure in the snapshot and stays disconnected.
    async fn connect(&self, url: &str) -> Result<Self::Transport, ArenaError>;
}
