//! # Chess Arena Client
//!
//! Async Rust client for the Chess Arena real-time multiplayer chess server.
//!
//! The server owns matchmaking, legal-move authority, clocks and persistence.
//! This crate owns the client side: one WebSocket session whose state is a
//! single immutable [`SessionSnapshot`] replaced on every transition, local
//! pre-validation of dragged moves, and a cookie-based auth session against
//! the HTTP auth API.
//!
//! ## Features
//!
//! - **Pure session reducer**: [`session::reduce`] and [`session::plan_intent`]
//!   are plain functions, testable without I/O
//! - **Optimistic moves**: [`MoveValidator`] computes SAN and the resulting
//!   position; the server's next `state` always wins
//! - **Transport-agnostic**: implement [`Transport`] + [`Connector`] for any
//!   backend; `transport-websocket` (default) provides [`WebSocketConnector`]
//! - **Auth**: `http-auth` (default) provides [`auth::HttpAuthApi`], whose
//!   cookie jar the WebSocket connector reuses
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> chess_arena_client::Result<()> {
//! use chess_arena_client::{ArenaConfig, ArenaEvent, ChessClient, WebSocketConnector};
//!
//! let (client, mut events) = ChessClient::start(WebSocketConnector::new(), ArenaConfig::default());
//! client.connect(None)?;
//! client.join_game()?;
//!
//! while let Some(event) = events.recv().await {
//!     if let ArenaEvent::GameAssigned { color, .. } = event {
//!         println!("matched, playing {color}");
//!         if client.snapshot().can_move() {
//!             client.drop_piece("e2", Some("e4"));
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod clock;
pub mod close_codes;
pub mod error;
pub mod event;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod transports;
pub mod validator;

// Re-export primary types for ergonomic imports.
pub use auth::{AuthConfig, AuthSession, CredentialRefresher, User};
pub use client::{ArenaConfig, ChessClient};
pub use close_codes::CloseCode;
pub use error::{ArenaError, Result};
pub use event::ArenaEvent;
pub use protocol::{ClientMessage, Color, ServerMessage};
pub use session::{SessionSnapshot, INITIAL_FEN};
pub use transport::{Connector, Transport};
pub use validator::{MoveValidator, ValidatedMove};

#[cfg(feature = "http-auth")]
pub use auth::HttpAuthApi;

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
