//! Observable side effects of the chess session.
//!
//! The snapshot (see [`crate::session::SessionSnapshot`]) carries everything a
//! view renders. [`ArenaEvent`]s carry what a view *reacts* to: navigation,
//! notifications, per-second ticks and the request to send the user back to
//! the login screen.

use std::time::Duration;

use crate::clock::GameClock;
use crate::protocol::{Color, GameId, PlayerId, RequestId};

/// Events emitted by the [`ChessClient`](crate::client::ChessClient) session
/// loop.
///
/// Events are delivered on a bounded channel. When the consumer falls behind,
/// events are dropped with a warning, except
/// [`Disconnected`](ArenaEvent::Disconnected) which is always delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum ArenaEvent {
    /// The transport opened. Queued intents have been flushed.
    Connected,

    /// The transport closed or failed.
    Disconnected {
        /// Human-readable reason, if any.
        reason: Option<String>,
        /// WebSocket close code, when the server sent one.
        code: Option<u16>,
    },

    /// A game was assigned; views navigate to the game screen.
    GameAssigned {
        game_id: GameId,
        player_id: PlayerId,
        color: Color,
    },

    /// A private game was created; share `invite_code` with the opponent.
    GameCreated { invite_code: GameId },

    /// The current game ended. `winner` is `None` for draws.
    GameOver {
        winner: Option<Color>,
        reason: Option<String>,
    },

    /// The server reported an error not tied to a pending move.
    ServerError { message: String },

    /// The server rejected the move sent with `request_id`.
    MoveRejected {
        request_id: RequestId,
        message: String,
    },

    /// The server accepted the move sent with `request_id` (a `state`
    /// arrived while it was pending).
    MoveConfirmed { request_id: RequestId },

    /// Projected clock, emitted every tick while a clocked game runs.
    ClockTick { clock: GameClock, turn: Color },

    /// Time spent searching for a random opponent, emitted every tick while
    /// waiting for a match.
    SearchElapsed { elapsed: Duration },

    /// Credentials were rejected and could not be refreshed; views should
    /// send the user to the login screen.
    AuthenticationRequired,
}

impl ArenaEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::GameAssigned { .. } => "game_assigned",
            Self::GameCreated { .. } => "game_created",
            Self::GameOver { .. } => "game_over",
            Self::ServerError { .. } => "server_error",
            Self::MoveRejected { .. } => "move_rejected",
            Self::MoveConfirmed { .. } => "move_confirmed",
            Self::ClockTick { .. } => "clock_tick",
            Self::SearchElapsed { .. } => "search_elapsed",
            Self::AuthenticationRequired => "authentication_required",
        }
    }
}
