//! The client-side game session state machine.
//!
//! A [`SessionSnapshot`] is an immutable value: every transition builds a new
//! snapshot from the previous one and the input that caused it. Two pure
//! functions drive it:
//!
//! - [`reduce`] folds a [`SessionInput`] (transport lifecycle or an inbound
//!   [`ServerMessage`]) into the next snapshot.
//! - [`plan_intent`] checks an [`Intent`]'s preconditions against the current
//!   snapshot and yields the next snapshot plus the [`ClientMessage`] to send,
//!   if any.
//!
//! Neither function performs I/O. The session loop in [`crate::client`] owns
//! the transport and feeds both.
//!
//! ```
//! use chess_arena_client::protocol::{Color, ServerMessage};
//! use chess_arena_client::session::{reduce, SessionInput, SessionSnapshot};
//!
//! let snapshot = SessionSnapshot::initial();
//! let snapshot = reduce(&snapshot, &SessionInput::Connecting);
//! let snapshot = reduce(&snapshot, &SessionInput::Opened);
//! let snapshot = reduce(
//!     &snapshot,
//!     &SessionInput::Message(ServerMessage::PlayerInfo {
//!         player_id: "p1".into(),
//!         color: Color::White,
//!         game_id: "g1".into(),
//!     }),
//! );
//! assert!(snapshot.can_move());
//! ```

use crate::clock::GameClock;
use crate::close_codes::CloseCode;
use crate::protocol::{ClientMessage, Color, GameId, PlayerId, RequestId, ServerMessage};
use crate::validator::{MoveValidator, ValidatedMove};

/// Standard chess starting position.
pub const INITIAL_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Surfaced when an intent needs a connection and there is none.
pub const NOT_CONNECTED: &str = "Not connected to server";
/// Surfaced when a move intent arrives without an assigned game.
pub const NO_ACTIVE_GAME: &str = "No active game";
/// Surfaced when the transport reports an error.
pub const CONNECTION_ERROR: &str = "Connection error";
/// Prefix for connection construction failures.
pub const FAILED_TO_CONNECT: &str = "Failed to connect";

// ── Phases ──────────────────────────────────────────────────────────

/// Transport connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Matchmaking phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchmakingPhase {
    #[default]
    Idle,
    /// Queued for a random opponent.
    WaitingForMatch,
    /// A private game exists and waits for the invitee.
    WaitingForInvitee,
}

/// Combined phase derived from a snapshot, for views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    /// Connected, no game and no search.
    Lobby,
    WaitingForMatch,
    WaitingForInvitee,
    InGame,
    GameOver,
}

// ── Snapshot ────────────────────────────────────────────────────────

/// A move sent with a correlation identifier that the server has not yet
/// answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    pub request_id: RequestId,
    pub san: String,
}

/// Everything a view needs to render the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub connection_phase: ConnectionPhase,
    /// Only set while connected.
    pub game_id: Option<GameId>,
    pub local_player_id: Option<PlayerId>,
    pub local_color: Option<Color>,
    /// Current position as FEN. Always parses.
    pub position: String,
    pub turn: Color,
    /// SAN moves in play order.
    pub move_log: Vec<String>,
    pub in_check: bool,
    pub is_game_over: bool,
    pub winner: Option<Color>,
    pub end_reason: Option<String>,
    pub matchmaking_phase: MatchmakingPhase,
    pub pending_invite_code: Option<GameId>,
    pub last_error: Option<String>,
    /// Last server-reported clock, for clocked games.
    pub clock: Option<GameClock>,
    pub pending_move: Option<PendingMove>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::initial()
    }
}

impl SessionSnapshot {
    /// Snapshot at session start: starting position, disconnected.
    pub fn initial() -> Self {
        Self {
            connection_phase: ConnectionPhase::Disconnected,
            game_id: None,
            local_player_id: None,
            local_color: None,
            position: INITIAL_FEN.to_owned(),
            turn: Color::White,
            move_log: Vec::new(),
            in_check: false,
            is_game_over: false,
            winner: None,
            end_reason: None,
            matchmaking_phase: MatchmakingPhase::Idle,
            pending_invite_code: None,
            last_error: None,
            clock: None,
            pending_move: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_phase == ConnectionPhase::Connected
    }

    /// Whether the local player may drag a piece right now.
    pub fn can_move(&self) -> bool {
        self.is_connected()
            && self.game_id.is_some()
            && self.local_color == Some(self.turn)
            && !self.is_game_over
            && self.matchmaking_phase != MatchmakingPhase::WaitingForInvitee
    }

    pub fn phase(&self) -> SessionPhase {
        match self.connection_phase {
            ConnectionPhase::Disconnected => SessionPhase::Disconnected,
            ConnectionPhase::Connecting => SessionPhase::Connecting,
            ConnectionPhase::Connected => match self.matchmaking_phase {
                MatchmakingPhase::WaitingForMatch => SessionPhase::WaitingForMatch,
                MatchmakingPhase::WaitingForInvitee => SessionPhase::WaitingForInvitee,
                MatchmakingPhase::Idle if self.is_game_over => SessionPhase::GameOver,
                MatchmakingPhase::Idle if self.game_id.is_some() => SessionPhase::InGame,
                MatchmakingPhase::Idle => SessionPhase::Lobby,
            },
        }
    }

    /// Side that played the last logged move.
    pub fn last_mover(&self) -> Option<Color> {
        match self.move_log.len() {
            0 => None,
            n if n % 2 == 1 => Some(Color::White),
            _ => Some(Color::Black),
        }
    }

    /// Copy with all per-game state dropped; connection, player id and the
    /// last error survive.
    fn without_game(&self) -> Self {
        Self {
            connection_phase: self.connection_phase,
            local_player_id: self.local_player_id.clone(),
            last_error: self.last_error.clone(),
            ..Self::initial()
        }
    }

    /// Drops the game if it has ended, so a new match never inherits it.
    fn without_finished_game(&self) -> Self {
        if self.is_game_over {
            self.without_game()
        } else {
            self.clone()
        }
    }

    fn disconnected(&self) -> Self {
        Self {
            connection_phase: ConnectionPhase::Disconnected,
            game_id: None,
            matchmaking_phase: MatchmakingPhase::Idle,
            pending_invite_code: None,
            pending_move: None,
            ..self.clone()
        }
    }

    fn with_error(&self, message: impl Into<String>) -> Self {
        Self {
            last_error: Some(message.into()),
            ..self.clone()
        }
    }
}

// ── Reducer ─────────────────────────────────────────────────────────

/// Inputs the reducer folds into a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// A connection attempt started.
    Connecting,
    /// The transport opened.
    Opened,
    /// The transport closed. `code` is absent when the peer sent no status.
    Closed { code: Option<u16>, reason: String },
    /// The transport failed mid-session.
    TransportError(String),
    /// The connection could not be established.
    ConnectFailed(String),
    /// A parsed inbound message.
    Message(ServerMessage),
    /// Explicit teardown by the user.
    Disconnect,
}

/// Folds `input` into the next snapshot.
pub fn reduce(snapshot: &SessionSnapshot, input: &SessionInput) -> SessionSnapshot {
    match input {
        SessionInput::Connecting => SessionSnapshot {
            connection_phase: ConnectionPhase::Connecting,
            game_id: None,
            matchmaking_phase: MatchmakingPhase::Idle,
            pending_invite_code: None,
            pending_move: None,
            last_error: None,
            ..snapshot.clone()
        },
        SessionInput::Opened => SessionSnapshot {
            connection_phase: ConnectionPhase::Connected,
            last_error: None,
            ..snapshot.clone()
        },
        SessionInput::Closed { code, reason } => {
            let next = snapshot.disconnected();
            match code.map(CloseCode::from) {
                Some(code) if code.requires_reauth() => {
                    let detail = if reason.is_empty() {
                        code.description().to_owned()
                    } else {
                        reason.clone()
                    };
                    next.with_error(format!("Connection closed ({}): {detail}", code.as_u16()))
                }
                _ => next,
            }
        }
        SessionInput::TransportError(_) => snapshot.disconnected().with_error(CONNECTION_ERROR),
        SessionInput::ConnectFailed(detail) => snapshot
            .disconnected()
            .with_error(format!("{FAILED_TO_CONNECT}: {detail}")),
        SessionInput::Disconnect => SessionSnapshot::initial(),
        SessionInput::Message(message) => reduce_message(snapshot, message),
    }
}

fn reduce_message(snapshot: &SessionSnapshot, message: &ServerMessage) -> SessionSnapshot {
    if !snapshot.is_connected() {
        return snapshot.clone();
    }

    match message {
        ServerMessage::PlayerInfo {
            player_id,
            color,
            game_id,
        } => SessionSnapshot {
            game_id: Some(game_id.clone()),
            local_player_id: Some(player_id.clone()),
            local_color: Some(*color),
            matchmaking_phase: MatchmakingPhase::Idle,
            pending_invite_code: None,
            last_error: None,
            ..snapshot.without_finished_game()
        },
        ServerMessage::GameCreated { game_id } => SessionSnapshot {
            pending_invite_code: Some(game_id.clone()),
            matchmaking_phase: MatchmakingPhase::WaitingForInvitee,
            last_error: None,
            ..snapshot.without_finished_game()
        },
        ServerMessage::State(state) => {
            if !MoveValidator::is_valid_fen(&state.fen) {
                return snapshot.clone();
            }
            let clock = GameClock::from_state(state.white_time, state.black_time).or(snapshot.clock);
            SessionSnapshot {
                game_id: Some(state.game_id.clone()),
                position: state.fen.clone(),
                turn: state.turn,
                move_log: state.moves.clone(),
                in_check: state.in_check,
                is_game_over: state.game_over,
                winner: state.winner,
                end_reason: state.reason.clone(),
                matchmaking_phase: MatchmakingPhase::Idle,
                pending_invite_code: None,
                pending_move: None,
                last_error: None,
                clock,
                ..snapshot.clone()
            }
        }
        ServerMessage::TimerUpdate {
            game_id,
            white_time,
            black_time,
            ..
        } => {
            if !is_current_game(snapshot, game_id) || snapshot.is_game_over {
                return snapshot.clone();
            }
            SessionSnapshot {
                clock: Some(GameClock::new(*white_time, *black_time)),
                ..snapshot.clone()
            }
        }
        ServerMessage::TimeUp {
            game_id,
            loser,
            winner,
            reason,
        } => {
            if !is_current_game(snapshot, game_id) {
                return snapshot.clone();
            }
            let end_reason = if reason.is_empty() {
                "timeout".to_owned()
            } else {
                reason.clone()
            };
            SessionSnapshot {
                is_game_over: true,
                winner: winner.or(Some(loser.opposite())),
                end_reason: Some(end_reason),
                matchmaking_phase: MatchmakingPhase::Idle,
                pending_move: None,
                clock: snapshot.clock.map(|clock| clock.with_remaining(*loser, 0)),
                ..snapshot.clone()
            }
        }
        ServerMessage::Error {
            message,
            request_id,
        } => {
            let pending_move = match (&snapshot.pending_move, request_id) {
                (Some(pending), Some(id)) if pending.request_id == *id => None,
                (pending, _) => pending.clone(),
            };
            SessionSnapshot {
                last_error: Some(message.clone()),
                matchmaking_phase: MatchmakingPhase::Idle,
                pending_invite_code: None,
                pending_move,
                ..snapshot.clone()
            }
        }
    }
}

fn is_current_game(snapshot: &SessionSnapshot, game_id: &str) -> bool {
    snapshot.game_id.as_deref() == Some(game_id)
}

// ── Intents ─────────────────────────────────────────────────────────

/// User intents the session understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Enter random matchmaking.
    JoinGame,
    /// Create a private game.
    CreateGame,
    /// Join a private game by invite code.
    JoinInvite(String),
    /// Send a move in SAN without local validation.
    MakeMove(String),
    /// Apply a locally validated move optimistically and send its SAN.
    PlayValidated(ValidatedMove),
    /// Back to the initial snapshot, keeping the connection phase.
    Reset,
}

impl Intent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinGame => "join_game",
            Self::CreateGame => "create_game",
            Self::JoinInvite(_) => "join_invite",
            Self::MakeMove(_) => "make_move",
            Self::PlayValidated(_) => "play_validated",
            Self::Reset => "reset",
        }
    }

    /// Whether the intent produces traffic and so needs an open connection.
    pub fn needs_connection(&self) -> bool {
        !matches!(self, Self::Reset)
    }
}

/// Values an intent may need that the snapshot cannot supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentContext {
    /// Player id used when the snapshot has none yet.
    pub fallback_player_id: PlayerId,
    /// Correlation id to attach to the outbound message.
    pub request_id: Option<RequestId>,
}

/// Checks `intent` against `snapshot`.
///
/// Returns the next snapshot and the message to send. System precondition
/// failures (no connection, no game) set `last_error`; user errors such as
/// moving out of turn leave the snapshot untouched and send nothing.
pub fn plan_intent(
    snapshot: &SessionSnapshot,
    intent: Intent,
    ctx: IntentContext,
) -> (SessionSnapshot, Option<ClientMessage>) {
    if intent.needs_connection() && !snapshot.is_connected() {
        return (snapshot.with_error(NOT_CONNECTED), None);
    }

    match intent {
        Intent::Reset => (
            SessionSnapshot {
                connection_phase: snapshot.connection_phase,
                ..SessionSnapshot::initial()
            },
            None,
        ),
        Intent::JoinGame => {
            let (next, player_id) = enter_matchmaking(snapshot, &ctx);
            let next = SessionSnapshot {
                matchmaking_phase: MatchmakingPhase::WaitingForMatch,
                ..next
            };
            let message = ClientMessage::Join {
                player_id,
                request_id: ctx.request_id,
            };
            (next, Some(message))
        }
        Intent::CreateGame => {
            let (next, player_id) = enter_matchmaking(snapshot, &ctx);
            let message = ClientMessage::CreateGame {
                player_id,
                request_id: ctx.request_id,
            };
            (next, Some(message))
        }
        Intent::JoinInvite(code) => {
            let code = code.trim();
            if code.is_empty() {
                return (snapshot.clone(), None);
            }
            let (next, player_id) = enter_matchmaking(snapshot, &ctx);
            let message = ClientMessage::JoinInvite {
                game_id: code.to_owned(),
                player_id,
                request_id: ctx.request_id,
            };
            (next, Some(message))
        }
        Intent::MakeMove(notation) => {
            let notation = notation.trim();
            if notation.is_empty() {
                return (snapshot.clone(), None);
            }
            plan_move(snapshot, notation.to_owned(), None, ctx.request_id)
        }
        Intent::PlayValidated(validated) => {
            if validated.source_fen != snapshot.position {
                return (snapshot.clone(), None);
            }
            let san = validated.san.clone();
            plan_move(snapshot, san, Some(validated), ctx.request_id)
        }
    }
}

/// Starts a matchmaking request, dropping a finished game first so that a
/// game-over snapshot never sits in a waiting phase.
fn enter_matchmaking(snapshot: &SessionSnapshot, ctx: &IntentContext) -> (SessionSnapshot, PlayerId) {
    let base = snapshot.without_finished_game();
    let player_id = base
        .local_player_id
        .clone()
        .unwrap_or_else(|| ctx.fallback_player_id.clone());
    let next = SessionSnapshot {
        local_player_id: Some(player_id.clone()),
        last_error: None,
        ..base
    };
    (next, player_id)
}

fn plan_move(
    snapshot: &SessionSnapshot,
    san: String,
    optimistic: Option<ValidatedMove>,
    request_id: Option<RequestId>,
) -> (SessionSnapshot, Option<ClientMessage>) {
    let (Some(game_id), Some(player_id)) = (&snapshot.game_id, &snapshot.local_player_id) else {
        return (snapshot.with_error(NO_ACTIVE_GAME), None);
    };
    if !snapshot.can_move() {
        return (snapshot.clone(), None);
    }

    let mut next = snapshot.clone();
    if let Some(validated) = optimistic {
        next.position = validated.fen;
        next.turn = validated.turn;
    }
    next.pending_move = request_id.clone().map(|request_id| PendingMove {
        request_id,
        san: san.clone(),
    });

    let message = ClientMessage::Move {
        game_id: game_id.clone(),
        player_id: player_id.clone(),
        san,
        request_id,
    };
    (next, Some(message))
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
    use crate::protocol::GameStatePayload;

    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
    const AFTER_E4_E5: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2";

    fn ctx() -> IntentContext {
        IntentContext {
            fallback_player_id: "player_local".into(),
            request_id: None,
        }
    }

    fn ctx_with_request(id: &str) -> IntentContext {
        IntentContext {
            request_id: Some(id.into()),
            ..ctx()
        }
    }

    fn connected() -> SessionSnapshot {
        let s = reduce(&SessionSnapshot::initial(), &SessionInput::Connecting);
        reduce(&s, &SessionInput::Opened)
    }

    fn msg(message: ServerMessage) -> SessionInput {
        SessionInput::Message(message)
    }

    fn player_info(color: Color) -> SessionInput {
        msg(ServerMessage::PlayerInfo {
            player_id: "p1".into(),
            color,
            game_id: "g1".into(),
        })
    }

    fn state(fen: &str, turn: Color, moves: &[&str]) -> GameStatePayload {
        GameStatePayload {
            game_id: "g1".into(),
            fen: fen.into(),
            board: Vec::new(),
            turn,
            moves: moves.iter().map(|m| (*m).to_owned()).collect(),
            in_check: false,
            game_over: false,
            winner: None,
            reason: None,
            white_time: None,
            black_time: None,
            request_id: None,
        }
    }

    fn state_input(payload: GameStatePayload) -> SessionInput {
        msg(ServerMessage::State(Box::new(payload)))
    }

    fn in_game(color: Color) -> SessionSnapshot {
        let s = reduce(&connected(), &player_info(color));
        reduce(&s, &state_input(state(INITIAL_FEN, Color::White, &[])))
    }

    #[test]
    fn initial_snapshot_is_disconnected_at_start_position() {
        let s = SessionSnapshot::initial();
        assert_eq!(s.connection_phase, ConnectionPhase::Disconnected);
        assert_eq!(s.position, INITIAL_FEN);
        assert_eq!(s.phase(), SessionPhase::Disconnected);
        assert!(!s.can_move());
    }

    #[test]
    fn connect_lifecycle() {
        let s = reduce(&SessionSnapshot::initial(), &SessionInput::Connecting);
        assert_eq!(s.phase(), SessionPhase::Connecting);
        let s = reduce(&s, &SessionInput::Opened);
        assert_eq!(s.phase(), SessionPhase::Lobby);
    }

    #[test]
    fn player_info_then_state_assigns_game() {
        let s = reduce(&connected(), &player_info(Color::White));
        let s = reduce(&s, &state_input(state(AFTER_E4, Color::Black, &["e4"])));
        assert_eq!(s.game_id.as_deref(), Some("g1"));
        assert_eq!(s.local_color, Some(Color::White));
        assert_eq!(s.local_player_id.as_deref(), Some("p1"));
        assert_eq!(s.position, AFTER_E4);
        assert!(!s.is_game_over);
        assert_eq!(s.phase(), SessionPhase::InGame);
        assert_eq!(s.last_mover(), Some(Color::White));
    }

    #[test]
    fn last_state_fen_wins_over_optimistic_moves() {
        let s = in_game(Color::White);
        let validated =
            MoveValidator::validate(INITIAL_FEN, "e2", Some("e4"), Some(Color::White)).unwrap();
        let (s, out) = plan_intent(&s, Intent::PlayValidated(validated), ctx());
        assert!(out.is_some());
        assert_ne!(s.position, INITIAL_FEN);

        let s = reduce(&s, &state_input(state(AFTER_E4, Color::Black, &["e4"])));
        let s = reduce(&s, &state_input(state(AFTER_E4_E5, Color::White, &["e4", "e5"])));
        assert_eq!(s.position, AFTER_E4_E5);
        assert_eq!(s.move_log, vec!["e4", "e5"]);
    }

    #[test]
    fn same_state_twice_is_idempotent() {
        let s = in_game(Color::White);
        let input = state_input(state(AFTER_E4, Color::Black, &["e4"]));
        let once = reduce(&s, &input);
        let twice = reduce(&once, &input);
        assert_eq!(once, twice);
    }

    #[test]
    fn state_with_invalid_fen_is_dropped() {
        let s = in_game(Color::White);
        let next = reduce(&s, &state_input(state("not/a/fen", Color::Black, &[])));
        assert_eq!(next, s);
    }

    #[test]
    fn move_out_of_turn_sends_nothing() {
        let s = in_game(Color::Black);
        let (next, out) = plan_intent(&s, Intent::MakeMove("e5".into()), ctx());
        assert!(out.is_none());
        assert_eq!(next, s);
    }

    #[test]
    fn move_on_turn_sends_san() {
        let s = in_game(Color::White);
        let (next, out) = plan_intent(&s, Intent::MakeMove("e4".into()), ctx_with_request("r1"));
        assert_eq!(
            out,
            Some(ClientMessage::Move {
                game_id: "g1".into(),
                player_id: "p1".into(),
                san: "e4".into(),
                request_id: Some("r1".into()),
            })
        );
        assert_eq!(next.phase(), SessionPhase::InGame);
        assert_eq!(next.position, INITIAL_FEN);
        assert_eq!(
            next.pending_move,
            Some(PendingMove {
                request_id: "r1".into(),
                san: "e4".into()
            })
        );
    }

    #[test]
    fn move_without_game_is_a_system_error() {
        let (next, out) = plan_intent(&connected(), Intent::MakeMove("e4".into()), ctx());
        assert!(out.is_none());
        assert_eq!(next.last_error.as_deref(), Some(NO_ACTIVE_GAME));
    }

    #[test]
    fn intents_while_disconnected_surface_an_error() {
        let (next, out) = plan_intent(&SessionSnapshot::initial(), Intent::JoinGame, ctx());
        assert!(out.is_none());
        assert_eq!(next.last_error.as_deref(), Some(NOT_CONNECTED));
        assert_eq!(next.matchmaking_phase, MatchmakingPhase::Idle);
    }

    #[test]
    fn join_uses_fallback_id_then_keeps_it() {
        let (s, out) = plan_intent(&connected(), Intent::JoinGame, ctx());
        assert_eq!(s.matchmaking_phase, MatchmakingPhase::WaitingForMatch);
        assert_eq!(s.local_player_id.as_deref(), Some("player_local"));
        assert_eq!(
            out,
            Some(ClientMessage::Join {
                player_id: "player_local".into(),
                request_id: None
            })
        );

        let other = IntentContext {
            fallback_player_id: "player_other".into(),
            request_id: None,
        };
        let (_, out) = plan_intent(&s, Intent::JoinGame, other);
        assert!(matches!(out, Some(ClientMessage::Join { player_id, .. }) if player_id == "player_local"));
    }

    #[test]
    fn create_game_then_game_created_waits_for_invitee() {
        let (s, out) = plan_intent(&connected(), Intent::CreateGame, ctx());
        assert!(matches!(out, Some(ClientMessage::CreateGame { .. })));
        let s = reduce(
            &s,
            &msg(ServerMessage::GameCreated {
                game_id: "invite-42".into(),
            }),
        );
        assert_eq!(s.matchmaking_phase, MatchmakingPhase::WaitingForInvitee);
        assert_eq!(s.pending_invite_code.as_deref(), Some("invite-42"));
        assert_eq!(s.phase(), SessionPhase::WaitingForInvitee);

        let s = reduce(&s, &player_info(Color::White));
        let s = reduce(&s, &state_input(state(INITIAL_FEN, Color::White, &[])));
        assert_eq!(s.pending_invite_code, None);
        assert!(s.can_move());
    }

    #[test]
    fn join_invite_trims_and_ignores_empty_codes() {
        let (s, out) = plan_intent(&connected(), Intent::JoinInvite("  ".into()), ctx());
        assert!(out.is_none());
        assert_eq!(s, connected());

        let (_, out) = plan_intent(&connected(), Intent::JoinInvite(" abc ".into()), ctx());
        assert_eq!(
            out,
            Some(ClientMessage::JoinInvite {
                game_id: "abc".into(),
                player_id: "player_local".into(),
                request_id: None,
            })
        );
    }

    #[test]
    fn error_cancels_matchmaking() {
        let (s, _) = plan_intent(&connected(), Intent::JoinGame, ctx());
        let s = reduce(
            &s,
            &msg(ServerMessage::Error {
                message: "queue full".into(),
                request_id: None,
            }),
        );
        assert_eq!(s.matchmaking_phase, MatchmakingPhase::Idle);
        assert_eq!(s.last_error.as_deref(), Some("queue full"));
    }

    #[test]
    fn correlated_error_clears_pending_move_only_when_ids_match() {
        let s = in_game(Color::White);
        let (s, _) = plan_intent(&s, Intent::MakeMove("e5".into()), ctx_with_request("r9"));
        let unrelated = reduce(
            &s,
            &msg(ServerMessage::Error {
                message: "boom".into(),
                request_id: None,
            }),
        );
        assert!(unrelated.pending_move.is_some());
        let matched = reduce(
            &s,
            &msg(ServerMessage::Error {
                message: "Invalid move".into(),
                request_id: Some("r9".into()),
            }),
        );
        assert_eq!(matched.pending_move, None);
        assert_eq!(matched.last_error.as_deref(), Some("Invalid move"));
    }

    #[test]
    fn reset_after_game_over_keeps_only_connection_phase() {
        let s = in_game(Color::White);
        let mut over = state(AFTER_E4, Color::Black, &["e4"]);
        over.game_over = true;
        over.winner = Some(Color::White);
        over.reason = Some("resignation".into());
        let s = reduce(&s, &state_input(over));
        assert_eq!(s.phase(), SessionPhase::GameOver);

        let (reset, out) = plan_intent(&s, Intent::Reset, ctx());
        assert!(out.is_none());
        assert_eq!(
            reset,
            SessionSnapshot {
                connection_phase: ConnectionPhase::Connected,
                ..SessionSnapshot::initial()
            }
        );
    }

    #[test]
    fn joining_after_game_over_drops_the_finished_game() {
        let s = in_game(Color::White);
        let mut over = state(AFTER_E4, Color::Black, &["e4"]);
        over.game_over = true;
        let s = reduce(&s, &state_input(over));
        let (s, _) = plan_intent(&s, Intent::JoinGame, ctx());
        assert!(!s.is_game_over);
        assert_eq!(s.game_id, None);
        assert_eq!(s.local_player_id.as_deref(), Some("p1"));
        assert_eq!(s.matchmaking_phase, MatchmakingPhase::WaitingForMatch);
    }

    /// Ends the running `g1` after a matchmaking request was already sent.
    fn game_ended_after(intent: Intent) -> SessionSnapshot {
        let s = reduce(&in_game(Color::White), &state_input(state(AFTER_E4, Color::Black, &["e4"])));
        let (s, out) = plan_intent(&s, intent, ctx());
        assert!(out.is_some());
        let mut over = state(AFTER_E4, Color::Black, &["e4"]);
        over.game_over = true;
        over.winner = Some(Color::White);
        over.reason = Some("resignation".into());
        let s = reduce(&s, &state_input(over));
        assert!(s.is_game_over);
        assert_eq!(s.matchmaking_phase, MatchmakingPhase::Idle);
        s
    }

    #[test]
    fn late_game_created_drops_the_game_that_ended_meanwhile() {
        let s = game_ended_after(Intent::CreateGame);
        let s = reduce(
            &s,
            &msg(ServerMessage::GameCreated {
                game_id: "inv".into(),
            }),
        );
        assert!(!s.is_game_over);
        assert_eq!(s.winner, None);
        assert_eq!(s.game_id, None);
        assert_eq!(s.position, INITIAL_FEN);
        assert_eq!(s.matchmaking_phase, MatchmakingPhase::WaitingForInvitee);
        assert_eq!(s.pending_invite_code.as_deref(), Some("inv"));
        assert_eq!(s.local_player_id.as_deref(), Some("p1"));
        assert_eq!(s.phase(), SessionPhase::WaitingForInvitee);
    }

    #[test]
    fn late_player_info_starts_the_new_game_clean() {
        let s = game_ended_after(Intent::JoinGame);
        let s = reduce(
            &s,
            &msg(ServerMessage::PlayerInfo {
                player_id: "p1".into(),
                color: Color::Black,
                game_id: "g2".into(),
            }),
        );
        assert!(!s.is_game_over);
        assert_eq!(s.winner, None);
        assert_eq!(s.end_reason, None);
        assert!(s.move_log.is_empty());
        assert_eq!(s.position, INITIAL_FEN);
        assert_eq!(s.game_id.as_deref(), Some("g2"));
        assert_eq!(s.local_color, Some(Color::Black));
        assert_eq!(s.phase(), SessionPhase::InGame);
    }

    #[test]
    fn player_info_during_running_game_keeps_the_board() {
        let s = reduce(&in_game(Color::White), &state_input(state(AFTER_E4, Color::Black, &["e4"])));
        let s = reduce(&s, &player_info(Color::White));
        assert_eq!(s.position, AFTER_E4);
        assert_eq!(s.move_log, vec!["e4"]);
    }

    #[test]
    fn one_sided_clock_in_state_reads_as_zero() {
        let mut clocked = state(INITIAL_FEN, Color::White, &[]);
        clocked.white_time = Some(5_000);
        clocked.black_time = Some(5_000);
        let s = reduce(&in_game(Color::White), &state_input(clocked));

        let mut flagged = state(AFTER_E4, Color::Black, &["e4"]);
        flagged.white_time = Some(4_200);
        let s = reduce(&s, &state_input(flagged));
        assert_eq!(s.clock, Some(GameClock::new(4_200, 0)));

        let s = reduce(&s, &state_input(state(AFTER_E4, Color::Black, &["e4"])));
        assert_eq!(s.clock, Some(GameClock::new(4_200, 0)));
    }

    #[test]
    fn close_keeps_board_but_drops_game_id() {
        let s = reduce(&in_game(Color::White), &state_input(state(AFTER_E4, Color::Black, &["e4"])));
        let s = reduce(
            &s,
            &SessionInput::Closed {
                code: Some(1000),
                reason: String::new(),
            },
        );
        assert_eq!(s.connection_phase, ConnectionPhase::Disconnected);
        assert_eq!(s.game_id, None);
        assert_eq!(s.position, AFTER_E4);
        assert_eq!(s.last_error, None);
    }

    #[test]
    fn policy_close_sets_error() {
        let s = reduce(
            &connected(),
            &SessionInput::Closed {
                code: Some(1008),
                reason: "Invalid authentication".into(),
            },
        );
        assert_eq!(
            s.last_error.as_deref(),
            Some("Connection closed (1008): Invalid authentication")
        );
    }

    #[test]
    fn connect_failure_stays_disconnected() {
        let s = reduce(&SessionSnapshot::initial(), &SessionInput::Connecting);
        let s = reduce(&s, &SessionInput::ConnectFailed("refused".into()));
        assert_eq!(s.connection_phase, ConnectionPhase::Disconnected);
        assert_eq!(s.last_error.as_deref(), Some("Failed to connect: refused"));
    }

    #[test]
    fn disconnect_returns_initial_snapshot() {
        let s = reduce(&in_game(Color::White), &SessionInput::Disconnect);
        assert_eq!(s, SessionSnapshot::initial());
    }

    #[test]
    fn messages_while_disconnected_are_ignored() {
        let s = reduce(&SessionSnapshot::initial(), &player_info(Color::White));
        assert_eq!(s, SessionSnapshot::initial());
    }

    #[test]
    fn clock_follows_state_and_timer_updates() {
        let s = in_game(Color::White);
        let mut clocked = state(INITIAL_FEN, Color::White, &[]);
        clocked.white_time = Some(600_000);
        clocked.black_time = Some(600_000);
        let s = reduce(&s, &state_input(clocked));
        assert_eq!(s.clock, Some(GameClock::new(600_000, 600_000)));

        let s = reduce(
            &s,
            &msg(ServerMessage::TimerUpdate {
                game_id: "g1".into(),
                white_time: 598_000,
                black_time: 600_000,
                current_turn: Color::White,
            }),
        );
        assert_eq!(s.clock, Some(GameClock::new(598_000, 600_000)));

        let stale = reduce(
            &s,
            &msg(ServerMessage::TimerUpdate {
                game_id: "other".into(),
                white_time: 1,
                black_time: 1,
                current_turn: Color::White,
            }),
        );
        assert_eq!(stale, s);
    }

    #[test]
    fn time_up_ends_game_for_loser() {
        let mut clocked = state(INITIAL_FEN, Color::White, &[]);
        clocked.white_time = Some(300);
        clocked.black_time = Some(5_000);
        let s = reduce(&in_game(Color::White), &state_input(clocked));
        let s = reduce(
            &s,
            &msg(ServerMessage::TimeUp {
                game_id: "g1".into(),
                loser: Color::White,
                winner: None,
                reason: String::new(),
            }),
        );
        assert!(s.is_game_over);
        assert_eq!(s.winner, Some(Color::Black));
        assert_eq!(s.end_reason.as_deref(), Some("timeout"));
        assert_eq!(s.clock, Some(GameClock::new(0, 5_000)));
        assert!(!s.can_move());
    }

    #[test]
    fn stale_validated_move_is_ignored() {
        let s = reduce(&in_game(Color::White), &state_input(state(AFTER_E4_E5, Color::White, &["e4", "e5"])));
        let stale =
            MoveValidator::validate(INITIAL_FEN, "d2", Some("d4"), Some(Color::White)).unwrap();
        let (next, out) = plan_intent(&s, Intent::PlayValidated(stale), ctx());
        assert!(out.is_none());
        assert_eq!(next, s);
    }

    #[test]
    fn gate_blocks_while_waiting_for_invitee() {
        let s = in_game(Color::White);
        let s = SessionSnapshot {
            matchmaking_phase: MatchmakingPhase::WaitingForInvitee,
            ..s
        };
        assert!(!s.can_move());
    }
}
