//! Wire-compatible protocol types for the Chess Arena game server.
//!
//! Every message travels as an adjacently-tagged envelope,
//! `{"type": "<camelCaseType>", "data": {...}}`, with camelCase field names.
//! Key adaptations to what the server actually emits:
//!
//! - `playerId` in `playerInfo` is numeric on the wire; it is accepted as a
//!   number or a string and stored as a `String`
//! - empty slices may arrive as `null`; they decode as empty vectors
//! - `winner` is omitted, empty, or non-color on draws; it decodes as `None`
//! - `requestId` is an optional correlation identifier attached to outbound
//!   intents and echoed back on `state` / `error` by servers that support it

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Server-issued game identifier (also used as the private invite code).
pub type GameId = String;

/// Player identifier, either server-assigned or generated locally.
pub type PlayerId = String;

/// Correlation identifier attached to an outbound intent.
pub type RequestId = String;

// ── Enums ───────────────────────────────────────────────────────────

/// Side color.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    #[default]
    White,
    Black,
}

impl Color {
    /// The other side.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    /// Wire spelling (`"white"` / `"black"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }

    /// Parses the wire spelling; anything else (including `"draw"` and the
    /// empty string) yields `None`.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "white" => Some(Self::White),
            "black" => Some(Self::Black),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<shakmaty::Color> for Color {
    fn from(color: shakmaty::Color) -> Self {
        match color {
            shakmaty::Color::White => Self::White,
            shakmaty::Color::Black => Self::Black,
        }
    }
}

// ── Payload structs ─────────────────────────────────────────────────

/// Payload for the `state` server message.
/// Boxed in `ServerMessage` to reduce enum size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatePayload {
    pub game_id: GameId,
    pub fen: String,
    /// 8×8 board rendering, rank 8 first. Not used by the reducer.
    #[serde(default, deserialize_with = "null_as_default")]
    pub board: Vec<Vec<String>>,
    pub turn: Color,
    /// Moves played so far, in play order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub moves: Vec<String>,
    #[serde(default)]
    pub in_check: bool,
    #[serde(default)]
    pub game_over: bool,
    #[serde(
        default,
        deserialize_with = "color_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub winner: Option<Color>,
    #[serde(
        default,
        deserialize_with = "non_empty_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub reason: Option<String>,
    /// Remaining white time in milliseconds, when the game is clocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_time: Option<i64>,
    /// Remaining black time in milliseconds, when the game is clocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub black_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Enter the random matchmaking queue.
    Join {
        player_id: PlayerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
    },
    /// Create a private game; the server answers with `gameCreated`.
    CreateGame {
        player_id: PlayerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
    },
    /// Join a private game by its invite code.
    JoinInvite {
        /// The invite code (the private game's identifier).
        game_id: GameId,
        player_id: PlayerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
    },
    /// Play a move in standard algebraic notation.
    Move {
        game_id: GameId,
        player_id: PlayerId,
        #[serde(rename = "move")]
        san: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
    },
}

impl ClientMessage {
    /// Wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::CreateGame { .. } => "createGame",
            Self::JoinInvite { .. } => "joinInvite",
            Self::Move { .. } => "move",
        }
    }

    /// Correlation identifier attached to this message, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Join { request_id, .. }
            | Self::CreateGame { request_id, .. }
            | Self::JoinInvite { request_id, .. }
            | Self::Move { request_id, .. } => request_id.as_deref(),
        }
    }
}

/// Message types sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// A game was assigned to this player.
    PlayerInfo {
        #[serde(deserialize_with = "string_or_number")]
        player_id: PlayerId,
        color: Color,
        game_id: GameId,
    },
    /// A private game was created and awaits an invitee.
    GameCreated { game_id: GameId },
    /// Authoritative game state (boxed to reduce enum size).
    State(Box<GameStatePayload>),
    /// Periodic clock synchronisation.
    TimerUpdate {
        game_id: GameId,
        /// Milliseconds.
        white_time: i64,
        /// Milliseconds.
        black_time: i64,
        current_turn: Color,
    },
    /// A player ran out of time.
    TimeUp {
        game_id: GameId,
        loser: Color,
        #[serde(
            default,
            deserialize_with = "color_or_none",
            skip_serializing_if = "Option::is_none"
        )]
        winner: Option<Color>,
        #[serde(default)]
        reason: String,
    },
    /// Error message.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
    },
}

impl ServerMessage {
    /// Wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlayerInfo { .. } => "playerInfo",
            Self::GameCreated { .. } => "gameCreated",
            Self::State(_) => "state",
            Self::TimerUpdate { .. } => "timerUpdate",
            Self::TimeUp { .. } => "timeUp",
            Self::Error { .. } => "error",
        }
    }
}

// ── Lenient field decoders ──────────────────────────────────────────

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn color_or_none<'de, D>(deserializer: D) -> Result<Option<Color>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Color::from_wire))
}

fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()))
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Unsigned(n) => n.to_string(),
        Raw::Signed(n) => n.to_string(),
    })
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
    fn move_uses_move_field_name() {
        let msg = ClientMessage::Move {
            game_id: "g1".into(),
            player_id: "p1".into(),
            san: "Nf3".into(),
            request_id: None,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "move",
                "data": { "gameId": "g1", "playerId": "p1", "move": "Nf3" }
            })
        );
    }

    #[test]
    fn request_id_is_serialized_when_present() {
        let msg = ClientMessage::CreateGame {
            player_id: "p1".into(),
            request_id: Some("r-1".into()),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "createGame");
        assert_eq!(value["data"]["requestId"], "r-1");
        assert_eq!(msg.request_id(), Some("r-1"));
    }

    #[test]
    fn numeric_player_id_becomes_string() {
        let json = r#"{"type":"playerInfo","data":{"playerId":17,"color":"black","gameId":"abc"}}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ServerMessage::PlayerInfo {
                player_id: "17".into(),
                color: Color::Black,
                game_id: "abc".into(),
            }
        );
    }

    #[test]
    fn draw_state_has_no_winner() {
        let json = r#"{"type":"state","data":{
            "gameId":"g","fen":"8/8/8/8/8/8/8/K6k w - - 0 80","board":null,
            "turn":"white","moves":null,"inCheck":false,"gameOver":true,
            "winner":"","reason":"InsufficientMaterial"}}"#;
        let ServerMessage::State(state) = serde_json::from_str(json).unwrap() else {
            panic!("expected state");
        };
        assert!(state.game_over);
        assert_eq!(state.winner, None);
        assert_eq!(state.reason.as_deref(), Some("InsufficientMaterial"));
        assert!(state.moves.is_empty());
        assert!(state.board.is_empty());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let json = r#"{"type":"gameOver","data":{}}"#;
        assert!(serde_json::from_str::<ServerMessage>(json).is_err());
    }

    #[test]
    fn color_helpers() {
        assert_eq!(Color::White.opposite(), Color::Black);
        assert_eq!(Color::from_wire("black"), Some(Color::Black));
        assert_eq!(Color::from_wire("draw"), None);
        assert_eq!(Color::from(shakmaty::Color::Black), Color::Black);
    }
}
