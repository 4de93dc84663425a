#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Protocol serialization tests for the Chess Arena client.
//!
//! Every `ClientMessage` is checked against the exact JSON the server
//! expects, and every `ServerMessage` is decoded from fixtures that match
//! real server output, including its lenient shapes (numeric player IDs,
//! `null` slices, draw winners).

use chess_arena_client::protocol::{ClientMessage, Color, GameStatePayload, ServerMessage};
use serde_json::json;

// ════════════════════════════════════════════════════════════════════
// Helper
// ════════════════════════════════════════════════════════════════════

fn decode(json: &str) -> ServerMessage {
    serde_json::from_str(json).expect("fixture must decode")
}

fn state_of(msg: ServerMessage) -> GameStatePayload {
    match msg {
        ServerMessage::State(payload) => *payload,
        other => panic!("expected state, got {other:?}"),
    }
}

// ════════════════════════════════════════════════════════════════════
// ClientMessage wire shape
// ════════════════════════════════════════════════════════════════════

#[test]
fn join_wire_shape() {
    let msg = ClientMessage::Join {
        player_id: "player_1f2e".into(),
        request_id: None,
    };
    assert_eq!(
        serde_json::to_value(&msg).unwrap(),
        json!({ "type": "join", "data": { "playerId": "player_1f2e" } })
    );
}

#[test]
fn create_game_wire_shape() {
    let msg = ClientMessage::CreateGame {
        player_id: "42".into(),
        request_id: Some("req-1".into()),
    };
    assert_eq!(
        serde_json::to_value(&msg).unwrap(),
        json!({ "type": "createGame", "data": { "playerId": "42", "requestId": "req-1" } })
    );
}

#[test]
fn join_invite_wire_shape() {
    let msg = ClientMessage::JoinInvite {
        game_id: "inv-7".into(),
        player_id: "42".into(),
        request_id: None,
    };
    assert_eq!(
        serde_json::to_value(&msg).unwrap(),
        json!({ "type": "joinInvite", "data": { "gameId": "inv-7", "playerId": "42" } })
    );
}

#[test]
fn move_wire_shape() {
    let msg = ClientMessage::Move {
        game_id: "g1".into(),
        player_id: "42".into(),
        san: "exd8=Q+".into(),
        request_id: Some("req-9".into()),
    };
    assert_eq!(
        serde_json::to_value(&msg).unwrap(),
        json!({
            "type": "move",
            "data": { "gameId": "g1", "playerId": "42", "move": "exd8=Q+", "requestId": "req-9" }
        })
    );
    assert_eq!(msg.kind(), "move");
    assert_eq!(msg.request_id(), Some("req-9"));
}

#[test]
fn client_messages_decode_from_their_own_encoding() {
    let msgs = [
        ClientMessage::Join {
            player_id: "a".into(),
            request_id: Some("r".into()),
        },
        ClientMessage::Move {
            game_id: "g".into(),
            player_id: "a".into(),
            san: "O-O".into(),
            request_id: None,
        },
    ];
    for msg in msgs {
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(serde_json::from_str::<ClientMessage>(&json).unwrap(), msg);
    }
}

// ════════════════════════════════════════════════════════════════════
// ServerMessage fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn player_info_fixture() {
    let msg = decode(r#"{"type":"playerInfo","data":{"playerId":3,"color":"white","gameId":"7c1d"}}"#);
    assert_eq!(
        msg,
        ServerMessage::PlayerInfo {
            player_id: "3".into(),
            color: Color::White,
            game_id: "7c1d".into(),
        }
    );
    assert_eq!(msg.kind(), "playerInfo");
}

#[test]
fn player_info_accepts_string_id() {
    let msg = decode(r#"{"type":"playerInfo","data":{"playerId":"player_ab","color":"black","gameId":"g"}}"#);
    assert!(matches!(
        msg,
        ServerMessage::PlayerInfo { player_id, color: Color::Black, .. } if player_id == "player_ab"
    ));
}

#[test]
fn game_created_fixture() {
    let msg = decode(r#"{"type":"gameCreated","data":{"gameId":"inv-7"}}"#);
    assert_eq!(
        msg,
        ServerMessage::GameCreated {
            game_id: "inv-7".into()
        }
    );
}

#[test]
fn opening_state_fixture() {
    let msg = decode(
        r#"{"type":"state","data":{
            "gameId":"g1",
            "fen":"rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
            "board":[["r","n","b","q","k","b","n","r"]],
            "turn":"black",
            "moves":["e4"],
            "inCheck":false,
            "gameOver":false,
            "winner":"",
            "reason":"",
            "whiteTime":299000,
            "blackTime":300000
        }}"#,
    );
    let state = state_of(msg);
    assert_eq!(state.game_id, "g1");
    assert_eq!(state.turn, Color::Black);
    assert_eq!(state.moves, vec!["e4"]);
    assert_eq!(state.board.len(), 1);
    assert_eq!(state.winner, None);
    assert_eq!(state.reason, None);
    assert_eq!(state.white_time, Some(299_000));
    assert_eq!(state.black_time, Some(300_000));
    assert_eq!(state.request_id, None);
}

#[test]
fn fresh_state_with_null_slices() {
    let state = state_of(decode(
        r#"{"type":"state","data":{
            "gameId":"g1",
            "fen":"rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "board":null,"turn":"white","moves":null
        }}"#,
    ));
    assert!(state.moves.is_empty());
    assert!(state.board.is_empty());
    assert!(!state.in_check);
    assert!(!state.game_over);
    assert_eq!(state.white_time, None);
}

#[test]
fn checkmate_state_fixture() {
    let state = state_of(decode(
        r#"{"type":"state","data":{
            "gameId":"g1",
            "fen":"rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3",
            "turn":"white",
            "moves":["f3","e5","g4","Qh4#"],
            "inCheck":true,
            "gameOver":true,
            "winner":"black",
            "reason":"checkmate",
            "requestId":"req-4"
        }}"#,
    ));
    assert!(state.in_check);
    assert!(state.game_over);
    assert_eq!(state.winner, Some(Color::Black));
    assert_eq!(state.reason.as_deref(), Some("checkmate"));
    assert_eq!(state.request_id.as_deref(), Some("req-4"));
}

#[test]
fn draw_winner_decodes_as_none() {
    let state = state_of(decode(
        r#"{"type":"state","data":{
            "gameId":"g1","fen":"8/8/8/8/8/8/8/K6k w - - 0 80","turn":"white",
            "gameOver":true,"winner":"draw","reason":"insufficient material"
        }}"#,
    ));
    assert_eq!(state.winner, None);
    assert_eq!(state.reason.as_deref(), Some("insufficient material"));
}

#[test]
fn timer_update_fixture() {
    let msg = decode(
        r#"{"type":"timerUpdate","data":{"gameId":"g1","whiteTime":120500,"blackTime":98000,"currentTurn":"black"}}"#,
    );
    assert_eq!(
        msg,
        ServerMessage::TimerUpdate {
            game_id: "g1".into(),
            white_time: 120_500,
            black_time: 98_000,
            current_turn: Color::Black,
        }
    );
}

#[test]
fn time_up_fixture() {
    let msg = decode(
        r#"{"type":"timeUp","data":{"gameId":"g1","loser":"white","winner":"black","reason":"timeout"}}"#,
    );
    assert_eq!(
        msg,
        ServerMessage::TimeUp {
            game_id: "g1".into(),
            loser: Color::White,
            winner: Some(Color::Black),
            reason: "timeout".into(),
        }
    );
}

#[test]
fn time_up_without_winner_or_reason() {
    let msg = decode(r#"{"type":"timeUp","data":{"gameId":"g1","loser":"black"}}"#);
    assert!(matches!(
        msg,
        ServerMessage::TimeUp { winner: None, ref reason, loser: Color::Black, .. } if reason.is_empty()
    ));
}

#[test]
fn error_fixtures() {
    assert_eq!(
        decode(r#"{"type":"error","data":{"message":"Not your turn"}}"#),
        ServerMessage::Error {
            message: "Not your turn".into(),
            request_id: None,
        }
    );
    assert_eq!(
        decode(r#"{"type":"error","data":{"message":"Invalid move","requestId":"req-2"}}"#),
        ServerMessage::Error {
            message: "Invalid move".into(),
            request_id: Some("req-2".into()),
        }
    );
}

// ════════════════════════════════════════════════════════════════════
// Rejected input
// ════════════════════════════════════════════════════════════════════

#[test]
fn unknown_and_malformed_messages_fail_to_decode() {
    let bad = [
        "",
        "{not json",
        r#"{"type":"mystery","data":{}}"#,
        r#"{"data":{"message":"x"}}"#,
        r#"{"type":"state","data":{"gameId":"g1"}}"#,
        r#"{"type":"playerInfo","data":{"playerId":1,"color":"green","gameId":"g"}}"#,
        r#"{"type":"timerUpdate","data":{"gameId":"g1","whiteTime":"soon","blackTime":1,"currentTurn":"white"}}"#,
    ];
    for raw in bad {
        assert!(
            serde_json::from_str::<ServerMessage>(raw).is_err(),
            "expected decode failure for {raw:?}"
        );
    }
}
