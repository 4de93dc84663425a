#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for [`ChessClient`] driven through a mock connector.

mod common;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chess_arena_client::protocol::{ClientMessage, Color, ServerMessage};
use chess_arena_client::session::{ConnectionPhase, MatchmakingPhase, SessionPhase, SessionSnapshot};
use chess_arena_client::{
    ArenaConfig, ArenaError, ArenaEvent, ChessClient, Connector, CredentialRefresher, Transport,
};
use common::*;

// ── Refresher mock ──────────────────────────────────────────────────

struct CountingRefresher {
    calls: AtomicU32,
    succeed: bool,
}

impl CountingRefresher {
    fn new(succeed: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            succeed,
        })
    }
}

#[async_trait]
impl CredentialRefresher for CountingRefresher {
    async fn refresh_credentials(&self) -> chess_arena_client::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            Ok(())
        } else {
            Err(ArenaError::Auth {
                status: 401,
                message: "refresh token expired".into(),
            })
        }
    }
}

// ── Connection lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn connect_opens_base_endpoint() {
    let connector = MockConnector::new();
    let (mut client, _events, server) = connected_client(&connector, quiet_config()).await;

    assert_eq!(connector.urls(), vec!["ws://localhost:8080/ws".to_owned()]);
    assert_eq!(client.snapshot().phase(), SessionPhase::Lobby);
    assert!(server.sent().is_empty());

    client.shutdown().await;
    assert!(server.is_closed());
}

#[tokio::test]
async fn connect_with_game_id_targets_that_game() {
    let connector = MockConnector::new();
    let _server = connector.accept();
    let (mut client, mut events) = ChessClient::start(connector.clone(), quiet_config());
    client.connect(Some("game-42")).unwrap();
    assert_eq!(next_event(&mut events).await, ArenaEvent::Connected);
    assert_eq!(
        connector.urls(),
        vec!["ws://localhost:8080/ws?gameId=game-42".to_owned()]
    );
    client.shutdown().await;
}

#[tokio::test]
async fn reconnecting_closes_the_previous_transport() {
    let connector = MockConnector::new();
    let (mut client, mut events, first) = connected_client(&connector, quiet_config()).await;
    let second = connector.accept();

    client.connect(None).unwrap();
    assert_eq!(next_event(&mut events).await, ArenaEvent::Connected);
    assert!(first.is_closed());
    assert!(!second.is_closed());

    client.join_game().unwrap();
    second.wait_for_sent(1).await;
    assert!(first.sent().is_empty());

    client.shutdown().await;
}

#[tokio::test]
async fn connect_failure_stays_disconnected_with_error() {
    let connector = MockConnector::new();
    connector.refuse(ArenaError::Timeout);
    let (mut client, mut events) = ChessClient::start(connector, quiet_config());
    client.connect(None).unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        ArenaEvent::Disconnected { code: None, .. }
    ));
    let snapshot = client.snapshot();
    assert_eq!(snapshot.connection_phase, ConnectionPhase::Disconnected);
    assert_eq!(
        snapshot.last_error.as_deref(),
        Some("Failed to connect: operation timed out")
    );

    client.shutdown().await;
}

#[tokio::test]
async fn intents_while_disconnected_set_error_and_send_nothing() {
    let connector = MockConnector::new();
    let (mut client, _events) = ChessClient::start(connector, quiet_config());
    client.join_game().unwrap();

    let snapshot = wait_for_snapshot(&client, |s| s.last_error.is_some()).await;
    assert_eq!(snapshot.last_error.as_deref(), Some("Not connected to server"));
    assert_eq!(snapshot.matchmaking_phase, MatchmakingPhase::Idle);

    client.shutdown().await;
}

#[tokio::test]
async fn intents_issued_while_connecting_flush_on_open() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let (mut client, mut events) = ChessClient::start(connector, quiet_config());

    client.connect(None).unwrap();
    client.create_game().unwrap();
    assert_eq!(next_event(&mut events).await, ArenaEvent::Connected);

    let sent = server.wait_for_sent(1).await;
    assert!(matches!(sent[0], ClientMessage::CreateGame { .. }));

    client.shutdown().await;
}

#[tokio::test]
async fn normal_close_does_not_reconnect() {
    let connector = MockConnector::new();
    let refresher = CountingRefresher::new(true);
    let server = connector.accept();
    let (mut client, mut events) = ChessClient::start_with_refresher(
        connector.clone(),
        quiet_config(),
        refresher.clone(),
    );
    client.connect(None).unwrap();
    assert_eq!(next_event(&mut events).await, ArenaEvent::Connected);

    server.push(&player_info("p1", Color::White, "g1"));
    let _ = next_event(&mut events).await; // GameAssigned
    server.close_normally();

    assert_eq!(
        next_event(&mut events).await,
        ArenaEvent::Disconnected {
            reason: None,
            code: None
        }
    );
    let snapshot = client.snapshot();
    assert_eq!(snapshot.connection_phase, ConnectionPhase::Disconnected);
    assert_eq!(snapshot.game_id, None);
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(connector.urls().len(), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn transport_error_sets_connection_error() {
    let connector = MockConnector::new();
    let (mut client, mut events, server) = connected_client(&connector, quiet_config()).await;
    server.fail("reset by peer");

    assert!(matches!(
        next_event(&mut events).await,
        ArenaEvent::Disconnected { .. }
    ));
    assert_eq!(client.snapshot().last_error.as_deref(), Some("Connection error"));

    client.shutdown().await;
}

#[tokio::test]
async fn disconnect_returns_to_initial_snapshot() {
    let connector = MockConnector::new();
    let (mut client, mut events, server) = client_in_game(&connector, Color::White).await;

    client.disconnect().unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ArenaEvent::Disconnected { .. }
    ));
    assert!(server.is_closed());
    assert_eq!(client.snapshot(), SessionSnapshot::initial());

    client.shutdown().await;
}

// ── Credential refresh ──────────────────────────────────────────────

#[tokio::test]
async fn policy_close_refreshes_once_and_rejoins_last_game() {
    let connector = MockConnector::new();
    let refresher = CountingRefresher::new(true);
    let first = connector.accept();
    let (mut client, mut events) = ChessClient::start_with_refresher(
        connector.clone(),
        quiet_config(),
        refresher.clone(),
    );
    client.connect(None).unwrap();
    assert_eq!(next_event(&mut events).await, ArenaEvent::Connected);
    first.push(&player_info("p1", Color::White, "g1"));
    let _ = next_event(&mut events).await; // GameAssigned

    let second = connector.accept();
    first.close_abnormally(1008, "Invalid authentication");

    assert_eq!(
        next_event(&mut events).await,
        ArenaEvent::Disconnected {
            reason: Some("Invalid authentication".into()),
            code: Some(1008),
        }
    );
    assert_eq!(next_event(&mut events).await, ArenaEvent::Connected);
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        connector.urls()[1],
        "ws://localhost:8080/ws?gameId=g1".to_owned()
    );

    // A second rejection gives up.
    second.close_abnormally(1011, "");
    assert!(matches!(
        next_event(&mut events).await,
        ArenaEvent::Disconnected {
            code: Some(1011),
            ..
        }
    ));
    assert_eq!(
        next_event(&mut events).await,
        ArenaEvent::AuthenticationRequired
    );
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(connector.urls().len(), 2);

    client.shutdown().await;
}

#[tokio::test]
async fn failed_refresh_requires_authentication() {
    let connector = MockConnector::new();
    let refresher = CountingRefresher::new(false);
    let server = connector.accept();
    let (mut client, mut events) = ChessClient::start_with_refresher(
        connector.clone(),
        quiet_config(),
        refresher.clone(),
    );
    client.connect(None).unwrap();
    assert_eq!(next_event(&mut events).await, ArenaEvent::Connected);

    server.close_abnormally(1008, "");
    assert!(matches!(
        next_event(&mut events).await,
        ArenaEvent::Disconnected { .. }
    ));
    assert_eq!(
        next_event(&mut events).await,
        ArenaEvent::AuthenticationRequired
    );
    assert_eq!(connector.urls().len(), 1);
    assert!(client.snapshot().last_error.unwrap().contains("1008"));

    client.shutdown().await;
}

#[tokio::test]
async fn failed_reconnect_requires_authentication() {
    let connector = MockConnector::new();
    let refresher = CountingRefresher::new(true);
    let server = connector.accept();
    connector.refuse(ArenaError::TransportClosed);
    let (mut client, mut events) =
        ChessClient::start_with_refresher(connector.clone(), quiet_config(), refresher);
    client.connect(None).unwrap();
    assert_eq!(next_event(&mut events).await, ArenaEvent::Connected);

    server.close_abnormally(1011, "");
    let _ = next_event(&mut events).await; // Disconnected (close)
    let _ = next_event(&mut events).await; // Disconnected (failed reconnect)
    assert_eq!(
        next_event(&mut events).await,
        ArenaEvent::AuthenticationRequired
    );

    client.shutdown().await;
}

#[tokio::test]
async fn policy_close_without_refresher_requires_authentication() {
    let connector = MockConnector::new();
    let (mut client, mut events, server) = connected_client(&connector, quiet_config()).await;
    server.close_abnormally(1008, "");
    let _ = next_event(&mut events).await; // Disconnected
    assert_eq!(
        next_event(&mut events).await,
        ArenaEvent::AuthenticationRequired
    );
    client.shutdown().await;
}

// ── Matchmaking ─────────────────────────────────────────────────────

#[tokio::test]
async fn join_game_waits_for_match_then_assigns_game() {
    let connector = MockConnector::new();
    let (mut client, mut events, server) = connected_client(&connector, quiet_config()).await;

    client.join_game().unwrap();
    let sent = server.wait_for_sent(1).await;
    let ClientMessage::Join { player_id, request_id } = &sent[0] else {
        panic!("expected join, got {:?}", sent[0]);
    };
    assert!(player_id.starts_with("player_"));
    assert!(request_id.is_some());
    assert_eq!(client.snapshot().phase(), SessionPhase::WaitingForMatch);

    server.push(&player_info("p1", Color::White, "g1"));
    server.push(&state("g1", START_FEN, Color::White, &[]));
    assert_eq!(
        next_event(&mut events).await,
        ArenaEvent::GameAssigned {
            game_id: "g1".into(),
            player_id: "p1".into(),
            color: Color::White,
        }
    );

    let snapshot = wait_for_snapshot(&client, |s| s.phase() == SessionPhase::InGame).await;
    assert_eq!(snapshot.game_id.as_deref(), Some("g1"));
    assert_eq!(snapshot.local_color, Some(Color::White));
    assert_eq!(snapshot.position, START_FEN);
    assert!(!snapshot.is_game_over);
    assert!(snapshot.can_move());

    client.shutdown().await;
}

#[tokio::test]
async fn private_game_flow() {
    let connector = MockConnector::new();
    let (mut client, mut events, server) = connected_client(&connector, quiet_config()).await;

    client.create_game().unwrap();
    server.wait_for_sent(1).await;
    server.push(&ServerMessage::GameCreated {
        game_id: "inv-7".into(),
    });
    assert_eq!(
        next_event(&mut events).await,
        ArenaEvent::GameCreated {
            invite_code: "inv-7".into()
        }
    );
    let snapshot = client.snapshot();
    assert_eq!(snapshot.pending_invite_code.as_deref(), Some("inv-7"));
    assert_eq!(snapshot.phase(), SessionPhase::WaitingForInvitee);
    assert!(!snapshot.can_move());

    server.push(&player_info("p1", Color::White, "inv-7"));
    server.push(&state("inv-7", START_FEN, Color::White, &[]));
    let snapshot = wait_for_snapshot(&client, |s| s.phase() == SessionPhase::InGame).await;
    assert_eq!(snapshot.pending_invite_code, None);

    client.shutdown().await;
}

#[tokio::test]
async fn join_invite_sends_code_as_game_id() {
    let connector = MockConnector::new();
    let (mut client, _events, server) = connected_client(&connector, quiet_config()).await;

    client.join_invite("inv-7").unwrap();
    let sent = server.wait_for_sent(1).await;
    assert!(matches!(
        &sent[0],
        ClientMessage::JoinInvite { game_id, .. } if game_id == "inv-7"
    ));

    client.shutdown().await;
}

#[tokio::test]
async fn server_error_cancels_search() {
    let connector = MockConnector::new();
    let (mut client, mut events, server) = connected_client(&connector, quiet_config()).await;

    client.join_game().unwrap();
    server.wait_for_sent(1).await;
    server.push(&error("Already in queue", None));

    assert_eq!(
        next_event(&mut events).await,
        ArenaEvent::ServerError {
            message: "Already in queue".into()
        }
    );
    let snapshot = client.snapshot();
    assert_eq!(snapshot.matchmaking_phase, MatchmakingPhase::Idle);
    assert_eq!(snapshot.last_error.as_deref(), Some("Already in queue"));

    client.shutdown().await;
}

// ── Moves ───────────────────────────────────────────────────────────

#[tokio::test]
async fn dropping_e2_on_e4_sends_san_and_applies_optimistic_fen() {
    let connector = MockConnector::new();
    let (mut client, _events, server) = client_in_game(&connector, Color::White).await;

    assert!(client.drop_piece("e2", Some("e4")));
    let sent = server.wait_for_sent(1).await;
    assert!(matches!(
        &sent[0],
        ClientMessage::Move { game_id, player_id, san, .. }
            if game_id == "g1" && player_id == "p1" && san == "e4"
    ));

    let snapshot = wait_for_snapshot(&client, |s| s.position != START_FEN).await;
    assert_eq!(
        snapshot.position,
        "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"
    );
    assert_eq!(snapshot.turn, Color::Black);
    assert!(!snapshot.can_move());

    client.shutdown().await;
}

#[tokio::test]
async fn rejected_drags_send_nothing() {
    let connector = MockConnector::new();
    let (mut client, _events, server) = client_in_game(&connector, Color::White).await;

    assert!(!client.drop_piece("e7", Some("e5")));
    assert!(!client.drop_piece("e2", Some("e5")));
    assert!(!client.drop_piece("e2", None));
    assert!(!client.drop_piece("d4", Some("d5")));

    client.create_game().unwrap();
    let sent = server.wait_for_sent(1).await;
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0], ClientMessage::CreateGame { .. }));

    client.shutdown().await;
}

#[tokio::test]
async fn last_state_fen_wins_over_optimistic_position() {
    let connector = MockConnector::new();
    let (mut client, _events, server) = client_in_game(&connector, Color::White).await;

    assert!(client.drop_piece("e2", Some("e4")));
    wait_for_snapshot(&client, |s| s.position.contains(" e3 ")).await;

    server.push(&state("g1", AFTER_E4, Color::Black, &["e4"]));
    server.push(&state("g1", AFTER_E4_E5, Color::White, &["e4", "e5"]));
    let snapshot = wait_for_snapshot(&client, |s| s.position == AFTER_E4_E5).await;
    assert_eq!(snapshot.move_log, vec!["e4", "e5"]);
    assert_eq!(snapshot.turn, Color::White);
    assert_eq!(snapshot.pending_move, None);
    assert!(snapshot.can_move());

    client.shutdown().await;
}

#[tokio::test]
async fn make_move_out_of_turn_never_sends() {
    let connector = MockConnector::new();
    let (mut client, _events, server) = client_in_game(&connector, Color::Black).await;

    client.make_move("e5").unwrap();
    client.create_game().unwrap();
    let sent = server.wait_for_sent(1).await;
    assert!(sent.iter().all(|m| !matches!(m, ClientMessage::Move { .. })));
    assert!(!client.drop_piece("e7", Some("e5")));

    client.shutdown().await;
}

#[tokio::test]
async fn correlated_rejection_reports_the_move() {
    let connector = MockConnector::new();
    let (mut client, mut events, server) = client_in_game(&connector, Color::White).await;

    client.make_move("Ke2").unwrap();
    let sent = server.wait_for_sent(1).await;
    let request_id = sent[0].request_id().unwrap().to_owned();

    server.push(&error("Invalid move", Some(&request_id)));
    assert_eq!(
        next_event(&mut events).await,
        ArenaEvent::MoveRejected {
            request_id,
            message: "Invalid move".into(),
        }
    );
    let snapshot = client.snapshot();
    assert_eq!(snapshot.last_error.as_deref(), Some("Invalid move"));
    assert_eq!(snapshot.pending_move, None);

    client.shutdown().await;
}

#[tokio::test]
async fn echoed_state_confirms_the_move() {
    let connector = MockConnector::new();
    let (mut client, mut events, server) = client_in_game(&connector, Color::White).await;

    assert!(client.drop_piece("e2", Some("e4")));
    let sent = server.wait_for_sent(1).await;
    let request_id = sent[0].request_id().unwrap().to_owned();

    let mut payload = state_payload("g1", AFTER_E4, Color::Black, &["e4"]);
    payload.request_id = Some(request_id.clone());
    server.push(&ServerMessage::State(Box::new(payload)));

    assert_eq!(
        next_event(&mut events).await,
        ArenaEvent::MoveConfirmed { request_id }
    );

    client.shutdown().await;
}

// ── Game end ────────────────────────────────────────────────────────

#[tokio::test]
async fn game_over_then_reset_restores_initial_snapshot() {
    let connector = MockConnector::new();
    let (mut client, mut events, server) = client_in_game(&connector, Color::White).await;

    let mut payload = state_payload("g1", AFTER_E4, Color::Black, &["e4"]);
    payload.game_over = true;
    payload.winner = Some(Color::White);
    payload.reason = Some("resignation".into());
    server.push(&ServerMessage::State(Box::new(payload)));

    assert_eq!(
        next_event(&mut events).await,
        ArenaEvent::GameOver {
            winner: Some(Color::White),
            reason: Some("resignation".into()),
        }
    );
    assert_eq!(client.snapshot().phase(), SessionPhase::GameOver);

    client.reset_game().unwrap();
    let expected = SessionSnapshot {
        connection_phase: ConnectionPhase::Connected,
        ..SessionSnapshot::initial()
    };
    let snapshot = wait_for_snapshot(&client, |s| s.game_id.is_none()).await;
    assert_eq!(snapshot, expected);

    client.shutdown().await;
}

#[tokio::test]
async fn time_up_ends_the_game() {
    let connector = MockConnector::new();
    let (mut client, mut events, server) = client_in_game(&connector, Color::White).await;

    server.push(&ServerMessage::TimeUp {
        game_id: "g1".into(),
        loser: Color::Black,
        winner: Some(Color::White),
        reason: "timeout".into(),
    });
    assert_eq!(
        next_event(&mut events).await,
        ArenaEvent::GameOver {
            winner: Some(Color::White),
            reason: Some("timeout".into()),
        }
    );
    assert!(!client.snapshot().can_move());

    client.shutdown().await;
}

// ── Malformed input ─────────────────────────────────────────────────

#[tokio::test]
async fn malformed_messages_leave_snapshot_untouched() {
    let connector = MockConnector::new();
    let (mut client, _events, server) = client_in_game(&connector, Color::White).await;

    server.push(&error("earlier failure", None));
    let before = wait_for_snapshot(&client, |s| s.last_error.is_some()).await;

    server.push_raw("{not json");
    server.push_raw(r#"{"type":"mystery","data":{}}"#);
    server.push_raw(r#"{"type":"state","data":{"gameId":"g1"}}"#);
    server.push(&ServerMessage::TimerUpdate {
        game_id: "g1".into(),
        white_time: 60_000,
        black_time: 60_000,
        current_turn: Color::White,
    });

    let after = wait_for_snapshot(&client, |s| s.clock.is_some()).await;
    assert_eq!(
        after,
        SessionSnapshot {
            clock: after.clock,
            ..before
        }
    );
    assert_eq!(after.last_error.as_deref(), Some("earlier failure"));

    client.shutdown().await;
}

// ── Timers ──────────────────────────────────────────────────────────

#[tokio::test]
async fn clock_ticks_count_down_side_to_move() {
    let connector = MockConnector::new();
    let config = ArenaConfig::default().with_tick_interval(Duration::from_millis(20));
    let (mut client, mut events, server) = connected_client(&connector, config).await;

    server.push(&player_info("p1", Color::White, "g1"));
    let mut payload = state_payload("g1", START_FEN, Color::White, &[]);
    payload.white_time = Some(300_000);
    payload.black_time = Some(300_000);
    server.push(&ServerMessage::State(Box::new(payload)));

    let tick = tokio::time::timeout(TIMEOUT, async {
        loop {
            if let Some(ArenaEvent::ClockTick { clock, turn }) = events.recv().await {
                return (clock, turn);
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(tick.1, Color::White);
    assert!(tick.0.white_ms <= 300_000);
    assert_eq!(tick.0.black_ms, 300_000);

    client.shutdown().await;
}

#[tokio::test]
async fn search_timer_runs_only_while_waiting() {
    let connector = MockConnector::new();
    let config = ArenaConfig::default().with_tick_interval(Duration::from_millis(20));
    let (mut client, mut events, server) = connected_client(&connector, config).await;

    client.join_game().unwrap();
    let elapsed = tokio::time::timeout(TIMEOUT, async {
        loop {
            if let Some(ArenaEvent::SearchElapsed { elapsed }) = events.recv().await {
                return elapsed;
            }
        }
    })
    .await
    .unwrap();
    assert!(elapsed < TIMEOUT);

    server.push(&player_info("p1", Color::White, "g1"));
    assert!(matches!(
        next_event(&mut events).await,
        ArenaEvent::GameAssigned { .. }
    ));
    tokio::time::sleep(Duration::from_millis(60)).await;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, ArenaEvent::SearchElapsed { .. }));
    }

    client.shutdown().await;
}

// ── Backpressure & shutdown ─────────────────────────────────────────

#[tokio::test]
async fn small_event_channel_drops_events_but_keeps_disconnected() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let config = quiet_config().with_event_channel_capacity(1);
    let (mut client, mut events) = ChessClient::start(connector, config);
    client.connect(None).unwrap();

    for i in 0..20 {
        server.push(&error(&format!("e{i}"), None));
    }
    server.close_normally();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut count = 0;
    let mut saw_disconnected = false;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
        count += 1;
        saw_disconnected |= matches!(event, ArenaEvent::Disconnected { .. });
    }
    assert!(saw_disconnected);
    assert!(count < 22, "expected dropped events, got {count}");

    client.shutdown().await;
}

/// Transport whose `close` never returns, to exercise the shutdown abort.
struct HangingCloseTransport {
    close_called: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for HangingCloseTransport {
    async fn send(&mut self, _message: String) -> Result<(), ArenaError> {
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ArenaError>> {
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<(), ArenaError> {
        self.close_called.store(true, Ordering::SeqCst);
        std::future::pending().await
    }
}

#[derive(Clone)]
struct HangingConnector {
    close_called: Arc<AtomicBool>,
}

#[async_trait]
impl Connector for HangingConnector {
    type Transport = HangingCloseTransport;

    async fn connect(&self, _url: &str) -> Result<HangingCloseTransport, ArenaError> {
        Ok(HangingCloseTransport {
            close_called: Arc::clone(&self.close_called),
        })
    }
}

#[tokio::test]
async fn shutdown_aborts_when_close_hangs() {
    let close_called = Arc::new(AtomicBool::new(false));
    let connector = HangingConnector {
        close_called: Arc::clone(&close_called),
    };
    let config = quiet_config().with_shutdown_timeout(Duration::from_millis(50));
    let (mut client, mut events) = ChessClient::start(connector, config);
    client.connect(None).unwrap();
    assert_eq!(next_event(&mut events).await, ArenaEvent::Connected);

    tokio::time::timeout(Duration::from_secs(1), client.shutdown())
        .await
        .expect("shutdown must finish after aborting the loop");
    assert!(close_called.load(Ordering::SeqCst));
    assert!(!client.is_running());
}
