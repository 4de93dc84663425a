#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Chess Arena client integration tests.
//!
//! Provides a channel-driven [`MockTransport`], a [`MockConnector`] that hands
//! out one prepared transport per connection attempt, and helpers for
//! building server messages.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chess_arena_client::protocol::{ClientMessage, Color, GameStatePayload, ServerMessage};
use chess_arena_client::session::SessionSnapshot;
use chess_arena_client::{ArenaConfig, ArenaError, ArenaEvent, ChessClient, Connector, Transport};
use tokio::sync::mpsc;

pub type Frame = Option<Result<String, ArenaError>>;

pub const TIMEOUT: Duration = Duration::from_secs(2);

// ── MockTransport ───────────────────────────────────────────────────

/// A mock transport fed by the test through a [`ServerHandle`].
///
/// `recv` yields frames in push order; a pushed `None` is a clean close.
/// With nothing queued it waits, so the session loop stays alive.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Frame>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), ArenaError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(ArenaError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ArenaError>> {
        match self.incoming.recv().await {
            Some(frame) => frame,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), ArenaError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// The test's end of one mock connection.
#[derive(Clone)]
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<Frame>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl ServerHandle {
    pub fn push(&self, message: &ServerMessage) {
        self.push_raw(&serde_json::to_string(message).unwrap());
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.tx.send(Some(Ok(text.to_owned())));
    }

    /// Close frame with a re-authentication code (1008 / 1011).
    pub fn close_abnormally(&self, code: u16, reason: &str) {
        let _ = self.tx.send(Some(Err(ArenaError::AbnormalClose {
            code,
            reason: reason.to_owned(),
        })));
    }

    pub fn close_normally(&self) {
        let _ = self.tx.send(None);
    }

    pub fn fail(&self, message: &str) {
        let _ = self.tx.send(Some(Err(ArenaError::TransportReceive(message.to_owned()))));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Everything the client has sent so far, decoded.
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect()
    }

    /// Waits until at least `count` messages were sent.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<ClientMessage> {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {count} sent messages"))
    }
}

// ── MockConnector ───────────────────────────────────────────────────

enum Prepared {
    Connection(MockTransport),
    Failure(ArenaError),
}

/// Hands out prepared connections in order. Attempts beyond the prepared
/// ones fail with a refused I/O error.
#[derive(Clone, Default)]
pub struct MockConnector {
    prepared: Arc<StdMutex<VecDeque<Prepared>>>,
    urls: Arc<StdMutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare the next successful connection and return its server side.
    pub fn accept(&self) -> ServerHandle {
        let (tx, incoming) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        self.prepared
            .lock()
            .unwrap()
            .push_back(Prepared::Connection(MockTransport {
                incoming,
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            }));
        ServerHandle { tx, sent, closed }
    }

    /// Prepare the next connection attempt to fail.
    pub fn refuse(&self, error: ArenaError) {
        self.prepared
            .lock()
            .unwrap()
            .push_back(Prepared::Failure(error));
    }

    /// URLs of every connection attempt so far.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, url: &str) -> Result<MockTransport, ArenaError> {
        self.urls.lock().unwrap().push(url.to_owned());
        let next = self.prepared.lock().unwrap().pop_front();
        match next {
            Some(Prepared::Connection(transport)) => Ok(transport),
            Some(Prepared::Failure(error)) => Err(error),
            None => Err(ArenaError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "no prepared connection",
            ))),
        }
    }
}

// ── Client helpers ──────────────────────────────────────────────────

/// Config with the ticker effectively off.
pub fn quiet_config() -> ArenaConfig {
    ArenaConfig::default().with_tick_interval(Duration::from_secs(3600))
}

/// Starts a client and connects it to a fresh mock connection.
pub async fn connected_client(
    connector: &MockConnector,
    config: ArenaConfig,
) -> (ChessClient, mpsc::Receiver<ArenaEvent>, ServerHandle) {
    let server = connector.accept();
    let (client, mut events) = ChessClient::start(connector.clone(), config);
    client.connect(None).unwrap();
    assert_eq!(next_event(&mut events).await, ArenaEvent::Connected);
    (client, events, server)
}

/// Next event that is not a timer tick.
pub async fn next_event(events: &mut mpsc::Receiver<ArenaEvent>) -> ArenaEvent {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            match events.recv().await {
                Some(ArenaEvent::ClockTick { .. } | ArenaEvent::SearchElapsed { .. }) => {}
                Some(event) => return event,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Waits for a snapshot satisfying `pred`.
pub async fn wait_for_snapshot(
    client: &ChessClient,
    pred: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = client.subscribe();
    let snapshot = tokio::time::timeout(TIMEOUT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for snapshot")
        .expect("session loop exited")
        .clone();
    snapshot
}

// ── Message builders ────────────────────────────────────────────────

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
pub const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
pub const AFTER_E4_E5: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2";

pub fn player_info(player_id: &str, color: Color, game_id: &str) -> ServerMessage {
    ServerMessage::PlayerInfo {
        player_id: player_id.into(),
        color,
        game_id: game_id.into(),
    }
}

pub fn state_payload(game_id: &str, fen: &str, turn: Color, moves: &[&str]) -> GameStatePayload {
    GameStatePayload {
        game_id: game_id.into(),
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

pub fn state(game_id: &str, fen: &str, turn: Color, moves: &[&str]) -> ServerMessage {
    ServerMessage::State(Box::new(state_payload(game_id, fen, turn, moves)))
}

pub fn error(message: &str, request_id: Option<&str>) -> ServerMessage {
    ServerMessage::Error {
        message: message.into(),
        request_id: request_id.map(str::to_owned),
    }
}

/// Connected client that is white in game `g1` at the starting position.
pub async fn client_in_game(
    connector: &MockConnector,
    color: Color,
) -> (ChessClient, mpsc::Receiver<ArenaEvent>, ServerHandle) {
    let (client, mut events, server) = connected_client(connector, quiet_config()).await;
    server.push(&player_info("p1", color, "g1"));
    server.push(&state("g1", START_FEN, Color::White, &[]));
    assert!(matches!(
        next_event(&mut events).await,
        ArenaEvent::GameAssigned { .. }
    ));
    wait_for_snapshot(&client, |s| s.game_id.is_some() && s.local_color.is_some()).await;
    (client, events, server)
}
