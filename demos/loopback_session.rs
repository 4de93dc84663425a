//! # Loopback Session Example
//!
//! Shows how to implement [`Transport`] and [`Connector`] over in-process
//! channels and drive a full game session against a tiny fake server:
//!
//! - **Testing**: exercise UI logic without a real Chess Arena server
//! - **Custom backends**: adapt any I/O layer to the session loop
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_session
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chess_arena_client::protocol::GameStatePayload;
use chess_arena_client::{
    ArenaConfig, ArenaError, ArenaEvent, ChessClient, ClientMessage, Color, Connector,
    MoveValidator, ServerMessage, Transport, INITIAL_FEN,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-based transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of the loopback; the fake server owns the other ends.
pub struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), ArenaError> {
        self.tx
            .send(message)
            .map_err(|e| ArenaError::TransportSend(e.to_string()))
    }

    /// `None` once the server side is dropped, which the client reports as
    /// a clean disconnect. Cancel-safe because `recv` on an mpsc is.
    async fn recv(&mut self) -> Option<Result<String, ArenaError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ArenaError> {
        self.rx.close();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A connector that spawns a fake server per connection
// ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct LoopbackConnector {
    urls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    async fn connect(&self, url: &str) -> Result<LoopbackTransport, ArenaError> {
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.to_owned());
        }
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        tokio::spawn(fake_server(server_rx, server_tx));
        Ok(LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        })
    }
}

/// Pairs the caller with an absent opponent and plays `e5` after `e4`.
async fn fake_server(
    mut rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
) {
    let mut fen = INITIAL_FEN.to_owned();
    let mut moves: Vec<String> = Vec::new();

    let state = |fen: &str, turn: Color, moves: &[String], request_id: Option<String>| {
        ServerMessage::State(Box::new(GameStatePayload {
            game_id: "loopback".into(),
            fen: fen.to_owned(),
            board: Vec::new(),
            turn,
            moves: moves.to_vec(),
            in_check: false,
            game_over: false,
            winner: None,
            reason: None,
            white_time: Some(180_000),
            black_time: Some(180_000),
            request_id,
        }))
    };

    while let Some(raw) = rx.recv().await {
        tracing::info!("server received: {raw}");
        let Ok(msg) = serde_json::from_str::<ClientMessage>(&raw) else {
            continue;
        };
        let mut replies = Vec::new();
        match msg {
            ClientMessage::Join { player_id, .. } => {
                replies.push(ServerMessage::PlayerInfo {
                    player_id,
                    color: Color::White,
                    game_id: "loopback".into(),
                });
                replies.push(state(&fen, Color::White, &moves, None));
            }
            ClientMessage::Move { san, request_id, .. } => {
                // Echo the client's move, then answer with e7e5.
                let Ok(played) = MoveValidator::validate(&fen, "e2", Some("e4"), None) else {
                    break;
                };
                if played.san != san {
                    replies.push(ServerMessage::Error {
                        message: "Only e4 is supported here".into(),
                        request_id,
                    });
                } else {
                    fen = played.fen;
                    moves.push(san);
                    replies.push(state(&fen, Color::Black, &moves, request_id));
                    if let Ok(reply) = MoveValidator::validate(&fen, "e7", Some("e5"), None) {
                        fen = reply.fen;
                        moves.push(reply.san);
                        replies.push(state(&fen, Color::White, &moves, None));
                    }
                }
            }
            other => {
                replies.push(ServerMessage::Error {
                    message: format!("{} is not supported here", other.kind()),
                    request_id: other.request_id().map(str::to_owned),
                });
            }
        }
        for reply in replies {
            let Ok(json) = serde_json::to_string(&reply) else {
                continue;
            };
            if tx.send(json).is_err() {
                return;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Drive a session
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let connector = LoopbackConnector::default();
    let (mut client, mut event_rx) = ChessClient::start(connector.clone(), ArenaConfig::default());
    client.connect(None)?;
    client.join_game()?;

    let mut snapshots = client.subscribe();
    while let Some(event) = event_rx.recv().await {
        match event {
            ArenaEvent::GameAssigned { color, .. } => {
                tracing::info!("Assigned {color}, playing e2-e4");
                // The state for the starting position follows playerInfo.
                snapshots.wait_for(|s| s.can_move()).await?;
                if !client.drop_piece("e2", Some("e4")) {
                    return Err("e2-e4 was rejected locally".into());
                }
            }
            ArenaEvent::MoveConfirmed { request_id } => {
                tracing::info!("Server confirmed move {request_id}");
                break;
            }
            ArenaEvent::MoveRejected { message, .. } => {
                return Err(message.into());
            }
            other => tracing::info!("Event: {other:?}"),
        }
    }

    let snapshot = snapshots
        .wait_for(|s| s.move_log.len() == 2)
        .await?
        .clone();
    tracing::info!(
        "Moves: {} | position: {} | urls: {:?}",
        snapshot.move_log.join(" "),
        snapshot.position,
        connector.urls.lock().map(|u| u.clone()).unwrap_or_default()
    );

    client.shutdown().await;
    Ok(())
}
