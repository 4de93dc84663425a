//! # Terminal Match Example
//!
//! Plays one game of chess against another Chess Arena player from the
//! terminal:
//!
//! 1. Log in through the HTTP auth API (cookies land in a shared jar)
//! 2. Open the game WebSocket with that jar and keep the session refreshed
//! 3. Join matchmaking, a private game, or an invite code
//! 4. Type moves as `e2 e4` (drag-style) or `san Nf3`
//! 5. Shut down gracefully on `quit` or Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! CHESS_ARENA_EMAIL=me@example.com CHESS_ARENA_PASSWORD=secret \
//!     cargo run --example terminal_match
//!
//! # Point at another deployment:
//! CHESS_ARENA_API_URL=https://arena.example/api \
//! CHESS_ARENA_WS_URL=wss://arena.example/ws \
//!     cargo run --example terminal_match
//! ```

use std::sync::Arc;

use chess_arena_client::clock::format_clock;
use chess_arena_client::{
    ArenaConfig, ArenaEvent, AuthConfig, AuthSession, ChessClient, HttpAuthApi,
    WebSocketConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "commands: join | create | invite <code> | <from> <to> | san <move> | reset | board | quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Auth ────────────────────────────────────────────────────────
    let auth_config = AuthConfig::from_env();
    let api = HttpAuthApi::new(&auth_config)?;
    let jar = api.jar();
    let auth = Arc::new(AuthSession::new(api, auth_config));

    if let (Ok(email), Ok(password)) = (
        std::env::var("CHESS_ARENA_EMAIL"),
        std::env::var("CHESS_ARENA_PASSWORD"),
    ) {
        let user = auth.login(&email, &password).await?;
        tracing::info!("Logged in as {}", user.display_name());
    } else if let Some(user) = auth.check_current_identity().await {
        tracing::info!("Resumed session for {}", user.display_name());
    } else {
        tracing::warn!(
            "Not logged in; the server may refuse the socket. Sign in at {}",
            auth.oauth_begin_url("google")
        );
    }
    let refresh_task = auth.spawn_refresh_task();

    // ── Connect ─────────────────────────────────────────────────────
    let connector = WebSocketConnector::new().with_cookie_jar(jar);
    let (mut client, mut event_rx) =
        ChessClient::start_with_refresher(connector, ArenaConfig::from_env(), auth.clone());
    client.connect(None)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    ArenaEvent::Connected => tracing::info!("Connected"),
                    ArenaEvent::GameAssigned { game_id, color, .. } => {
                        println!("Game {game_id}: you play {color}");
                    }
                    ArenaEvent::GameCreated { invite_code } => {
                        println!("Share this invite code: {invite_code}");
                    }
                    ArenaEvent::MoveRejected { message, .. } => println!("Move rejected: {message}"),
                    ArenaEvent::ServerError { message } => println!("Server: {message}"),
                    ArenaEvent::GameOver { winner, reason } => {
                        let winner = winner.map_or_else(|| "nobody".to_owned(), |c| c.to_string());
                        println!(
                            "Game over: {winner} wins ({})",
                            reason.as_deref().unwrap_or("unknown")
                        );
                    }
                    ArenaEvent::ClockTick { clock, turn } => {
                        tracing::debug!(
                            "white {} | black {} | {turn} to move",
                            format_clock(Some(clock.white_ms)),
                            format_clock(Some(clock.black_ms)),
                        );
                    }
                    ArenaEvent::SearchElapsed { elapsed } => {
                        tracing::debug!("Searching for {}s", elapsed.as_secs());
                    }
                    ArenaEvent::AuthenticationRequired => {
                        tracing::error!("Session expired; log in again");
                        break;
                    }
                    ArenaEvent::Disconnected { reason, code } => {
                        tracing::warn!(
                            "Disconnected ({code:?}): {}",
                            reason.as_deref().unwrap_or("unknown")
                        );
                    }
                    other => tracing::debug!("Event: {other:?}"),
                }
            }

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let words: Vec<&str> = line.split_whitespace().collect();
                match words.as_slice() {
                    ["quit"] => break,
                    ["join"] => client.join_game()?,
                    ["create"] => client.create_game()?,
                    ["invite", code] => client.join_invite(*code)?,
                    ["san", san] => client.make_move(*san)?,
                    ["reset"] => client.reset_game()?,
                    ["board"] => {
                        let snapshot = client.snapshot();
                        println!("{} | moves: {}", snapshot.position, snapshot.move_log.join(" "));
                    }
                    [from, to] => {
                        if !client.drop_piece(from, Some(*to)) {
                            println!("Illegal or not your turn");
                        }
                    }
                    _ => println!("{HELP}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.shutdown().await;
    refresh_task.cancel().await;
    if auth.is_authenticated() {
        let _ = auth.logout().await;
    }
    tracing::info!("Goodbye!");
    Ok(())
}
