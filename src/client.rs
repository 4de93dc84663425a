//! Async client for the Chess Arena game server.
//!
//! [`ChessClient`] is a thin handle that communicates with a background
//! session loop task via an unbounded MPSC channel. The loop owns the
//! [`Connector`] and the single live [`Transport`], folds every transport event
//! and inbound message through [`reduce`], and publishes the resulting
//! [`SessionSnapshot`] on a [`watch`] channel. Side effects a view reacts to
//! are emitted on a bounded channel of [`ArenaEvent`]s returned from
//! [`ChessClient::start`].
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> chess_arena_client::Result<()> {
//! use chess_arena_client::{ArenaConfig, ArenaEvent, ChessClient, WebSocketConnector};
//!
//! let (client, mut events) =
//!     ChessClient::start(WebSocketConnector::new(), ArenaConfig::from_env());
//!
//! client.connect(None)?;
//! client.join_game()?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ArenaEvent::GameAssigned { color, .. } => println!("playing {color}"),
//!         ArenaEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::auth::CredentialRefresher;
use crate::error::{ArenaError, Result};
use crate::event::ArenaEvent;
use crate::protocol::{ClientMessage, GameId, ServerMessage};
use crate::session::{
    plan_intent, reduce, Intent, IntentContext, MatchmakingPhase, SessionInput, SessionSnapshot,
    NOT_CONNECTED,
};
use crate::transport::{Connector, Transport};
use crate::validator::MoveValidator;

/// Default game server endpoint.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";

/// Environment variable overriding [`ArenaConfig::ws_url`].
pub const WS_URL_ENV: &str = "CHESS_ARENA_WS_URL";

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default timeout for opening a connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default period of the clock / search ticker.
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`ChessClient`].
///
/// # Example
///
/// ```
/// use chess_arena_client::client::ArenaConfig;
///
/// let config = ArenaConfig::default();
/// assert_eq!(config.ws_url, "ws://localhost:8080/ws");
/// assert_eq!(config.event_channel_capacity, 256);
/// ```
///
/// # Tuning
///
/// ```
/// use chess_arena_client::client::ArenaConfig;
/// use std::time::Duration;
///
/// let config = ArenaConfig::new("wss://chess.example.com/ws")
///     .with_event_channel_capacity(512)
///     .with_connect_timeout(Duration::from_secs(5))
///     .with_shutdown_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Game server WebSocket endpoint, without the `gameId` query parameter.
    pub ws_url: String,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped (with a warning
    /// logged) to avoid blocking the session loop. `Disconnected` is always
    /// delivered regardless of capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`ChessClient::shutdown`] is called, the session loop is given this
    /// much time to close the transport and emit a final `Disconnected` event.
    /// If the timeout expires the task is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Timeout for each connection attempt.
    ///
    /// Defaults to **10 seconds**.
    pub connect_timeout: Duration,
    /// Period of the ticker driving [`ArenaEvent::ClockTick`] and
    /// [`ArenaEvent::SearchElapsed`].
    ///
    /// Defaults to **1 second**. Zero is clamped to one millisecond.
    pub tick_interval: Duration,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WS_URL)
    }
}

impl ArenaConfig {
    /// Create a configuration for the given endpoint with default values.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    /// Defaults, with the endpoint taken from `CHESS_ARENA_WS_URL` when set.
    pub fn from_env() -> Self {
        match std::env::var(WS_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        }
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    ///
    /// A zero timeout aborts the session loop immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(Duration::from_millis(1));
        self
    }
}

/// Builds the connection URL, appending `gameId` when reconnecting to a game.
///
/// # Errors
///
/// Returns [`ArenaError::InvalidEndpoint`] when `base` is not a URL.
pub fn endpoint_url(base: &str, game_id: Option<&str>) -> Result<String> {
    let mut url = url::Url::parse(base)?;
    if let Some(game_id) = game_id.filter(|id| !id.is_empty()) {
        url.query_pairs_mut().append_pair("gameId", game_id);
    }
    Ok(url.into())
}

// ── Commands ────────────────────────────────────────────────────────

#[derive(Debug)]
enum Command {
    Connect { game_id: Option<GameId> },
    Intent(Intent),
    Disconnect,
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for a chess session.
///
/// Created via [`ChessClient::start`], which spawns the background session
/// loop and returns this handle together with an event receiver.
///
/// All intent methods queue a command for the loop and return immediately.
/// They only fail once the loop has exited; session-level problems (not
/// connected, no active game) land in [`SessionSnapshot::last_error`].
pub struct ChessClient {
    /// Sender half of the command channel to the session loop.
    cmd_tx: mpsc::UnboundedSender<Command>,
    /// Latest snapshot published by the session loop.
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    /// Handle to the background session loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the session loop to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl ChessClient {
    /// Start the session loop and return a handle plus event receiver.
    ///
    /// The session starts disconnected; call [`connect`](Self::connect).
    /// Must be called from within a Tokio runtime.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start<C: Connector>(
        connector: C,
        config: ArenaConfig,
    ) -> (Self, mpsc::Receiver<ArenaEvent>) {
        Self::spawn(connector, config, None)
    }

    /// Like [`start`](Self::start), with a [`CredentialRefresher`] consulted
    /// once when the server closes the connection with a policy-violation or
    /// unexpected-condition code.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start_with_refresher<C: Connector>(
        connector: C,
        config: ArenaConfig,
        refresher: Arc<dyn CredentialRefresher>,
    ) -> (Self, mpsc::Receiver<ArenaEvent>) {
        Self::spawn(connector, config, Some(refresher))
    }

    fn spawn<C: Connector>(
        connector: C,
        config: ArenaConfig,
        refresher: Option<Arc<dyn CredentialRefresher>>,
    ) -> (Self, mpsc::Receiver<ArenaEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<ArenaEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::initial());
        let shutdown_timeout = config.shutdown_timeout;

        let session = SessionLoop {
            connector,
            config,
            refresher,
            snapshot: SessionSnapshot::initial(),
            snapshot_tx,
            event_tx,
            transport: None,
            pending_connect: None,
            deferred: VecDeque::new(),
            last_game_id: None,
            reconnect_attempted: false,
            reconnecting: false,
            clock_synced_at: None,
            search_started: None,
        };
        let task = tokio::spawn(session.run(cmd_rx, shutdown_rx));

        let client = Self {
            cmd_tx,
            snapshot_rx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Open a connection, closing any existing one first. With `game_id`,
    /// the server is asked to put the player back into that game.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::NotConnected`] if the session loop has exited.
    pub fn connect(&self, game_id: Option<&str>) -> Result<()> {
        self.send(Command::Connect {
            game_id: game_id.map(str::to_owned),
        })
    }

    /// Close the connection and return to the initial snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::NotConnected`] if the session loop has exited.
    pub fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect)
    }

    /// Enter random matchmaking.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::NotConnected`] if the session loop has exited.
    pub fn join_game(&self) -> Result<()> {
        self.send(Command::Intent(Intent::JoinGame))
    }

    /// Create a private game; the invite code arrives as
    /// [`ArenaEvent::GameCreated`].
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::NotConnected`] if the session loop has exited.
    pub fn create_game(&self) -> Result<()> {
        self.send(Command::Intent(Intent::CreateGame))
    }

    /// Join a private game by invite code.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::NotConnected`] if the session loop has exited.
    pub fn join_invite(&self, code: impl Into<String>) -> Result<()> {
        self.send(Command::Intent(Intent::JoinInvite(code.into())))
    }

    /// Send a move in standard algebraic notation without local validation.
    /// Ignored when it is not the local player's turn.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::NotConnected`] if the session loop has exited.
    pub fn make_move(&self, notation: impl Into<String>) -> Result<()> {
        self.send(Command::Intent(Intent::MakeMove(notation.into())))
    }

    /// Handle a piece dropped from `from` onto `to` (`None` when dropped off
    /// the board).
    ///
    /// The move is validated synchronously against the latest snapshot.
    /// Returns `true` when it was accepted and queued; the board then shows
    /// the resulting position until the server's next `state`. Rejected drags
    /// return `false` and have no side effects.
    pub fn drop_piece(&self, from: &str, to: Option<&str>) -> bool {
        let snapshot = self.snapshot_rx.borrow().clone();
        if !snapshot.can_move() {
            return false;
        }
        match MoveValidator::validate(&snapshot.position, from, to, snapshot.local_color) {
            Ok(validated) => self
                .send(Command::Intent(Intent::PlayValidated(validated)))
                .is_ok(),
            Err(rejection) => {
                debug!(from, ?to, "drag rejected: {rejection}");
                false
            }
        }
    }

    /// Return to the initial snapshot, keeping the connection.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::NotConnected`] if the session loop has exited.
    pub fn reset_game(&self) -> Result<()> {
        self.send(Command::Intent(Intent::Reset))
    }

    /// Shut down the client, closing the transport and stopping the
    /// background task.
    ///
    /// After calling this method, the event receiver will yield `None` once
    /// the session loop exits.
    pub async fn shutdown(&mut self) {
        debug!("ChessClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    /// The latest snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver notified on every snapshot replacement.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Returns `true` while the session loop is running.
    pub fn is_running(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| ArenaError::NotConnected)
    }
}

impl std::fmt::Debug for ChessClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot_rx.borrow();
        f.debug_struct("ChessClient")
            .field("connection_phase", &snapshot.connection_phase)
            .field("game_id", &snapshot.game_id)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ChessClient {
    fn drop(&mut self) {
        // No executor context here to drive a graceful close.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

type ConnectFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// State owned by the background task. Nothing here is shared; the handle
/// only sees the published snapshot.
struct SessionLoop<C: Connector> {
    connector: C,
    config: ArenaConfig,
    refresher: Option<Arc<dyn CredentialRefresher>>,
    snapshot: SessionSnapshot,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    event_tx: mpsc::Sender<ArenaEvent>,
    /// The single live connection.
    transport: Option<C::Transport>,
    /// In-flight connection attempt.
    pending_connect: Option<ConnectFuture<C::Transport>>,
    /// Intents issued while connecting, replayed once the transport opens.
    deferred: VecDeque<Intent>,
    /// Game to rejoin when reconnecting after a credential refresh.
    last_game_id: Option<GameId>,
    /// Set after the one automatic refresh-and-reconnect; cleared by an
    /// explicit `connect`.
    reconnect_attempted: bool,
    /// The in-flight attempt is the automatic reconnect.
    reconnecting: bool,
    clock_synced_at: Option<Instant>,
    search_started: Option<Instant>,
}

impl<C: Connector> SessionLoop<C> {
    /// Multiplexes commands, the in-flight connect, transport frames and the
    /// ticker via `tokio::select!`.
    ///
    /// Exits when the command channel closes (handle dropped) or on the
    /// shutdown signal.
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!("session loop started");

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received");
                    self.teardown().await;
                    break;
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            debug!("command channel closed, shutting down session loop");
                            self.teardown().await;
                            break;
                        }
                    }
                }

                result = await_connect(&mut self.pending_connect) => {
                    self.pending_connect = None;
                    self.on_connect_result(result).await;
                }

                incoming = recv_from(&mut self.transport) => {
                    self.on_incoming(incoming).await;
                }

                _ = ticker.tick() => self.on_tick(),
            }
        }

        debug!("session loop exited");
    }

    // ── Commands ────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { game_id } => {
                self.reconnect_attempted = false;
                self.reconnecting = false;
                self.open(game_id).await;
            }
            Command::Intent(intent) => {
                if intent.needs_connection() && self.pending_connect.is_some() {
                    debug!(intent = intent.kind(), "deferring intent until connected");
                    self.deferred.push_back(intent);
                } else {
                    self.apply_intent(intent).await;
                }
            }
            Command::Disconnect => {
                debug!("disconnect requested");
                let was_live = self.transport.is_some() || self.pending_connect.is_some();
                self.deferred.clear();
                self.pending_connect = None;
                self.reconnecting = false;
                self.close_transport().await;
                self.last_game_id = None;
                self.clock_synced_at = None;
                self.search_started = None;
                self.publish(reduce(&self.snapshot, &SessionInput::Disconnect));
                if was_live {
                    emit_disconnected(&self.event_tx, Some("client disconnected".into()), None)
                        .await;
                }
            }
        }
    }

    async fn open(&mut self, game_id: Option<GameId>) {
        self.close_transport().await;
        self.pending_connect = None;

        let url = match endpoint_url(&self.config.ws_url, game_id.as_deref()) {
            Ok(url) => url,
            Err(e) => {
                error!("cannot build endpoint: {e}");
                self.deferred.clear();
                self.publish(reduce(
                    &self.snapshot,
                    &SessionInput::ConnectFailed(e.to_string()),
                ));
                return;
            }
        };

        debug!(%url, "connecting");
        self.last_game_id = game_id;
        self.publish(reduce(&self.snapshot, &SessionInput::Connecting));

        let connector = self.connector.clone();
        let timeout = self.config.connect_timeout;
        self.pending_connect = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, connector.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(ArenaError::Timeout),
            }
        }));
    }

    async fn apply_intent(&mut self, intent: Intent) {
        let kind = intent.kind();
        let ctx = IntentContext {
            fallback_player_id: format!("player_{}", uuid::Uuid::new_v4().simple()),
            request_id: Some(uuid::Uuid::new_v4().to_string()),
        };
        let was_searching = self.snapshot.matchmaking_phase == MatchmakingPhase::WaitingForMatch;
        let (next, outbound) = plan_intent(&self.snapshot, intent, ctx);
        self.publish(next);
        self.track_search(was_searching);

        match outbound {
            Some(message) => self.send(message).await,
            None => debug!(intent = kind, "intent produced no message"),
        }
    }

    async fn send(&mut self, message: ClientMessage) {
        let Some(transport) = self.transport.as_mut() else {
            warn!(kind = message.kind(), "no transport for outbound message");
            self.publish(SessionSnapshot {
                last_error: Some(NOT_CONNECTED.to_owned()),
                ..self.snapshot.clone()
            });
            return;
        };

        debug!(kind = message.kind(), request_id = ?message.request_id(), "sending client message");
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize ClientMessage: {e}");
                return;
            }
        };
        let result = transport.send(json).await;
        if let Err(e) = result {
            error!("transport send error: {e}");
            self.transport = None;
            self.publish(reduce(
                &self.snapshot,
                &SessionInput::TransportError(e.to_string()),
            ));
            emit_disconnected(
                &self.event_tx,
                Some(format!("transport send error: {e}")),
                None,
            )
            .await;
        }
    }

    // ── Transport events ────────────────────────────────────────────

    async fn on_connect_result(&mut self, result: Result<C::Transport>) {
        let reconnecting = std::mem::take(&mut self.reconnecting);
        match result {
            Ok(transport) => {
                info!("connected to game server");
                self.transport = Some(transport);
                self.publish(reduce(&self.snapshot, &SessionInput::Opened));
                emit_event(&self.event_tx, ArenaEvent::Connected);

                while let Some(intent) = self.deferred.pop_front() {
                    if !self.snapshot.is_connected() {
                        break;
                    }
                    self.apply_intent(intent).await;
                }
                self.deferred.clear();
            }
            Err(e) => {
                error!("failed to connect: {e}");
                self.deferred.clear();
                self.publish(reduce(
                    &self.snapshot,
                    &SessionInput::ConnectFailed(e.to_string()),
                ));
                emit_disconnected(&self.event_tx, Some(format!("failed to connect: {e}")), None)
                    .await;
                if reconnecting {
                    emit_event(&self.event_tx, ArenaEvent::AuthenticationRequired);
                }
            }
        }
    }

    async fn on_incoming(&mut self, incoming: Option<Result<String>>) {
        match incoming {
            Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) => self.on_message(message),
                Err(e) => warn!("failed to deserialize server message: {e} (raw: {text})"),
            },
            Some(Err(ArenaError::AbnormalClose { code, reason })) => {
                warn!(code, %reason, "server closed the connection abnormally");
                self.transport = None;
                self.publish(reduce(
                    &self.snapshot,
                    &SessionInput::Closed {
                        code: Some(code),
                        reason: reason.clone(),
                    },
                ));
                let reason = (!reason.is_empty()).then_some(reason);
                emit_disconnected(&self.event_tx, reason, Some(code)).await;
                self.recover_credentials().await;
            }
            Some(Err(e)) => {
                error!("transport receive error: {e}");
                self.transport = None;
                self.publish(reduce(
                    &self.snapshot,
                    &SessionInput::TransportError(e.to_string()),
                ));
                emit_disconnected(
                    &self.event_tx,
                    Some(format!("transport receive error: {e}")),
                    None,
                )
                .await;
            }
            None => {
                debug!("transport closed by server");
                self.transport = None;
                self.publish(reduce(
                    &self.snapshot,
                    &SessionInput::Closed {
                        code: None,
                        reason: String::new(),
                    },
                ));
                emit_disconnected(&self.event_tx, None, None).await;
            }
        }
    }

    /// One credential refresh and one reconnect to the last game; after that
    /// the user has to sign in again.
    async fn recover_credentials(&mut self) {
        if self.reconnect_attempted {
            warn!("connection rejected again after reconnect, giving up");
            emit_event(&self.event_tx, ArenaEvent::AuthenticationRequired);
            return;
        }
        self.reconnect_attempted = true;

        let Some(refresher) = self.refresher.clone() else {
            emit_event(&self.event_tx, ArenaEvent::AuthenticationRequired);
            return;
        };
        match refresher.refresh_credentials().await {
            Ok(()) => {
                info!(game_id = ?self.last_game_id, "credentials refreshed, reconnecting");
                let game_id = self.last_game_id.clone();
                self.open(game_id).await;
                self.reconnecting = self.pending_connect.is_some();
                if !self.reconnecting {
                    emit_event(&self.event_tx, ArenaEvent::AuthenticationRequired);
                }
            }
            Err(e) => {
                warn!("credential refresh failed: {e}");
                emit_event(&self.event_tx, ArenaEvent::AuthenticationRequired);
            }
        }
    }

    fn on_message(&mut self, message: ServerMessage) {
        debug!(kind = message.kind(), "server message");
        let before = self.snapshot.clone();
        let next = reduce(&before, &SessionInput::Message(message.clone()));
        let now = Instant::now();
        self.publish(next.clone());
        self.track_search(before.matchmaking_phase == MatchmakingPhase::WaitingForMatch);

        match &message {
            ServerMessage::PlayerInfo {
                player_id,
                color,
                game_id,
            } if next.is_connected() => {
                self.last_game_id = Some(game_id.clone());
                emit_event(
                    &self.event_tx,
                    ArenaEvent::GameAssigned {
                        game_id: game_id.clone(),
                        player_id: player_id.clone(),
                        color: *color,
                    },
                );
            }
            ServerMessage::GameCreated { game_id } if next.is_connected() => {
                emit_event(
                    &self.event_tx,
                    ArenaEvent::GameCreated {
                        invite_code: game_id.clone(),
                    },
                );
            }
            ServerMessage::State(state) if next.is_connected() && next.position == state.fen => {
                self.last_game_id = next.game_id.clone();
                if state.white_time.is_some() || state.black_time.is_some() {
                    self.clock_synced_at = Some(now);
                }
                if let Some(pending) = &before.pending_move {
                    let confirmed = match &state.request_id {
                        Some(id) => *id == pending.request_id,
                        None => next.last_mover().is_some() && next.last_mover() == next.local_color,
                    };
                    if confirmed {
                        emit_event(
                            &self.event_tx,
                            ArenaEvent::MoveConfirmed {
                                request_id: pending.request_id.clone(),
                            },
                        );
                    }
                }
            }
            ServerMessage::TimerUpdate { .. } if next.clock != before.clock => {
                self.clock_synced_at = Some(now);
            }
            ServerMessage::Error {
                message,
                request_id,
            } => {
                let correlated = before
                    .pending_move
                    .as_ref()
                    .zip(request_id.as_ref())
                    .filter(|(pending, id)| pending.request_id == **id);
                let event = match correlated {
                    Some((pending, _)) => ArenaEvent::MoveRejected {
                        request_id: pending.request_id.clone(),
                        message: message.clone(),
                    },
                    None => ArenaEvent::ServerError {
                        message: message.clone(),
                    },
                };
                emit_event(&self.event_tx, event);
            }
            _ => {}
        }

        if next.is_game_over && !before.is_game_over {
            info!(winner = ?next.winner, reason = ?next.end_reason, "game over");
            emit_event(
                &self.event_tx,
                ArenaEvent::GameOver {
                    winner: next.winner,
                    reason: next.end_reason.clone(),
                },
            );
        }
    }

    // ── Timers ──────────────────────────────────────────────────────

    fn on_tick(&mut self) {
        let now = Instant::now();

        if let Some(started) = self.search_started {
            emit_event(
                &self.event_tx,
                ArenaEvent::SearchElapsed {
                    elapsed: now.duration_since(started),
                },
            );
        }

        let snapshot = &self.snapshot;
        if snapshot.is_connected() && snapshot.game_id.is_some() && !snapshot.is_game_over {
            if let (Some(clock), Some(synced)) = (snapshot.clock, self.clock_synced_at) {
                emit_event(
                    &self.event_tx,
                    ArenaEvent::ClockTick {
                        clock: clock.project(snapshot.turn, now.duration_since(synced)),
                        turn: snapshot.turn,
                    },
                );
            }
        }
    }

    /// Starts or stops the search timer on matchmaking transitions.
    fn track_search(&mut self, was_searching: bool) {
        let searching = self.snapshot.matchmaking_phase == MatchmakingPhase::WaitingForMatch;
        match (was_searching, searching) {
            (false, true) => self.search_started = Some(Instant::now()),
            (true, false) => self.search_started = None,
            _ => {}
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn publish(&mut self, next: SessionSnapshot) {
        if next == self.snapshot {
            return;
        }
        self.snapshot = next.clone();
        self.snapshot_tx.send_replace(next);
    }

    async fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("transport close failed: {e}");
            }
        }
    }

    async fn teardown(&mut self) {
        self.pending_connect = None;
        self.close_transport().await;
        emit_disconnected(&self.event_tx, Some("client shut down".into()), None).await;
    }
}

/// Next frame from the live transport; pends forever without one.
async fn recv_from<T: Transport>(transport: &mut Option<T>) -> Option<Result<String>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

/// Outcome of the in-flight connect; pends forever without one.
async fn await_connect<T>(pending: &mut Option<ConnectFuture<T>>) -> Result<T> {
    match pending {
        Some(connect) => connect.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Emit an event to the event channel. If the channel is full, log a warning
/// and drop the event to avoid blocking the session loop.
fn emit_event(event_tx: &mpsc::Sender<ArenaEvent>, event: ArenaEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {}", dropped.kind());
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit a [`Disconnected`](ArenaEvent::Disconnected) event.
///
/// Uses `send().await` instead of `try_send` so it is never dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<ArenaEvent>,
    reason: Option<String>,
    code: Option<u16>,
) {
    let event = ArenaEvent::Disconnected { reason, code };
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use crate::protocol::Color;
    use crate::session::ConnectionPhase;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// Replays scripted frames, then hangs until closed.
    struct MockTransport {
        incoming: VecDeque<Option<Result<String>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Hands out one scripted transport per `connect`, recording URLs.
    #[derive(Clone, Default)]
    struct ScriptedConnector {
        scripts: Arc<StdMutex<VecDeque<Vec<Option<Result<String>>>>>>,
        urls: Arc<StdMutex<Vec<String>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedConnector {
        fn with_script(frames: Vec<Option<Result<String>>>) -> Self {
            let connector = Self::default();
            connector.scripts.lock().unwrap().push_back(frames);
            connector
        }

        fn sent(&self) -> Vec<ClientMessage> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|raw| serde_json::from_str(raw).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Transport = MockTransport;

        async fn connect(&self, url: &str) -> Result<MockTransport> {
            self.urls.lock().unwrap().push(url.to_owned());
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(ArenaError::TransportClosed)?;
            Ok(MockTransport {
                incoming: VecDeque::from(script),
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
            })
        }
    }

    fn json(message: &ServerMessage) -> Option<Result<String>> {
        Some(Ok(serde_json::to_string(message).unwrap()))
    }

    fn quiet_config() -> ArenaConfig {
        ArenaConfig::default().with_tick_interval(Duration::from_secs(3600))
    }

    async fn wait_for(
        client: &ChessClient,
        pred: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        let mut rx = client.subscribe();
        let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
            .await
            .expect("timed out waiting for snapshot")
            .expect("session loop exited")
            .clone();
        snapshot
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[test]
    fn config_defaults() {
        let config = ArenaConfig::default();
        assert_eq!(config.ws_url, DEFAULT_WS_URL);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.tick_interval, Duration::from_secs(1));
    }

    #[test]
    fn config_clamps() {
        let config = ArenaConfig::default()
            .with_event_channel_capacity(0)
            .with_tick_interval(Duration::ZERO);
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.tick_interval, Duration::from_millis(1));
    }

    #[test]
    fn endpoint_url_appends_game_id() {
        assert_eq!(
            endpoint_url(DEFAULT_WS_URL, None).unwrap(),
            "ws://localhost:8080/ws"
        );
        assert_eq!(
            endpoint_url(DEFAULT_WS_URL, Some("a b")).unwrap(),
            "ws://localhost:8080/ws?gameId=a+b"
        );
        assert_eq!(
            endpoint_url(DEFAULT_WS_URL, Some("")).unwrap(),
            "ws://localhost:8080/ws"
        );
        assert!(endpoint_url("nope", None).is_err());
    }

    #[tokio::test]
    async fn starts_disconnected_and_connects() {
        let connector = ScriptedConnector::with_script(vec![]);
        let (mut client, mut events) = ChessClient::start(connector.clone(), quiet_config());
        assert_eq!(client.snapshot().connection_phase, ConnectionPhase::Disconnected);

        client.connect(Some("g7")).unwrap();
        assert_eq!(events.recv().await.unwrap(), ArenaEvent::Connected);
        assert!(client.snapshot().is_connected());
        assert_eq!(
            connector.urls.lock().unwrap().as_slice(),
            ["ws://localhost:8080/ws?gameId=g7"]
        );

        client.shutdown().await;
        assert!(connector.closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn intents_before_open_are_replayed_after_connect() {
        let connector = ScriptedConnector::with_script(vec![]);
        let (mut client, mut events) = ChessClient::start(connector.clone(), quiet_config());

        client.connect(None).unwrap();
        client.join_game().unwrap();
        let _ = events.recv().await; // Connected

        let snapshot = wait_for(&client, |s| {
            s.matchmaking_phase == MatchmakingPhase::WaitingForMatch
        })
        .await;
        assert!(snapshot.local_player_id.unwrap().starts_with("player_"));
        assert!(matches!(
            connector.sent().as_slice(),
            [ClientMessage::Join { request_id: Some(_), .. }]
        ));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn player_info_emits_game_assigned() {
        let connector = ScriptedConnector::with_script(vec![json(&ServerMessage::PlayerInfo {
            player_id: "p1".into(),
            color: Color::Black,
            game_id: "g1".into(),
        })]);
        let (mut client, mut events) = ChessClient::start(connector, quiet_config());
        client.connect(None).unwrap();

        assert_eq!(events.recv().await.unwrap(), ArenaEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            ArenaEvent::GameAssigned {
                game_id: "g1".into(),
                player_id: "p1".into(),
                color: Color::Black,
            }
        );
        let snapshot = wait_for(&client, |s| s.game_id.is_some()).await;
        assert_eq!(snapshot.local_color, Some(Color::Black));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn connect_failure_lands_in_last_error() {
        let connector = ScriptedConnector::default();
        let (mut client, mut events) = ChessClient::start(connector, quiet_config());
        client.connect(None).unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            ArenaEvent::Disconnected { .. }
        ));
        let snapshot = client.snapshot();
        assert_eq!(snapshot.connection_phase, ConnectionPhase::Disconnected);
        assert!(snapshot
            .last_error
            .unwrap()
            .starts_with("Failed to connect"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn drop_piece_rejects_without_game() {
        let (mut client, _events) = ChessClient::start(ScriptedConnector::default(), quiet_config());
        assert!(!client.drop_piece("e2", Some("e4")));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn methods_fail_after_shutdown() {
        let (mut client, mut events) =
            ChessClient::start(ScriptedConnector::default(), quiet_config());
        client.shutdown().await;
        assert!(matches!(
            events.recv().await,
            Some(ArenaEvent::Disconnected { .. })
        ));
        assert!(events.recv().await.is_none());
        assert!(matches!(client.join_game(), Err(ArenaError::NotConnected)));
        assert!(!client.is_running());
    }
}
