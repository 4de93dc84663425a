//! Auth session cache over the Chess Arena HTTP auth API.
//!
//! The auth service keeps credentials in HTTP-only cookies (`accessToken`,
//! `refreshToken`), so the client never handles tokens directly. It asks the
//! service who it is (`GET /me`), logs in or signs up (which sets the cookies),
//! refreshes the short-lived access cookie periodically and logs out.
//!
//! [`AuthApi`] is the seam to the service; [`HttpAuthApi`] (feature
//! `http-auth`) talks to it with `reqwest` and a shared cookie jar that the
//! WebSocket connector can reuse. [`AuthSession`] caches the current identity
//! and applies the failure policy: two consecutive hard refresh failures
//! (a bad status from the service, not a network error) clear the identity.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::{ArenaError, Result};

/// Default base URL of the auth API.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Environment variable overriding [`AuthConfig::api_url`].
pub const API_URL_ENV: &str = "CHESS_ARENA_API_URL";

/// Access cookies live 15 minutes; refresh well before that.
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_HARD_FAILURE_LIMIT: u32 = 2;

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for the auth client and session cache.
///
/// ```
/// use chess_arena_client::auth::AuthConfig;
/// use std::time::Duration;
///
/// let config = AuthConfig::new("https://api.example.com")
///     .with_refresh_interval(Duration::from_secs(300))
///     .with_hard_failure_limit(0);
/// assert_eq!(config.hard_failure_limit, 1);
/// ```
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL of the auth API, without trailing path.
    pub api_url: String,
    /// Period of the background refresh task.
    ///
    /// Defaults to **10 minutes**.
    pub refresh_interval: Duration,
    /// Per-request timeout for [`HttpAuthApi`].
    ///
    /// Defaults to **10 seconds**.
    pub request_timeout: Duration,
    /// Consecutive hard refresh failures after which the identity is cleared.
    ///
    /// Defaults to **2**. Values below 1 are clamped to 1.
    pub hard_failure_limit: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl AuthConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            hard_failure_limit: DEFAULT_HARD_FAILURE_LIMIT,
        }
    }

    /// Defaults, with the API URL taken from `CHESS_ARENA_API_URL` when set.
    pub fn from_env() -> Self {
        match std::env::var(API_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        }
    }

    /// Set the background refresh period. Zero is clamped to one second.
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval.max(Duration::from_secs(1));
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_hard_failure_limit(mut self, limit: u32) -> Self {
        self.hard_failure_limit = limit.max(1);
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

// ── Wire types ──────────────────────────────────────────────────────

/// An authenticated user as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub email: String,
    /// Display name (OAuth accounts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Avatar URL (OAuth accounts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl User {
    /// Name to show in the UI: the display name, else the email.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.email)
    }
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "http-auth"), allow(dead_code))]
struct UserEnvelope {
    user: User,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "http-auth"), allow(dead_code))]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(not(feature = "http-auth"), allow(dead_code))]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

// ── API seam ────────────────────────────────────────────────────────

/// Requests to the auth service.
///
/// Every method maps a non-success status to [`ArenaError::Auth`] carrying the
/// body's `error` field. Network failures use other variants.
#[async_trait]
pub trait AuthApi: Send + Sync + 'static {
    /// `POST /signup`
    async fn signup(&self, email: &str, password: &str) -> Result<User>;
    /// `POST /login`
    async fn login(&self, email: &str, password: &str) -> Result<User>;
    /// `POST /logout`
    async fn logout(&self) -> Result<()>;
    /// `POST /refresh`, renewing the access cookie.
    async fn refresh(&self) -> Result<()>;
    /// `GET /me`
    async fn me(&self) -> Result<User>;
}

/// Something that can renew session credentials before a reconnect.
#[async_trait]
pub trait CredentialRefresher: Send + Sync + 'static {
    async fn refresh_credentials(&self) -> Result<()>;
}

// ── reqwest implementation ──────────────────────────────────────────

/// [`AuthApi`] over HTTP with a cookie jar.
///
/// ```rust,no_run
/// # async fn example() -> chess_arena_client::Result<()> {
/// use chess_arena_client::auth::{AuthConfig, HttpAuthApi, AuthApi};
///
/// let api = HttpAuthApi::new(&AuthConfig::from_env())?;
/// let user = api.login("alice@example.com", "hunter2").await?;
/// println!("logged in as {}", user.display_name());
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "http-auth")]
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    http: reqwest::Client,
    config: AuthConfig,
    jar: Arc<reqwest::cookie::Jar>,
}

#[cfg(feature = "http-auth")]
impl HttpAuthApi {
    /// Build a client with a fresh cookie jar.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::InvalidEndpoint`] if `api_url` is not a URL, or
    /// [`ArenaError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        url::Url::parse(&config.api_url)?;
        let jar = Arc::new(reqwest::cookie::Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
            jar,
        })
    }

    /// The cookie jar holding the session cookies. Hand it to
    /// [`WebSocketConnector::with_cookie_jar`](crate::WebSocketConnector::with_cookie_jar)
    /// so the game server sees the same credentials.
    pub fn jar(&self) -> Arc<reqwest::cookie::Jar> {
        Arc::clone(&self.jar)
    }

    fn url(&self, path: &str) -> Result<url::Url> {
        Ok(url::Url::parse(&self.config.endpoint(path))?)
    }

    async fn post_credentials(&self, path: &str, email: &str, password: &str) -> Result<User> {
        let response = self
            .http
            .post(self.url(path)?)
            .json(&Credentials { email, password })
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<UserEnvelope>().await?.user)
    }

    /// Returns the response on success, or [`ArenaError::Auth`] with the
    /// body's `error` field (falling back to the status text).
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|body| body.error)
            .filter(|error| !error.is_empty())
            .or_else(|| status.canonical_reason().map(str::to_owned))
            .unwrap_or_else(|| "Request failed".to_owned());
        Err(ArenaError::Auth {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(feature = "http-auth")]
#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn signup(&self, email: &str, password: &str) -> Result<User> {
        self.post_credentials("signup", email, password).await
    }

    async fn login(&self, email: &str, password: &str) -> Result<User> {
        self.post_credentials("login", email, password).await
    }

    async fn logout(&self) -> Result<()> {
        let response = self.http.post(self.url("logout")?).send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        let response = self.http.post(self.url("refresh")?).send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn me(&self) -> Result<User> {
        let response = self.http.get(self.url("me")?).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<UserEnvelope>().await?.user)
    }
}

// ── Session cache ───────────────────────────────────────────────────

/// Caches the current identity and applies the refresh failure policy.
///
/// Identity changes are published through a [`watch`] channel so views can
/// react to login, logout and forced sign-out alike.
pub struct AuthSession<A: AuthApi> {
    api: A,
    config: AuthConfig,
    identity: watch::Sender<Option<User>>,
    last_error: watch::Sender<Option<String>>,
    hard_failures: AtomicU32,
}

impl<A: AuthApi> AuthSession<A> {
    pub fn new(api: A, config: AuthConfig) -> Self {
        let (identity, _) = watch::channel(None);
        let (last_error, _) = watch::channel(None);
        Self {
            api,
            config,
            identity,
            last_error,
            hard_failures: AtomicU32::new(0),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Current identity, if authenticated.
    pub fn identity(&self) -> Option<User> {
        self.identity.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.borrow().is_some()
    }

    /// Subscribe to identity changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.identity.subscribe()
    }

    /// Message of the last failed request, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    /// Consecutive hard refresh failures so far.
    pub fn hard_failures(&self) -> u32 {
        self.hard_failures.load(Ordering::Acquire)
    }

    /// URL that starts the browser OAuth flow for `provider`, e.g.
    /// `"google"` → `{api}/auth/google`.
    pub fn oauth_begin_url(&self, provider: &str) -> String {
        self.config.endpoint(&format!("auth/{provider}"))
    }

    /// Startup check: asks the service who the cookies belong to. Any
    /// failure means "not signed in" and is not surfaced as an error.
    pub async fn check_current_identity(&self) -> Option<User> {
        match self.api.me().await {
            Ok(user) => {
                debug!(user_id = user.id, "session cookie is valid");
                self.authenticated(user.clone());
                Some(user)
            }
            Err(e) => {
                debug!("no current identity: {e}");
                self.identity.send_replace(None);
                None
            }
        }
    }

    /// # Errors
    ///
    /// Returns the service's error; the message is also kept in
    /// [`last_error`](Self::last_error).
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        match self.api.login(email, password).await {
            Ok(user) => {
                info!(user_id = user.id, "logged in");
                self.authenticated(user.clone());
                Ok(user)
            }
            Err(e) => Err(self.failed(e)),
        }
    }

    /// # Errors
    ///
    /// Returns the service's error; the message is also kept in
    /// [`last_error`](Self::last_error).
    pub async fn signup(&self, email: &str, password: &str) -> Result<User> {
        match self.api.signup(email, password).await {
            Ok(user) => {
                info!(user_id = user.id, "signed up");
                self.authenticated(user.clone());
                Ok(user)
            }
            Err(e) => Err(self.failed(e)),
        }
    }

    /// Logs out. The local identity is cleared even when the request fails.
    ///
    /// # Errors
    ///
    /// Returns the service's error after clearing the identity.
    pub async fn logout(&self) -> Result<()> {
        let outcome = self.api.logout().await;
        self.identity.send_replace(None);
        self.hard_failures.store(0, Ordering::Release);
        match outcome {
            Ok(()) => {
                info!("logged out");
                self.last_error.send_replace(None);
                Ok(())
            }
            Err(e) => Err(self.failed(e)),
        }
    }

    /// Renews the access cookie.
    ///
    /// Hard failures are counted; reaching
    /// [`hard_failure_limit`](AuthConfig::hard_failure_limit) consecutive ones
    /// clears the identity. Network errors are not counted.
    ///
    /// # Errors
    ///
    /// Returns the underlying error.
    pub async fn refresh(&self) -> Result<()> {
        match self.api.refresh().await {
            Ok(()) => {
                debug!("credentials refreshed");
                self.hard_failures.store(0, Ordering::Release);
                self.last_error.send_replace(None);
                Ok(())
            }
            Err(e) if e.is_hard_auth_failure() => {
                let failures = self.hard_failures.fetch_add(1, Ordering::AcqRel) + 1;
                warn!(failures, "credential refresh rejected: {e}");
                if failures >= self.config.hard_failure_limit {
                    warn!("refresh failure limit reached, clearing identity");
                    self.identity.send_replace(None);
                }
                Err(self.failed(e))
            }
            Err(e) => {
                warn!("credential refresh failed, will retry: {e}");
                Err(self.failed(e))
            }
        }
    }

    fn authenticated(&self, user: User) {
        self.hard_failures.store(0, Ordering::Release);
        self.last_error.send_replace(None);
        self.identity.send_replace(Some(user));
    }

    fn failed(&self, e: ArenaError) -> ArenaError {
        let message = match &e {
            ArenaError::Auth { message, .. } => message.clone(),
            other => other.to_string(),
        };
        self.last_error.send_replace(Some(message));
        e
    }
}

impl<A: AuthApi> std::fmt::Debug for AuthSession<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("api_url", &self.config.api_url)
            .field("authenticated", &self.is_authenticated())
            .field("hard_failures", &self.hard_failures())
            .finish()
    }
}

#[async_trait]
impl<A: AuthApi> CredentialRefresher for AuthSession<A> {
    async fn refresh_credentials(&self) -> Result<()> {
        self.refresh().await
    }
}

// ── Background refresh ──────────────────────────────────────────────

/// Handle to the periodic refresh task. Dropping it aborts the task.
#[derive(Debug)]
pub struct RefreshTask {
    cancel_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl RefreshTask {
    /// Stop the task and wait for it to exit.
    pub async fn cancel(mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(join_err) = task.await {
                debug!("refresh task ended with join error: {join_err}");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<A: AuthApi> AuthSession<A> {
    /// Spawn a task that refreshes credentials every
    /// [`refresh_interval`](AuthConfig::refresh_interval) while authenticated.
    pub fn spawn_refresh_task(self: &Arc<Self>) -> RefreshTask {
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let session = Arc::clone(self);
        let period = self.config.refresh_interval;

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            debug!(?period, "refresh task started");

            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    _ = ticker.tick() => {
                        if !session.is_authenticated() {
                            continue;
                        }
                        if session.refresh().await.is_err() && !session.is_authenticated() {
                            debug!("identity cleared, refresh task idles");
                        }
                    }
                }
            }

            debug!("refresh task exited");
        });

        RefreshTask {
            cancel_tx: Some(cancel_tx),
            task: Some(task),
        }
    }
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
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    // ── Scripted API ────────────────────────────────────────────────

    #[derive(Default)]
    struct ScriptedApi {
        me: StdMutex<VecDeque<Result<User>>>,
        login: StdMutex<VecDeque<Result<User>>>,
        logout: StdMutex<VecDeque<Result<()>>>,
        refresh: StdMutex<VecDeque<Result<()>>>,
        refresh_calls: AtomicU32,
    }

    fn next<T>(queue: &StdMutex<VecDeque<Result<T>>>) -> Result<T> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ArenaError::TransportClosed))
    }

    #[async_trait]
    impl AuthApi for ScriptedApi {
        async fn signup(&self, email: &str, _password: &str) -> Result<User> {
            Ok(user(7, email))
        }
        async fn login(&self, _email: &str, _password: &str) -> Result<User> {
            next(&self.login)
        }
        async fn logout(&self) -> Result<()> {
            next(&self.logout)
        }
        async fn refresh(&self) -> Result<()> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            next(&self.refresh)
        }
        async fn me(&self) -> Result<User> {
            next(&self.me)
        }
    }

    fn user(id: u64, email: &str) -> User {
        User {
            id,
            email: email.into(),
            name: None,
            avatar: None,
            provider: None,
        }
    }

    fn rejected(message: &str) -> ArenaError {
        ArenaError::Auth {
            status: 401,
            message: message.into(),
        }
    }

    async fn signed_in(api: ScriptedApi) -> AuthSession<ScriptedApi> {
        api.me.lock().unwrap().push_back(Ok(user(1, "a@b.c")));
        let session = AuthSession::new(api, AuthConfig::default());
        assert!(session.check_current_identity().await.is_some());
        session
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[test]
    fn config_defaults_and_clamps() {
        let config = AuthConfig::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.refresh_interval, Duration::from_secs(600));
        assert_eq!(config.hard_failure_limit, 2);
        let config = config.with_refresh_interval(Duration::ZERO);
        assert_eq!(config.refresh_interval, Duration::from_secs(1));
    }

    #[test]
    fn oauth_url_joins_provider() {
        let session = AuthSession::new(
            ScriptedApi::default(),
            AuthConfig::new("http://localhost:3000/"),
        );
        assert_eq!(
            session.oauth_begin_url("google"),
            "http://localhost:3000/auth/google"
        );
    }

    #[test]
    fn display_name_falls_back_to_email() {
        let mut u = user(1, "a@b.c");
        assert_eq!(u.display_name(), "a@b.c");
        u.name = Some("Alice".into());
        assert_eq!(u.display_name(), "Alice");
    }

    #[tokio::test]
    async fn failed_identity_check_is_silent() {
        let api = ScriptedApi::default();
        api.me.lock().unwrap().push_back(Err(rejected("missing access token")));
        let session = AuthSession::new(api, AuthConfig::default());
        assert_eq!(session.check_current_identity().await, None);
        assert_eq!(session.last_error(), None);
    }

    #[tokio::test]
    async fn login_failure_surfaces_message() {
        let api = ScriptedApi::default();
        api.login
            .lock()
            .unwrap()
            .push_back(Err(rejected("Invalid email or password")));
        let session = AuthSession::new(api, AuthConfig::default());
        let err = session.login("a@b.c", "nope").await.unwrap_err();
        assert!(err.is_hard_auth_failure());
        assert_eq!(
            session.last_error().as_deref(),
            Some("Invalid email or password")
        );
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn login_publishes_identity() {
        let api = ScriptedApi::default();
        api.login.lock().unwrap().push_back(Ok(user(3, "c@d.e")));
        let session = AuthSession::new(api, AuthConfig::default());
        let mut rx = session.subscribe();
        session.login("c@d.e", "pw").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().map(|u| u.id), Some(3));
    }

    #[tokio::test]
    async fn signup_replaces_identity() {
        let session = signed_in(ScriptedApi::default()).await;
        let created = session.signup("new@x.y", "pw").await.unwrap();
        assert_eq!(session.identity(), Some(created));
    }

    #[tokio::test]
    async fn logout_clears_identity_even_on_failure() {
        let api = ScriptedApi::default();
        api.logout
            .lock()
            .unwrap()
            .push_back(Err(ArenaError::Timeout));
        let session = signed_in(api).await;
        assert!(session.logout().await.is_err());
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn two_hard_refresh_failures_clear_identity() {
        let api = ScriptedApi::default();
        api.refresh.lock().unwrap().extend([
            Err(rejected("refresh token expired")),
            Err(rejected("refresh token expired")),
        ]);
        let session = signed_in(api).await;

        assert!(session.refresh().await.is_err());
        assert!(session.is_authenticated());
        assert_eq!(session.hard_failures(), 1);

        assert!(session.refresh().await.is_err());
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn network_errors_do_not_count_and_success_resets() {
        let api = ScriptedApi::default();
        api.refresh.lock().unwrap().extend([
            Err(rejected("invalid refresh token")),
            Err(ArenaError::Timeout),
            Ok(()),
            Err(rejected("invalid refresh token")),
        ]);
        let session = signed_in(api).await;

        assert!(session.refresh().await.is_err());
        assert!(session.refresh().await.is_err());
        assert_eq!(session.hard_failures(), 1);
        session.refresh().await.unwrap();
        assert_eq!(session.hard_failures(), 0);
        assert!(session.refresh().await.is_err());
        assert!(session.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_task_ticks_while_authenticated_and_cancels() {
        let api = ScriptedApi::default();
        api.refresh.lock().unwrap().extend([Ok(()), Ok(())]);
        let session = Arc::new(signed_in(api).await);
        let config_period = session.config.refresh_interval;

        let task = session.spawn_refresh_task();
        tokio::time::sleep(config_period * 2 + Duration::from_millis(10)).await;
        assert_eq!(session.api().refresh_calls.load(Ordering::SeqCst), 2);

        task.cancel().await;
        tokio::time::sleep(config_period * 3).await;
        assert_eq!(session.api().refresh_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_task_skips_when_signed_out() {
        let session = Arc::new(AuthSession::new(
            ScriptedApi::default(),
            AuthConfig::default(),
        ));
        let task = session.spawn_refresh_task();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(session.api().refresh_calls.load(Ordering::SeqCst), 0);
        drop(task);
    }

    // ── HTTP client against a raw responder ─────────────────────────

    #[cfg(feature = "http-auth")]
    mod http {
        use super::*;
        use reqwest::cookie::CookieStore;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        /// Serve exactly one HTTP exchange and hand back the raw request.
        async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let handle = tokio::spawn(async move {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = stream.read(&mut chunk).await.unwrap();
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf).to_string();
                    if let Some(head_end) = text.find("\r\n\r\n") {
                        let length = text[..head_end]
                            .lines()
                            .find_map(|line| {
                                let lower = line.to_ascii_lowercase();
                                lower
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap())
                            })
                            .unwrap_or(0);
                        if buf.len() >= head_end + 4 + length {
                            break;
                        }
                    }
                    if n == 0 {
                        break;
                    }
                }
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
                String::from_utf8_lossy(&buf).to_string()
            });
            (format!("http://{addr}"), handle)
        }

        fn json_response(status: &str, extra_headers: &str, body: &str) -> String {
            format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n{extra_headers}\r\n{body}",
                body.len()
            )
        }

        #[tokio::test]
        async fn login_posts_credentials_and_stores_cookie() {
            let body = r#"{"message":"Login successful","user":{"id":5,"email":"a@b.c"}}"#;
            let (base, server) = serve_once(json_response(
                "200 OK",
                "set-cookie: accessToken=tok; Path=/\r\n",
                body,
            ))
            .await;
            let api = HttpAuthApi::new(&AuthConfig::new(base.clone())).unwrap();

            let user = api.login("a@b.c", "pw").await.unwrap();
            assert_eq!(user.id, 5);

            let request = server.await.unwrap();
            assert!(request.starts_with("POST /login "));
            assert!(request.contains(r#""email":"a@b.c""#));
            assert!(request.contains(r#""password":"pw""#));

            let cookies = api.jar().cookies(&url::Url::parse(&base).unwrap()).unwrap();
            assert!(cookies.to_str().unwrap().contains("accessToken=tok"));
        }

        #[tokio::test]
        async fn error_body_becomes_auth_error() {
            let (base, _server) = serve_once(json_response(
                "401 Unauthorized",
                "",
                r#"{"error":"missing access token"}"#,
            ))
            .await;
            let api = HttpAuthApi::new(&AuthConfig::new(base)).unwrap();
            match api.me().await.unwrap_err() {
                ArenaError::Auth { status, message } => {
                    assert_eq!(status, 401);
                    assert_eq!(message, "missing access token");
                }
                other => panic!("expected auth error, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn non_json_error_falls_back_to_status_text() {
            let response =
                "HTTP/1.1 502 Bad Gateway\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    .to_owned();
            let (base, _server) = serve_once(response).await;
            let api = HttpAuthApi::new(&AuthConfig::new(base)).unwrap();
            match api.refresh().await.unwrap_err() {
                ArenaError::Auth { status, message } => {
                    assert_eq!(status, 502);
                    assert_eq!(message, "Bad Gateway");
                }
                other => panic!("expected auth error, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn unreachable_service_is_not_a_hard_failure() {
            let api = HttpAuthApi::new(
                &AuthConfig::new("http://127.0.0.1:1")
                    .with_request_timeout(Duration::from_secs(2)),
            )
            .unwrap();
            let err = api.refresh().await.unwrap_err();
            assert!(!err.is_hard_auth_failure());
        }

        #[test]
        fn rejects_invalid_base_url() {
            assert!(matches!(
                HttpAuthApi::new(&AuthConfig::new("not a url")),
                Err(ArenaError::InvalidEndpoint(_))
            ));
        }
    }
}
