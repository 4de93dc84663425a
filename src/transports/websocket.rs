//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! This module provides [`WebSocketTransport`], a [`Transport`] over a single
//! WebSocket connection, and [`WebSocketConnector`], the [`Connector`] the
//! session loop uses to open one. Both `ws://` and `wss://` URLs are
//! supported; TLS is handled transparently via
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! The game server authenticates the upgrade request with the `accessToken`
//! cookie issued by the auth service, so the connector can be given the auth
//! client's cookie jar (`http-auth` feature) and will attach the matching
//! `Cookie` header to every handshake.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), chess_arena_client::ArenaError> {
//! use chess_arena_client::{Transport, WebSocketTransport};
//!
//! let mut transport = WebSocketTransport::connect("ws://localhost:8080/ws").await?;
//! transport.send(r#"{"type":"join","data":{"playerId":"p1"}}"#.to_string()).await?;
//!
//! if let Some(Ok(msg)) = transport.recv().await {
//!     println!("received: {msg}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::close_codes::CloseCode;
use crate::error::ArenaError;
use crate::transport::{Connector, Transport};

/// Default timeout for establishing a WebSocket connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Type alias for the underlying WebSocket stream.
///
/// Made public so that callers can construct a [`WebSocketTransport`] from an
/// existing stream via [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] implementation backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method is cancel-safe. Dropping the future
/// returned by `recv` before it completes will not consume or lose any messages,
/// making it safe to use inside `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Io`] if the URL is invalid or the connection
    /// cannot be established. When the underlying error is an I/O error its
    /// [`ErrorKind`](std::io::ErrorKind) is preserved; all other errors are
    /// mapped to [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, ArenaError> {
        Self::connect_with_cookie(url, None).await
    }

    /// Establish a new WebSocket connection, sending `cookie` as the
    /// handshake's `Cookie` header when present.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn connect_with_cookie(url: &str, cookie: Option<&str>) -> Result<Self, ArenaError> {
        tracing::debug!(url = %url, with_cookie = cookie.is_some(), "connecting to game server");

        let mut request = url.into_client_request().map_err(handshake_error)?;
        if let Some(cookie) = cookie {
            let value = HeaderValue::from_str(cookie).map_err(|e| {
                ArenaError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
            })?;
            request.headers_mut().insert(COOKIE, value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(handshake_error)?;

        tracing::info!(url = %url, "WebSocket connection established");

        Ok(Self {
            stream,
            closed: false,
        })
    }

    /// Create a [`WebSocketTransport`] from an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

fn handshake_error(e: tokio_tungstenite::tungstenite::Error) -> ArenaError {
    let kind = match &e {
        tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
        _ => std::io::ErrorKind::Other,
    };
    ArenaError::Io(std::io::Error::new(kind, e))
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), ArenaError> {
        if self.closed {
            return Err(ArenaError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| ArenaError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ArenaError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(ArenaError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(Some(frame)) => {
                    let code = CloseCode::from(u16::from(frame.code));
                    tracing::debug!(%code, reason = %frame.reason.as_str(), "received WebSocket close frame");
                    if code.requires_reauth() {
                        return Some(Err(ArenaError::AbnormalClose {
                            code: code.as_u16(),
                            reason: frame.reason.to_string(),
                        }));
                    }
                    return None;
                }
                Message::Close(None) => {
                    tracing::debug!("received WebSocket close frame without status");
                    return None;
                }
                Message::Ping(_) => {
                    // tungstenite auto-queues the Pong reply.
                    tracing::debug!("received WebSocket ping");
                }
                Message::Pong(_) => {
                    tracing::debug!("received WebSocket pong (ignored)");
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    // Never produced by the read half; kept for exhaustiveness.
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), ArenaError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| ArenaError::TransportSend(e.to_string()))
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Opens [`WebSocketTransport`]s for the session loop.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use chess_arena_client::WebSocketConnector;
///
/// let connector = WebSocketConnector::new().with_timeout(Duration::from_secs(5));
/// ```
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    timeout: Duration,
    #[cfg(feature = "http-auth")]
    cookies: Option<std::sync::Arc<reqwest::cookie::Jar>>,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketConnector {
    /// Create a connector with the default 10 second handshake timeout and no cookies.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_CONNECT_TIMEOUT,
            #[cfg(feature = "http-auth")]
            cookies: None,
        }
    }

    /// Set the handshake timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach cookies from the auth client's jar to every handshake.
    #[cfg(feature = "http-auth")]
    #[must_use]
    pub fn with_cookie_jar(mut self, jar: std::sync::Arc<reqwest::cookie::Jar>) -> Self {
        self.cookies = Some(jar);
        self
    }

    #[cfg(feature = "http-auth")]
    fn cookie_header(&self, url: &str) -> Option<String> {
        use reqwest::cookie::CookieStore;

        let jar = self.cookies.as_ref()?;
        let lookup = cookie_lookup_url(url)?;
        let value = jar.cookies(&lookup)?;
        value.to_str().ok().map(str::to_owned)
    }

    #[cfg(not(feature = "http-auth"))]
    fn cookie_header(&self, _url: &str) -> Option<String> {
        None
    }
}

/// Cookies are stored against the HTTP origin of the auth service, so the
/// WebSocket scheme is mapped onto its HTTP counterpart for the lookup.
#[cfg_attr(not(feature = "http-auth"), allow(dead_code))]
fn cookie_lookup_url(ws_url: &str) -> Option<url::Url> {
    let mut url = url::Url::parse(ws_url).ok()?;
    let scheme = match url.scheme() {
        "ws" => "http",
        "wss" => "https",
        other => other,
    }
    .to_owned();
    url.set_scheme(&scheme).ok()?;
    Some(url)
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, url: &str) -> Result<WebSocketTransport, ArenaError> {
        let cookie = self.cookie_header(url);
        tokio::time::timeout(
            self.timeout,
            WebSocketTransport::connect_with_cookie(url, cookie.as_deref()),
        )
        .await
        .map_err(|_| ArenaError::Timeout)?
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
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::Io(_)));
    }

    #[test]
    fn cookie_lookup_maps_websocket_schemes() {
        assert_eq!(
            cookie_lookup_url("ws://localhost:8080/ws?gameId=g1")
                .unwrap()
                .scheme(),
            "http"
        );
        assert_eq!(
            cookie_lookup_url("wss://chess.example/ws").unwrap().scheme(),
            "https"
        );
        assert!(cookie_lookup_url("::nonsense::").is_none());
    }

    // ── Mock-stream helpers ──────────────────────────────────────────────

    use tokio::net::TcpListener;

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the address to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn recv_receives_text_messages() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"type":"gameCreated","data":{"gameId":"g"}}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert!(msg.contains("gameCreated"));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn policy_violation_close_surfaces_abnormal_close() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(Some(CloseFrame {
                code: WsCloseCode::Policy,
                reason: "Invalid authentication".into(),
            }))
            .await
            .unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let err = transport.recv().await.unwrap().unwrap_err();
        match err {
            ArenaError::AbnormalClose { code, reason } => {
                assert_eq!(code, 1008);
                assert_eq!(reason, "Invalid authentication");
            }
            other => panic!("expected AbnormalClose, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn normal_close_returns_none() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(Some(CloseFrame {
                code: WsCloseCode::Normal,
                reason: "bye".into(),
            }))
            .await
            .unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after_binary".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, "after_binary");
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        // Second close is a no-op.
        transport.close().await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, ArenaError::TransportClosed));
    }

    #[tokio::test]
    async fn connector_times_out_on_unroutable_address() {
        let connector = WebSocketConnector::new().with_timeout(Duration::from_millis(50));
        let err = connector.connect("ws://192.0.2.1:1").await.unwrap_err();
        assert!(matches!(err, ArenaError::Timeout | ArenaError::Io(_)));
    }

    #[tokio::test]
    async fn connector_sends_round_trip() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketConnector::new().connect(&url).await.unwrap();
        transport.send("echo".to_string()).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "echo");
    }

    #[cfg(feature = "http-auth")]
    #[tokio::test]
    async fn connector_attaches_cookies_from_jar() {
        use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (cookie_tx, cookie_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let cookie = req
                    .headers()
                    .get(COOKIE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let _ = cookie_tx.send(cookie);
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        });

        let jar = std::sync::Arc::new(reqwest::cookie::Jar::default());
        let origin: url::Url = format!("http://{addr}").parse().unwrap();
        jar.add_cookie_str("accessToken=abc123; Path=/", &origin);

        let connector = WebSocketConnector::new().with_cookie_jar(jar);
        let _transport = connector.connect(&format!("ws://{addr}/ws")).await.unwrap();
        assert_eq!(
            cookie_rx.await.unwrap().as_deref(),
            Some("accessToken=abc123")
        );
    }
}
