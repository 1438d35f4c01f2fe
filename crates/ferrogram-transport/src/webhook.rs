//! Webhook acquisition strategy.
//!
//! An axum listener receives updates POSTed by the remote and pushes them
//! onto the queue. Each request is answered by what happened to its update:
//!
//! | Condition                                  | Status |
//! |--------------------------------------------|--------|
//! | method is not POST                         | 405    |
//! | secret token header missing or wrong       | 401    |
//! | body larger than `max_body_size`           | 413    |
//! | processing exceeded `request_timeout`      | 408    |
//! | body is not an update                      | 400    |
//! | shutting down, queue full or closed        | 503    |
//! | update queued                              | 200    |
//!
//! A 503 makes the remote redeliver the update later.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    error_handling::HandleErrorLayer,
    extract::{DefaultBodyLimit, FromRequest, Request, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::{BoxError, ServiceBuilder, timeout::TimeoutLayer};
use tracing::{debug, error, info, warn};

use ferrogram_core::{
    PushError, TransportError, TransportResult, Update, UpdateSender, WebhookOptions,
    validate_secret_token,
};

/// Header the remote uses to echo the registered secret token.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

// ─── Configuration ────────────────────────────────────────────────────────────

/// Webhook listener and registration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Public HTTPS URL registered with the remote.
    #[serde(default)]
    pub url: String,
    /// Local bind host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Local bind port.
    #[serde(default)]
    pub port: u16,
    /// Local route path. Defaults to the path component of `url`; a missing
    /// leading `/` is added.
    #[serde(default)]
    pub path: Option<String>,
    /// Secret the remote must send back in [`SECRET_TOKEN_HEADER`].
    #[serde(default)]
    pub secret_token: Option<String>,
    /// Public key certificate to upload for self-signed setups.
    #[serde(default)]
    pub certificate: Option<PathBuf>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u8>,
    #[serde(default)]
    pub allowed_updates: Vec<String>,
    #[serde(default)]
    pub drop_pending_updates: bool,
    /// How long a request may wait for queue capacity.
    #[serde(default = "default_push_timeout_secs")]
    pub push_timeout_secs: u64,
    /// Upper bound on processing one request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Grace period for in-flight requests on shutdown.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    /// Maximum accepted request body, in bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_push_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

fn default_max_body_size() -> usize {
    1 << 20
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            host: default_host(),
            port: 0,
            path: None,
            secret_token: None,
            certificate: None,
            ip_address: None,
            max_connections: None,
            allowed_updates: Vec::new(),
            drop_pending_updates: false,
            push_timeout_secs: default_push_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl WebhookConfig {
    /// Creates a configuration for `url`, listening on `port`.
    pub fn new(url: impl Into<String>, port: u16) -> Self {
        Self {
            url: url.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_secret_token(mut self, token: impl Into<String>) -> Self {
        self.secret_token = Some(token.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Route path served locally.
    pub fn route_path(&self) -> String {
        let raw = match &self.path {
            Some(path) => path.as_str(),
            None => url_path(&self.url),
        };
        if raw.is_empty() {
            "/".to_string()
        } else if raw.starts_with('/') {
            raw.to_string()
        } else {
            format!("/{raw}")
        }
    }

    /// Options for registering this webhook with the remote.
    pub fn webhook_options(&self) -> WebhookOptions {
        WebhookOptions {
            url: self.url.clone(),
            certificate: self.certificate.clone(),
            ip_address: self.ip_address.clone(),
            max_connections: self.max_connections,
            allowed_updates: self.allowed_updates.clone(),
            drop_pending_updates: self.drop_pending_updates,
            secret_token: self.secret_token.clone(),
        }
    }

    /// Rejects a zero port, a missing or non-HTTPS URL and a malformed
    /// secret token.
    pub fn validate(&self) -> TransportResult<()> {
        self.validate_registration()?;
        if self.port == 0 {
            return Err(TransportError::InvalidConfig(
                "webhook port must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_registration(&self) -> TransportResult<()> {
        if self.url.is_empty() {
            return Err(TransportError::InvalidConfig(
                "webhook url is required".to_string(),
            ));
        }
        if !self.url.starts_with("https://") {
            return Err(TransportError::InvalidConfig(format!(
                "webhook url must use https: {}",
                self.url
            )));
        }
        if let Some(token) = &self.secret_token {
            validate_secret_token(token)
                .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;
        }
        Ok(())
    }
}

/// Path component of an absolute URL, without query or fragment.
fn url_path(url: &str) -> &str {
    let after_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = match after_scheme.find('/') {
        Some(start) => &after_scheme[start..],
        None => "",
    };
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

// ─── Request handling ─────────────────────────────────────────────────────────

/// Shared state of the webhook route.
#[derive(Clone)]
pub struct WebhookState {
    sender: UpdateSender,
    shutdown: CancellationToken,
    secret_token: Option<Arc<str>>,
    path: String,
    push_timeout: Duration,
    request_timeout: Duration,
    max_body_size: usize,
}

impl WebhookState {
    pub fn new(config: &WebhookConfig, sender: UpdateSender, shutdown: CancellationToken) -> Self {
        Self {
            sender,
            shutdown,
            secret_token: config.secret_token.as_deref().map(Arc::from),
            path: config.route_path(),
            push_timeout: config.push_timeout(),
            request_timeout: config.request_timeout(),
            max_body_size: config.max_body_size,
        }
    }
}

/// Builds the webhook router: one route at the configured path with the body
/// limit and the request timeout applied.
pub fn webhook_router(state: WebhookState) -> Router {
    let path = state.path.clone();
    let timeout = state.request_timeout;
    let max_body_size = state.max_body_size;

    Router::new()
        .route(&path, any(receive_update))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|_: BoxError| async {
                    (StatusCode::REQUEST_TIMEOUT, "Request timeout")
                }))
                .layer(TimeoutLayer::new(timeout)),
        )
        .with_state(state)
}

async fn receive_update(State(state): State<WebhookState>, request: Request) -> Response {
    if request.method() != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response();
    }

    if let Some(expected) = &state.secret_token
        && !secret_matches(expected, request.headers())
    {
        warn!("Rejected webhook request with invalid secret token");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    let body = match Bytes::from_request(request, &state).await {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected webhook body");
            return rejection.into_response();
        }
    };

    let update = match Update::from_slice(&body) {
        Ok(update) => update,
        Err(error) => {
            warn!(%error, "Malformed webhook update");
            return (StatusCode::BAD_REQUEST, "Bad request").into_response();
        }
    };

    let update_id = update.update_id;
    if state.shutdown.is_cancelled() {
        debug!(update_id, "Refusing update during shutdown");
        return (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable").into_response();
    }

    match state
        .sender
        .push_timeout(update, state.push_timeout, &state.shutdown)
        .await
    {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(error) => {
            let reason = match error {
                PushError::Timeout => "queue full",
                PushError::Cancelled => "shutting down",
                PushError::Closed => "queue closed",
            };
            warn!(update_id, reason, "Dropping undeliverable webhook update");
            (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable").into_response()
        }
    }
}

/// Constant-time in the token contents; a length mismatch fails early.
fn secret_matches(expected: &str, headers: &HeaderMap) -> bool {
    headers
        .get(SECRET_TOKEN_HEADER)
        .is_some_and(|provided| expected.as_bytes().ct_eq(provided.as_bytes()).into())
}

// ─── Listener lifecycle ───────────────────────────────────────────────────────

/// A running webhook listener.
pub struct WebhookServer {
    local_addr: SocketAddr,
    path: String,
    stop: CancellationToken,
    task: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl WebhookServer {
    /// Validates `config`, binds the listener and starts serving.
    ///
    /// The listener stops gracefully on [`shutdown`](Self::shutdown) or when
    /// `shutdown` fires.
    pub async fn bind(
        config: &WebhookConfig,
        sender: UpdateSender,
        shutdown: CancellationToken,
    ) -> TransportResult<Self> {
        config.validate()?;
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::Bind {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;
        Self::serve(listener, config, sender, shutdown)
    }

    /// Starts serving on an already bound listener.
    ///
    /// `config.host` and `config.port` are ignored.
    pub fn serve(
        listener: TcpListener,
        config: &WebhookConfig,
        sender: UpdateSender,
        shutdown: CancellationToken,
    ) -> TransportResult<Self> {
        config.validate_registration()?;
        let local_addr = listener.local_addr()?;
        let state = WebhookState::new(config, sender, shutdown.clone());
        let path = state.path.clone();
        let router = webhook_router(state);

        let stop = shutdown.child_token();
        let signal = stop.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "Webhook listener failed");
            }
        });

        info!(addr = %local_addr, %path, "Webhook listener started");
        Ok(Self {
            local_addr,
            path,
            stop,
            task,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Route path updates are accepted on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Stops accepting connections and waits for in-flight requests, at most
    /// the configured shutdown timeout. Returns false if the listener had to
    /// be aborted.
    pub async fn shutdown(mut self) -> bool {
        self.stop.cancel();
        match tokio::time::timeout(self.shutdown_timeout, &mut self.task).await {
            Ok(_) => {
                info!(addr = %self.local_addr, "Webhook listener stopped");
                true
            }
            Err(_) => {
                self.task.abort();
                warn!(
                    addr = %self.local_addr,
                    timeout = ?self.shutdown_timeout,
                    "Webhook listener did not stop in time, aborted"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for WebhookServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookServer")
            .field("local_addr", &self.local_addr)
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http;
    use ferrogram_core::update_queue;
    use serde_json::json;
    use tower::ServiceExt;

    const URL: &str = "https://bot.example.com/hook";

    fn update_body(id: i64) -> String {
        json!({
            "update_id": id,
            "message": {"message_id": 1, "chat": {"id": 1, "type": "private"}, "text": "hi"}
        })
        .to_string()
    }

    fn post(path: &str, body: impl Into<Body>) -> Request {
        http::Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn route_path_defaults_to_url_path() {
        assert_eq!(WebhookConfig::new(URL, 8443).route_path(), "/hook");
        assert_eq!(
            WebhookConfig::new("https://example.com", 8443).route_path(),
            "/"
        );
        assert_eq!(
            WebhookConfig::new("https://example.com/a/b?x=1", 8443).route_path(),
            "/a/b"
        );
        assert_eq!(
            WebhookConfig::new(URL, 8443).with_path("local").route_path(),
            "/local"
        );
    }

    #[test]
    fn validate_rejects_bad_configs() {
        assert!(WebhookConfig::new(URL, 8443).validate().is_ok());
        assert!(WebhookConfig::new(URL, 0).validate().is_err());
        assert!(WebhookConfig::new("", 8443).validate().is_err());
        assert!(WebhookConfig::new("http://bot.example.com", 8443).validate().is_err());
        assert!(
            WebhookConfig::new(URL, 8443)
                .with_secret_token("bad token!")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn secret_header_comparison() {
        let with_secret = |value: &'static str| {
            let mut headers = HeaderMap::new();
            headers.insert(SECRET_TOKEN_HEADER, http::HeaderValue::from_static(value));
            headers
        };
        assert!(secret_matches("secret", &with_secret("secret")));
        assert!(!secret_matches("secret", &with_secret("secreT")));
        assert!(!secret_matches("secret", &with_secret("secret-longer")));
        assert!(!secret_matches("secret", &HeaderMap::new()));
    }

    #[tokio::test]
    async fn accepts_valid_update() {
        let (tx, mut rx) = update_queue(4);
        let config = WebhookConfig::new(URL, 8443);
        let router = webhook_router(WebhookState::new(&config, tx, CancellationToken::new()));

        let response = router.oneshot(post("/hook", update_body(7))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "OK");
        assert_eq!(rx.recv().await.map(|u| u.update_id), Some(7));
    }

    #[tokio::test]
    async fn rejects_non_post() {
        let (tx, rx) = update_queue(4);
        let config = WebhookConfig::new(URL, 8443);
        let router = webhook_router(WebhookState::new(&config, tx, CancellationToken::new()));

        let request = http::Request::builder()
            .method(Method::GET)
            .uri("/hook")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn secret_token_is_enforced() {
        let (tx, mut rx) = update_queue(4);
        let config = WebhookConfig::new(URL, 8443).with_secret_token("s3cret");
        let router = webhook_router(WebhookState::new(&config, tx, CancellationToken::new()));

        let response = router
            .clone()
            .oneshot(post("/hook", update_body(1)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut wrong = post("/hook", update_body(2));
        wrong
            .headers_mut()
            .insert(SECRET_TOKEN_HEADER, "nope".parse().unwrap());
        let response = router.clone().oneshot(wrong).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut right = post("/hook", update_body(3));
        right
            .headers_mut()
            .insert(SECRET_TOKEN_HEADER, "s3cret".parse().unwrap());
        let response = router.oneshot(right).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(rx.recv().await.map(|u| u.update_id), Some(3));
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let (tx, rx) = update_queue(4);
        let config = WebhookConfig::new(URL, 8443);
        let router = webhook_router(WebhookState::new(&config, tx, CancellationToken::new()));

        for body in ["{not json", r#"{"message": {}}"#, "[]"] {
            let response = router.clone().oneshot(post("/hook", body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        }
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let (tx, rx) = update_queue(4);
        let config = WebhookConfig {
            max_body_size: 64,
            ..WebhookConfig::new(URL, 8443)
        };
        let router = webhook_router(WebhookState::new(&config, tx, CancellationToken::new()));

        let response = router
            .oneshot(post("/hook", "x".repeat(1024)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(rx.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_answers_503_after_push_timeout() {
        let (tx, mut rx) = update_queue(1);
        let config = WebhookConfig {
            push_timeout_secs: 5,
            request_timeout_secs: 30,
            ..WebhookConfig::new(URL, 8443)
        };
        let router = webhook_router(WebhookState::new(&config, tx, CancellationToken::new()));

        let first = router.clone().oneshot(post("/hook", update_body(1))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let started = tokio::time::Instant::now();
        let second = router.oneshot(post("/hook", update_body(2))).await.unwrap();
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(started.elapsed() >= Duration::from_secs(5));

        assert_eq!(rx.recv().await.map(|u| u.update_id), Some(1));
        assert!(rx.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_times_out() {
        let (tx, _rx) = update_queue(1);
        let config = WebhookConfig {
            push_timeout_secs: 60,
            request_timeout_secs: 2,
            ..WebhookConfig::new(URL, 8443)
        };
        let router = webhook_router(WebhookState::new(&config, tx, CancellationToken::new()));

        let first = router.clone().oneshot(post("/hook", update_body(1))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = router.oneshot(post("/hook", update_body(2))).await.unwrap();
        assert_eq!(second.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn shutdown_answers_503() {
        let (tx, rx) = update_queue(4);
        let token = CancellationToken::new();
        let config = WebhookConfig::new(URL, 8443);
        let router = webhook_router(WebhookState::new(&config, tx, token.clone()));
        token.cancel();

        let response = router.oneshot(post("/hook", update_body(1))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn server_accepts_and_shuts_down() {
        let (tx, mut rx) = update_queue(4);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = WebhookConfig::new(URL, 8443);
        let server = WebhookServer::serve(listener, &config, tx, CancellationToken::new()).unwrap();
        assert_eq!(server.path(), "/hook");

        let addr = server.local_addr();
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let body = update_body(42);
        let request = format!(
            "POST /hook HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        tokio::io::AsyncWriteExt::write_all(&mut stream, request.as_bytes())
            .await
            .unwrap();
        let mut response = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut response)
            .await
            .unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert_eq!(rx.recv().await.map(|u| u.update_id), Some(42));

        assert!(server.shutdown().await);
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn bind_rejects_zero_port() {
        let (tx, _rx) = update_queue(1);
        let config = WebhookConfig::new(URL, 0);
        let err = WebhookServer::bind(&config, tx, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidConfig(_)));
    }
}
