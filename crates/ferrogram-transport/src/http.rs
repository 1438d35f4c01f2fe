//! HTTP implementation of [`BotApi`].
//!
//! Every method is a POST to `{api_url}/bot{token}/{method}`. The token is
//! part of the URL, so errors are stripped of it before they leave this
//! module.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, multipart};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use ferrogram_core::{
    ApiError, ApiResponse, ApiResult, BotApi, GetUpdatesParams, Update, WebhookInfo,
    WebhookOptions,
};

/// Longest response body kept in an [`ApiError::Http`].
const MAX_ERROR_BODY: usize = 512;

/// Connection settings of the HTTP client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpApiConfig {
    /// Base URL of the Bot API server.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Bot token.
    #[serde(default)]
    pub token: String,
    /// Timeout of a single request, added on top of the long polling timeout
    /// for `getUpdates`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for HttpApiConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl HttpApiConfig {
    /// Creates a configuration for `token` against the public server.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Default::default()
        }
    }

    /// Points the client at another server, such as a local Bot API server.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl std::fmt::Debug for HttpApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApiConfig")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// [`BotApi`] over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpBotApi {
    client: Client,
    config: HttpApiConfig,
}

impl HttpBotApi {
    /// Creates a client. Fails if the token is empty or the TLS backend
    /// cannot be initialized.
    pub fn new(config: HttpApiConfig) -> ApiResult<Self> {
        if config.token.is_empty() {
            return Err(ApiError::invalid("bot token is required"));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| ApiError::Transport(e.without_url().to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpApiConfig {
        &self.config
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.token,
            method
        )
    }

    async fn call<P, T>(&self, method: &str, params: &P, timeout: Duration) -> ApiResult<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(method, "Calling Bot API");
        let request = self
            .client
            .post(self.method_url(method))
            .json(params)
            .timeout(timeout);
        self.execute(request).await?.into_result()
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> ApiResult<ApiResponse<T>> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;

        match serde_json::from_slice::<ApiResponse<T>>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => Err(ApiError::Http {
                status: status.as_u16(),
                body: truncate(&String::from_utf8_lossy(&body)),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_webhook_with_certificate(
        &self,
        options: &WebhookOptions,
        certificate: &std::path::Path,
    ) -> ApiResult<String> {
        let bytes = tokio::fs::read(certificate).await.map_err(|e| {
            ApiError::invalid(format!(
                "cannot read certificate {}: {e}",
                certificate.display()
            ))
        })?;
        let file_name = certificate
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "certificate.pem".to_string());

        let mut form = multipart::Form::new()
            .text("url", options.url.clone())
            .part("certificate", multipart::Part::bytes(bytes).file_name(file_name));
        if let Some(ip) = &options.ip_address {
            form = form.text("ip_address", ip.clone());
        }
        if let Some(max) = options.max_connections {
            form = form.text("max_connections", max.to_string());
        }
        if !options.allowed_updates.is_empty() {
            form = form.text(
                "allowed_updates",
                serde_json::to_string(&options.allowed_updates)?,
            );
        }
        if options.drop_pending_updates {
            form = form.text("drop_pending_updates", "true");
        }
        if let Some(secret) = &options.secret_token {
            form = form.text("secret_token", secret.clone());
        }

        debug!(method = "setWebhook", "Uploading webhook certificate");
        let request = self
            .client
            .post(self.method_url("setWebhook"))
            .multipart(form)
            .timeout(self.config.request_timeout());
        self.execute::<bool>(request).await?.into_description()
    }
}

#[async_trait]
impl BotApi for HttpBotApi {
    async fn get_updates(&self, params: &GetUpdatesParams) -> ApiResult<Vec<Update>> {
        params.validate()?;
        let timeout = Duration::from_secs(u64::from(params.timeout)) + self.config.request_timeout();
        let raw: Vec<Value> = self.call("getUpdates", params, timeout).await?;

        let mut updates = Vec::with_capacity(raw.len());
        for value in raw {
            match Update::from_value(value) {
                Ok(update) => updates.push(update),
                Err(error) => warn!(%error, "Skipping undecodable update"),
            }
        }
        Ok(updates)
    }

    async fn set_webhook(&self, options: &WebhookOptions) -> ApiResult<String> {
        options.validate()?;
        if let Some(certificate) = &options.certificate {
            return self.set_webhook_with_certificate(options, certificate).await;
        }
        let request = self
            .client
            .post(self.method_url("setWebhook"))
            .json(options)
            .timeout(self.config.request_timeout());
        self.execute::<bool>(request).await?.into_description()
    }

    async fn delete_webhook(&self, drop_pending_updates: bool) -> ApiResult<String> {
        let params = serde_json::json!({ "drop_pending_updates": drop_pending_updates });
        let request = self
            .client
            .post(self.method_url("deleteWebhook"))
            .json(&params)
            .timeout(self.config.request_timeout());
        self.execute::<bool>(request).await?.into_description()
    }

    async fn get_webhook_info(&self) -> ApiResult<WebhookInfo> {
        self.call(
            "getWebhookInfo",
            &serde_json::json!({}),
            self.config.request_timeout(),
        )
        .await
    }
}

fn transport_error(err: reqwest::Error) -> ApiError {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    ApiError::Transport(format!("{kind}: {}", err.without_url()))
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        routing::post,
    };
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    const TOKEN: &str = "123:secret-token";

    #[derive(Clone, Default)]
    struct Fake {
        calls: Arc<Mutex<Vec<(String, String, Value)>>>,
    }

    async fn fake_method(
        State(fake): State<Fake>,
        Path((bot, method)): Path<(String, String)>,
        body: String,
    ) -> axum::response::Response {
        let params: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        fake.calls.lock().push((bot, method.clone(), params));
        match method.as_str() {
            "getUpdates" => Json(json!({
                "ok": true,
                "result": [
                    {"update_id": 10, "message": {"message_id": 1, "chat": {"id": 5, "type": "private"}, "text": "hi"}},
                    {"no_update_id": true},
                    {"update_id": 11, "poll": {"id": "p", "question": "?", "options": []}}
                ]
            }))
            .into_response(),
            "setWebhook" => Json(json!({"ok": true, "result": true, "description": "Webhook was set"}))
                .into_response(),
            "deleteWebhook" => Json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 3",
                "parameters": {"retry_after": 3}
            }))
            .into_response(),
            "getWebhookInfo" => Json(json!({
                "ok": true,
                "result": {"url": "https://example.com/hook", "has_custom_certificate": false, "pending_update_count": 2}
            }))
            .into_response(),
            _ => (StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").into_response(),
        }
    }

    async fn spawn_fake() -> (HttpBotApi, Fake) {
        let fake = Fake::default();
        let router = Router::new()
            .route("/{bot}/{method}", post(fake_method))
            .with_state(fake.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        let config = HttpApiConfig::new(TOKEN).with_api_url(format!("http://{addr}"));
        (HttpBotApi::new(config).unwrap(), fake)
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(HttpBotApi::new(HttpApiConfig::default()).is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", HttpApiConfig::new(TOKEN));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn truncates_long_bodies() {
        assert_eq!(truncate("short"), "short");
        let long = "é".repeat(MAX_ERROR_BODY);
        let truncated = truncate(&long);
        assert!(truncated.len() <= MAX_ERROR_BODY + 3);
        assert!(truncated.ends_with("..."));
    }

    #[tokio::test]
    async fn get_updates_skips_bad_entries() {
        let (api, fake) = spawn_fake().await;
        let params = GetUpdatesParams::new(10).with_timeout(0);
        let updates = api.get_updates(&params).await.unwrap();

        let ids: Vec<_> = updates.iter().map(|u| u.update_id).collect();
        assert_eq!(ids, vec![10, 11]);
        assert_eq!(updates[1].kind_name(), "poll");

        let calls = fake.calls.lock();
        assert_eq!(calls[0].0, format!("bot{TOKEN}"));
        assert_eq!(calls[0].1, "getUpdates");
        assert_eq!(calls[0].2["offset"], 10);
    }

    #[tokio::test]
    async fn set_webhook_returns_description() {
        let (api, fake) = spawn_fake().await;
        let options = WebhookOptions::new("https://example.com/hook").with_secret_token("abc");
        let description = api.set_webhook(&options).await.unwrap();
        assert_eq!(description, "Webhook was set");
        assert_eq!(fake.calls.lock()[0].2["secret_token"], "abc");
    }

    #[tokio::test]
    async fn set_webhook_validates_locally() {
        let (api, fake) = spawn_fake().await;
        let err = api
            .set_webhook(&WebhookOptions::new("http://insecure"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        assert!(fake.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn api_failure_carries_retry_after() {
        let (api, _fake) = spawn_fake().await;
        let err = api.delete_webhook(true).await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn get_webhook_info_decodes() {
        let (api, _fake) = spawn_fake().await;
        let info = api.get_webhook_info().await.unwrap();
        assert!(info.is_set());
        assert_eq!(info.pending_update_count, 2);
    }

    #[tokio::test]
    async fn non_json_error_maps_to_http() {
        let (api, _fake) = spawn_fake().await;
        let err: ApiError = api
            .call::<_, bool>("unknownMethod", &json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            ApiError::Http { status, body } => {
                assert_eq!(status, 502);
                assert!(body.contains("bad gateway"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_errors_hide_token() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = HttpApiConfig::new(TOKEN).with_api_url(format!("http://{addr}"));
        let api = HttpBotApi::new(config).unwrap();
        let err = api.get_webhook_info().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert!(!err.to_string().contains("secret-token"));
    }
}
