//! The remote API capability.
//!
//! [`BotApi`] is the only thing the ingestion pipeline needs from the remote
//! side: fetching updates and managing the webhook registration. The HTTP
//! implementation lives in `ferrogram-transport`; tests plug in in-memory
//! implementations.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::types::Update;

/// Highest `limit` accepted by `getUpdates`.
pub const MAX_UPDATES_LIMIT: u8 = 100;

/// Highest `max_connections` accepted by `setWebhook`.
pub const MAX_WEBHOOK_CONNECTIONS: u8 = 100;

/// Longest accepted webhook secret token.
pub const MAX_SECRET_TOKEN_LEN: usize = 256;

// ============================================================================
// Capability Trait
// ============================================================================

/// Remote operations the update pipeline depends on.
#[async_trait]
pub trait BotApi: Send + Sync {
    /// Fetches pending updates, blocking up to `params.timeout` seconds on the
    /// remote side when none are available.
    async fn get_updates(&self, params: &GetUpdatesParams) -> ApiResult<Vec<Update>>;

    /// Registers a webhook. Returns the remote description.
    async fn set_webhook(&self, options: &WebhookOptions) -> ApiResult<String>;

    /// Removes the webhook registration. Returns the remote description.
    async fn delete_webhook(&self, drop_pending_updates: bool) -> ApiResult<String>;

    /// Returns the current webhook status.
    async fn get_webhook_info(&self) -> ApiResult<WebhookInfo>;
}

/// Type-erased [`BotApi`] shared between the runtime and its strategies.
pub type BoxedBotApi = Arc<dyn BotApi>;

// ============================================================================
// Request Parameters
// ============================================================================

/// Parameters of a `getUpdates` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GetUpdatesParams {
    /// Identifier of the first update to return.
    pub offset: i64,
    /// Number of updates to return, 1-100. Remote default is 100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u8>,
    /// Long polling timeout in seconds.
    pub timeout: u32,
    /// Update kinds to receive; empty means the remote default.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_updates: Vec<String>,
}

impl GetUpdatesParams {
    /// Creates parameters starting at `offset`.
    pub fn new(offset: i64) -> Self {
        Self {
            offset,
            ..Default::default()
        }
    }

    /// Sets the long polling timeout in seconds.
    pub fn with_timeout(mut self, timeout: u32) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the batch size limit.
    pub fn with_limit(mut self, limit: Option<u8>) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the update kinds to receive.
    pub fn with_allowed_updates(mut self, allowed_updates: Vec<String>) -> Self {
        self.allowed_updates = allowed_updates;
        self
    }

    /// Checks the parameters against the remote's documented limits.
    pub fn validate(&self) -> ApiResult<()> {
        if let Some(limit) = self.limit
            && !(1..=MAX_UPDATES_LIMIT).contains(&limit)
        {
            return Err(ApiError::invalid(format!(
                "limit must be between 1 and {MAX_UPDATES_LIMIT}, got {limit}"
            )));
        }
        Ok(())
    }
}

/// Parameters of a `setWebhook` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebhookOptions {
    /// HTTPS URL the remote will POST updates to.
    pub url: String,
    /// Public key certificate to upload, for self-signed setups.
    #[serde(skip)]
    pub certificate: Option<PathBuf>,
    /// Fixed IP address to use instead of DNS resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Maximum simultaneous connections, 1-100. Remote default is 40.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u8>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_updates: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub drop_pending_updates: bool,
    /// Sent back in the `X-Telegram-Bot-Api-Secret-Token` header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_token: Option<String>,
}

impl WebhookOptions {
    /// Creates options for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_secret_token(mut self, token: impl Into<String>) -> Self {
        self.secret_token = Some(token.into());
        self
    }

    pub fn with_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.certificate = Some(path.into());
        self
    }

    pub fn with_max_connections(mut self, max: u8) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn with_allowed_updates(mut self, allowed_updates: Vec<String>) -> Self {
        self.allowed_updates = allowed_updates;
        self
    }

    pub fn with_drop_pending_updates(mut self, drop: bool) -> Self {
        self.drop_pending_updates = drop;
        self
    }

    /// Checks the options against the remote's documented limits.
    pub fn validate(&self) -> ApiResult<()> {
        if self.url.is_empty() {
            return Err(ApiError::invalid("webhook url is required"));
        }
        if !self.url.starts_with("https://") {
            return Err(ApiError::invalid(format!(
                "webhook url must use https, got {}",
                self.url
            )));
        }
        if let Some(max) = self.max_connections
            && !(1..=MAX_WEBHOOK_CONNECTIONS).contains(&max)
        {
            return Err(ApiError::invalid(format!(
                "max_connections must be between 1 and {MAX_WEBHOOK_CONNECTIONS}, got {max}"
            )));
        }
        if let Some(token) = &self.secret_token {
            validate_secret_token(token)?;
        }
        Ok(())
    }
}

/// Checks a webhook secret token: 1-256 characters of `A-Z a-z 0-9 _ -`.
pub fn validate_secret_token(token: &str) -> ApiResult<()> {
    if token.is_empty() || token.len() > MAX_SECRET_TOKEN_LEN {
        return Err(ApiError::invalid(format!(
            "secret_token must be 1-{MAX_SECRET_TOKEN_LEN} characters, got {}",
            token.len()
        )));
    }
    if let Some(bad) = token
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(ApiError::invalid(format!(
            "secret_token contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

// ============================================================================
// Responses
// ============================================================================

/// Extra information attached to a failed response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseParameters {
    /// The group was migrated to a supergroup with this identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrate_to_chat_id: Option<i64>,
    /// Seconds to wait before repeating the request (flood control).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// The JSON envelope every remote method answers with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ResponseParameters>,
}

impl<T> ApiResponse<T> {
    /// Creates a successful response, as a fake remote would send it.
    pub fn success(result: T) -> Self {
        Self {
            ok: true,
            result: Some(result),
            description: None,
            error_code: None,
            parameters: None,
        }
    }

    /// Creates a failed response.
    pub fn failure(code: i64, description: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            description: Some(description.into()),
            error_code: Some(code),
            parameters: None,
        }
    }

    fn into_error(self) -> ApiError {
        ApiError::Api {
            code: self.error_code.unwrap_or_default(),
            description: self
                .description
                .unwrap_or_else(|| "no description".to_string()),
            retry_after: self.parameters.and_then(|p| p.retry_after),
        }
    }

    /// Converts the envelope into the `result` payload or an [`ApiError`].
    pub fn into_result(self) -> ApiResult<T> {
        if !self.ok {
            return Err(self.into_error());
        }
        self.result
            .ok_or_else(|| ApiError::Decode("response is ok but has no result".to_string()))
    }

    /// Converts a successful envelope into its description, for methods
    /// whose result is a bare `true`.
    pub fn into_description(self) -> ApiResult<String> {
        if !self.ok {
            return Err(self.into_error());
        }
        Ok(self.description.unwrap_or_default())
    }
}

/// Current webhook status, as returned by `getWebhookInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookInfo {
    /// Registered URL; empty when no webhook is set.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub has_custom_certificate: bool,
    /// Updates awaiting delivery.
    #[serde(default)]
    pub pending_update_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synchronization_error_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_updates: Vec<String>,
}

impl WebhookInfo {
    /// Returns true if a webhook is registered.
    pub fn is_set(&self) -> bool {
        !self.url.is_empty()
    }
}
