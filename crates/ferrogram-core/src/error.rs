//! Unified error types for the Ferrogram core.
//!
//! Each layer gets its own enum so callers can tell setup failures from
//! steady-state ones. Runtime-level errors live in `ferrogram-runtime`.

use std::time::Duration;

use thiserror::Error;

// =============================================================================
// API Errors
// =============================================================================

/// Errors returned by a [`BotApi`](crate::BotApi) call.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request never produced a response (connect, TLS, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote answered with a non-2xx status and an unreadable body.
    #[error("HTTP {status} error: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Raw response body, possibly truncated.
        body: String,
    },

    /// The remote answered `ok: false`.
    #[error("API error ({code}): {description}")]
    Api {
        /// Remote error code.
        code: i64,
        /// Human readable description from the remote.
        description: String,
        /// Seconds to wait before retrying, set on flood control.
        retry_after: Option<u64>,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The request was rejected locally before being sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Creates an invalid request error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Returns the back-off the remote asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api {
                retry_after: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

// =============================================================================
// Decode Errors
// =============================================================================

/// The top-level update envelope could not be decoded.
///
/// Variant payloads never produce this error; they are dropped instead.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The input was not valid JSON.
    #[error("malformed JSON: {0}")]
    Json(String),

    /// The JSON was valid but not an update envelope.
    #[error("invalid update envelope: {0}")]
    Envelope(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised while setting up a listener.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {reason}")]
    Bind {
        /// Requested bind address.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Queue Errors
// =============================================================================

/// Why an update could not be pushed onto the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    /// The cancellation token fired while waiting for capacity.
    #[error("shutdown in progress")]
    Cancelled,

    /// The queue stayed full for the whole push timeout.
    #[error("queue full, push timed out")]
    Timeout,

    /// The receiving side is gone.
    #[error("queue closed")]
    Closed,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
