//! Runtime error types.

use thiserror::Error;

use ferrogram_core::{ApiError, TransportError};

use crate::config::ConfigError;

/// Errors returned by [`BotRuntime`](crate::BotRuntime) setup operations.
///
/// Steady-state failures (fetch errors, dropped updates, handler errors) are
/// logged and never surface here.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A remote call made during startup failed.
    #[error("Bot API error: {0}")]
    Api(#[from] ApiError),

    /// The webhook listener could not be set up.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// An acquisition strategy is already running.
    #[error("Runtime already started")]
    AlreadyStarted,

    /// The runtime was shut down and cannot be restarted.
    #[error("Runtime has been shut down")]
    ShutDown,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
