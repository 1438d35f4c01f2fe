//! Ferrogram Runtime - lifecycle layer of the Ferrogram bot framework.
//!
//! This crate provides:
//! - The per-bot controller ([`BotRuntime`]): strategy start, graceful shutdown
//! - Layered configuration ([`config`]) loaded with figment
//! - Logging setup ([`logging`]) on `tracing-subscriber`
//!
//! ```ignore
//! use std::sync::Arc;
//! use ferrogram_runtime::BotRuntime;
//! use ferrogram_core::Message;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Reads ferrogram.toml and FERROGRAM_* variables
//!     let runtime = BotRuntime::builder().build()?;
//!
//!     runtime.on_command("/ping", |msg: Arc<Message>| async move {
//!         tracing::info!(chat = msg.chat_id(), "pong");
//!     });
//!
//!     // Polls (or serves the webhook) until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, FerrogramConfig, LoggingConfig, Mode, RuntimeConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{BotRuntime, RuntimeBuilder};

pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
