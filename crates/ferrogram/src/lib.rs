//! # Ferrogram
//!
//! Update ingestion and dispatch for Telegram bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌────────────┐     ┌─────────────────────────┐
//! │ Poller / Webhook │────▶│ update queue │────▶│ Dispatcher │────▶│ handler (own task)      │
//! │  (producer)      │     │  (bounded)   │     │ (filters)  │────▶│ handler (own task)      │
//! └──────────────────┘     └──────────────┘     └────────────┘     └─────────────────────────┘
//! ```
//!
//! - **Producer**: long polling or a webhook listener; exactly one per bot
//! - **Queue**: bounded FIFO; a full queue pushes back on the producer
//! - **Dispatcher**: routes each update by kind, evaluates filters, spawns
//!   every matching handler concurrently under an in-flight cap
//! - **BotRuntime**: owns all of the above and shuts it down in order
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferrogram::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BotRuntime::builder().build()?;
//!
//!     runtime.on_command("/start", |msg: Arc<Message>| async move {
//!         info!(chat = msg.chat_id(), "started");
//!     });
//!     runtime.on_message(vec![filter::text_contains("help")], |msg: Arc<Message>| async move {
//!         info!(chat = msg.chat_id(), "asked for help");
//!     });
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default): TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use ferrogram_core as core;
pub use ferrogram_framework as framework;
pub use ferrogram_runtime as runtime;
pub use ferrogram_transport as transport;

/// Commonly used types.
///
/// ```rust,ignore
/// use ferrogram::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use ferrogram_runtime::{BotRuntime, FerrogramConfig, Mode, RuntimeError, RuntimeResult};

    // Routing
    pub use ferrogram_framework::{DispatchState, Filter, HandlerRegistry, filter};

    // Payloads
    pub use ferrogram_core::{
        CallbackQuery, Chat, ChosenInlineResult, InlineQuery, Message, Poll, PollAnswer,
        PreCheckoutQuery, ShippingQuery, Update, UpdateKind, User,
    };

    // Remote API
    pub use ferrogram_core::{ApiError, BotApi};
    pub use ferrogram_transport::{HttpApiConfig, HttpBotApi, WebhookConfig};

    pub use ferrogram_runtime::prelude::*;
}
