//! # Ferrogram Transport
//!
//! Update acquisition strategies and the HTTP Bot API client.
//!
//! Both strategies feed the same bounded queue from `ferrogram-core`; the
//! dispatcher on the other end does not know which one is running.
//!
//! ## Features
//!
//! - `http-client` (default): [`HttpBotApi`], the reqwest based [`BotApi`](ferrogram_core::BotApi)
//! - `webhook` (default): the axum webhook listener
//! - `full`: everything
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐        ┌─────────────────────┐
//! │  Poller             │        │  WebhookServer      │
//! │  (getUpdates loop)  │        │  (axum listener)    │
//! └──────────┬──────────┘        └──────────┬──────────┘
//!            │      push / push_timeout     │
//!            └──────────────┬───────────────┘
//!                           ▼
//!                ┌─────────────────────┐
//!                │  update queue       │  (ferrogram-core)
//!                └──────────┬──────────┘
//!                           ▼
//!                ┌─────────────────────┐
//!                │  Dispatcher         │  (ferrogram-framework)
//!                └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ferrogram_core::{update_queue, CancellationToken};
//! use ferrogram_transport::{HttpApiConfig, HttpBotApi, Poller, PollingConfig};
//!
//! let api = Arc::new(HttpBotApi::new(HttpApiConfig::new(token))?);
//! let poller = Poller::new(api, PollingConfig::default());
//! poller.prepare().await?;
//!
//! let (tx, rx) = update_queue(20);
//! let shutdown = CancellationToken::new();
//! tokio::spawn(async move { poller.run(tx, shutdown).await });
//! ```

pub mod polling;

#[cfg(feature = "http-client")]
pub mod http;

#[cfg(feature = "webhook")]
pub mod webhook;

pub use polling::{Poller, PollingConfig, PollingReport};

#[cfg(feature = "http-client")]
pub use http::{HttpApiConfig, HttpBotApi};

#[cfg(feature = "webhook")]
pub use webhook::{SECRET_TOKEN_HEADER, WebhookConfig, WebhookServer, WebhookState, webhook_router};
