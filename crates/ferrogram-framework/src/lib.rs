//! # Ferrogram Framework
//!
//! Routing layer of the Ferrogram bot framework.
//!
//! - [`filter`]: composable predicates over payloads ([`Filter`])
//! - [`handler`]: the [`Handler`] trait and outcome reporting
//! - [`registry`]: per-kind handler storage ([`HandlerRegistry`])
//! - [`dispatcher`]: the dispatch loop ([`Dispatcher`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ferrogram_framework::{filter, Dispatcher, DispatcherConfig, HandlerRegistry};
//! use ferrogram_core::{update_queue, CancellationToken, Message};
//!
//! let registry = Arc::new(HandlerRegistry::new());
//! registry.on_command("/start", |msg: Arc<Message>| async move {
//!     tracing::info!(chat = msg.chat_id(), "start");
//! });
//! registry.on_message(vec![filter::text_contains("help")], |_msg: Arc<Message>| async {});
//!
//! let (tx, rx) = update_queue(20);
//! let dispatcher = Dispatcher::new(registry, DispatcherConfig::default());
//! dispatcher.run(rx, CancellationToken::new()).await;
//! ```

pub mod dispatcher;
pub mod filter;
pub mod handler;
pub mod registry;

pub use dispatcher::{DispatchReport, DispatchState, Dispatcher, DispatcherConfig};
pub use filter::{Field, Filter, all_match};
pub use handler::{BoxedHandler, Handler, HandlerOutcome, into_handler};
pub use registry::{HandlerRegistry, Job};
