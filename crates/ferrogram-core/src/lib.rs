//! # Ferrogram Core
//!
//! The foundation of the Ferrogram bot framework.
//!
//! This crate holds everything the ingestion pipeline agrees on:
//!
//! - **Event Model**: the [`Update`] envelope and its typed variant payloads
//!   ([`UpdateKind`], [`Message`], [`CallbackQuery`], ...)
//! - **Remote Capability**: the [`BotApi`] trait the dispatcher depends on,
//!   plus request/response types ([`GetUpdatesParams`], [`WebhookOptions`])
//! - **Update Queue**: the bounded FIFO between acquisition strategies and
//!   the dispatch loop ([`update_queue`])
//! - **Errors**: [`ApiError`], [`TransportError`], [`PushError`]
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌────────────────┐
//! │ Polling/Webhook  │────▶│ UpdateQueue  │────▶│ Dispatch Loop  │
//! │ (UpdateSender)   │     │ (bounded)    │     │ (UpdateReceiver)│
//! └──────────────────┘     └──────────────┘     └────────────────┘
//! ```

pub mod api;
pub mod error;
pub mod queue;
pub mod types;

pub use api::{
    ApiResponse, BotApi, BoxedBotApi, GetUpdatesParams, MAX_SECRET_TOKEN_LEN, MAX_UPDATES_LIMIT,
    MAX_WEBHOOK_CONNECTIONS, ResponseParameters, WebhookInfo, WebhookOptions,
    validate_secret_token,
};
pub use error::{ApiError, ApiResult, DecodeError, PushError, TransportError, TransportResult};
pub use queue::{DEFAULT_QUEUE_CAPACITY, UpdateReceiver, UpdateSender, update_queue};
pub use types::{
    BusinessConnection, BusinessMessagesDeleted, CallbackQuery, Chat, ChatBoostRemoved,
    ChatBoostUpdated, ChatJoinRequest, ChatMemberUpdated, ChosenInlineResult, InlineQuery,
    Location, Message, MessageReactionCountUpdated, MessageReactionUpdated, OrderInfo,
    PaidMediaPurchased, Poll, PollAnswer, PreCheckoutQuery, ShippingAddress, ShippingQuery,
    UPDATE_KINDS, Update, UpdateKind, User,
};

/// Re-exported so every crate shares one cancellation primitive.
pub use tokio_util::sync::CancellationToken;
