//! Telegram payload types.
//!
//! Only the envelope ([`Update`]) and the fields routing and filtering rely on
//! are modelled strictly. Every other field is optional and defaults when the
//! remote omits it, so schema additions on the remote side never break
//! decoding.

pub mod chat;
pub mod message;
pub mod payment;
pub mod poll;
pub mod query;
pub mod update;

pub use chat::{
    BusinessConnection, BusinessMessagesDeleted, ChatBoost, ChatBoostRemoved, ChatBoostSource,
    ChatBoostUpdated, ChatJoinRequest, ChatMember, ChatMemberUpdated, MessageReactionCountUpdated,
    MessageReactionUpdated, ReactionCount, ReactionType,
};
pub use message::{Chat, Message, User};
pub use payment::{OrderInfo, PaidMediaPurchased, PreCheckoutQuery, ShippingAddress, ShippingQuery};
pub use poll::{Poll, PollAnswer, PollOption};
pub use query::{CallbackQuery, ChosenInlineResult, InlineQuery, Location};
pub use update::{UPDATE_KINDS, Update, UpdateKind};
