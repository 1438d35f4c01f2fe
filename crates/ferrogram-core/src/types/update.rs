//! The update envelope.
//!
//! An [`Update`] pairs the remote sequence number with exactly one
//! [`UpdateKind`]. Decoding is lenient per variant: the envelope itself must be
//! an object with an integer `update_id`, but a variant field that fails to
//! decode is logged and skipped instead of failing the whole update.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::warn;

use super::chat::{
    BusinessConnection, BusinessMessagesDeleted, ChatBoostRemoved, ChatBoostUpdated,
    ChatJoinRequest, ChatMemberUpdated, MessageReactionCountUpdated, MessageReactionUpdated,
};
use super::message::Message;
use super::payment::{PaidMediaPurchased, PreCheckoutQuery, ShippingQuery};
use super::poll::{Poll, PollAnswer};
use super::query::{CallbackQuery, ChosenInlineResult, InlineQuery};
use crate::error::DecodeError;

// ============================================================================
// Variants
// ============================================================================

/// Wire names of every known variant, in the order they are tried.
pub const UPDATE_KINDS: &[&str] = &[
    "message",
    "edited_message",
    "channel_post",
    "edited_channel_post",
    "business_connection",
    "business_message",
    "edited_business_message",
    "deleted_business_messages",
    "message_reaction",
    "message_reaction_count",
    "inline_query",
    "chosen_inline_result",
    "callback_query",
    "shipping_query",
    "pre_checkout_query",
    "purchased_paid_media",
    "poll",
    "poll_answer",
    "my_chat_member",
    "chat_member",
    "chat_join_request",
    "chat_boost",
    "removed_chat_boost",
];

/// The populated variant of an [`Update`].
///
/// Payloads are reference counted so every handler invoked for one update
/// shares the same decoded value.
#[derive(Debug, Clone)]
pub enum UpdateKind {
    Message(Arc<Message>),
    EditedMessage(Arc<Message>),
    ChannelPost(Arc<Message>),
    EditedChannelPost(Arc<Message>),
    BusinessConnection(Arc<BusinessConnection>),
    BusinessMessage(Arc<Message>),
    EditedBusinessMessage(Arc<Message>),
    DeletedBusinessMessages(Arc<BusinessMessagesDeleted>),
    MessageReaction(Arc<MessageReactionUpdated>),
    MessageReactionCount(Arc<MessageReactionCountUpdated>),
    InlineQuery(Arc<InlineQuery>),
    ChosenInlineResult(Arc<ChosenInlineResult>),
    CallbackQuery(Arc<CallbackQuery>),
    ShippingQuery(Arc<ShippingQuery>),
    PreCheckoutQuery(Arc<PreCheckoutQuery>),
    PurchasedPaidMedia(Arc<PaidMediaPurchased>),
    Poll(Arc<Poll>),
    PollAnswer(Arc<PollAnswer>),
    MyChatMember(Arc<ChatMemberUpdated>),
    ChatMember(Arc<ChatMemberUpdated>),
    ChatJoinRequest(Arc<ChatJoinRequest>),
    ChatBoost(Arc<ChatBoostUpdated>),
    RemovedChatBoost(Arc<ChatBoostRemoved>),
    /// No known variant decoded. `fields` lists the keys that were present
    /// besides `update_id`.
    Unknown { fields: Vec<String> },
}

impl UpdateKind {
    /// Returns the wire name of this variant, e.g. `"callback_query"`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::EditedMessage(_) => "edited_message",
            Self::ChannelPost(_) => "channel_post",
            Self::EditedChannelPost(_) => "edited_channel_post",
            Self::BusinessConnection(_) => "business_connection",
            Self::BusinessMessage(_) => "business_message",
            Self::EditedBusinessMessage(_) => "edited_business_message",
            Self::DeletedBusinessMessages(_) => "deleted_business_messages",
            Self::MessageReaction(_) => "message_reaction",
            Self::MessageReactionCount(_) => "message_reaction_count",
            Self::InlineQuery(_) => "inline_query",
            Self::ChosenInlineResult(_) => "chosen_inline_result",
            Self::CallbackQuery(_) => "callback_query",
            Self::ShippingQuery(_) => "shipping_query",
            Self::PreCheckoutQuery(_) => "pre_checkout_query",
            Self::PurchasedPaidMedia(_) => "purchased_paid_media",
            Self::Poll(_) => "poll",
            Self::PollAnswer(_) => "poll_answer",
            Self::MyChatMember(_) => "my_chat_member",
            Self::ChatMember(_) => "chat_member",
            Self::ChatJoinRequest(_) => "chat_join_request",
            Self::ChatBoost(_) => "chat_boost",
            Self::RemovedChatBoost(_) => "removed_chat_boost",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Returns true for [`UpdateKind::Unknown`].
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }

    /// Decodes the payload stored under `key`.
    ///
    /// Returns `None` if `key` is not a known variant name.
    fn decode(key: &str, value: Value) -> Option<Result<Self, serde_json::Error>> {
        fn shared<T: DeserializeOwned>(value: Value) -> Result<Arc<T>, serde_json::Error> {
            serde_json::from_value(value).map(Arc::new)
        }

        let kind = match key {
            "message" => shared(value).map(Self::Message),
            "edited_message" => shared(value).map(Self::EditedMessage),
            "channel_post" => shared(value).map(Self::ChannelPost),
            "edited_channel_post" => shared(value).map(Self::EditedChannelPost),
            "business_connection" => shared(value).map(Self::BusinessConnection),
            "business_message" => shared(value).map(Self::BusinessMessage),
            "edited_business_message" => shared(value).map(Self::EditedBusinessMessage),
            "deleted_business_messages" => shared(value).map(Self::DeletedBusinessMessages),
            "message_reaction" => shared(value).map(Self::MessageReaction),
            "message_reaction_count" => shared(value).map(Self::MessageReactionCount),
            "inline_query" => shared(value).map(Self::InlineQuery),
            "chosen_inline_result" => shared(value).map(Self::ChosenInlineResult),
            "callback_query" => shared(value).map(Self::CallbackQuery),
            "shipping_query" => shared(value).map(Self::ShippingQuery),
            "pre_checkout_query" => shared(value).map(Self::PreCheckoutQuery),
            "purchased_paid_media" => shared(value).map(Self::PurchasedPaidMedia),
            "poll" => shared(value).map(Self::Poll),
            "poll_answer" => shared(value).map(Self::PollAnswer),
            "my_chat_member" => shared(value).map(Self::MyChatMember),
            "chat_member" => shared(value).map(Self::ChatMember),
            "chat_join_request" => shared(value).map(Self::ChatJoinRequest),
            "chat_boost" => shared(value).map(Self::ChatBoost),
            "removed_chat_boost" => shared(value).map(Self::RemovedChatBoost),
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// One inbound notification from the remote API.
#[derive(Debug, Clone)]
pub struct Update {
    /// Remote sequence number, strictly increasing.
    pub update_id: i64,
    /// The populated variant.
    pub kind: UpdateKind,
}

impl Update {
    /// Creates an update from its parts.
    pub fn new(update_id: i64, kind: UpdateKind) -> Self {
        Self { update_id, kind }
    }

    /// Shorthand for a text message update, mostly useful for tests.
    pub fn text_message(update_id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        Self::new(
            update_id,
            UpdateKind::Message(Arc::new(Message::text_in(chat_id, text))),
        )
    }

    /// Returns the wire name of the populated variant.
    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    /// Decodes an update from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Decodes an update from a parsed JSON value.
    ///
    /// Fails only if `value` is not an object or lacks an integer
    /// `update_id`. When several variant keys are present the first in
    /// [`UPDATE_KINDS`] order that decodes wins.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let Value::Object(mut map) = value else {
            return Err(DecodeError::Envelope(
                "update is not a JSON object".to_string(),
            ));
        };

        let update_id = map
            .remove("update_id")
            .and_then(|id| id.as_i64())
            .ok_or_else(|| {
                DecodeError::Envelope("missing or non-integer update_id".to_string())
            })?;

        for key in UPDATE_KINDS {
            let Some(payload) = map.remove(*key) else {
                continue;
            };
            if payload.is_null() {
                continue;
            }
            match UpdateKind::decode(key, payload) {
                Some(Ok(kind)) => return Ok(Self { update_id, kind }),
                Some(Err(error)) => {
                    warn!(update_id, field = *key, %error, "Skipping undecodable update field");
                }
                None => {}
            }
        }

        Ok(Self {
            update_id,
            kind: UpdateKind::Unknown {
                fields: remaining_keys(&map),
            },
        })
    }
}

fn remaining_keys(map: &Map<String, Value>) -> Vec<String> {
    map.keys().cloned().collect()
}

impl<'de> Deserialize<'de> for Update {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Update {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("update_id", &self.update_id)?;
        let name = self.kind.name();
        match &self.kind {
            UpdateKind::Message(p)
            | UpdateKind::EditedMessage(p)
            | UpdateKind::ChannelPost(p)
            | UpdateKind::EditedChannelPost(p)
            | UpdateKind::BusinessMessage(p)
            | UpdateKind::EditedBusinessMessage(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::BusinessConnection(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::DeletedBusinessMessages(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::MessageReaction(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::MessageReactionCount(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::InlineQuery(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::ChosenInlineResult(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::CallbackQuery(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::ShippingQuery(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::PreCheckoutQuery(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::PurchasedPaidMedia(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::Poll(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::PollAnswer(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::MyChatMember(p) | UpdateKind::ChatMember(p) => {
                map.serialize_entry(name, &**p)?
            }
            UpdateKind::ChatJoinRequest(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::ChatBoost(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::RemovedChatBoost(p) => map.serialize_entry(name, &**p)?,
            UpdateKind::Unknown { .. } => {}
        }
        map.end()
    }
}
