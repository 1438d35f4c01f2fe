//! Chat membership, join requests, boosts, business connections and reactions.

use serde::{Deserialize, Serialize};

use super::message::{Chat, User};

/// A member of a chat.
///
/// The remote models this as one object per status; the status string is
/// kept and status-specific fields are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMember {
    /// `creator`, `administrator`, `member`, `restricted`, `left` or `kicked`.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until_date: Option<i64>,
}

/// A change in the status of a chat member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMemberUpdated {
    #[serde(default)]
    pub chat: Chat,
    /// Performer of the action.
    #[serde(default)]
    pub from: User,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub old_chat_member: ChatMember,
    #[serde(default)]
    pub new_chat_member: ChatMember,
    #[serde(default)]
    pub via_join_request: bool,
}

/// A request to join a chat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatJoinRequest {
    #[serde(default)]
    pub chat: Chat,
    #[serde(default)]
    pub from: User,
    /// Private chat with the requester, valid for 5 minutes.
    #[serde(default)]
    pub user_chat_id: i64,
    #[serde(default)]
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// Source of a chat boost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatBoostSource {
    /// `premium`, `gift_code` or `giveaway`.
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

/// A chat boost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatBoost {
    #[serde(default)]
    pub boost_id: String,
    #[serde(default)]
    pub add_date: i64,
    #[serde(default)]
    pub expiration_date: i64,
    #[serde(default)]
    pub source: ChatBoostSource,
}

/// A boost was added or changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatBoostUpdated {
    #[serde(default)]
    pub chat: Chat,
    #[serde(default)]
    pub boost: ChatBoost,
}

/// A boost was removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatBoostRemoved {
    #[serde(default)]
    pub chat: Chat,
    #[serde(default)]
    pub boost_id: String,
    #[serde(default)]
    pub remove_date: i64,
    #[serde(default)]
    pub source: ChatBoostSource,
}

/// The bot was connected to or disconnected from a business account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessConnection {
    pub id: String,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub user_chat_id: i64,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub is_enabled: bool,
}

/// Messages were deleted from a connected business account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessMessagesDeleted {
    #[serde(default)]
    pub business_connection_id: String,
    #[serde(default)]
    pub chat: Chat,
    #[serde(default)]
    pub message_ids: Vec<i64>,
}

/// A reaction: an emoji, a custom emoji or a paid star reaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactionType {
    /// `emoji`, `custom_emoji` or `paid`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_emoji_id: Option<String>,
}

/// A reaction to a message was changed by a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageReactionUpdated {
    #[serde(default)]
    pub chat: Chat,
    #[serde(default)]
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_chat: Option<Chat>,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub old_reaction: Vec<ReactionType>,
    #[serde(default)]
    pub new_reaction: Vec<ReactionType>,
}

/// How many times a reaction was added.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactionCount {
    #[serde(rename = "type", default)]
    pub reaction_type: ReactionType,
    #[serde(default)]
    pub total_count: i64,
}

/// Anonymous reactions to a message were changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageReactionCountUpdated {
    #[serde(default)]
    pub chat: Chat,
    #[serde(default)]
    pub message_id: i64,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub reactions: Vec<ReactionCount>,
}
