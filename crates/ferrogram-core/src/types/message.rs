//! Users, chats and messages.

use serde::{Deserialize, Serialize};

/// A Telegram user or bot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier; fits in 52 bits.
    pub id: i64,
    /// True if this user is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// IETF language tag of the user's client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
}

/// A private chat, group, supergroup or channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    /// Unique identifier; fits in 52 bits.
    pub id: i64,
    /// One of `private`, `group`, `supergroup`, `channel`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// True if the supergroup has topics enabled.
    #[serde(default)]
    pub is_forum: bool,
}

/// A message of any kind.
///
/// Media, entities and service fields are not modelled; `text` and `caption`
/// carry what filters look at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier inside the chat; `0` for scheduled messages.
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_thread_id: Option<i64>,
    /// Sender; empty for messages sent to channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    /// Sender when the message was sent on behalf of a chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_chat: Option<Chat>,
    /// Unix time the message was sent.
    #[serde(default)]
    pub date: i64,
    /// Chat the message belongs to.
    #[serde(default)]
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_connection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_signature: Option<String>,
    /// UTF-8 text of a text message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Caption of a media message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// The replied-to message; never carries a nested reply itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    /// Creates a text message in the given chat, mostly useful for tests.
    pub fn text_in(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat: Chat {
                id: chat_id,
                kind: "private".to_string(),
                ..Default::default()
            },
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Returns the chat identifier.
    pub fn chat_id(&self) -> i64 {
        self.chat.id
    }

    /// Returns the message text or, for media messages, the caption.
    pub fn text_or_caption(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }
}
