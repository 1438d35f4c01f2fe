//! Callback and inline queries.

use serde::{Deserialize, Serialize};

use super::message::{Message, User};

/// A point on the map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Radius of uncertainty in meters, 0-1500.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_accuracy: Option<f64>,
}

/// An incoming callback query from an inline keyboard button.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackQuery {
    /// Unique identifier for this query.
    pub id: String,
    /// Sender.
    #[serde(default)]
    pub from: User,
    /// Message with the button that originated the query. Inaccessible
    /// messages arrive with `date == 0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_message_id: Option<String>,
    /// Global identifier of the chat the button was sent to.
    #[serde(default)]
    pub chat_instance: String,
    /// Data attached to the button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_short_name: Option<String>,
}

/// An incoming inline query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InlineQuery {
    pub id: String,
    #[serde(default)]
    pub from: User,
    /// Text of the query, up to 256 characters.
    #[serde(default)]
    pub query: String,
    /// Offset of the results to be returned.
    #[serde(default)]
    pub offset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// An inline result chosen by a user and sent to their chat partner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChosenInlineResult {
    pub result_id: String,
    #[serde(default)]
    pub from: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_message_id: Option<String>,
    /// The query that was used to obtain the result.
    #[serde(default)]
    pub query: String,
}
