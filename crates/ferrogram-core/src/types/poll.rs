//! Polls and poll answers.

use serde::{Deserialize, Serialize};

use super::message::{Chat, User};

/// One answer option of a poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub voter_count: i64,
}

/// A poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub total_voter_count: i64,
    #[serde(default)]
    pub is_closed: bool,
    #[serde(default)]
    pub is_anonymous: bool,
    /// `regular` or `quiz`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub allows_multiple_answers: bool,
}

/// A changed answer in a non-anonymous poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollAnswer {
    pub poll_id: String,
    /// Set when the voter is anonymous.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter_chat: Option<Chat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// Zero-based chosen options; empty if the vote was retracted.
    #[serde(default)]
    pub option_ids: Vec<i64>,
}
