use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vote::VoterId;

/// A vote request as received from the chat transport.
///
/// `subject` and `polarity` are raw tokens; intake decides whether they are
/// valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEvent {
    pub voter_id: VoterId,
    pub subject: String,
    pub polarity: String,
    pub received_at: DateTime<Utc>,
}

/// Every inbound chat update the bot reacts to decodes into one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Inbound {
    /// `/start` command: reply with the subject keyboard.
    Start { chat_id: i64 },
    /// Plain message naming a configured subject: reply with vote buttons.
    SubjectChosen { chat_id: i64, subject: String },
    /// Vote button pressed.
    Vote {
        callback_id: String,
        chat_id: Option<i64>,
        message_id: Option<i64>,
        event: VoteEvent,
    },
    /// Callback query that is not a vote; acknowledged and dropped.
    UnknownCallback { callback_id: String },
    /// Anything else.
    Ignored,
}
