use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A direct message between two users. Immutable once stored, except for
/// `is_seen`, which only ever moves false -> true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalMessage {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub body: String,
    pub is_seen: bool,
    pub created_at: DateTime<Utc>,
}

/// A message posted to a group channel. Immutable once stored; unseen
/// tracking for groups lives in per-member markers, not on the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessage {
    pub id: i64,
    pub group_id: i64,
    pub sender_id: i64,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Either kind of chat message, as delivered over the gateway and returned
/// from the history endpoint. Untagged: the presence of `receiver_id` vs
/// `group_id` tells the two apart on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatMessage {
    Personal(PersonalMessage),
    Group(GroupMessage),
}

impl ChatMessage {
    pub fn id(&self) -> i64 {
        match self {
            Self::Personal(m) => m.id,
            Self::Group(m) => m.id,
        }
    }

    pub fn sender_id(&self) -> i64 {
        match self {
            Self::Personal(m) => m.sender_id,
            Self::Group(m) => m.sender_id,
        }
    }
}
