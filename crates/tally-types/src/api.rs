use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// -- Chats --

/// Body for sending a message. Exactly one of `receiver_id` / `group_id`
/// must be set; the handler rejects anything else before touching storage.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub sender_id: i64,
    pub message: String,
    pub receiver_id: Option<i64>,
    pub group_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
}

// -- Unseen counts --

/// Per-counterpart and per-group unseen tallies for one user.
/// Map keys serialize as strings, matching the JSON wire format.
#[derive(Debug, Serialize, Deserialize)]
pub struct UnseenAllResponse {
    pub personal_chats: HashMap<i64, i64>,
    pub group_chats: HashMap<i64, i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnseenCountResponse {
    pub unseen_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkPersonalSeenRequest {
    pub sender_id: i64,
    pub receiver_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkGroupSeenRequest {
    pub user_id: i64,
    pub group_id: i64,
}

// -- Groups --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub name: String,
    pub creator_id: i64,
    #[serde(default)]
    pub member_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateGroupResponse {
    pub success: bool,
    pub group_id: i64,
}

/// Generic `{success: true}` body for mutations with nothing else to say.
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub success: bool,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
