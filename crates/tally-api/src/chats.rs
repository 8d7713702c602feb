use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use tally_db::models::{GroupMessageRow, PersonalMessageRow};
use tally_types::api::{SendMessageRequest, SendMessageResponse};
use tally_types::events::{GatewayEvent, RoomId};
use tally_types::models::{ChatMessage, GroupMessage, PersonalMessage};

use crate::error::ApiError;
use crate::{AppState, run_blocking};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: i64,
    pub other_user_id: Option<i64>,
    pub group_id: Option<i64>,
}

/// Where a send request is addressed. Resolved from the request body before
/// anything touches storage.
enum SendTarget {
    Personal(i64),
    Group(i64),
}

fn send_target(req: &SendMessageRequest) -> Result<SendTarget, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::Validation("message is required".into()));
    }

    match (req.receiver_id, req.group_id) {
        (Some(receiver_id), None) => Ok(SendTarget::Personal(receiver_id)),
        (None, Some(group_id)) => Ok(SendTarget::Group(group_id)),
        (Some(_), Some(_)) => Err(ApiError::Validation(
            "receiver_id and group_id are mutually exclusive".into(),
        )),
        (None, None) => Err(ApiError::Validation(
            "either receiver_id or group_id is required".into(),
        )),
    }
}

/// Persist a message, then fan it out to the live rooms.
///
/// The publish happens strictly after the insert committed: an undelivered
/// message is retrievable via history, but a delivered-yet-unstored message
/// must never exist. Fan-out itself is best-effort: rooms with no current
/// subscribers simply drop the event.
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    match send_target(&req)? {
        SendTarget::Personal(receiver_id) => {
            let db = state.clone();
            let sender_id = req.sender_id;
            let body = req.message;
            let row =
                run_blocking(move || db.db.insert_personal_message(sender_id, receiver_id, &body))
                    .await?;

            let message = personal_model(row);
            let chat_id = message.id;
            let event = GatewayEvent::ReceiveMessage {
                message: ChatMessage::Personal(message),
            };

            // Receiver's inbox plus the sender's own, so the sender's other
            // live sessions see the echo.
            let delivered = state.registry.publish(RoomId::User(receiver_id), event.clone()).await
                + state.registry.publish(RoomId::User(sender_id), event).await;
            debug!("personal message {} fanned out to {} connections", chat_id, delivered);

            Ok((
                StatusCode::CREATED,
                Json(SendMessageResponse {
                    success: true,
                    chat_id: Some(chat_id),
                    message_id: None,
                }),
            ))
        }

        SendTarget::Group(group_id) => {
            let db = state.clone();
            if !run_blocking(move || db.db.group_exists(group_id)).await? {
                return Err(ApiError::NotFound(format!("group {} not found", group_id)));
            }

            let db = state.clone();
            let sender_id = req.sender_id;
            let body = req.message;
            let row =
                run_blocking(move || db.db.insert_group_message(group_id, sender_id, &body))
                    .await?;

            let message = group_model(row);
            let message_id = message.id;

            // One publish to the shared room covers every member, the
            // sender included.
            let delivered = state
                .registry
                .publish(
                    RoomId::Group(group_id),
                    GatewayEvent::ReceiveMessage {
                        message: ChatMessage::Group(message),
                    },
                )
                .await;
            debug!("group message {} fanned out to {} connections", message_id, delivered);

            Ok((
                StatusCode::CREATED,
                Json(SendMessageResponse {
                    success: true,
                    chat_id: None,
                    message_id: Some(message_id),
                }),
            ))
        }
    }
}

/// Message history, oldest first. `other_user_id` selects the personal
/// conversation with that user; `group_id` selects a group's channel.
/// Unknown pairs and unknown groups return empty lists, not errors.
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    match (query.other_user_id, query.group_id) {
        (Some(other_user_id), None) => {
            let db = state.clone();
            let user_id = query.user_id;
            let rows =
                run_blocking(move || db.db.personal_history(user_id, other_user_id)).await?;

            let messages: Vec<PersonalMessage> = rows.into_iter().map(personal_model).collect();
            Ok(Json(messages).into_response())
        }

        (None, Some(group_id)) => {
            let db = state.clone();
            let rows = run_blocking(move || db.db.group_history(group_id)).await?;

            let messages: Vec<GroupMessage> = rows.into_iter().map(group_model).collect();
            Ok(Json(messages).into_response())
        }

        (Some(_), Some(_)) => Err(ApiError::Validation(
            "other_user_id and group_id are mutually exclusive".into(),
        )),
        (None, None) => Err(ApiError::Validation(
            "either other_user_id or group_id is required".into(),
        )),
    }
}

fn personal_model(row: PersonalMessageRow) -> PersonalMessage {
    let created_at = parse_created_at(&row.created_at, row.id);
    PersonalMessage {
        id: row.id,
        sender_id: row.sender_id,
        receiver_id: row.receiver_id,
        body: row.body,
        is_seen: row.is_seen,
        created_at,
    }
}

fn group_model(row: GroupMessageRow) -> GroupMessage {
    let created_at = parse_created_at(&row.created_at, row.id);
    GroupMessage {
        id: row.id,
        group_id: row.group_id,
        sender_id: row.sender_id,
        body: row.body,
        created_at,
    }
}

fn parse_created_at(raw: &str, message_id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without
            // timezone. Parse as naive UTC and convert.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on message {}: {}", raw, message_id, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(receiver_id: Option<i64>, group_id: Option<i64>, message: &str) -> SendMessageRequest {
        SendMessageRequest {
            sender_id: 1,
            message: message.into(),
            receiver_id,
            group_id,
        }
    }

    #[test]
    fn target_resolves_personal_and_group() {
        assert!(matches!(
            send_target(&request(Some(2), None, "hi")),
            Ok(SendTarget::Personal(2))
        ));
        assert!(matches!(
            send_target(&request(None, Some(3), "hi")),
            Ok(SendTarget::Group(3))
        ));
    }

    #[test]
    fn target_rejects_ambiguous_or_missing_destination() {
        assert!(matches!(
            send_target(&request(Some(2), Some(3), "hi")),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            send_target(&request(None, None, "hi")),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn target_rejects_blank_message() {
        assert!(matches!(
            send_target(&request(Some(2), None, "   ")),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn sqlite_timestamps_parse_as_utc() {
        let parsed = parse_created_at("2026-03-01 09:30:00", 1);
        assert_eq!(parsed.to_rfc3339(), "2026-03-01T09:30:00+00:00");
    }
}
