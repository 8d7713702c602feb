use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use tracing::debug;

use tally_types::api::{
    AckResponse, MarkGroupSeenRequest, MarkPersonalSeenRequest, UnseenAllResponse,
    UnseenCountResponse,
};

use crate::error::ApiError;
use crate::{AppState, run_blocking};

#[derive(Debug, Deserialize)]
pub struct UnseenAllQuery {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct GroupUnseenQuery {
    pub user_id: i64,
    pub group_id: i64,
}

/// Badge counts for one user: unseen direct messages per counterpart and
/// flagged groups. Counts are computed from the rows at query time; there
/// is no separate counter to drift out of sync.
pub async fn get_all_unseen(
    State(state): State<AppState>,
    Query(query): Query<UnseenAllQuery>,
) -> Result<Json<UnseenAllResponse>, ApiError> {
    let db = state.clone();
    let user_id = query.user_id;
    let (personal, groups) = run_blocking(move || {
        let personal = db.db.count_unseen_personal(user_id)?;
        let groups = db.db.count_unseen_groups(user_id)?;
        Ok((personal, groups))
    })
    .await?;

    Ok(Json(UnseenAllResponse {
        personal_chats: personal.into_iter().collect(),
        group_chats: groups.into_iter().collect(),
    }))
}

pub async fn get_group_unseen(
    State(state): State<AppState>,
    Query(query): Query<GroupUnseenQuery>,
) -> Result<Json<UnseenCountResponse>, ApiError> {
    let db = state.clone();
    let unseen_count =
        run_blocking(move || db.db.count_unseen_in_group(query.user_id, query.group_id)).await?;

    Ok(Json(UnseenCountResponse { unseen_count }))
}

/// Mark the (sender -> receiver) direction of a conversation seen.
/// Idempotent; repeated calls succeed and change nothing further.
pub async fn mark_personal_seen(
    State(state): State<AppState>,
    Json(req): Json<MarkPersonalSeenRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let db = state.clone();
    let (sender_id, receiver_id) = (req.sender_id, req.receiver_id);
    let changed = run_blocking(move || db.db.mark_personal_seen(sender_id, receiver_id)).await?;
    debug!(
        "marked {} personal messages {} -> {} seen",
        changed, sender_id, receiver_id
    );

    Ok(Json(AckResponse::ok()))
}

pub async fn mark_group_seen(
    State(state): State<AppState>,
    Json(req): Json<MarkGroupSeenRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let db = state.clone();
    let (user_id, group_id) = (req.user_id, req.group_id);
    let changed = run_blocking(move || db.db.mark_group_seen(user_id, group_id)).await?;
    debug!(
        "cleared {} group markers for user {} in group {}",
        changed, user_id, group_id
    );

    Ok(Json(AckResponse::ok()))
}
