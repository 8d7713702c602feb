use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use tally_types::api::{AckResponse, CreateGroupRequest, CreateGroupResponse};

use crate::error::ApiError;
use crate::{AppState, run_blocking};

/// Create a group with its initial membership. The group row, membership
/// rows and per-member seen markers land in one transaction, so a group
/// never exists half-initialized.
pub async fn create_group(
    State(state): State<AppState>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }

    let db = state.clone();
    let creator_id = req.creator_id;
    let group_id = run_blocking(move || {
        db.db.create_group(&req.name, req.creator_id, &req.member_ids)
    })
    .await?;

    info!("group {} created by user {}", group_id, creator_id);

    Ok((
        StatusCode::CREATED,
        Json(CreateGroupResponse {
            success: true,
            group_id,
        }),
    ))
}

/// Delete a group and everything hanging off it (membership, seen
/// markers, messages, task references) as a single atomic unit.
pub async fn delete_group(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<AckResponse>, ApiError> {
    let db = state.clone();
    let deleted = run_blocking(move || db.db.delete_group(group_id)).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("group {} not found", group_id)));
    }

    info!("group {} deleted", group_id);
    Ok(Json(AckResponse::ok()))
}
