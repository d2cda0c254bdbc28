use axum::{
    Extension, Json,
    extract::{Path, State},
};
use std::sync::Arc;

use super::validation::{validate_group_id, validate_user_id};
use super::{
    AddMemberRequest, ApiError, ApiResponse, AppState, CreateGroupRequest, MessageResponse,
    SetGroupAdminRequest,
};
use crate::db::{Group, Member};
use crate::domain::Identity;

/// POST /groups
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Identity>,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<Json<ApiResponse<Group>>, ApiError> {
    let group = state.memberships.create_group(&actor, &payload.name).await?;
    Ok(Json(ApiResponse::success(group)))
}

/// GET /groups/{id}/members
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Identity>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<Vec<Member>>>, ApiError> {
    let group = validate_group_id(id)?;
    let members = state.memberships.list_members(&actor, group).await?;
    Ok(Json(ApiResponse::success(members)))
}

/// POST /groups/{id}/members
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Identity>,
    Path(id): Path<i32>,
    Json(payload): Json<AddMemberRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let group = validate_group_id(id)?;
    let user = validate_user_id(payload.user_id.value())?;
    state
        .memberships
        .add_member(&actor, group, user, payload.is_group_admin)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Member added",
    ))))
}

/// PUT /groups/{id}/members/{user_id}
pub async fn set_group_admin(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Identity>,
    Path((id, user_id)): Path<(i32, i32)>,
    Json(payload): Json<SetGroupAdminRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let group = validate_group_id(id)?;
    let user = validate_user_id(user_id)?;
    state
        .memberships
        .set_group_admin(&actor, group, user, payload.is_group_admin)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Membership updated",
    ))))
}

/// DELETE /groups/{id}/members/{user_id}
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Identity>,
    Path((id, user_id)): Path<(i32, i32)>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let group = validate_group_id(id)?;
    let user = validate_user_id(user_id)?;
    state.memberships.remove_member(&actor, group, user).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Member removed",
    ))))
}
