//! Site administration: account lifecycle.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use std::sync::Arc;

use super::validation::validate_user_id;
use super::{
    ApiError, ApiResponse, AppState, CreateUserRequest, MessageResponse, SetAdminRequest,
    SetPasswordRequest,
};
use crate::domain::Identity;
use crate::services::{NewUser, UserInfo};

/// GET /admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Identity>,
) -> Result<Json<ApiResponse<Vec<UserInfo>>>, ApiError> {
    let users = state.auth.list_users(&actor).await?;
    Ok(Json(ApiResponse::success(users)))
}

/// POST /admin/users
/// Without a password the account is created pending setup and invited.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Identity>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let user = state
        .auth
        .create_user(
            &actor,
            NewUser {
                username: payload.username,
                email: payload.email,
                password: payload.password,
                is_admin: payload.is_admin,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(user)))
}

/// POST /admin/users/{id}/invite
pub async fn invite_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Identity>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let user_id = validate_user_id(id)?;
    state.auth.invite_user(&actor, user_id).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Setup invite sent",
    ))))
}

/// PUT /admin/users/{id}/password
pub async fn set_password(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Identity>,
    Path(id): Path<i32>,
    Json(payload): Json<SetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let user_id = validate_user_id(id)?;
    state
        .auth
        .admin_set_password(&actor, user_id, &payload.new_password)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password updated successfully",
    ))))
}

/// PUT /admin/users/{id}/admin
pub async fn set_admin(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Identity>,
    Path(id): Path<i32>,
    Json(payload): Json<SetAdminRequest>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let user_id = validate_user_id(id)?;
    let user = state
        .auth
        .set_site_admin(&actor, user_id, payload.is_admin)
        .await?;

    Ok(Json(ApiResponse::success(user)))
}

/// DELETE /admin/users/{id}
pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Identity>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let user_id = validate_user_id(id)?;
    state.auth.deactivate_user(&actor, user_id).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "User deactivated",
    ))))
}
