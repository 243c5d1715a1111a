//! Permission inspection and cache administration endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_sessions::Session;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::permissions::{EffectivePermissionMap, GroupId, UserId, is_logged_in};
use crate::session::current_user_id;
use crate::state::AppState;

/// Permission required to manage the permission cache.
pub const ADMIN_PERMISSIONS: &str = "admin.permissions";

#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
    pub user_id: UserId,
    pub permissions: EffectivePermissionMap,
}

/// GET /api/permissions: the caller's effective permission map.
async fn my_permissions(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<PermissionsResponse>> {
    let user_id = current_user_id(&session).await;
    if !is_logged_in(user_id) {
        return Err(AppError::Unauthorized);
    }

    let permissions = state
        .permissions()
        .resolve_effective_permissions(user_id)
        .await?;

    Ok(Json(PermissionsResponse {
        user_id,
        permissions,
    }))
}

/// POST /api/admin/permissions/groups/{group_id}/invalidate
async fn invalidate_group(
    State(state): State<AppState>,
    session: Session,
    Path(group_id): Path<GroupId>,
) -> AppResult<StatusCode> {
    let user_id = require_admin(&state, &session).await?;

    state.permission_store().invalidate_group(group_id).await?;
    info!(user_id, group_id, "group permissions invalidated");

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/permissions/invalidate
async fn invalidate_all(State(state): State<AppState>, session: Session) -> AppResult<StatusCode> {
    let user_id = require_admin(&state, &session).await?;

    state.permission_store().invalidate_all().await;
    info!(user_id, "all group permissions invalidated");

    Ok(StatusCode::NO_CONTENT)
}

async fn require_admin(state: &AppState, session: &Session) -> AppResult<UserId> {
    let user_id = current_user_id(session).await;

    if state
        .permissions()
        .user_has_permission(user_id, ADMIN_PERMISSIONS)
        .await?
    {
        Ok(user_id)
    } else {
        Err(AppError::Forbidden)
    }
}

/// Create the permissions router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/permissions", get(my_permissions))
        .route(
            "/api/admin/permissions/groups/{group_id}/invalidate",
            post(invalidate_group),
        )
        .route("/api/admin/permissions/invalidate", post(invalidate_all))
}
