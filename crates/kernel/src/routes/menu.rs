//! Menu rendering endpoint.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_sessions::Session;

use crate::error::{AppError, AppResult};
use crate::menu::MenuNode;
use crate::models::load_menu;
use crate::session::current_user_id;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MenuResponse {
    pub menu: Vec<MenuNode>,
}

/// GET /api/menus/{menu_id}: the part of a menu the caller may see.
async fn show_menu(
    State(state): State<AppState>,
    session: Session,
    Path(menu_id): Path<i64>,
) -> AppResult<Json<MenuResponse>> {
    if menu_id <= 0 {
        return Err(AppError::BadRequest(format!("invalid menu id {menu_id}")));
    }

    let user_id = current_user_id(&session).await;
    let entries = load_menu(state.db(), menu_id).await?;
    let menu = state.menus().build_visible_menu(user_id, &entries).await?;

    Ok(Json(MenuResponse { menu }))
}

/// Create the menu router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/menus/{menu_id}", get(show_menu))
}
