//! HTTP route handlers.

pub mod health;
pub mod menu;
pub mod metrics;
pub mod permissions;

use axum::Router;

use crate::state::AppState;

/// Every gateway route, without session or tracing layers.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(metrics::router())
        .merge(menu::router())
        .merge(permissions::router())
}
