//! Liveness probe for the authorization gateway.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    postgres: bool,
    redis: bool,
}

impl HealthResponse {
    fn new(postgres: bool, redis: bool) -> (StatusCode, Self) {
        let healthy = postgres && redis;
        let code = if healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        let status = if healthy { "healthy" } else { "unhealthy" };

        (
            code,
            Self {
                status,
                postgres,
                redis,
            },
        )
    }
}

/// GET /health: 200 when both backing stores answer, 503 otherwise.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (postgres, redis) = tokio::join!(state.postgres_healthy(), state.redis_healthy());
    let (code, body) = HealthResponse::new(postgres, redis);
    (code, Json(body))
}

/// Create the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhealthy_when_any_store_is_down() {
        assert_eq!(HealthResponse::new(true, true).0, StatusCode::OK);
        assert_eq!(
            HealthResponse::new(true, false).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        let (_, body) = HealthResponse::new(false, true);
        assert_eq!(body.status, "unhealthy");
    }
}
