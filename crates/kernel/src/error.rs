//! Application error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::permissions::AuthzError;

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Authz(#[from] AuthzError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Authz(e) => match e {
                AuthzError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                AuthzError::LookupFailed { .. } | AuthzError::AggregationFailed { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                AuthzError::DependencyUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Collaborator details stay in the logs, not the response body.
        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                "internal server error".to_string()
            }
            AppError::Authz(
                e @ (AuthzError::LookupFailed { .. } | AuthzError::AggregationFailed { .. }),
            ) => {
                tracing::warn!(error = ?e, kind = e.kind(), "permission resolution failed");
                "permissions temporarily unavailable".to_string()
            }
            AppError::Authz(e @ AuthzError::DependencyUnavailable(_)) => {
                tracing::error!(error = %e, "authorization misconfigured");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn authz_errors_map_to_status() {
        let cases = [
            (
                AppError::from(AuthzError::InvalidArgument("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(AuthzError::LookupFailed {
                    user_id: 1,
                    source: anyhow::anyhow!("db down"),
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::from(AuthzError::AggregationFailed {
                    group_id: 2,
                    source: anyhow::anyhow!("timeout"),
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::from(AuthzError::DependencyUnavailable("cache")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn forbidden_and_unauthorized() {
        assert_eq!(AppError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
