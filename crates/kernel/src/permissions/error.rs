//! Authorization errors.

use thiserror::Error;

use super::{GroupId, UserId};

/// Errors surfaced by permission resolution.
///
/// Collaborator failures are never folded into a permissive or restrictive
/// default; callers always see one of these.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Non-positive user or group identifier. Rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Resolving the user's group memberships failed.
    #[error("group membership lookup failed for user {user_id}")]
    LookupFailed {
        user_id: UserId,
        #[source]
        source: anyhow::Error,
    },

    /// At least one per-group permission fetch failed or timed out.
    /// Carries the first observed cause.
    #[error("permission aggregation failed at group {group_id}")]
    AggregationFailed {
        group_id: GroupId,
        #[source]
        source: anyhow::Error,
    },

    /// A required collaborator was not configured.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(&'static str),
}

impl AuthzError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthzError::InvalidArgument(_) => "invalid_argument",
            AuthzError::LookupFailed { .. } => "lookup_failed",
            AuthzError::AggregationFailed { .. } => "aggregation_failed",
            AuthzError::DependencyUnavailable(_) => "dependency_unavailable",
        }
    }

    pub(crate) fn invalid_user(user_id: UserId) -> Self {
        AuthzError::InvalidArgument(format!("user id must be positive, got {user_id}"))
    }

    pub(crate) fn invalid_group(group_id: GroupId) -> Self {
        AuthzError::InvalidArgument(format!("group id must be positive, got {group_id}"))
    }
}

/// Result type alias using AuthzError.
pub type AuthzResult<T> = Result<T, AuthzError>;
