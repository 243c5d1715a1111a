//! Collaborator contracts consumed by the aggregator.
//!
//! Implementations live outside the aggregator so it can be driven by the
//! Postgres-backed collaborators in production and by in-memory fakes in tests.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::map::GroupPermissionMap;
use super::{GroupId, UserId};

/// Resolves which groups a user belongs to.
#[async_trait]
pub trait GroupMembershipResolver: Send + Sync {
    async fn resolve_group_ids(&self, user_id: UserId) -> Result<Vec<GroupId>>;
}

/// Keyed lookup of one group's permission map, usually cache-backed.
///
/// A cache miss must fall through to an authoritative load and still
/// complete the call.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn fetch_group_permissions(&self, group_id: GroupId) -> Result<Arc<GroupPermissionMap>>;
}

/// Authoritative backend behind a [`PermissionStore`] cache.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    async fn load_group_permissions(&self, group_id: GroupId) -> Result<GroupPermissionMap>;
}
