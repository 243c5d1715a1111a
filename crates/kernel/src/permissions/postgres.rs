//! Postgres-backed collaborators.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

use super::map::GroupPermissionMap;
use super::traits::{GroupMembershipResolver, PermissionSource};
use super::{GroupId, UserId};
use crate::models::{GroupMember, GroupPermission};

/// Resolves group memberships from `group_members`.
#[derive(Clone, Debug)]
pub struct PgGroupDirectory {
    pool: PgPool,
}

impl PgGroupDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupMembershipResolver for PgGroupDirectory {
    async fn resolve_group_ids(&self, user_id: UserId) -> Result<Vec<GroupId>> {
        GroupMember::list_group_ids(&self.pool, user_id).await
    }
}

/// Loads group permission maps from `group_permissions`.
#[derive(Clone, Debug)]
pub struct PgPermissionSource {
    pool: PgPool,
}

impl PgPermissionSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionSource for PgPermissionSource {
    async fn load_group_permissions(&self, group_id: GroupId) -> Result<GroupPermissionMap> {
        let rows = GroupPermission::list_for_group(&self.pool, group_id).await?;
        GroupPermission::into_map(rows)
    }
}
