//! Group membership and group permission models.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::permissions::{GroupId, GroupPermissionMap, PermissionState, UserId};

/// Membership of a user in a group.
pub struct GroupMember;

impl GroupMember {
    /// List the ids of every group a user belongs to.
    pub async fn list_group_ids(pool: &PgPool, user_id: UserId) -> Result<Vec<GroupId>> {
        let ids = sqlx::query_scalar::<_, GroupId>(
            "SELECT group_id FROM group_members WHERE user_id = $1 ORDER BY group_id",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("failed to list group ids of user")?;

        Ok(ids)
    }
}

/// One row of `group_permissions`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GroupPermission {
    pub group_id: GroupId,
    pub permission: String,
    /// Storage code, see [`PermissionState::code`].
    pub state: i16,
}

impl GroupPermission {
    /// Load the raw permission rows of one group.
    pub async fn list_for_group(pool: &PgPool, group_id: GroupId) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, GroupPermission>(
            "SELECT group_id, permission, state FROM group_permissions WHERE group_id = $1",
        )
        .bind(group_id)
        .fetch_all(pool)
        .await
        .context("failed to list group permissions")?;

        Ok(rows)
    }

    /// Decode rows into a group map. An unknown state code fails the whole
    /// group rather than being dropped.
    pub fn into_map(rows: Vec<Self>) -> Result<GroupPermissionMap> {
        let mut map = GroupPermissionMap::new();
        for row in rows {
            let state = PermissionState::from_code(row.state).with_context(|| {
                format!(
                    "group {} has invalid state for permission {}",
                    row.group_id, row.permission
                )
            })?;
            map.insert(row.permission, state);
        }
        Ok(map)
    }
}
