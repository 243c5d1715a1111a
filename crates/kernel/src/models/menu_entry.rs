//! Menu entry storage.
//!
//! Each row belongs to a menu (`menu_id`) and may point at a parent row.
//! Required permissions are stored as one `|`-separated text column.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::menu::{MenuEntry, decode_permission_list};

/// Raw `menu_entries` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MenuRow {
    pub id: i64,
    pub menu_id: i64,
    pub parent_id: i64,
    pub title: String,
    pub event_name: String,
    pub shortcut: String,
    pub order: i32,
    pub login_required: bool,
    pub permissions: String,
}

impl MenuRow {
    /// Load every row of one menu.
    pub async fn list_by_menu(pool: &PgPool, menu_id: i64) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, MenuRow>(
            r#"
            SELECT id, menu_id, parent_id, title, event_name, shortcut, "order",
                   login_required, permissions
            FROM menu_entries
            WHERE menu_id = $1
            ORDER BY parent_id, "order", id
            "#,
        )
        .bind(menu_id)
        .fetch_all(pool)
        .await
        .context("failed to list menu entries by menu id")?;

        Ok(rows)
    }
}

impl From<MenuRow> for MenuEntry {
    fn from(row: MenuRow) -> Self {
        Self {
            id: row.id,
            menu_id: row.menu_id,
            parent_id: row.parent_id,
            title: row.title,
            event_name: row.event_name,
            shortcut: row.shortcut,
            order: row.order,
            login_required: row.login_required,
            required_permissions: decode_permission_list(&row.permissions),
        }
    }
}

/// Load one menu as domain entries.
pub async fn load_menu(pool: &PgPool, menu_id: i64) -> Result<Vec<MenuEntry>> {
    let rows = MenuRow::list_by_menu(pool, menu_id).await?;
    Ok(rows.into_iter().map(MenuEntry::from).collect())
}
