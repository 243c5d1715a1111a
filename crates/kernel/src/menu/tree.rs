//! Permission-gated menu tree construction.
//!
//! Entries are indexed by parent once, then walked depth-first from the
//! roots. A node that fails the visibility gate is skipped together with its
//! whole subtree; its children are never visited.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::entry::{MenuEntry, ROOT_PARENT_ID};
use crate::permissions::{
    AuthzResult, EffectivePermissionMap, PermissionAggregator, UserId, is_logged_in,
};

/// Default maximum nesting depth of a rendered menu.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// One visible menu node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuNode {
    pub title: String,
    pub event: String,
    pub shortcut: String,
    pub order: i32,
    pub submenus: Vec<MenuNode>,
}

impl MenuNode {
    fn from_entry(entry: &MenuEntry, submenus: Vec<MenuNode>) -> Self {
        Self {
            title: entry.title.clone(),
            event: entry.event_name.clone(),
            shortcut: entry.shortcut.clone(),
            order: entry.order,
            submenus,
        }
    }
}

/// Whether a single entry passes the login and permission checks.
///
/// Multiple required permissions are OR-ed: any one effective `ALLOW` suffices.
pub fn is_entry_visible(
    entry: &MenuEntry,
    logged_in: bool,
    permissions: &EffectivePermissionMap,
) -> bool {
    if entry.login_required && !logged_in {
        return false;
    }

    entry.required_permissions.is_empty()
        || permissions.allows_any(entry.required_permissions.as_slice())
}

/// Builds the menu forest a user may see.
#[derive(Debug, Clone)]
pub struct MenuTreeBuilder {
    aggregator: PermissionAggregator,
    max_depth: usize,
}

impl MenuTreeBuilder {
    pub fn new(aggregator: PermissionAggregator) -> Self {
        Self {
            aggregator,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limit nesting depth. Entries below the limit are omitted.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Build the visible forest for `user_id`.
    ///
    /// Permissions are resolved once for the whole build. A user id `<= 0`
    /// is treated as an anonymous caller.
    ///
    /// # Errors
    ///
    /// Propagates `LookupFailed` / `AggregationFailed` from permission
    /// resolution. An entry list with no visible roots is an empty forest.
    pub async fn build_visible_menu(
        &self,
        user_id: UserId,
        entries: &[MenuEntry],
    ) -> AuthzResult<Vec<MenuNode>> {
        let permissions = self.aggregator.resolve_for_viewer(user_id).await?;

        let forest = build_with_permissions(
            is_logged_in(user_id),
            &permissions,
            entries,
            self.max_depth,
        );

        debug!(
            user_id,
            entries = entries.len(),
            roots = forest.len(),
            "built visible menu"
        );

        Ok(forest)
    }
}

/// Build the visible forest from an already resolved permission map.
pub fn build_with_permissions(
    logged_in: bool,
    permissions: &EffectivePermissionMap,
    entries: &[MenuEntry],
    max_depth: usize,
) -> Vec<MenuNode> {
    let walk = TreeWalk {
        children: index_by_parent(entries),
        logged_in,
        permissions,
        max_depth,
    };

    let mut emitted = HashSet::with_capacity(entries.len());
    walk.build_level(ROOT_PARENT_ID, 0, &mut emitted)
}

/// Map each parent id to its direct children, ordered by `order` then `id`.
///
/// Entries with a non-positive id are dropped: walking their children would
/// re-enter the root level.
fn index_by_parent(entries: &[MenuEntry]) -> HashMap<i64, Vec<&MenuEntry>> {
    let mut children: HashMap<i64, Vec<&MenuEntry>> = HashMap::new();
    for entry in entries {
        if entry.id <= 0 {
            warn!(id = entry.id, title = %entry.title, "skipping menu entry with invalid id");
            continue;
        }
        children.entry(entry.parent_id).or_default().push(entry);
    }
    for siblings in children.values_mut() {
        siblings.sort_by_key(|e| (e.order, e.id));
    }
    children
}

struct TreeWalk<'a> {
    children: HashMap<i64, Vec<&'a MenuEntry>>,
    logged_in: bool,
    permissions: &'a EffectivePermissionMap,
    max_depth: usize,
}

impl TreeWalk<'_> {
    fn build_level(
        &self,
        parent_id: i64,
        depth: usize,
        emitted: &mut HashSet<i64>,
    ) -> Vec<MenuNode> {
        let Some(siblings) = self.children.get(&parent_id) else {
            return Vec::new();
        };

        if depth >= self.max_depth {
            warn!(
                parent_id,
                omitted = siblings.len(),
                max_depth = self.max_depth,
                "menu nesting exceeds maximum depth"
            );
            return Vec::new();
        }

        let mut nodes = Vec::with_capacity(siblings.len());

        for entry in siblings {
            if !is_entry_visible(entry, self.logged_in, self.permissions) {
                continue;
            }

            // Duplicate ids or a cycle through the root would revisit an entry.
            if !emitted.insert(entry.id) {
                warn!(id = entry.id, "menu entry reached twice, skipping");
                continue;
            }

            let submenus = self.build_level(entry.id, depth + 1, emitted);
            nodes.push(MenuNode::from_entry(entry, submenus));
        }

        nodes
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    use crate::permissions::{GroupPermissionMap, PermissionState};

    fn entry(id: i64, parent_id: i64, order: i32) -> MenuEntry {
        MenuEntry {
            id,
            menu_id: 1,
            parent_id,
            title: format!("Entry {id}"),
            event_name: format!("open_{id}"),
            shortcut: String::new(),
            order,
            login_required: false,
            required_permissions: Vec::new(),
        }
    }

    fn requiring(mut e: MenuEntry, perms: &[&str]) -> MenuEntry {
        e.required_permissions = perms.iter().map(|p| p.to_string()).collect();
        e
    }

    fn perms(entries: &[(&str, PermissionState)]) -> EffectivePermissionMap {
        let group: GroupPermissionMap = entries.iter().map(|(k, v)| (*k, *v)).collect();
        EffectivePermissionMap::from_groups([&group])
    }

    fn titles(nodes: &[MenuNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.title.as_str()).collect()
    }

    #[test]
    fn child_shown_only_with_allow() {
        let entries = vec![entry(1, -1, 0), requiring(entry(2, 1, 0), &["perm.X"])];

        let allow = perms(&[("perm.X", PermissionState::Allow)]);
        let allowed = build_with_permissions(true, &allow, &entries, 32);
        assert_eq!(allowed.len(), 1);
        assert_eq!(titles(&allowed[0].submenus), vec!["Entry 2"]);

        let disallow = perms(&[("perm.X", PermissionState::Disallow)]);
        let denied = build_with_permissions(true, &disallow, &entries, 32);
        assert_eq!(denied.len(), 1);
        assert!(denied[0].submenus.is_empty());
    }

    #[test]
    fn non_positive_ids_are_skipped() {
        let entries = vec![
            entry(-1, -1, 0),
            entry(5, -1, 1),
            entry(0, 5, 0),
            entry(6, 5, 1),
        ];

        let forest = build_with_permissions(true, &EffectivePermissionMap::new(), &entries, 32);
        assert_eq!(titles(&forest), vec!["Entry 5"]);
        assert_eq!(titles(&forest[0].submenus), vec!["Entry 6"]);
    }

    #[test]
    fn hidden_parent_hides_visible_descendants() {
        let entries = vec![
            requiring(entry(1, -1, 0), &["perm.admin"]),
            entry(2, 1, 0),
            entry(3, 2, 0),
            entry(4, -1, 1),
        ];

        let forest = build_with_permissions(true, &EffectivePermissionMap::new(), &entries, 32);
        assert_eq!(titles(&forest), vec!["Entry 4"]);
    }

    #[test]
    fn login_required_hidden_for_anonymous() {
        let mut private = entry(1, -1, 0);
        private.login_required = true;
        let entries = vec![private, entry(2, -1, 1)];

        let anonymous = build_with_permissions(false, &EffectivePermissionMap::new(), &entries, 32);
        assert_eq!(titles(&anonymous), vec!["Entry 2"]);

        let member = build_with_permissions(true, &EffectivePermissionMap::new(), &entries, 32);
        assert_eq!(titles(&member), vec!["Entry 1", "Entry 2"]);
    }

    #[test]
    fn siblings_sorted_by_order_then_id() {
        let entries = vec![
            entry(5, -1, 2),
            entry(3, -1, 1),
            entry(4, -1, 1),
            entry(1, -1, 3),
        ];

        let forest = build_with_permissions(false, &EffectivePermissionMap::new(), &entries, 32);
        assert_eq!(titles(&forest), vec!["Entry 3", "Entry 4", "Entry 5", "Entry 1"]);
    }

    #[test]
    fn any_listed_permission_suffices() {
        let entries = vec![requiring(entry(1, -1, 0), &["perm.A", "perm.B"])];
        let map = perms(&[("perm.A", PermissionState::Never), ("perm.B", PermissionState::Allow)]);

        assert_eq!(build_with_permissions(true, &map, &entries, 32).len(), 1);
    }

    #[test]
    fn depth_limit_truncates() {
        let entries = vec![entry(1, -1, 0), entry(2, 1, 0), entry(3, 2, 0)];

        let forest = build_with_permissions(false, &EffectivePermissionMap::new(), &entries, 2);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].submenus.len(), 1);
        assert!(forest[0].submenus[0].submenus.is_empty());
    }

    #[test]
    fn cycles_unreachable_from_root_are_ignored() {
        let entries = vec![entry(1, -1, 0), entry(2, 3, 0), entry(3, 2, 0)];

        let forest = build_with_permissions(false, &EffectivePermissionMap::new(), &entries, 32);
        assert_eq!(titles(&forest), vec!["Entry 1"]);
        assert!(forest[0].submenus.is_empty());
    }

    #[test]
    fn duplicate_ids_emitted_once() {
        let entries = vec![entry(1, -1, 0), entry(1, -1, 1)];

        let forest = build_with_permissions(false, &EffectivePermissionMap::new(), &entries, 32);
        assert_eq!(forest.len(), 1);
    }

    #[test]
    fn no_visible_roots_is_empty_forest() {
        let entries = vec![requiring(entry(1, -1, 0), &["perm.X"])];
        let forest = build_with_permissions(true, &EffectivePermissionMap::new(), &entries, 32);
        assert!(forest.is_empty());
        assert!(build_with_permissions(true, &EffectivePermissionMap::new(), &[], 32).is_empty());
    }

    #[test]
    fn node_serializes_with_submenus() {
        let entries = vec![entry(1, -1, 4)];
        let forest = build_with_permissions(false, &EffectivePermissionMap::new(), &entries, 32);

        let json = serde_json::to_value(&forest).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "title": "Entry 1",
                "event": "open_1",
                "shortcut": "",
                "order": 4,
                "submenus": []
            }])
        );
    }
}
