//! erpgate test utilities.
//!
//! In-memory collaborators for the permission aggregator and the cached
//! store, with failure and latency injection, plus fixture builders for
//! menu entries and group permission maps.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;

use erpgate_kernel::menu::{MenuEntry, ROOT_PARENT_ID};
use erpgate_kernel::permissions::{
    GroupId, GroupMembershipResolver, GroupPermissionMap, PermissionSource, PermissionState,
    PermissionStore, UserId,
};

/// Build a group permission map from `(permission, state)` pairs.
pub fn group_map(entries: &[(&str, PermissionState)]) -> GroupPermissionMap {
    entries.iter().map(|&(name, state)| (name, state)).collect()
}

/// In-memory user to group directory.
#[derive(Debug, Default)]
pub struct FakeGroupDirectory {
    memberships: HashMap<UserId, Vec<GroupId>>,
    failing_users: HashSet<UserId>,
    calls: AtomicUsize,
}

impl FakeGroupDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the groups of `user_id`, in the order they are returned.
    pub fn with_member(mut self, user_id: UserId, group_ids: &[GroupId]) -> Self {
        self.memberships.insert(user_id, group_ids.to_vec());
        self
    }

    /// Make lookups for `user_id` fail.
    pub fn failing_for(mut self, user_id: UserId) -> Self {
        self.failing_users.insert(user_id);
        self
    }

    /// Number of lookups performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GroupMembershipResolver for FakeGroupDirectory {
    async fn resolve_group_ids(&self, user_id: UserId) -> Result<Vec<GroupId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_users.contains(&user_id) {
            return Err(anyhow!("directory unavailable for user {user_id}"));
        }

        Ok(self.memberships.get(&user_id).cloned().unwrap_or_default())
    }
}

/// Per-group fixture shared by the fake store and the fake source.
#[derive(Debug, Default)]
struct GroupFixtures {
    maps: HashMap<GroupId, GroupPermissionMap>,
    failing: HashSet<GroupId>,
    delays: HashMap<GroupId, Duration>,
    calls: Mutex<Vec<GroupId>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    completed: AtomicUsize,
}

impl GroupFixtures {
    async fn load(&self, group_id: GroupId) -> Result<GroupPermissionMap> {
        self.calls.lock().push(group_id);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delays.get(&group_id) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing.contains(&group_id) {
            return Err(anyhow!("permission backend failed for group {group_id}"));
        }

        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(self.maps.get(&group_id).cloned().unwrap_or_default())
    }
}

/// Decrements the in-flight counter when a fetch ends or is aborted.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

macro_rules! fixture_builder {
    ($ty:ident) => {
        impl $ty {
            pub fn new() -> Self {
                Self::default()
            }

            /// Serve `map` for `group_id`.
            pub fn with_group(mut self, group_id: GroupId, map: GroupPermissionMap) -> Self {
                self.fixtures.maps.insert(group_id, map);
                self
            }

            /// Make fetches of `group_id` fail.
            pub fn failing_for(mut self, group_id: GroupId) -> Self {
                self.fixtures.failing.insert(group_id);
                self
            }

            /// Sleep `delay` before answering for `group_id`.
            pub fn with_delay(mut self, group_id: GroupId, delay: Duration) -> Self {
                self.fixtures.delays.insert(group_id, delay);
                self
            }

            /// Every group id requested so far, in call order.
            pub fn calls(&self) -> Vec<GroupId> {
                self.fixtures.calls.lock().clone()
            }

            /// Number of fetches performed so far.
            pub fn call_count(&self) -> usize {
                self.fixtures.calls.lock().len()
            }

            /// Fetches that ran to a successful end.
            pub fn completed(&self) -> usize {
                self.fixtures.completed.load(Ordering::SeqCst)
            }

            /// Highest number of fetches observed running at once.
            pub fn peak_concurrency(&self) -> usize {
                self.fixtures.peak_in_flight.load(Ordering::SeqCst)
            }
        }
    };
}

/// In-memory [`PermissionStore`] for aggregator tests.
#[derive(Debug, Default)]
pub struct FakePermissionStore {
    fixtures: GroupFixtures,
}

fixture_builder!(FakePermissionStore);

#[async_trait]
impl PermissionStore for FakePermissionStore {
    async fn fetch_group_permissions(&self, group_id: GroupId) -> Result<Arc<GroupPermissionMap>> {
        self.fixtures.load(group_id).await.map(Arc::new)
    }
}

/// In-memory [`PermissionSource`] for cached store tests.
#[derive(Debug, Default)]
pub struct FakePermissionSource {
    fixtures: GroupFixtures,
}

fixture_builder!(FakePermissionSource);

#[async_trait]
impl PermissionSource for FakePermissionSource {
    async fn load_group_permissions(&self, group_id: GroupId) -> Result<GroupPermissionMap> {
        self.fixtures.load(group_id).await
    }
}

/// Start a menu entry fixture. It belongs to menu 1 and sits at the root.
pub fn menu_entry(id: i64, title: &str) -> TestMenuEntry {
    TestMenuEntry {
        entry: MenuEntry {
            id,
            menu_id: 1,
            parent_id: ROOT_PARENT_ID,
            title: title.to_string(),
            event_name: format!("open_{}", title.to_lowercase().replace(' ', "_")),
            shortcut: String::new(),
            order: 0,
            login_required: false,
            required_permissions: Vec::new(),
        },
    }
}

/// A menu entry builder for test fixtures.
#[derive(Debug, Clone)]
pub struct TestMenuEntry {
    entry: MenuEntry,
}

impl TestMenuEntry {
    /// Place under `parent_id`.
    pub fn under(mut self, parent_id: i64) -> Self {
        self.entry.parent_id = parent_id;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.entry.order = order;
        self
    }

    pub fn with_shortcut(mut self, shortcut: &str) -> Self {
        self.entry.shortcut = shortcut.to_string();
        self
    }

    pub fn with_event(mut self, event_name: &str) -> Self {
        self.entry.event_name = event_name.to_string();
        self
    }

    /// Require any one of `permissions`.
    pub fn requires(mut self, permissions: &[&str]) -> Self {
        self.entry.required_permissions = permissions.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Hide from anonymous callers.
    pub fn login_required(mut self) -> Self {
        self.entry.login_required = true;
        self
    }

    pub fn build(self) -> MenuEntry {
        self.entry
    }
}

impl From<TestMenuEntry> for MenuEntry {
    fn from(value: TestMenuEntry) -> Self {
        value.build()
    }
}
