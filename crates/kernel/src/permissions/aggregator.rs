//! Effective permission resolution.
//!
//! Resolves a user's groups, fetches every group's permission map
//! concurrently, and reduces them with the veto-strength merge. The join is
//! fail-fast: one failed or timed-out fetch aborts the whole resolution, so a
//! `NEVER` veto held by an unreachable group can never be silently dropped.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::error::{AuthzError, AuthzResult};
use super::map::{EffectivePermissionMap, GroupPermissionMap};
use super::traits::{GroupMembershipResolver, PermissionStore};
use super::{GroupId, UserId, is_logged_in};
use crate::metrics::Metrics;

/// Default per-group fetch deadline.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(2000);

/// Permission aggregator.
///
/// Wrapped in Arc internally so Clone is cheap. Holds no per-user state;
/// concurrent resolutions for different users are independent.
#[derive(Clone)]
pub struct PermissionAggregator {
    inner: Arc<AggregatorInner>,
}

struct AggregatorInner {
    membership: Arc<dyn GroupMembershipResolver>,
    store: Arc<dyn PermissionStore>,
    fetch_timeout: Duration,
    /// Group whose permissions apply to anonymous callers.
    guest_group: Option<GroupId>,
    metrics: Option<Arc<Metrics>>,
}

impl PermissionAggregator {
    /// Start building an aggregator.
    pub fn builder() -> PermissionAggregatorBuilder {
        PermissionAggregatorBuilder::new()
    }

    /// Resolve the effective permission map of a logged-in user.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for `user_id <= 0`, before any I/O
    /// - `LookupFailed` if group membership resolution fails
    /// - `AggregationFailed` if any group fetch fails or times out
    pub async fn resolve_effective_permissions(
        &self,
        user_id: UserId,
    ) -> AuthzResult<EffectivePermissionMap> {
        if user_id <= 0 {
            return Err(AuthzError::invalid_user(user_id));
        }

        self.timed(self.aggregate(user_id)).await
    }

    /// Resolve permissions for whoever is making a request.
    ///
    /// Logged-in users go through [`Self::resolve_effective_permissions`].
    /// Anonymous callers get the guest group's permissions when one is
    /// configured, otherwise an empty map.
    pub async fn resolve_for_viewer(
        &self,
        user_id: UserId,
    ) -> AuthzResult<EffectivePermissionMap> {
        if is_logged_in(user_id) {
            return self.resolve_effective_permissions(user_id).await;
        }

        let Some(guest_group) = self.inner.guest_group else {
            return Ok(EffectivePermissionMap::new());
        };

        self.timed(self.aggregate_guest(guest_group)).await
    }

    /// Check whether the caller's effective state for `permission` is `ALLOW`.
    pub async fn user_has_permission(
        &self,
        user_id: UserId,
        permission: &str,
    ) -> AuthzResult<bool> {
        let effective = self.resolve_for_viewer(user_id).await?;
        Ok(effective.is_allowed(permission))
    }

    /// Run one resolution, recording its outcome and duration.
    async fn timed<F>(&self, resolution: F) -> AuthzResult<EffectivePermissionMap>
    where
        F: Future<Output = AuthzResult<EffectivePermissionMap>>,
    {
        let started = Instant::now();
        let result = resolution.await;

        if let Some(metrics) = &self.inner.metrics {
            let outcome = result.as_ref().map_or_else(AuthzError::kind, |_| "ok");
            metrics.record_aggregation(outcome, started.elapsed().as_secs_f64());
        }

        result
    }

    async fn aggregate_guest(&self, guest_group: GroupId) -> AuthzResult<EffectivePermissionMap> {
        let groups = self.fetch_all(vec![guest_group]).await.inspect_err(|e| {
            warn!(guest_group, error = %e, "guest permission resolution failed");
        })?;

        Ok(EffectivePermissionMap::from_groups(
            groups.iter().map(Arc::as_ref),
        ))
    }

    async fn aggregate(&self, user_id: UserId) -> AuthzResult<EffectivePermissionMap> {
        let group_ids = match self.inner.membership.resolve_group_ids(user_id).await {
            Ok(ids) => ids,
            Err(source) => {
                warn!(user_id, error = %source, "group membership lookup failed");
                return Err(AuthzError::LookupFailed { user_id, source });
            }
        };

        let group_ids = dedup_group_ids(group_ids);
        if let Some(&bad) = group_ids.iter().find(|&&id| id <= 0) {
            return Err(AuthzError::invalid_group(bad));
        }

        let groups = self.fetch_all(group_ids).await.inspect_err(|e| {
            warn!(user_id, error = %e, "permission aggregation failed");
        })?;

        let effective = EffectivePermissionMap::from_groups(groups.iter().map(Arc::as_ref));

        debug!(
            user_id,
            groups = groups.len(),
            permissions = effective.len(),
            "resolved effective permissions"
        );

        Ok(effective)
    }

    /// Fetch every group concurrently. The first failure wins; dropping the
    /// set on early return aborts the fetches still in flight.
    async fn fetch_all(
        &self,
        group_ids: Vec<GroupId>,
    ) -> AuthzResult<Vec<Arc<GroupPermissionMap>>> {
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_group_fetches(group_ids.len() as u64);
        }

        let timeout = self.inner.fetch_timeout;
        let mut tasks = JoinSet::new();
        let mut task_groups = HashMap::with_capacity(group_ids.len());

        for group_id in group_ids {
            let store = Arc::clone(&self.inner.store);
            let handle = tasks.spawn(async move {
                match tokio::time::timeout(timeout, store.fetch_group_permissions(group_id)).await {
                    Ok(fetched) => fetched,
                    Err(_) => Err(anyhow::anyhow!(
                        "permission fetch timed out after {}ms",
                        timeout.as_millis()
                    )),
                }
            });
            task_groups.insert(handle.id(), group_id);
        }

        let mut groups = Vec::with_capacity(task_groups.len());

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, Ok(map))) => groups.push(map),
                Ok((task_id, Err(source))) => {
                    let group_id = task_groups.get(&task_id).copied().unwrap_or_default();
                    return Err(AuthzError::AggregationFailed { group_id, source });
                }
                Err(join_error) => {
                    let group_id = task_groups.get(&join_error.id()).copied().unwrap_or_default();
                    return Err(AuthzError::AggregationFailed {
                        group_id,
                        source: anyhow::anyhow!("permission fetch task failed: {join_error}"),
                    });
                }
            }
        }

        Ok(groups)
    }
}

impl std::fmt::Debug for PermissionAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionAggregator")
            .field("fetch_timeout", &self.inner.fetch_timeout)
            .field("guest_group", &self.inner.guest_group)
            .finish()
    }
}

/// Drop repeated group ids, keeping first-seen order.
fn dedup_group_ids(mut group_ids: Vec<GroupId>) -> Vec<GroupId> {
    let mut seen = HashSet::with_capacity(group_ids.len());
    group_ids.retain(|id| seen.insert(*id));
    group_ids
}

/// Builder for [`PermissionAggregator`].
pub struct PermissionAggregatorBuilder {
    membership: Option<Arc<dyn GroupMembershipResolver>>,
    store: Option<Arc<dyn PermissionStore>>,
    fetch_timeout: Duration,
    guest_group: Option<GroupId>,
    metrics: Option<Arc<Metrics>>,
}

impl PermissionAggregatorBuilder {
    pub fn new() -> Self {
        Self {
            membership: None,
            store: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            guest_group: None,
            metrics: None,
        }
    }

    pub fn with_membership(mut self, membership: Arc<dyn GroupMembershipResolver>) -> Self {
        self.membership = Some(membership);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PermissionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Deadline for each per-group fetch. A fetch exceeding it fails the resolution.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Group whose permissions anonymous callers receive.
    pub fn with_guest_group(mut self, group_id: Option<GroupId>) -> Self {
        self.guest_group = group_id;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// # Errors
    ///
    /// `DependencyUnavailable` if a collaborator is missing, `InvalidArgument`
    /// for a non-positive guest group.
    pub fn build(self) -> AuthzResult<PermissionAggregator> {
        let membership = self
            .membership
            .ok_or(AuthzError::DependencyUnavailable("group membership resolver"))?;
        let store = self
            .store
            .ok_or(AuthzError::DependencyUnavailable("group permission store"))?;

        if let Some(group_id) = self.guest_group
            && group_id <= 0
        {
            return Err(AuthzError::invalid_group(group_id));
        }

        Ok(PermissionAggregator {
            inner: Arc::new(AggregatorInner {
                membership,
                store,
                fetch_timeout: self.fetch_timeout,
                guest_group: self.guest_group,
                metrics: self.metrics,
            }),
        })
    }
}

impl Default for PermissionAggregatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    use anyhow::Result;
    use async_trait::async_trait;

    use crate::permissions::PermissionState;

    struct StaticMembership(Vec<GroupId>);

    #[async_trait]
    impl GroupMembershipResolver for StaticMembership {
        async fn resolve_group_ids(&self, _user_id: UserId) -> Result<Vec<GroupId>> {
            Ok(self.0.clone())
        }
    }

    struct StaticStore(HashMap<GroupId, GroupPermissionMap>);

    #[async_trait]
    impl PermissionStore for StaticStore {
        async fn fetch_group_permissions(
            &self,
            group_id: GroupId,
        ) -> Result<Arc<GroupPermissionMap>> {
            self.0
                .get(&group_id)
                .cloned()
                .map(Arc::new)
                .ok_or_else(|| anyhow::anyhow!("group {group_id} unreachable"))
        }
    }

    fn aggregator(
        groups: Vec<GroupId>,
        store: HashMap<GroupId, GroupPermissionMap>,
    ) -> PermissionAggregator {
        PermissionAggregator::builder()
            .with_membership(Arc::new(StaticMembership(groups)))
            .with_store(Arc::new(StaticStore(store)))
            .build()
            .unwrap()
    }

    fn single(name: &str, state: PermissionState) -> GroupPermissionMap {
        [(name, state)].into_iter().collect()
    }

    #[tokio::test]
    async fn rejects_non_positive_user() {
        let agg = aggregator(vec![], HashMap::new());
        for user_id in [0, -1, -42] {
            let err = agg.resolve_effective_permissions(user_id).await.unwrap_err();
            assert!(matches!(err, AuthzError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn merges_allow_and_disallow() {
        let store = HashMap::from([
            (1, single("perm.X", PermissionState::Allow)),
            (2, single("perm.X", PermissionState::Disallow)),
        ]);
        let agg = aggregator(vec![1, 2], store);

        let effective = agg.resolve_effective_permissions(7).await.unwrap();
        assert_eq!(effective.state("perm.X"), Some(PermissionState::Allow));
    }

    #[tokio::test]
    async fn missing_group_fails_whole_aggregation() {
        let store = HashMap::from([
            (1, single("perm.X", PermissionState::Allow)),
            (3, single("perm.Y", PermissionState::Allow)),
        ]);
        let agg = aggregator(vec![1, 2, 3], store);

        let err = agg.resolve_effective_permissions(7).await.unwrap_err();
        match err {
            AuthzError::AggregationFailed { group_id, .. } => assert_eq!(group_id, 2),
            other => panic!("expected AggregationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn user_without_groups_gets_empty_map() {
        let agg = aggregator(vec![], HashMap::new());
        let effective = agg.resolve_effective_permissions(7).await.unwrap();
        assert!(effective.is_empty());
    }

    #[tokio::test]
    async fn anonymous_viewer_without_guest_group_gets_empty_map() {
        let agg = aggregator(vec![1], HashMap::new());
        let effective = agg.resolve_for_viewer(-1).await.unwrap();
        assert!(effective.is_empty());
    }

    #[tokio::test]
    async fn guest_resolutions_are_recorded() {
        let metrics = Arc::new(Metrics::new());
        let store = HashMap::from([(9, single("menu.public", PermissionState::Allow))]);
        let build = |guest_group| {
            PermissionAggregator::builder()
                .with_membership(Arc::new(StaticMembership(vec![])))
                .with_store(Arc::new(StaticStore(store.clone())))
                .with_guest_group(Some(guest_group))
                .with_metrics(Arc::clone(&metrics))
                .build()
                .unwrap()
        };

        let effective = build(9).resolve_for_viewer(-1).await.unwrap();
        assert!(effective.is_allowed("menu.public"));

        let err = build(4).resolve_for_viewer(-1).await.unwrap_err();
        assert!(matches!(err, AuthzError::AggregationFailed { group_id: 4, .. }));

        let output = metrics.encode();
        assert!(output.contains(r#"permission_aggregations_total{outcome="ok"} 1"#));
        assert!(
            output.contains(r#"permission_aggregations_total{outcome="aggregation_failed"} 1"#)
        );
    }

    #[test]
    fn builder_requires_collaborators() {
        let err = PermissionAggregator::builder().build().unwrap_err();
        assert!(matches!(err, AuthzError::DependencyUnavailable(_)));

        let err = PermissionAggregator::builder()
            .with_membership(Arc::new(StaticMembership(vec![])))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            AuthzError::DependencyUnavailable("group permission store")
        ));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        assert_eq!(dedup_group_ids(vec![3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }
}
