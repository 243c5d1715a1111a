//! Cache-then-source group permission store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::GroupId;
use super::error::{AuthzError, AuthzResult};
use super::map::GroupPermissionMap;
use super::traits::{PermissionSource, PermissionStore};
use crate::cache::CacheLayer;
use crate::metrics::Metrics;

/// Prefix shared by every group permission cache key.
pub const GROUP_PERMISSIONS_KEY_PREFIX: &str = "group-permissions-";

/// Cache key for one group's permission map.
pub fn group_permissions_key(group_id: GroupId) -> String {
    format!("{GROUP_PERMISSIONS_KEY_PREFIX}{group_id}")
}

/// Group permission store backed by [`CacheLayer`] in front of a [`PermissionSource`].
///
/// A miss loads from the source, populates the cache, and returns the
/// loaded map through the same call.
///
/// Invalidation only reaches this node's L1 tier and the shared L2 tier.
/// Other nodes keep serving their L1 copy until its TTL (`CACHE_L1_TTL_SECS`)
/// expires.
#[derive(Clone)]
pub struct CachedPermissionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    source: Arc<dyn PermissionSource>,
    cache: CacheLayer,
    metrics: Option<Arc<Metrics>>,
    /// Bumped by every invalidation. A load that started under an older
    /// generation must not leave its result in the cache.
    generation: AtomicU64,
}

impl CachedPermissionStore {
    pub fn builder() -> CachedPermissionStoreBuilder {
        CachedPermissionStoreBuilder::default()
    }

    /// Drop one group's cached map.
    ///
    /// Call this when a group's permissions change. Other nodes' L1 copies
    /// are not reached and expire on their own TTL.
    pub async fn invalidate_group(&self, group_id: GroupId) -> AuthzResult<()> {
        if group_id <= 0 {
            return Err(AuthzError::invalid_group(group_id));
        }
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner
            .cache
            .invalidate(&group_permissions_key(group_id))
            .await;
        Ok(())
    }

    /// Drop every cached group map, with the same L1 caveat as
    /// [`Self::invalidate_group`].
    pub async fn invalidate_all(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner
            .cache
            .invalidate_prefix(GROUP_PERMISSIONS_KEY_PREFIX)
            .await;
    }

    async fn cached(&self, key: &str) -> Option<GroupPermissionMap> {
        let payload = self.inner.cache.get(key).await?;

        match serde_json::from_str::<GroupPermissionMap>(&payload) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!(key = %key, error = %e, "discarding undecodable cached permission map");
                self.inner.cache.invalidate(key).await;
                None
            }
        }
    }

    /// Cache a freshly loaded map unless an invalidation ran since `loaded_at`.
    ///
    /// The generation is checked again after the write: an invalidation that
    /// lands between the check and the write would otherwise be undone.
    async fn store_loaded(&self, key: &str, map: &GroupPermissionMap, loaded_at: u64) {
        if self.inner.generation.load(Ordering::SeqCst) != loaded_at {
            debug!(key = %key, "permission map invalidated during load, not caching");
            return;
        }

        let payload = match serde_json::to_string(map) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to encode permission map for cache");
                return;
            }
        };

        self.inner.cache.set(key, &payload).await;

        if self.inner.generation.load(Ordering::SeqCst) != loaded_at {
            self.inner.cache.invalidate(key).await;
        }
    }
}

#[async_trait]
impl PermissionStore for CachedPermissionStore {
    async fn fetch_group_permissions(&self, group_id: GroupId) -> Result<Arc<GroupPermissionMap>> {
        if group_id <= 0 {
            return Err(AuthzError::invalid_group(group_id).into());
        }

        let key = group_permissions_key(group_id);

        if let Some(map) = self.cached(&key).await {
            if let Some(metrics) = &self.inner.metrics {
                metrics.record_cache_hit();
            }
            return Ok(Arc::new(map));
        }

        if let Some(metrics) = &self.inner.metrics {
            metrics.record_cache_miss();
        }

        let loaded_at = self.inner.generation.load(Ordering::SeqCst);
        let map = self
            .inner
            .source
            .load_group_permissions(group_id)
            .await
            .with_context(|| format!("failed to load permissions for group {group_id}"))?;

        self.store_loaded(&key, &map, loaded_at).await;

        debug!(
            group_id,
            permissions = map.len(),
            "loaded group permissions from source"
        );

        Ok(Arc::new(map))
    }
}

impl std::fmt::Debug for CachedPermissionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedPermissionStore")
            .field("cache", &self.inner.cache)
            .finish()
    }
}

/// Builder for [`CachedPermissionStore`].
#[derive(Default)]
pub struct CachedPermissionStoreBuilder {
    source: Option<Arc<dyn PermissionSource>>,
    cache: Option<CacheLayer>,
    metrics: Option<Arc<Metrics>>,
}

impl CachedPermissionStoreBuilder {
    pub fn with_source(mut self, source: Arc<dyn PermissionSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_cache(mut self, cache: CacheLayer) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// # Errors
    ///
    /// `DependencyUnavailable` if the source or the cache is missing.
    pub fn build(self) -> AuthzResult<CachedPermissionStore> {
        let source = self
            .source
            .ok_or(AuthzError::DependencyUnavailable("group permission source"))?;
        let cache = self
            .cache
            .ok_or(AuthzError::DependencyUnavailable("group permission cache"))?;

        Ok(CachedPermissionStore {
            inner: Arc::new(StoreInner {
                source,
                cache,
                metrics: self.metrics,
                generation: AtomicU64::new(0),
            }),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::permissions::PermissionState;

    #[derive(Default)]
    struct CountingSource {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl PermissionSource for CountingSource {
        async fn load_group_permissions(&self, group_id: GroupId) -> Result<GroupPermissionMap> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok([(format!("perm.{group_id}"), PermissionState::Allow)]
                .into_iter()
                .collect())
        }
    }

    fn store(source: Arc<CountingSource>, cache: CacheLayer) -> CachedPermissionStore {
        CachedPermissionStore::builder()
            .with_source(source)
            .with_cache(cache)
            .build()
            .unwrap()
    }

    #[test]
    fn key_matches_legacy_scheme() {
        assert_eq!(group_permissions_key(17), "group-permissions-17");
    }

    #[tokio::test]
    async fn miss_loads_populates_and_returns() {
        let source = Arc::new(CountingSource::default());
        let cache = CacheLayer::local_only();
        let store = store(Arc::clone(&source), cache.clone());

        let map = store.fetch_group_permissions(5).await.unwrap();
        assert_eq!(map.get("perm.5"), Some(PermissionState::Allow));
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert!(cache.get("group-permissions-5").await.is_some());

        // Second fetch is served from cache.
        store.fetch_group_permissions(5).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn corrupt_cache_entry_is_reloaded() {
        let source = Arc::new(CountingSource::default());
        let cache = CacheLayer::local_only();
        cache.set("group-permissions-9", "not json").await;
        let store = store(Arc::clone(&source), cache);

        let map = store.fetch_group_permissions(9).await.unwrap();
        assert_eq!(map.get("perm.9"), Some(PermissionState::Allow));
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejects_non_positive_group() {
        let source = Arc::new(CountingSource::default());
        let store = store(Arc::clone(&source), CacheLayer::local_only());

        let err = store.fetch_group_permissions(0).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AuthzError>(),
            Some(AuthzError::InvalidArgument(_))
        ));
        assert_eq!(source.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalidate_group_forces_reload() {
        let source = Arc::new(CountingSource::default());
        let store = store(Arc::clone(&source), CacheLayer::local_only());

        store.fetch_group_permissions(3).await.unwrap();
        store.invalidate_group(3).await.unwrap();
        store.fetch_group_permissions(3).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn builder_requires_cache() {
        let err = CachedPermissionStore::builder()
            .with_source(Arc::new(CountingSource::default()))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            AuthzError::DependencyUnavailable("group permission cache")
        ));
    }
}
