//! Two-tier cache with Moka (L1) and Redis (L2).
//!
//! L1 is per-instance. L2 is shared by every node of the cluster and is
//! optional; without it the cache degrades to L1 only. L2 errors are logged
//! and treated as misses, never as failures.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use redis::AsyncCommands;
use redis::Client as RedisClient;
use tracing::{debug, warn};

/// Default TTL for L1 cache (60 seconds).
pub const L1_TTL_SECS: u64 = 60;

/// Default TTL for L2 cache (5 minutes).
pub const L2_TTL_SECS: u64 = 300;

/// Maximum L1 cache capacity.
const L1_MAX_CAPACITY: u64 = 10_000;

/// Cache tuning.
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub l1_ttl: Duration,
    pub l2_ttl_secs: u64,
    pub l1_max_capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            l1_ttl: Duration::from_secs(L1_TTL_SECS),
            l2_ttl_secs: L2_TTL_SECS,
            l1_max_capacity: L1_MAX_CAPACITY,
        }
    }
}

/// Two-tier cache layer.
///
/// L1 (Moka): In-process, short TTL, per-instance
/// L2 (Redis): Shared across instances, longer TTL
#[derive(Clone)]
pub struct CacheLayer {
    inner: Arc<CacheLayerInner>,
}

struct CacheLayerInner {
    /// L1 in-process cache.
    local: Cache<String, String>,

    /// L2 Redis client, if configured.
    redis: Option<RedisClient>,

    l2_ttl_secs: u64,
}

impl CacheLayer {
    /// Create a new cache layer. Pass `None` to run with L1 only.
    pub fn new(redis: Option<RedisClient>, settings: CacheSettings) -> Self {
        let local = Cache::builder()
            .max_capacity(settings.l1_max_capacity)
            .time_to_live(settings.l1_ttl)
            .support_invalidation_closures()
            .build();

        Self {
            inner: Arc::new(CacheLayerInner {
                local,
                redis,
                l2_ttl_secs: settings.l2_ttl_secs,
            }),
        }
    }

    /// L1-only cache with default settings.
    pub fn local_only() -> Self {
        Self::new(None, CacheSettings::default())
    }

    /// Get a value from cache.
    ///
    /// Checks L1 first, then L2. On L2 hit, populates L1.
    pub async fn get(&self, key: &str) -> Option<String> {
        // Check L1 first
        if let Some(val) = self.inner.local.get(key).await {
            debug!(key = %key, "cache L1 hit");
            return Some(val);
        }

        let redis = self.inner.redis.as_ref()?;

        // Check L2
        let mut conn = match redis.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to get Redis connection for cache");
                return None;
            }
        };

        let val = match conn.get::<_, Option<String>>(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, key = %key, "failed to read cache value from Redis");
                return None;
            }
        };

        if let Some(ref v) = val {
            debug!(key = %key, "cache L2 hit, populating L1");
            self.inner.local.insert(key.to_string(), v.clone()).await;
        }

        val
    }

    /// Set a value in both tiers.
    pub async fn set(&self, key: &str, value: &str) {
        // Set in L1
        self.inner
            .local
            .insert(key.to_string(), value.to_string())
            .await;

        let Some(redis) = self.inner.redis.as_ref() else {
            return;
        };

        // Set in L2 with TTL
        let Ok(mut conn) = redis.get_multiplexed_async_connection().await else {
            warn!("failed to get Redis connection for cache set");
            return;
        };

        let ttl = self.inner.l2_ttl_secs;
        if let Err(e) = conn.set_ex::<_, _, ()>(key, value, ttl).await {
            warn!(error = %e, key = %key, "failed to set cache value in Redis");
            return;
        }

        debug!(key = %key, ttl = %ttl, "cache set");
    }

    /// Invalidate a single cache key.
    pub async fn invalidate(&self, key: &str) {
        // Invalidate L1
        self.inner.local.invalidate(key).await;

        let Some(redis) = self.inner.redis.as_ref() else {
            return;
        };

        // Invalidate L2
        let Ok(mut conn) = redis.get_multiplexed_async_connection().await else {
            warn!("failed to get Redis connection for cache invalidate");
            return;
        };

        if let Err(e) = conn.del::<_, ()>(key).await {
            warn!(error = %e, key = %key, "failed to delete cache key from Redis");
        }

        debug!(key = %key, "cache invalidated");
    }

    /// Invalidate every key starting with `prefix` in both tiers.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        let owned_prefix = prefix.to_string();
        if let Err(e) = self
            .inner
            .local
            .invalidate_entries_if(move |key, _| key.starts_with(&owned_prefix))
        {
            warn!(error = %e, prefix = %prefix, "failed to invalidate L1 entries by prefix");
        }

        let Some(redis) = self.inner.redis.as_ref() else {
            return;
        };

        let Ok(mut conn) = redis.get_multiplexed_async_connection().await else {
            warn!("failed to get Redis connection for prefix invalidation");
            return;
        };

        let pattern = format!("{prefix}*");

        // Use SCAN to find and delete all matching keys
        let mut cursor = 0u64;
        let mut total_deleted = 0usize;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = match redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "SCAN failed during prefix invalidation");
                    break;
                }
            };

            if !keys.is_empty() {
                if let Err(e) = conn.del::<_, ()>(&keys).await {
                    warn!(error = %e, "failed to delete keys from Redis");
                }
                total_deleted += keys.len();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(prefix = %prefix, keys_deleted = %total_deleted, "cache prefix invalidated");
    }

    /// Whether a shared L2 tier is configured.
    pub fn has_l2(&self) -> bool {
        self.inner.redis.is_some()
    }
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("l2", &self.has_l2())
            .finish()
    }
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_set_then_get() {
        let cache = CacheLayer::local_only();
        assert_eq!(cache.get("k").await, None);

        cache.set("k", "v").await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn invalidate_removes_key() {
        let cache = CacheLayer::local_only();
        cache.set("k", "v").await;
        cache.invalidate("k").await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn invalidate_prefix_only_drops_matching_keys() {
        let cache = CacheLayer::local_only();
        cache.set("group-permissions-1", "a").await;
        cache.set("group-permissions-2", "b").await;
        cache.set("other-1", "c").await;

        cache.invalidate_prefix("group-permissions-").await;

        assert_eq!(cache.get("group-permissions-1").await, None);
        assert_eq!(cache.get("group-permissions-2").await, None);
        assert_eq!(cache.get("other-1").await.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn local_only_has_no_l2() {
        let cache = CacheLayer::local_only();
        assert!(!cache.has_l2());
    }
}
