//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use redis::Client as RedisClient;
use sqlx::PgPool;
use tracing::info;

use crate::cache::CacheLayer;
use crate::config::Config;
use crate::db;
use crate::menu::MenuTreeBuilder;
use crate::metrics::Metrics;
use crate::permissions::{
    CachedPermissionStore, PermissionAggregator, PgGroupDirectory, PgPermissionSource,
};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// PostgreSQL connection pool.
    db: PgPool,

    /// Redis client, used for health checks and the L2 cache.
    redis: Option<RedisClient>,

    /// Cached group permission maps.
    store: CachedPermissionStore,

    /// Effective permission resolution.
    aggregator: PermissionAggregator,

    /// Permission-gated menu construction.
    menus: MenuTreeBuilder,

    /// Prometheus metrics.
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create new application state, connecting to PostgreSQL and Redis.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = db::create_pool(config).await?;

        let redis = RedisClient::open(config.redis_url.as_str())
            .context("failed to create Redis client")?;

        // Test Redis connection
        let mut conn = redis
            .get_multiplexed_async_connection()
            .await
            .context("failed to connect to Redis")?;

        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .context("Redis PING failed")?;

        let l2 = config.cache_l2_enabled.then(|| redis.clone());
        let cache = CacheLayer::new(l2, config.cache_settings());
        info!(l2 = cache.has_l2(), "permission cache ready");

        let metrics = Arc::new(Metrics::new());

        let store = CachedPermissionStore::builder()
            .with_source(Arc::new(PgPermissionSource::new(db.clone())))
            .with_cache(cache)
            .with_metrics(metrics.clone())
            .build()?;

        let aggregator = PermissionAggregator::builder()
            .with_membership(Arc::new(PgGroupDirectory::new(db.clone())))
            .with_store(Arc::new(store.clone()))
            .with_fetch_timeout(config.permission_fetch_timeout)
            .with_guest_group(config.guest_group_id)
            .with_metrics(metrics.clone())
            .build()?;

        info!(
            fetch_timeout_ms = config.permission_fetch_timeout.as_millis() as u64,
            guest_group = ?config.guest_group_id,
            "permission aggregator ready"
        );

        Ok(Self::from_parts(
            db,
            Some(redis),
            store,
            aggregator,
            config.menu_max_depth,
            metrics,
        ))
    }

    /// Assemble state from already constructed services.
    pub fn from_parts(
        db: PgPool,
        redis: Option<RedisClient>,
        store: CachedPermissionStore,
        aggregator: PermissionAggregator,
        menu_max_depth: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        let menus = MenuTreeBuilder::new(aggregator.clone()).with_max_depth(menu_max_depth);

        Self {
            inner: Arc::new(AppStateInner {
                db,
                redis,
                store,
                aggregator,
                menus,
                metrics,
            }),
        }
    }

    /// Get the database pool.
    pub fn db(&self) -> &PgPool {
        &self.inner.db
    }

    /// Get the permission store.
    pub fn permission_store(&self) -> &CachedPermissionStore {
        &self.inner.store
    }

    /// Get the permission aggregator.
    pub fn permissions(&self) -> &PermissionAggregator {
        &self.inner.aggregator
    }

    /// Get the menu tree builder.
    pub fn menus(&self) -> &MenuTreeBuilder {
        &self.inner.menus
    }

    /// Get the metrics registry.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// Check if PostgreSQL is healthy.
    pub async fn postgres_healthy(&self) -> bool {
        db::check_health(&self.inner.db).await
    }

    /// Check if Redis is healthy.
    pub async fn redis_healthy(&self) -> bool {
        let Some(redis) = &self.inner.redis else {
            return false;
        };

        let Ok(mut conn) = redis.get_multiplexed_async_connection().await else {
            return false;
        };

        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("redis", &self.inner.redis.is_some())
            .field("aggregator", &self.inner.aggregator)
            .finish_non_exhaustive()
    }
}
