//! Configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cache::{CacheSettings, L1_TTL_SECS, L2_TTL_SECS};
use crate::menu::DEFAULT_MAX_DEPTH;
use crate::permissions::{DEFAULT_FETCH_TIMEOUT, GroupId};

/// Upper bound for `MENU_MAX_DEPTH`. The menu walk recurses once per level.
pub const MENU_MAX_DEPTH_LIMIT: usize = 256;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Redis connection URL, used for sessions and the shared L2 cache.
    pub redis_url: String,

    /// Whether group permission maps are also cached in Redis (default: true).
    pub cache_l2_enabled: bool,

    /// In-process cache TTL in seconds (default: 60).
    pub cache_l1_ttl_secs: u64,

    /// Redis cache TTL in seconds (default: 300).
    pub cache_l2_ttl_secs: u64,

    /// Deadline for each per-group permission fetch (default: 2000ms).
    pub permission_fetch_timeout: Duration,

    /// Maximum rendered menu depth (default: 32).
    pub menu_max_depth: usize,

    /// Group whose permissions apply to anonymous callers. Unset means guests
    /// hold no permissions.
    pub guest_group_id: Option<GroupId>,

    /// Cookie SameSite policy: "strict", "lax", or "none" (default: "strict").
    pub cookie_same_site: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = parse_var("PORT", 3000u16).context("PORT must be a valid u16")?;

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = parse_var("DATABASE_MAX_CONNECTIONS", 10u32)
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let cache_l2_enabled = parse_var("CACHE_L2_ENABLED", true)
            .context("CACHE_L2_ENABLED must be true or false")?;

        let cache_l1_ttl_secs = parse_var("CACHE_L1_TTL_SECS", L1_TTL_SECS)
            .context("CACHE_L1_TTL_SECS must be a valid u64")?;

        let cache_l2_ttl_secs = parse_var("CACHE_L2_TTL_SECS", L2_TTL_SECS)
            .context("CACHE_L2_TTL_SECS must be a valid u64")?;

        let fetch_timeout_ms = parse_var(
            "PERMISSION_FETCH_TIMEOUT_MS",
            DEFAULT_FETCH_TIMEOUT.as_millis() as u64,
        )
        .context("PERMISSION_FETCH_TIMEOUT_MS must be a valid u64")?;

        let menu_max_depth = parse_var("MENU_MAX_DEPTH", DEFAULT_MAX_DEPTH)
            .context("MENU_MAX_DEPTH must be a valid usize")
            .and_then(check_menu_max_depth)?;

        let guest_group_id = match env::var("GUEST_GROUP_ID") {
            Ok(v) if !v.trim().is_empty() => {
                let id: GroupId = v
                    .trim()
                    .parse()
                    .context("GUEST_GROUP_ID must be a valid group id")?;
                anyhow::ensure!(id > 0, "GUEST_GROUP_ID must be positive");
                Some(id)
            }
            _ => None,
        };

        let cookie_same_site = env::var("COOKIE_SAME_SITE")
            .unwrap_or_else(|_| "strict".to_string())
            .to_lowercase();

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            redis_url,
            cache_l2_enabled,
            cache_l1_ttl_secs,
            cache_l2_ttl_secs,
            permission_fetch_timeout: Duration::from_millis(fetch_timeout_ms),
            menu_max_depth,
            guest_group_id,
            cookie_same_site,
        })
    }

    /// Cache tuning derived from this configuration.
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            l1_ttl: Duration::from_secs(self.cache_l1_ttl_secs),
            l2_ttl_secs: self.cache_l2_ttl_secs,
            ..CacheSettings::default()
        }
    }
}

fn check_menu_max_depth(depth: usize) -> Result<usize> {
    anyhow::ensure!(
        (1..=MENU_MAX_DEPTH_LIMIT).contains(&depth),
        "MENU_MAX_DEPTH must be between 1 and {MENU_MAX_DEPTH_LIMIT}, got {depth}"
    );
    Ok(depth)
}

/// Read an optional variable, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => Ok(raw.trim().parse::<T>()?),
        Err(_) => Ok(default),
    }
}
