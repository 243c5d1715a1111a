//! Session management using Redis.

use anyhow::{Context, Result};
use fred::prelude::*;
use tower_sessions::cookie::SameSite;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, Session, SessionManagerLayer};
use tower_sessions_redis_store::RedisStore;
use tracing::warn;

use crate::permissions::{GUEST_USER_ID, UserId};

/// Session key for the logged-in user's id.
pub const SESSION_USER_ID: &str = "user_id";

/// Default session expiry (24 hours).
pub const DEFAULT_SESSION_EXPIRY_HOURS: i64 = 24;

/// Create the session layer using Redis as the backend.
pub async fn create_session_layer(
    redis_url: &str,
    same_site: SameSite,
) -> Result<SessionManagerLayer<RedisStore<Pool>>> {
    let config = Config::from_url(redis_url).context("failed to parse Redis URL")?;

    let pool = Builder::from_config(config)
        .build_pool(1)
        .context("failed to create Redis pool")?;

    pool.init()
        .await
        .context("failed to connect to Redis for sessions")?;

    let store = RedisStore::new(pool);

    let session_layer = SessionManagerLayer::new(store)
        .with_secure(true)
        .with_http_only(true)
        .with_same_site(same_site)
        .with_expiry(Expiry::OnInactivity(Duration::hours(
            DEFAULT_SESSION_EXPIRY_HOURS,
        )));

    Ok(session_layer)
}

/// The session's user id, or [`GUEST_USER_ID`] when nobody is logged in.
///
/// A session read error is logged and treated as no session.
pub async fn current_user_id(session: &Session) -> UserId {
    let stored = match session.get::<UserId>(SESSION_USER_ID).await {
        Ok(stored) => stored,
        Err(e) => {
            warn!(error = %e, "failed to read session, treating caller as guest");
            None
        }
    };

    viewer_id(stored)
}

/// Map a stored session value to a viewer id. Non-positive ids are guests.
fn viewer_id(stored: Option<UserId>) -> UserId {
    stored.filter(|id| *id > 0).unwrap_or(GUEST_USER_ID)
}
