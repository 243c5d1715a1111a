//! Group-based permission resolution.
//!
//! A user's effective permissions are the veto-strength merge of every
//! group they belong to:
//! - `NEVER` from any group wins outright
//! - otherwise `ALLOW` from any group wins
//! - otherwise the permission is `DISALLOW`
//!
//! Groups that do not mention a permission take no part in its merge.

mod aggregator;
mod error;
mod map;
mod postgres;
mod state;
mod store;
mod traits;

pub use aggregator::{DEFAULT_FETCH_TIMEOUT, PermissionAggregator, PermissionAggregatorBuilder};
pub use error::{AuthzError, AuthzResult};
pub use map::{EffectivePermissionMap, GroupPermissionMap};
pub use postgres::{PgGroupDirectory, PgPermissionSource};
pub use state::{PermissionState, UnknownPermissionState};
pub use store::{CachedPermissionStore, CachedPermissionStoreBuilder, group_permissions_key};
pub use traits::{GroupMembershipResolver, PermissionSource, PermissionStore};

/// User identifier. Values `<= 0` denote an anonymous caller.
pub type UserId = i64;

/// Group identifier. Always positive.
pub type GroupId = i64;

/// Sentinel user id for a caller without a session.
pub const GUEST_USER_ID: UserId = -1;

/// Whether `user_id` identifies a logged-in user.
pub fn is_logged_in(user_id: UserId) -> bool {
    user_id > 0
}
