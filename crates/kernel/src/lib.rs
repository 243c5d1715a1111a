//! ERP authorization gateway kernel.
//!
//! Resolves a user's effective permissions from their group memberships and
//! renders the part of a menu tree they are allowed to see. The `erpgate`
//! binary serves both over HTTP.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod menu;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod permissions;
pub mod routes;
pub mod session;
pub mod state;

pub use config::Config;
pub use state::AppState;
