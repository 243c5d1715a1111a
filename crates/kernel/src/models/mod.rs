//! Database models.

pub mod group;
pub mod menu_entry;

pub use group::{GroupMember, GroupPermission};
pub use menu_entry::{MenuRow, load_menu};
