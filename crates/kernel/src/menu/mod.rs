//! Menu system for permission-gated navigation.
//!
//! Menus are stored as flat entry rows and rendered per request into the
//! forest the caller may see:
//! - login-required entries are hidden from anonymous callers
//! - entries with required permissions need at least one effective `ALLOW`
//! - a hidden entry hides its whole subtree

mod entry;
mod tree;

pub use entry::{
    CodecError, MenuEntry, PERMISSION_DELIMITER, ROOT_PARENT_ID, decode_permission_list,
    encode_permission_list,
};
pub use tree::{
    DEFAULT_MAX_DEPTH, MenuNode, MenuTreeBuilder, build_with_permissions, is_entry_visible,
};
