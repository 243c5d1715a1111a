//! Menu entry records and the stored permission-list encoding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `parent_id` value of a top-level entry.
pub const ROOT_PARENT_ID: i64 = -1;

/// Separator between permission names in the stored `permissions` column.
pub const PERMISSION_DELIMITER: char = '|';

/// A flat menu record, as loaded from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub id: i64,
    /// Menu this entry belongs to (e.g. the main navigation vs. a toolbar).
    pub menu_id: i64,
    /// Parent entry id, or [`ROOT_PARENT_ID`].
    pub parent_id: i64,
    pub title: String,
    pub event_name: String,
    pub shortcut: String,
    /// Sibling sort key, ascending.
    pub order: i32,
    pub login_required: bool,
    /// The user needs at least one of these. Empty means no permission required.
    pub required_permissions: Vec<String>,
}

impl MenuEntry {
    pub fn is_root(&self) -> bool {
        self.parent_id == ROOT_PARENT_ID
    }
}

/// Errors encoding a permission list for storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("permission name {0:?} contains the list delimiter")]
    DelimiterInName(String),

    #[error("permission name must not be empty")]
    EmptyName,
}

/// Split a stored permission list on the literal delimiter character.
///
/// Segments are trimmed, empty segments dropped, and repeats removed
/// keeping the first occurrence.
pub fn decode_permission_list(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for segment in raw.split(PERMISSION_DELIMITER) {
        let name = segment.trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Join permission names for storage.
pub fn encode_permission_list<S: AsRef<str>>(names: &[S]) -> Result<String, CodecError> {
    let mut encoded = String::new();
    for (i, name) in names.iter().enumerate() {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(CodecError::EmptyName);
        }
        if name.contains(PERMISSION_DELIMITER) {
            return Err(CodecError::DelimiterInName(name.to_string()));
        }
        if i > 0 {
            encoded.push(PERMISSION_DELIMITER);
        }
        encoded.push_str(name);
    }
    Ok(encoded)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn decode_splits_multi_permission_lists() {
        assert_eq!(
            decode_permission_list("menu.admin|menu.reports|menu.audit"),
            vec!["menu.admin", "menu.reports", "menu.audit"]
        );
    }

    #[test]
    fn decode_empty_means_no_requirement() {
        assert!(decode_permission_list("").is_empty());
        assert!(decode_permission_list(" | |").is_empty());
    }

    #[test]
    fn decode_single_name_is_not_split_into_characters() {
        assert_eq!(decode_permission_list("perm.X"), vec!["perm.X"]);
    }

    #[test]
    fn decode_trims_and_dedups() {
        assert_eq!(
            decode_permission_list(" a | b |a|| c "),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn encode_joins_with_delimiter() {
        assert_eq!(
            encode_permission_list(&["menu.admin", "menu.reports"]).unwrap(),
            "menu.admin|menu.reports"
        );
        assert_eq!(encode_permission_list::<&str>(&[]).unwrap(), "");
    }

    #[test]
    fn encode_rejects_delimiter_in_name() {
        assert_eq!(
            encode_permission_list(&["a|b"]).unwrap_err(),
            CodecError::DelimiterInName("a|b".to_string())
        );
        assert_eq!(
            encode_permission_list(&["a", " "]).unwrap_err(),
            CodecError::EmptyName
        );
    }

    #[test]
    fn encoded_list_decodes_to_same_names() {
        let names = vec!["x.one".to_string(), "x.two".to_string()];
        let stored = encode_permission_list(&names).unwrap();
        assert_eq!(decode_permission_list(&stored), names);
    }
}
