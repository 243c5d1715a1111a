//! Permission states and their veto-strength ordering.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The state a group assigns to a single permission.
///
/// Variants are declared weakest first so the derived `Ord` is the
/// veto-strength order: `Never > Allow > Disallow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PermissionState {
    Disallow,
    Allow,
    Never,
}

impl PermissionState {
    /// Combine two contributions for the same permission name.
    ///
    /// Commutative, associative and idempotent.
    pub fn merge(self, other: Self) -> Self {
        self.max(other)
    }

    /// Storage code used by the `group_permissions.state` column.
    pub fn code(self) -> i16 {
        match self {
            PermissionState::Disallow => 0,
            PermissionState::Allow => 1,
            PermissionState::Never => 2,
        }
    }

    /// Decode a storage code. Unknown codes are rejected rather than guessed.
    pub fn from_code(code: i16) -> Result<Self, UnknownPermissionState> {
        match code {
            0 => Ok(PermissionState::Disallow),
            1 => Ok(PermissionState::Allow),
            2 => Ok(PermissionState::Never),
            other => Err(UnknownPermissionState(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionState::Disallow => "DISALLOW",
            PermissionState::Allow => "ALLOW",
            PermissionState::Never => "NEVER",
        }
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionState {
    type Err = UnknownPermissionState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DISALLOW" => Ok(PermissionState::Disallow),
            "ALLOW" => Ok(PermissionState::Allow),
            "NEVER" => Ok(PermissionState::Never),
            _ => Err(UnknownPermissionState(s.to_string())),
        }
    }
}

/// A stored or serialized permission state that is not one of the three known values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission state: {0}")]
pub struct UnknownPermissionState(pub String);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    use PermissionState::{Allow, Disallow, Never};

    #[test]
    fn veto_strength_order() {
        assert!(Never > Allow);
        assert!(Allow > Disallow);
        assert!(Never > Disallow);
    }

    #[test]
    fn merge_table() {
        let all = [Disallow, Allow, Never];
        for a in all {
            for b in all {
                let expected = if a == Never || b == Never {
                    Never
                } else if a == Allow || b == Allow {
                    Allow
                } else {
                    Disallow
                };
                assert_eq!(a.merge(b), expected, "{a} + {b}");
                assert_eq!(a.merge(b), b.merge(a), "commutative for {a}, {b}");
            }
            assert_eq!(a.merge(a), a, "idempotent for {a}");
        }
    }

    #[test]
    fn storage_codes() {
        for state in [Disallow, Allow, Never] {
            assert_eq!(PermissionState::from_code(state.code()).unwrap(), state);
        }
        assert!(PermissionState::from_code(3).is_err());
        assert!(PermissionState::from_code(-1).is_err());
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("allow".parse::<PermissionState>().unwrap(), Allow);
        assert_eq!(" Never ".parse::<PermissionState>().unwrap(), Never);
        assert!("maybe".parse::<PermissionState>().is_err());
    }

    #[test]
    fn serializes_as_uppercase_name() {
        assert_eq!(serde_json::to_string(&Never).unwrap(), "\"NEVER\"");
        let parsed: PermissionState = serde_json::from_str("\"DISALLOW\"").unwrap();
        assert_eq!(parsed, Disallow);
    }
}
