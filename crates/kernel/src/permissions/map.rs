//! Per-group and effective permission maps.

use std::collections::HashMap;
use std::collections::hash_map;

use serde::{Deserialize, Serialize};

use super::state::PermissionState;

/// The permissions one group expresses an opinion on.
///
/// A missing key means the group is silent on that permission, which is
/// different from an explicit `DISALLOW`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupPermissionMap(HashMap<String, PermissionState>);

impl GroupPermissionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a permission. A later insert for the same name within one group
    /// keeps the stronger state, so duplicate rows cannot weaken a veto.
    pub fn insert(&mut self, permission: impl Into<String>, state: PermissionState) {
        self.0
            .entry(permission.into())
            .and_modify(|existing| *existing = existing.merge(state))
            .or_insert(state);
    }

    pub fn get(&self, permission: &str) -> Option<PermissionState> {
        self.0.get(permission).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, PermissionState)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, PermissionState)> for GroupPermissionMap {
    fn from_iter<I: IntoIterator<Item = (K, PermissionState)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (permission, state) in iter {
            map.insert(permission, state);
        }
        map
    }
}

/// A user's resolved permissions after merging every group they belong to.
///
/// Built fresh for each resolution. Only permissions mentioned by at least
/// one group are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectivePermissionMap(HashMap<String, PermissionState>);

impl EffectivePermissionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduce any number of group maps into one effective map.
    ///
    /// The result depends only on the set of contributed states per key,
    /// never on the iteration order of `groups`.
    pub fn from_groups<'a, I>(groups: I) -> Self
    where
        I: IntoIterator<Item = &'a GroupPermissionMap>,
    {
        let mut effective = Self::new();
        for group in groups {
            effective.merge_group(group);
        }
        effective
    }

    /// Fold one group's contributions in, keeping the strongest state per key.
    pub fn merge_group(&mut self, group: &GroupPermissionMap) {
        for (permission, state) in group.iter() {
            match self.0.entry(permission.to_string()) {
                hash_map::Entry::Occupied(mut slot) => {
                    let merged = slot.get().merge(state);
                    slot.insert(merged);
                }
                hash_map::Entry::Vacant(slot) => {
                    slot.insert(state);
                }
            }
        }
    }

    pub fn state(&self, permission: &str) -> Option<PermissionState> {
        self.0.get(permission).copied()
    }

    /// True only when the effective state is `ALLOW`.
    pub fn is_allowed(&self, permission: &str) -> bool {
        self.state(permission) == Some(PermissionState::Allow)
    }

    /// True when at least one of `permissions` is allowed.
    pub fn allows_any<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        permissions.iter().any(|p| self.is_allowed(p.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, PermissionState)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
