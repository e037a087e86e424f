//! Per-user subscription sets.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::collection::types::ModId;

/// How a mod's subscription changed between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Added,
    Removed,
}

/// The set of mods one user is subscribed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserSubscriptionList {
    mods: BTreeSet<ModId>,
}

impl UserSubscriptionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mod. Returns `true` if it was not subscribed before.
    pub fn add(&mut self, id: ModId) -> bool {
        self.mods.insert(id)
    }

    pub fn remove(&mut self, id: ModId) {
        self.mods.remove(&id);
    }

    pub fn contains(&self, id: ModId) -> bool {
        self.mods.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = ModId> + '_ {
        self.mods.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    /// Changes needed to turn `original` into `updated`.
    ///
    /// Mods present in both snapshots produce no entry.
    pub fn calculate_changes(
        original: &UserSubscriptionList,
        updated: &UserSubscriptionList,
    ) -> BTreeMap<ModId, ChangeType> {
        original
            .mods
            .symmetric_difference(&updated.mods)
            .map(|id| {
                let change = if original.mods.contains(id) {
                    ChangeType::Removed
                } else {
                    ChangeType::Added
                };
                (*id, change)
            })
            .collect()
    }
}

impl FromIterator<ModId> for UserSubscriptionList {
    fn from_iter<I: IntoIterator<Item = ModId>>(iter: I) -> Self {
        Self {
            mods: iter.into_iter().collect(),
        }
    }
}
