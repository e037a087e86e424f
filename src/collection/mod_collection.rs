//! The set of all locally known mods.

use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::collection::entry::ModCollectionEntry;
use crate::collection::persistence::{decode_records, encode_records, StateStore};
use crate::collection::state::ModState;
use crate::collection::subscriptions::UserSubscriptionList;
use crate::collection::types::{ModId, ModMetadata};
use crate::error::Result;

/// Outcome of [`ModCollection::add_or_update_mod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Created,
    Updated,
}

/// Entries keyed by mod id, in insertion order.
///
/// Entries are handed out as shared handles; all structural changes go through
/// the collection.
#[derive(Debug, Clone, Default)]
pub struct ModCollection {
    entries: IndexMap<ModId, Arc<ModCollectionEntry>>,
    default_retries: u8,
}

impl ModCollection {
    pub fn new(default_retries: u8) -> Self {
        Self {
            entries: IndexMap::new(),
            default_retries,
        }
    }

    pub fn default_retries(&self) -> u8 {
        self.default_retries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: ModId) -> Option<Arc<ModCollectionEntry>> {
        self.entries.get(&id).cloned()
    }

    pub fn contains(&self, id: ModId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<ModCollectionEntry>> {
        self.entries.values()
    }

    /// Entries the given user is subscribed to.
    ///
    /// Subscriptions to mods that are not known locally yet are skipped.
    pub fn filter_by_user_subscriptions(&self, subscriptions: &UserSubscriptionList) -> Self {
        let entries = subscriptions
            .iter()
            .filter_map(|id| self.entries.get(&id).map(|entry| (id, Arc::clone(entry))))
            .collect();
        Self {
            entries,
            default_retries: self.default_retries,
        }
    }

    /// Reconcile remote metadata into local state.
    pub fn add_or_update_mod(&mut self, metadata: ModMetadata, path: PathBuf) -> Reconciled {
        match self.entries.get(&metadata.id) {
            Some(entry) => {
                entry.update_profile(metadata);
                Reconciled::Updated
            }
            None => {
                debug!(mod_id = %metadata.id, "Adding mod to collection");
                let id = metadata.id;
                let entry = ModCollectionEntry::new(metadata, path, self.default_retries);
                self.entries.insert(id, Arc::new(entry));
                Reconciled::Created
            }
        }
    }

    /// Remove an entry.
    ///
    /// Only entries waiting for uninstallation are removed unless `force` is set.
    /// Returns whether an entry was removed.
    pub fn remove_mod(&mut self, id: ModId, force: bool) -> bool {
        let Some(entry) = self.entries.get(&id) else {
            return false;
        };
        if entry.state() != ModState::UninstallPending && !force {
            warn!(
                mod_id = %id,
                state = %entry.state(),
                "Refusing to remove mod from collection as it is not pending uninstallation"
            );
            return false;
        }
        self.entries.shift_remove(&id);
        true
    }

    /// Entries ordered for retry scheduling.
    ///
    /// Retryable entries come first, and among those the ones with an untouched
    /// retry budget lead. Order is otherwise insertion order.
    pub fn sort_entries_by_retry_priority(&self) -> Vec<Arc<ModCollectionEntry>> {
        let (eligible, exhausted): (Vec<_>, Vec<_>) = self
            .entries
            .values()
            .cloned()
            .partition(|entry| entry.should_retry());
        let (fresh, retried): (Vec<_>, Vec<_>) = eligible
            .into_iter()
            .partition(|entry| entry.retries_remaining() == entry.default_retries());

        fresh.into_iter().chain(retried).chain(exhausted).collect()
    }

    /// Serialize every entry.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let records: Vec<_> = self.entries.values().map(|entry| entry.to_record()).collect();
        encode_records(&records)
    }

    /// Rebuild a collection from serialized state.
    pub fn from_json(bytes: &[u8], default_retries: u8) -> Result<Self> {
        let mut collection = Self::new(default_retries);
        for record in decode_records(bytes)? {
            let entry = ModCollectionEntry::from_record(record, default_retries);
            collection.entries.insert(entry.id(), Arc::new(entry));
        }
        Ok(collection)
    }

    /// Write the collection to `store`.
    pub fn persist(&self, store: &dyn StateStore) -> Result<()> {
        store.write(&self.to_json()?)
    }

    /// Load the collection from `store`, or start empty if nothing was stored.
    pub fn restore(store: &dyn StateStore, default_retries: u8) -> Result<Self> {
        match store.read()? {
            Some(bytes) => Self::from_json(&bytes, default_retries),
            None => Ok(Self::new(default_retries)),
        }
    }
}
