//! Per-mod installation record and its state machine.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::collection::persistence::EntryRecord;
use crate::collection::state::ModState;
use crate::collection::types::{ModId, ModMetadata, UserId};
use crate::error::ErrorCode;

/// Local record of a single mod.
///
/// The identifier and install path are fixed at construction. Everything that
/// other chains may observe sits behind one lock so related fields (such as the
/// state and its rollback snapshot) are always read together.
#[derive(Debug)]
pub struct ModCollectionEntry {
    id: ModId,
    path_on_disk: PathBuf,
    default_retries: u8,
    inner: Mutex<EntryInner>,
}

#[derive(Debug, Clone)]
struct EntryInner {
    state: ModState,
    profile: ModMetadata,
    subscribers: BTreeSet<UserId>,
    size_on_disk: Option<u64>,
    retries_remaining: u8,
    should_not_retry: bool,
    terminal_failure_reason: Option<ErrorCode>,
    rollback_state: Option<ModState>,
}

impl EntryInner {
    fn set_state(&mut self, state: ModState, default_retries: u8) {
        self.state = state;
        if state == ModState::Installed {
            self.retries_remaining = default_retries;
        }
    }

    fn consume_retry(&mut self) {
        self.retries_remaining = self.retries_remaining.saturating_sub(1);
        if self.retries_remaining == 0 {
            self.should_not_retry = true;
        }
    }
}

/// Consistent point-in-time view of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub id: ModId,
    pub state: ModState,
    pub rollback_state: Option<ModState>,
    pub subscriber_count: usize,
    pub retries_remaining: u8,
    pub should_not_retry: bool,
    pub terminal_failure_reason: Option<ErrorCode>,
    pub size_on_disk: Option<u64>,
}

impl ModCollectionEntry {
    /// Create an entry for a newly discovered mod in `InstallationPending`.
    pub fn new(profile: ModMetadata, path_on_disk: PathBuf, default_retries: u8) -> Self {
        Self {
            id: profile.id,
            path_on_disk,
            default_retries,
            inner: Mutex::new(EntryInner {
                state: ModState::InstallationPending,
                profile,
                subscribers: BTreeSet::new(),
                size_on_disk: None,
                retries_remaining: default_retries,
                should_not_retry: false,
                terminal_failure_reason: None,
                rollback_state: None,
            }),
        }
    }

    pub fn id(&self) -> ModId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path_on_disk
    }

    pub fn state(&self) -> ModState {
        self.inner.lock().state
    }

    pub fn profile(&self) -> ModMetadata {
        self.inner.lock().profile.clone()
    }

    pub fn subscribers(&self) -> BTreeSet<UserId> {
        self.inner.lock().subscribers.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub fn retries_remaining(&self) -> u8 {
        self.inner.lock().retries_remaining
    }

    /// Retry budget granted at the start of a session.
    pub fn default_retries(&self) -> u8 {
        self.default_retries
    }

    pub fn terminal_failure_reason(&self) -> Option<ErrorCode> {
        self.inner.lock().terminal_failure_reason
    }

    /// Size of the installed files. Only reported while the mod is installed.
    pub fn size_on_disk(&self) -> Option<u64> {
        let inner = self.inner.lock();
        if inner.state == ModState::Installed {
            inner.size_on_disk
        } else {
            None
        }
    }

    pub fn update_size_on_disk(&self, size: u64) {
        self.inner.lock().size_on_disk = Some(size);
    }

    pub fn snapshot(&self) -> EntrySnapshot {
        let inner = self.inner.lock();
        EntrySnapshot {
            id: self.id,
            state: inner.state,
            rollback_state: inner.rollback_state,
            subscriber_count: inner.subscribers.len(),
            retries_remaining: inner.retries_remaining,
            should_not_retry: inner.should_not_retry,
            terminal_failure_reason: inner.terminal_failure_reason,
            size_on_disk: inner.size_on_disk,
        }
    }

    /// Replace the remote metadata.
    ///
    /// When both the old and the new metadata name a file version and the
    /// versions differ, the entry is marked `UpdatePending` first.
    pub fn update_profile(&self, profile: ModMetadata) {
        let mut inner = self.inner.lock();
        if let (Some(current), Some(incoming)) =
            (inner.profile.file_version(), profile.file_version())
        {
            if current != incoming {
                debug!(mod_id = %self.id, current, incoming, "New file version, marking for update");
                inner.set_state(ModState::UpdatePending, self.default_retries);
            }
        }
        inner.profile = profile;
    }

    /// Add a subscriber and return the new subscriber count.
    ///
    /// A mod waiting for uninstallation stays in `UninstallPending`: the files on
    /// disk cannot be verified yet, so a fresh install is preferred.
    pub fn add_subscriber(&self, user: UserId) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.insert(user);
        inner.subscribers.len()
    }

    /// Remove a subscriber and return the new subscriber count.
    ///
    /// Losing the last subscriber marks the mod for uninstallation.
    pub fn remove_subscriber(&self, user: UserId) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.remove(&user);
        if inner.subscribers.is_empty() {
            inner.state = ModState::UninstallPending;
            info!(mod_id = %self.id, "Reference count now 0, marking for uninstallation");
        }
        inner.subscribers.len()
    }

    /// Mark the entry for uninstallation if nobody is subscribed anymore.
    ///
    /// Used after work that may have overwritten the state set when the last
    /// subscriber left. Returns `true` if the state changed.
    pub fn mark_uninstall_if_unsubscribed(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.subscribers.is_empty() || inner.state == ModState::UninstallPending {
            return false;
        }
        inner.state = ModState::UninstallPending;
        info!(mod_id = %self.id, "No subscribers left after install, marking for uninstallation");
        true
    }

    /// Queue a fresh install once the files of an uninstalled mod are gone,
    /// if subscribers came back in the meantime. Returns `true` if it did.
    pub fn reinstate_if_subscribed(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.subscribers.is_empty() {
            return false;
        }
        inner.state = ModState::InstallationPending;
        inner.size_on_disk = None;
        debug!(mod_id = %self.id, subscribers = inner.subscribers.len(), "Reinstating for new subscribers");
        true
    }

    /// Move directly to `state`. Entering `Installed` refills the retry budget.
    pub fn set_state(&self, state: ModState) {
        self.inner.lock().set_state(state, self.default_retries);
    }

    /// Stop retrying this mod for the rest of the session.
    pub fn mark_no_retry(&self) {
        self.inner.lock().should_not_retry = true;
    }

    /// Allow retries again this session. A terminal failure still blocks them.
    pub fn clear_no_retry(&self) {
        self.inner.lock().should_not_retry = false;
    }

    /// Record why the last attempt on this mod failed.
    pub fn record_failure(&self, reason: ErrorCode) {
        let mut inner = self.inner.lock();
        if inner.state == ModState::UninstallPending {
            if reason.is_deferred_delete() {
                debug!(mod_id = %self.id, %reason, "Deferring uninstall to next session");
                inner.should_not_retry = true;
                return;
            }
            inner.consume_retry();
        } else if reason.is_retryable_install() {
            inner.consume_retry();
        } else if reason.is_unrecoverable_install() {
            warn!(mod_id = %self.id, %reason, "Install failed permanently, mod will not be retried");
            inner.terminal_failure_reason = Some(reason);
        } else {
            inner.should_not_retry = true;
        }
        debug!(
            mod_id = %self.id,
            %reason,
            retries_remaining = inner.retries_remaining,
            should_not_retry = inner.should_not_retry,
            "Recorded failure"
        );
    }

    /// Whether a scheduler should attempt this mod again.
    pub fn should_retry(&self) -> bool {
        let inner = self.inner.lock();
        inner.terminal_failure_reason.is_none() && !inner.should_not_retry
    }

    /// Snapshot the current state as the rollback point.
    ///
    /// Returns `false` (and changes nothing) if a transaction is already open or
    /// the entry is already in a transitional state.
    pub fn begin_transaction(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_transitional() || inner.rollback_state.is_some() {
            warn!(
                mod_id = %self.id,
                state = %inner.state,
                "Beginning transaction while a transaction is already occurring"
            );
            return false;
        }
        inner.rollback_state = Some(inner.state);
        true
    }

    /// Restore the state recorded by [`begin_transaction`](Self::begin_transaction).
    ///
    /// Returns `false` (and changes nothing) when no transaction is open.
    pub fn rollback_transaction(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.rollback_state.take() {
            Some(previous) => {
                inner.state = previous;
                true
            }
            None => {
                warn!(mod_id = %self.id, "Tried to roll back while no transaction was occurring");
                false
            }
        }
    }

    /// Close the open transaction, keeping the current state.
    pub fn commit_transaction(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.rollback_state.take().is_none() {
            warn!(mod_id = %self.id, "Tried to commit while no transaction was occurring");
            return false;
        }
        true
    }

    pub fn has_open_transaction(&self) -> bool {
        self.inner.lock().rollback_state.is_some()
    }

    /// Persistable form of this entry.
    ///
    /// A transitional state is never written as-is: the rollback snapshot is
    /// stored instead, or `InstallationPending` when there is none.
    pub fn to_record(&self) -> EntryRecord {
        let inner = self.inner.lock();
        let state = if inner.state.is_transitional() {
            match inner.rollback_state {
                Some(previous) => previous,
                None => {
                    warn!(
                        mod_id = %self.id,
                        state = %inner.state,
                        "Transitional state without a transaction, saving as InstallationPending"
                    );
                    ModState::InstallationPending
                }
            }
        } else {
            inner.state
        };

        EntryRecord {
            id: self.id,
            profile: inner.profile.clone(),
            subscribers: inner.subscribers.clone(),
            state,
            size_on_disk: inner.size_on_disk,
            path_on_disk: self.path_on_disk.clone(),
            never_retry_code: inner.terminal_failure_reason.map(ErrorCode::code),
            never_retry_category: inner
                .terminal_failure_reason
                .map(|reason| reason.category().id()),
        }
    }

    /// Rebuild an entry from its persisted form.
    ///
    /// Session-scoped fields start fresh; the terminal failure is restored only
    /// when both halves of its `(code, category)` pair are present and known.
    pub fn from_record(record: EntryRecord, default_retries: u8) -> Self {
        let terminal_failure_reason = match (record.never_retry_code, record.never_retry_category) {
            (Some(code), Some(category)) => {
                let restored = ErrorCode::from_parts(code, category);
                if restored.is_none() {
                    warn!(mod_id = %record.id, code, category, "Unknown terminal failure code");
                }
                restored
            }
            _ => None,
        };

        Self {
            id: record.id,
            path_on_disk: record.path_on_disk,
            default_retries,
            inner: Mutex::new(EntryInner {
                state: record.state,
                profile: record.profile,
                subscribers: record.subscribers,
                size_on_disk: record.size_on_disk,
                retries_remaining: default_retries,
                should_not_retry: false,
                terminal_failure_reason,
                rollback_state: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::types::FileInfo;
    use proptest::prelude::*;

    const RETRIES: u8 = 3;

    fn profile(id: u64, version: Option<u64>) -> ModMetadata {
        ModMetadata {
            id: ModId(id),
            name: format!("mod-{id}"),
            file_info: version.map(|metadata_id| FileInfo {
                metadata_id,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn entry() -> ModCollectionEntry {
        ModCollectionEntry::new(profile(7, Some(1)), PathBuf::from("/mods/7"), RETRIES)
    }

    #[test]
    fn test_new_entry_is_installation_pending() {
        let entry = entry();
        assert_eq!(entry.state(), ModState::InstallationPending);
        assert_eq!(entry.retries_remaining(), RETRIES);
        assert!(entry.should_retry());
        assert_eq!(entry.path(), Path::new("/mods/7"));
    }

    #[test]
    fn test_update_profile_new_version_marks_update() {
        let entry = entry();
        entry.set_state(ModState::Installed);
        entry.update_profile(profile(7, Some(2)));
        assert_eq!(entry.state(), ModState::UpdatePending);
        assert_eq!(entry.profile().file_version(), Some(2));
    }

    #[test]
    fn test_update_profile_same_or_missing_version_keeps_state() {
        let entry = entry();
        entry.set_state(ModState::Installed);
        entry.update_profile(profile(7, Some(1)));
        assert_eq!(entry.state(), ModState::Installed);
        entry.update_profile(profile(7, None));
        assert_eq!(entry.state(), ModState::Installed);
        // Old metadata has no version now, so the next change cannot compare.
        entry.update_profile(profile(7, Some(5)));
        assert_eq!(entry.state(), ModState::Installed);
    }

    #[test]
    fn test_removing_last_subscriber_marks_uninstall() {
        let entry = entry();
        assert_eq!(entry.add_subscriber(UserId(1)), 1);
        assert_eq!(entry.remove_subscriber(UserId(1)), 0);
        assert_eq!(entry.state(), ModState::UninstallPending);
    }

    #[test]
    fn test_add_subscriber_is_idempotent_and_keeps_uninstall() {
        let entry = entry();
        entry.add_subscriber(UserId(1));
        assert_eq!(entry.add_subscriber(UserId(1)), 1);
        assert_eq!(entry.add_subscriber(UserId(2)), 2);
        assert_eq!(entry.remove_subscriber(UserId(2)), 1);
        assert_eq!(entry.state(), ModState::InstallationPending);

        entry.remove_subscriber(UserId(1));
        entry.add_subscriber(UserId(3));
        assert_eq!(entry.state(), ModState::UninstallPending);
    }

    #[test]
    fn test_set_installed_resets_retries() {
        let entry = entry();
        entry.record_failure(ErrorCode::TransportError);
        entry.record_failure(ErrorCode::TransportError);
        assert_eq!(entry.retries_remaining(), 1);
        entry.set_state(ModState::Downloading);
        assert_eq!(entry.retries_remaining(), 1);
        entry.set_state(ModState::Installed);
        assert_eq!(entry.retries_remaining(), RETRIES);
    }

    #[test]
    fn test_retryable_failures_exhaust_budget() {
        let entry = entry();
        for expected in (0..RETRIES).rev() {
            assert!(entry.should_retry());
            entry.record_failure(ErrorCode::RetryableInstallError);
            assert_eq!(entry.retries_remaining(), expected);
        }
        assert!(!entry.should_retry());
        entry.record_failure(ErrorCode::RetryableInstallError);
        assert_eq!(entry.retries_remaining(), 0);
    }

    #[test]
    fn test_unrecoverable_failure_is_terminal() {
        let entry = entry();
        entry.record_failure(ErrorCode::UnrecoverableInstallError);
        assert_eq!(
            entry.terminal_failure_reason(),
            Some(ErrorCode::UnrecoverableInstallError)
        );
        assert_eq!(entry.retries_remaining(), RETRIES);
        entry.clear_no_retry();
        assert!(!entry.should_retry());

        // A new session restores the entry from its persisted form.
        let restored = ModCollectionEntry::from_record(entry.to_record(), RETRIES);
        assert!(!restored.should_retry());
        assert_eq!(
            restored.terminal_failure_reason(),
            Some(ErrorCode::UnrecoverableInstallError)
        );
    }

    #[test]
    fn test_other_install_failure_sets_sticky_flag_only() {
        let entry = entry();
        entry.record_failure(ErrorCode::InvalidResponse);
        assert!(!entry.should_retry());
        assert_eq!(entry.retries_remaining(), RETRIES);
        assert_eq!(entry.terminal_failure_reason(), None);

        entry.clear_no_retry();
        assert!(entry.should_retry());
    }

    #[test]
    fn test_deferred_delete_while_uninstalling() {
        let entry = entry();
        entry.set_state(ModState::UninstallPending);
        entry.record_failure(ErrorCode::DeferredDeleteError);
        assert!(!entry.should_retry());
        assert_eq!(entry.retries_remaining(), RETRIES);
        assert_eq!(entry.terminal_failure_reason(), None);
    }

    #[test]
    fn test_uninstall_failures_consume_budget() {
        let entry = entry();
        entry.set_state(ModState::UninstallPending);
        entry.record_failure(ErrorCode::UnrecoverableInstallError);
        assert_eq!(entry.retries_remaining(), RETRIES - 1);
        assert_eq!(entry.terminal_failure_reason(), None);
        entry.record_failure(ErrorCode::WriteError);
        entry.record_failure(ErrorCode::WriteError);
        assert_eq!(entry.retries_remaining(), 0);
        assert!(!entry.should_retry());
    }

    #[test]
    fn test_transaction_rollback_restores_state() {
        let entry = entry();
        entry.set_state(ModState::UpdatePending);
        assert!(entry.begin_transaction());
        entry.set_state(ModState::Downloading);
        entry.set_state(ModState::Extracting);
        assert!(entry.rollback_transaction());
        assert_eq!(entry.state(), ModState::UpdatePending);
        assert!(!entry.has_open_transaction());
    }

    #[test]
    fn test_rollback_without_transaction_is_noop() {
        let entry = entry();
        entry.set_state(ModState::Installed);
        assert!(!entry.rollback_transaction());
        assert_eq!(entry.state(), ModState::Installed);
    }

    #[test]
    fn test_double_begin_is_rejected() {
        let entry = entry();
        assert!(entry.begin_transaction());
        entry.set_state(ModState::Downloading);
        assert!(!entry.begin_transaction());
        assert_eq!(entry.snapshot().rollback_state, Some(ModState::InstallationPending));

        let fresh = ModCollectionEntry::new(profile(8, None), PathBuf::from("/mods/8"), RETRIES);
        assert!(fresh.begin_transaction());
        assert!(!fresh.begin_transaction());
    }

    #[test]
    fn test_begin_rejected_in_transitional_state_without_snapshot() {
        let entry = entry();
        entry.set_state(ModState::Extracting);
        assert!(!entry.begin_transaction());
        assert!(!entry.has_open_transaction());
    }

    #[test]
    fn test_commit_keeps_state() {
        let entry = entry();
        assert!(entry.begin_transaction());
        entry.set_state(ModState::Installed);
        assert!(entry.commit_transaction());
        assert_eq!(entry.state(), ModState::Installed);
        assert!(!entry.commit_transaction());
    }

    #[test]
    fn test_record_uses_rollback_state_for_transitional() {
        let entry = entry();
        entry.set_state(ModState::UpdatePending);
        entry.begin_transaction();
        entry.set_state(ModState::Downloading);
        assert_eq!(entry.to_record().state, ModState::UpdatePending);

        let orphan = ModCollectionEntry::new(profile(9, None), PathBuf::from("/mods/9"), RETRIES);
        orphan.set_state(ModState::Extracting);
        assert_eq!(orphan.to_record().state, ModState::InstallationPending);
    }

    #[test]
    fn test_size_on_disk_only_when_installed() {
        let entry = entry();
        entry.update_size_on_disk(1024);
        assert_eq!(entry.size_on_disk(), None);
        entry.set_state(ModState::Installed);
        assert_eq!(entry.size_on_disk(), Some(1024));
    }

    #[test]
    fn test_record_without_full_failure_pair() {
        let mut record = entry().to_record();
        record.never_retry_code = Some(ErrorCode::UnrecoverableInstallError.code());
        record.never_retry_category = None;
        let restored = ModCollectionEntry::from_record(record, RETRIES);
        assert_eq!(restored.terminal_failure_reason(), None);
        assert!(restored.should_retry());
    }

    proptest! {
        #[test]
        fn prop_retry_budget_never_underflows(failures in 0usize..20) {
            let entry = entry();
            let mut previous = entry.retries_remaining();
            for _ in 0..failures {
                entry.record_failure(ErrorCode::TransportError);
                let current = entry.retries_remaining();
                prop_assert!(current <= previous);
                prop_assert_eq!(entry.snapshot().should_not_retry, current == 0);
                previous = current;
            }
            prop_assert_eq!(
                entry.retries_remaining() as usize,
                (RETRIES as usize).saturating_sub(failures)
            );
        }
    }
}
