//! Drives mods through install, update and uninstall.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{MemoryCache, ResponseCache};
use crate::collection::{
    ChangeType, EventKind, FileInfo, GameInfo, JsonFileStore, ModCollection, ModCollectionEntry,
    ModEvent, ModEventLog, ModId, ModMetadata, ModState, StateStore, UserId, UserSubscriptionList,
};
use crate::config::Config;
use crate::error::{Error, ErrorCode, OpResult, Result};
use crate::fs::{
    dir_size, installed_file_path, mod_install_path, staging_path, FileChannel, FileMode,
    StdFileChannel,
};
use crate::install::verify::verify_download;
use crate::ops::{drive, DownloadToFile, FetchGameInfo, FetchModInfo, OpContext};
use crate::transport::{ApiEndpoints, HttpRequest, ReqwestTransport};

/// Collection shared between the installer and its callers.
pub type SharedCollection = Arc<RwLock<ModCollection>>;

/// What one pass over the work queue did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkReport {
    pub installed: Vec<ModId>,
    pub uninstalled: Vec<ModId>,
    pub failed: Vec<(ModId, ErrorCode)>,
}

impl WorkReport {
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.uninstalled.is_empty() && self.failed.is_empty()
    }
}

/// Result of applying a user's subscription changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSync {
    pub applied: BTreeMap<ModId, ChangeType>,
    pub failed: Vec<(ModId, ErrorCode)>,
}

/// Owns the mod collection and applies remote changes to disk.
///
/// The collection is written to the state store after every step that changes
/// an entry, so an interrupted session resumes from the last rollback point.
pub struct ModInstaller {
    config: Config,
    ctx: OpContext,
    collection: SharedCollection,
    store: Arc<dyn StateStore>,
    events: Arc<Mutex<ModEventLog>>,
}

impl ModInstaller {
    /// Create an installer over previously persisted state in `store`.
    pub fn new(config: Config, ctx: OpContext, store: Arc<dyn StateStore>) -> Result<Self> {
        let collection =
            ModCollection::restore(store.as_ref(), config.mod_management.default_retries)?;
        debug!("Restored {} mods from state", collection.len());
        Ok(Self {
            config,
            ctx,
            collection: Arc::new(RwLock::new(collection)),
            store,
            events: Arc::new(Mutex::new(ModEventLog::new())),
        })
    }

    /// Create an installer talking to the configured API and storing state on disk.
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.api.user_agent)?;
        let cache = ResponseCache::new(Arc::new(MemoryCache::new(
            config.cache_ttl(),
            config.cache.max_entries,
        )));
        let endpoints =
            ApiEndpoints::new(&config.api.base_url, config.api.game_id, config.api.api_key.clone())?;
        let ctx = OpContext::new(Arc::new(transport), cache, endpoints, config.poll_settings());
        let store = Arc::new(JsonFileStore::new(config.state_file()));
        Self::new(config, ctx, store)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &OpContext {
        &self.ctx
    }

    pub fn collection(&self) -> SharedCollection {
        Arc::clone(&self.collection)
    }

    pub fn entry(&self, id: ModId) -> Option<Arc<ModCollectionEntry>> {
        self.collection.read().get(id)
    }

    /// Hand all pending events to the caller.
    pub fn drain_events(&self) -> Vec<ModEvent> {
        self.events.lock().drain()
    }

    /// Write the collection to the state store.
    pub fn persist(&self) -> Result<()> {
        let bytes = self.collection.read().to_json()?;
        self.store.write(&bytes)
    }

    pub async fn fetch_game_info(&self) -> Result<GameInfo> {
        Ok(drive(FetchGameInfo::game_info(self.ctx.clone())).await?)
    }

    /// Subscribe `user` to `id`, reconciling the latest remote metadata.
    pub async fn subscribe(&self, user: UserId, id: ModId) -> Result<Arc<ModCollectionEntry>> {
        let metadata = drive(FetchModInfo::mod_info(self.ctx.clone(), id)).await?;
        if metadata.id != id {
            warn!(mod_id = %id, returned = %metadata.id, "Server returned metadata for another mod");
            return Err(Error::Operation(ErrorCode::InvalidResponse));
        }

        let path = mod_install_path(&self.config, id);
        let entry = {
            // The subscriber is added under the collection lock so a concurrent
            // uninstall cannot drop the entry in between.
            let mut collection = self.collection.write();
            let outcome = collection.add_or_update_mod(metadata, path);
            debug!(mod_id = %id, ?outcome, "Reconciled remote metadata");
            let entry = collection.get(id).ok_or(Error::UnknownMod(id))?;
            let subscribers = entry.add_subscriber(user);
            debug!(mod_id = %id, %user, subscribers, "Added subscriber");
            entry
        };
        self.persist()?;
        Ok(entry)
    }

    /// Re-read remote metadata for every known mod, bypassing the cache.
    ///
    /// Entries whose file version changed move to `UpdatePending`. Mods waiting
    /// for uninstallation or with work in progress are left alone. Returns the
    /// mods whose metadata could not be fetched.
    pub async fn refresh_metadata(&self) -> Result<Vec<(ModId, ErrorCode)>> {
        self.ctx.cache().invalidate_all::<ModMetadata>();
        let ids: Vec<ModId> = self
            .collection
            .read()
            .entries()
            .filter(|entry| {
                entry.state() != ModState::UninstallPending && !entry.has_open_transaction()
            })
            .map(|entry| entry.id())
            .collect();

        let mut failed = Vec::new();
        for id in ids {
            match drive(FetchModInfo::mod_info(self.ctx.clone(), id)).await {
                Ok(metadata) if metadata.id == id => {
                    let path = mod_install_path(&self.config, id);
                    let outcome = self.collection.write().add_or_update_mod(metadata, path);
                    debug!(mod_id = %id, ?outcome, "Refreshed remote metadata");
                }
                Ok(metadata) => {
                    warn!(
                        mod_id = %id,
                        returned = %metadata.id,
                        "Server returned metadata for another mod"
                    );
                    failed.push((id, ErrorCode::InvalidResponse));
                }
                Err(ErrorCode::Cancelled) => return Err(Error::Operation(ErrorCode::Cancelled)),
                Err(code) => {
                    warn!(mod_id = %id, %code, "Could not refresh metadata");
                    failed.push((id, code));
                }
            }
        }
        self.persist()?;
        Ok(failed)
    }

    /// Drop `user`'s subscription to `id`. Returns the remaining subscriber count.
    pub fn unsubscribe(&self, user: UserId, id: ModId) -> Result<usize> {
        let entry = self.entry(id).ok_or(Error::UnknownMod(id))?;
        let remaining = entry.remove_subscriber(user);
        self.persist()?;
        Ok(remaining)
    }

    /// Subscribe `user` to `id` and install or update it if needed.
    ///
    /// Returns the state the mod ends up in.
    pub async fn ensure_installed(&self, user: UserId, id: ModId) -> Result<ModState> {
        let entry = self.subscribe(user, id).await?;
        match entry.state() {
            ModState::Installed => {
                debug!(mod_id = %id, "Already installed");
                Ok(ModState::Installed)
            }
            ModState::UninstallPending => {
                info!(mod_id = %id, "Mod is pending uninstallation, it will be reinstalled once removed");
                Ok(ModState::UninstallPending)
            }
            ModState::Downloading | ModState::Extracting => Err(Error::InProgress(id)),
            ModState::InstallationPending | ModState::UpdatePending => {
                self.install_entry(&entry).await?;
                Ok(entry.state())
            }
        }
    }

    /// Download, verify and move the current file of `entry` into place.
    pub async fn install_entry(&self, entry: &Arc<ModCollectionEntry>) -> Result<()> {
        let id = entry.id();
        if !entry.should_retry() {
            return Err(Error::RetriesExhausted(id));
        }

        let (begin, finish) = if entry.state() == ModState::UpdatePending {
            (EventKind::BeginUpdate, EventKind::Updated)
        } else {
            (EventKind::BeginInstall, EventKind::Installed)
        };

        if !entry.begin_transaction() {
            return Err(Error::InProgress(id));
        }
        self.events.lock().push(id, begin, None);
        entry.set_state(ModState::Downloading);
        if let Err(e) = self.persist() {
            entry.rollback_transaction();
            return Err(e);
        }

        match self.download_and_finalize(entry).await {
            Ok(size) => {
                entry.commit_transaction();
                entry.update_size_on_disk(size);
                entry.set_state(ModState::Installed);
                entry.mark_uninstall_if_unsubscribed();
                self.events.lock().push(id, finish, None);
                self.persist()?;
                info!(mod_id = %id, size, "Mod installed");
                Ok(())
            }
            Err(code) => {
                entry.rollback_transaction();
                // A failure nobody is waiting for does not count against the mod.
                if !entry.mark_uninstall_if_unsubscribed() {
                    entry.record_failure(code);
                }
                self.events.lock().push(id, finish, Some(code));
                self.persist()?;
                warn!(mod_id = %id, %code, "Mod install failed");
                Err(Error::Operation(code))
            }
        }
    }

    async fn download_and_finalize(&self, entry: &ModCollectionEntry) -> OpResult<u64> {
        let profile = entry.profile();
        let Some(file) = profile.file_info.clone() else {
            warn!(mod_id = %entry.id(), "Mod has no downloadable file");
            return Err(ErrorCode::UnrecoverableInstallError);
        };
        let url = Url::parse(&file.download_url).map_err(|e| {
            warn!(mod_id = %entry.id(), "Invalid download URL: {}", e);
            ErrorCode::UnrecoverableInstallError
        })?;
        let target = installed_file_path(entry.path(), &profile).map_err(|e| {
            warn!(mod_id = %entry.id(), "Unusable file name: {}", e);
            ErrorCode::UnrecoverableInstallError
        })?;

        let staging = staging_path(&self.config, entry.id());
        let staged = match self.stage_and_verify(entry, url, &staging, &file).await {
            Ok(()) => move_into_place(&staging, entry.path(), &target),
            Err(code) => Err(code),
        };

        if let Err(code) = staged {
            if let Err(e) = std::fs::remove_file(&staging) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Could not remove staging file {}: {}", staging.display(), e);
                }
            }
            return Err(code);
        }

        dir_size(entry.path()).map_err(|e| ErrorCode::from_io(&e))
    }

    async fn stage_and_verify(
        &self,
        entry: &ModCollectionEntry,
        url: Url,
        staging: &Path,
        file: &FileInfo,
    ) -> OpResult<()> {
        if let Some(parent) = staging.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ErrorCode::from_io(&e))?;
        }
        let staged = Arc::new(
            StdFileChannel::open(
                staging,
                FileMode::ReadWrite,
                self.ctx.cancellation().clone(),
                self.config.io.sync_write_threshold,
            )
            .map_err(|e| e.code().unwrap_or(ErrorCode::WriteError))?,
        );
        let channel: Arc<dyn FileChannel> = staged.clone();

        let written = drive(DownloadToFile::new(
            self.ctx.clone(),
            HttpRequest::get(url),
            channel.clone(),
            self.config.io.write_chunk_size,
        ))
        .await?;
        staged.sync().map_err(|e| e.code().unwrap_or(ErrorCode::WriteError))?;
        debug!(mod_id = %entry.id(), written, "Download staged");

        self.ctx.cancellation().check()?;
        entry.set_state(ModState::Extracting);
        if let Err(e) = self.persist() {
            warn!(mod_id = %entry.id(), "Could not persist state: {}", e);
        }

        verify_download(
            channel,
            file,
            self.config.io.write_chunk_size,
            self.ctx.poll_settings(),
        )
        .await
    }

    /// Delete the files of every mod waiting for uninstallation.
    pub async fn process_uninstalls(&self) -> Result<WorkReport> {
        let pending: Vec<_> = self
            .collection
            .read()
            .entries()
            .filter(|entry| entry.state() == ModState::UninstallPending && entry.should_retry())
            .cloned()
            .collect();

        let mut report = WorkReport::default();
        for entry in pending {
            match self.uninstall_entry(&entry).await {
                Ok(()) => report.uninstalled.push(entry.id()),
                Err(Error::Operation(code)) => report.failed.push((entry.id(), code)),
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Remove the files of `entry` and drop it from the collection.
    pub async fn uninstall_entry(&self, entry: &Arc<ModCollectionEntry>) -> Result<()> {
        let id = entry.id();
        self.events.lock().push(id, EventKind::BeginUninstall, None);

        let removal = match tokio::fs::remove_dir_all(entry.path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(mod_id = %id, "Could not delete {}: {}", entry.path().display(), e);
                Err(match ErrorCode::from_io(&e) {
                    ErrorCode::NoPermission => ErrorCode::DeferredDeleteError,
                    code => code,
                })
            }
        };

        match removal {
            Ok(()) => {
                let reinstated = {
                    let mut collection = self.collection.write();
                    let reinstated = entry.reinstate_if_subscribed();
                    if !reinstated {
                        collection.remove_mod(id, false);
                    }
                    reinstated
                };
                self.events.lock().push(id, EventKind::Uninstalled, None);
                self.persist()?;
                if reinstated {
                    info!(mod_id = %id, "Mod files removed, queued for reinstall");
                } else {
                    info!(mod_id = %id, "Mod uninstalled");
                }
                Ok(())
            }
            Err(code) => {
                entry.record_failure(code);
                self.events.lock().push(id, EventKind::Uninstalled, Some(code));
                self.persist()?;
                Err(Error::Operation(code))
            }
        }
    }

    /// Apply the difference between two snapshots of `user`'s subscriptions.
    ///
    /// New subscriptions are reconciled but not installed; removed ones drop the
    /// user's reference.
    pub async fn apply_subscription_changes(
        &self,
        user: UserId,
        previous: &UserSubscriptionList,
        current: &UserSubscriptionList,
    ) -> Result<SubscriptionSync> {
        let mut sync = SubscriptionSync::default();
        for (id, change) in UserSubscriptionList::calculate_changes(previous, current) {
            let outcome = match change {
                ChangeType::Added => self.subscribe(user, id).await.map(|_| ()),
                ChangeType::Removed => self.unsubscribe(user, id).map(|_| ()),
            };
            match outcome {
                Ok(()) => {
                    sync.applied.insert(id, change);
                }
                Err(Error::UnknownMod(_)) if change == ChangeType::Removed => {
                    debug!(mod_id = %id, "Removed subscription was never known locally");
                }
                Err(Error::Operation(code)) => {
                    warn!(mod_id = %id, %code, ?change, "Could not apply subscription change");
                    sync.failed.push((id, code));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(sync)
    }

    /// The entry a scheduler should work on next, if any.
    pub fn next_work_item(&self) -> Option<Arc<ModCollectionEntry>> {
        self.collection
            .read()
            .sort_entries_by_retry_priority()
            .into_iter()
            .find(|entry| {
                let state = entry.state();
                entry.should_retry()
                    && !entry.has_open_transaction()
                    && (state.wants_install() || state == ModState::UninstallPending)
            })
    }

    /// Work through the queue until nothing is left to attempt this session.
    pub async fn run_pending(&self) -> Result<WorkReport> {
        let mut report = WorkReport::default();
        while let Some(entry) = self.next_work_item() {
            if self.ctx.cancellation().is_cancelled() {
                break;
            }
            let id = entry.id();
            let uninstalling = entry.state() == ModState::UninstallPending;
            let outcome = if uninstalling {
                self.uninstall_entry(&entry).await
            } else {
                self.install_entry(&entry).await
            };
            match outcome {
                Ok(()) if uninstalling => report.uninstalled.push(id),
                Ok(()) => report.installed.push(id),
                Err(Error::Operation(code)) => report.failed.push((id, code)),
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }
}

fn move_into_place(staging: &Path, install_dir: &Path, target: &Path) -> OpResult<()> {
    if install_dir.exists() {
        std::fs::remove_dir_all(install_dir).map_err(|e| ErrorCode::from_io(&e))?;
    }
    std::fs::create_dir_all(install_dir).map_err(|e| ErrorCode::from_io(&e))?;
    std::fs::rename(staging, target).map_err(|e| {
        warn!("Could not move {} to {}: {}", staging.display(), target.display(), e);
        ErrorCode::from_io(&e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::MemoryStore;
    use crate::testing::{
        download_path, mod_info_path, mod_with_file, serve_mod, test_context, ScriptedTransport,
    };
    use tempfile::TempDir;

    const USER: UserId = UserId(1);
    const OTHER_USER: UserId = UserId(2);
    const PAYLOAD: &[u8] = b"PK\x03\x04 pretend this is a zip archive";

    struct Harness {
        _dir: TempDir,
        transport: Arc<ScriptedTransport>,
        store: Arc<MemoryStore>,
        installer: ModInstaller,
    }

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.root_directory = Some(dir.path().to_path_buf());
        config.io.write_chunk_size = 8;
        config.io.sync_write_threshold = 4;
        config.io.poll_interval_ms = 1;
        config.io.max_poll_attempts = 500;
        config
    }

    fn harness() -> Harness {
        harness_with_pending_polls(1)
    }

    fn harness_with_pending_polls(polls: u32) -> Harness {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::new().with_pending_polls(polls));
        let store = Arc::new(MemoryStore::new());
        let installer = ModInstaller::new(
            test_config(&dir),
            test_context(transport.clone()),
            store.clone(),
        )
        .unwrap();
        Harness {
            _dir: dir,
            transport,
            store,
            installer,
        }
    }

    fn event_kinds(installer: &ModInstaller) -> Vec<(EventKind, Option<ErrorCode>)> {
        installer
            .drain_events()
            .into_iter()
            .map(|event| (event.kind, event.status))
            .collect()
    }

    fn staging_files(installer: &ModInstaller) -> usize {
        std::fs::read_dir(installer.config().temp_directory())
            .map(|dir| dir.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_ensure_installed() {
        let h = harness();
        let metadata = mod_with_file(ModId(10), 1, PAYLOAD);
        serve_mod(&h.transport, &metadata, PAYLOAD);

        let state = h.installer.ensure_installed(USER, ModId(10)).await.unwrap();
        assert_eq!(state, ModState::Installed);

        let entry = h.installer.entry(ModId(10)).unwrap();
        let installed = entry.path().join("mod.zip");
        assert_eq!(std::fs::read(&installed).unwrap(), PAYLOAD);
        assert_eq!(entry.size_on_disk(), Some(PAYLOAD.len() as u64));
        assert!(!entry.has_open_transaction());
        assert_eq!(staging_files(&h.installer), 0);
        assert_eq!(
            event_kinds(&h.installer),
            vec![(EventKind::BeginInstall, None), (EventKind::Installed, None)]
        );

        let restored = ModCollection::restore(h.store.as_ref(), 3).unwrap();
        assert_eq!(restored.get(ModId(10)).unwrap().state(), ModState::Installed);
    }

    #[tokio::test]
    async fn test_second_subscriber_does_not_reinstall() {
        let h = harness();
        let metadata = mod_with_file(ModId(10), 1, PAYLOAD);
        serve_mod(&h.transport, &metadata, PAYLOAD);

        h.installer.ensure_installed(USER, ModId(10)).await.unwrap();
        h.installer.drain_events();
        let state = h.installer.ensure_installed(OTHER_USER, ModId(10)).await.unwrap();

        assert_eq!(state, ModState::Installed);
        assert_eq!(h.installer.entry(ModId(10)).unwrap().subscriber_count(), 2);
        assert!(h.installer.drain_events().is_empty());
        let downloads = h
            .transport
            .sent_paths()
            .into_iter()
            .filter(|path| path == &download_path(ModId(10), 1))
            .count();
        assert_eq!(downloads, 1);
    }

    #[tokio::test]
    async fn test_hash_mismatch_rolls_back() {
        let h = harness();
        let metadata = mod_with_file(ModId(11), 1, b"the file the server promised");
        serve_mod(&h.transport, &metadata, PAYLOAD);

        let result = h.installer.ensure_installed(USER, ModId(11)).await;
        assert!(matches!(
            result,
            Err(Error::Operation(ErrorCode::RetryableInstallError))
        ));

        let entry = h.installer.entry(ModId(11)).unwrap();
        assert_eq!(entry.state(), ModState::InstallationPending);
        assert_eq!(entry.retries_remaining(), 2);
        assert!(entry.should_retry());
        assert!(!entry.path().exists());
        assert_eq!(staging_files(&h.installer), 0);
        assert_eq!(
            event_kinds(&h.installer),
            vec![
                (EventKind::BeginInstall, None),
                (EventKind::Installed, Some(ErrorCode::RetryableInstallError)),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_file_fails_permanently() {
        let h = harness();
        let metadata = mod_with_file(ModId(12), 1, PAYLOAD);
        let body = serde_json::to_vec(&metadata).unwrap();
        h.transport.respond(&mod_info_path(ModId(12)), 200, body);

        let result = h.installer.ensure_installed(USER, ModId(12)).await;
        assert!(matches!(
            result,
            Err(Error::Operation(ErrorCode::UnrecoverableInstallError))
        ));
        let entry = h.installer.entry(ModId(12)).unwrap();
        assert_eq!(
            entry.terminal_failure_reason(),
            Some(ErrorCode::UnrecoverableInstallError)
        );

        let again = h.installer.ensure_installed(USER, ModId(12)).await;
        assert!(matches!(again, Err(Error::RetriesExhausted(ModId(12)))));

        // A new session still refuses to retry.
        let reloaded = ModCollection::restore(h.store.as_ref(), 3).unwrap();
        assert!(!reloaded.get(ModId(12)).unwrap().should_retry());
    }

    #[tokio::test]
    async fn test_new_file_version_updates() {
        let h = harness();
        let v1 = mod_with_file(ModId(13), 1, PAYLOAD);
        serve_mod(&h.transport, &v1, PAYLOAD);
        h.installer.ensure_installed(USER, ModId(13)).await.unwrap();
        h.installer.drain_events();

        const V2: &[u8] = b"second release";
        let v2 = mod_with_file(ModId(13), 2, V2);
        serve_mod(&h.transport, &v2, V2);
        h.installer.context().cache().invalidate::<ModMetadata>("13");

        let state = h.installer.ensure_installed(USER, ModId(13)).await.unwrap();
        assert_eq!(state, ModState::Installed);
        let entry = h.installer.entry(ModId(13)).unwrap();
        assert_eq!(std::fs::read(entry.path().join("mod.zip")).unwrap(), V2);
        assert_eq!(entry.size_on_disk(), Some(V2.len() as u64));
        assert_eq!(
            event_kinds(&h.installer),
            vec![(EventKind::BeginUpdate, None), (EventKind::Updated, None)]
        );
    }

    #[tokio::test]
    async fn test_refresh_metadata_queues_update() {
        let h = harness();
        let v1 = mod_with_file(ModId(19), 1, PAYLOAD);
        serve_mod(&h.transport, &v1, PAYLOAD);
        h.installer.ensure_installed(USER, ModId(19)).await.unwrap();

        const V2: &[u8] = b"patched release";
        let v2 = mod_with_file(ModId(19), 2, V2);
        serve_mod(&h.transport, &v2, V2);

        let failed = h.installer.refresh_metadata().await.unwrap();
        assert!(failed.is_empty());
        let entry = h.installer.entry(ModId(19)).unwrap();
        assert_eq!(entry.state(), ModState::UpdatePending);

        let report = h.installer.run_pending().await.unwrap();
        assert_eq!(report.installed, vec![ModId(19)]);
        assert_eq!(std::fs::read(entry.path().join("mod.zip")).unwrap(), V2);
    }

    #[tokio::test]
    async fn test_cancellation_stops_install() {
        let h = harness();
        let metadata = mod_with_file(ModId(14), 1, PAYLOAD);
        serve_mod(&h.transport, &metadata, PAYLOAD);
        let entry = h.installer.subscribe(USER, ModId(14)).await.unwrap();

        h.installer.context().cancellation().cancel();
        let result = h.installer.install_entry(&entry).await;

        assert!(matches!(result, Err(Error::Operation(ErrorCode::Cancelled))));
        assert_eq!(entry.state(), ModState::InstallationPending);
        assert!(!entry.should_retry());
        assert!(h.installer.next_work_item().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_and_uninstall() {
        let h = harness();
        let metadata = mod_with_file(ModId(15), 1, PAYLOAD);
        serve_mod(&h.transport, &metadata, PAYLOAD);
        h.installer.ensure_installed(USER, ModId(15)).await.unwrap();
        let path = h.installer.entry(ModId(15)).unwrap().path().to_path_buf();
        h.installer.drain_events();

        assert_eq!(h.installer.unsubscribe(USER, ModId(15)).unwrap(), 0);
        assert_eq!(
            h.installer.entry(ModId(15)).unwrap().state(),
            ModState::UninstallPending
        );

        let report = h.installer.process_uninstalls().await.unwrap();
        assert_eq!(report.uninstalled, vec![ModId(15)]);
        assert!(!path.exists());
        assert!(h.installer.entry(ModId(15)).is_none());
        assert_eq!(
            event_kinds(&h.installer),
            vec![(EventKind::BeginUninstall, None), (EventKind::Uninstalled, None)]
        );
    }

    #[tokio::test]
    async fn test_resubscribe_while_uninstall_pending_reinstalls() {
        let h = harness();
        let metadata = mod_with_file(ModId(16), 1, PAYLOAD);
        serve_mod(&h.transport, &metadata, PAYLOAD);
        h.installer.ensure_installed(USER, ModId(16)).await.unwrap();
        h.installer.unsubscribe(USER, ModId(16)).unwrap();

        let state = h.installer.ensure_installed(OTHER_USER, ModId(16)).await.unwrap();
        assert_eq!(state, ModState::UninstallPending);

        let report = h.installer.run_pending().await.unwrap();
        assert_eq!(report.uninstalled, vec![ModId(16)]);
        assert_eq!(report.installed, vec![ModId(16)]);

        let entry = h.installer.entry(ModId(16)).unwrap();
        assert_eq!(entry.state(), ModState::Installed);
        assert_eq!(entry.subscribers().into_iter().collect::<Vec<_>>(), vec![OTHER_USER]);
        assert_eq!(std::fs::read(entry.path().join("mod.zip")).unwrap(), PAYLOAD);

        let restored = ModCollection::restore(h.store.as_ref(), 3).unwrap();
        assert!(restored.contains(ModId(16)));
    }

    #[tokio::test]
    async fn test_unsubscribe_during_install_leaves_uninstall_pending() {
        let h = harness_with_pending_polls(5);
        let metadata = mod_with_file(ModId(17), 1, PAYLOAD);
        serve_mod(&h.transport, &metadata, PAYLOAD);
        let entry = h.installer.subscribe(USER, ModId(17)).await.unwrap();

        let (installed, remaining) = tokio::join!(h.installer.install_entry(&entry), async {
            while entry.state() != ModState::Downloading {
                tokio::task::yield_now().await;
            }
            h.installer.unsubscribe(USER, ModId(17)).unwrap()
        });

        assert!(installed.is_ok());
        assert_eq!(remaining, 0);
        assert_eq!(entry.state(), ModState::UninstallPending);
        assert_eq!(h.installer.next_work_item().unwrap().id(), ModId(17));

        let report = h.installer.run_pending().await.unwrap();
        assert_eq!(report.uninstalled, vec![ModId(17)]);
        assert!(h.installer.entry(ModId(17)).is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_during_failed_install_keeps_budget() {
        let h = harness_with_pending_polls(5);
        let metadata = mod_with_file(ModId(18), 1, b"the file the server promised");
        serve_mod(&h.transport, &metadata, PAYLOAD);
        let entry = h.installer.subscribe(USER, ModId(18)).await.unwrap();

        let (installed, _) = tokio::join!(h.installer.install_entry(&entry), async {
            while entry.state() != ModState::Downloading {
                tokio::task::yield_now().await;
            }
            h.installer.unsubscribe(USER, ModId(18)).unwrap()
        });

        assert!(matches!(
            installed,
            Err(Error::Operation(ErrorCode::RetryableInstallError))
        ));
        assert_eq!(entry.state(), ModState::UninstallPending);
        assert_eq!(entry.retries_remaining(), 3);
        assert!(entry.should_retry());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_mod() {
        let h = harness();
        assert!(matches!(
            h.installer.unsubscribe(USER, ModId(99)),
            Err(Error::UnknownMod(ModId(99)))
        ));
    }

    #[tokio::test]
    async fn test_apply_subscription_changes() {
        let h = harness();
        for id in [20, 21, 22] {
            let metadata = mod_with_file(ModId(id), 1, PAYLOAD);
            serve_mod(&h.transport, &metadata, PAYLOAD);
        }
        h.transport.fail(&mod_info_path(ModId(23)), ErrorCode::TransportError);

        let before: UserSubscriptionList = [ModId(20), ModId(21)].into_iter().collect();
        for id in before.iter() {
            h.installer.subscribe(USER, id).await.unwrap();
        }
        let after: UserSubscriptionList = [ModId(21), ModId(22), ModId(23)].into_iter().collect();

        let sync = h
            .installer
            .apply_subscription_changes(USER, &before, &after)
            .await
            .unwrap();

        assert_eq!(sync.applied.get(&ModId(20)), Some(&ChangeType::Removed));
        assert_eq!(sync.applied.get(&ModId(22)), Some(&ChangeType::Added));
        assert!(!sync.applied.contains_key(&ModId(21)));
        assert_eq!(sync.failed, vec![(ModId(23), ErrorCode::TransportError)]);
        assert_eq!(
            h.installer.entry(ModId(20)).unwrap().state(),
            ModState::UninstallPending
        );
        assert_eq!(
            h.installer.entry(ModId(22)).unwrap().state(),
            ModState::InstallationPending
        );
    }

    #[tokio::test]
    async fn test_run_pending_drains_queue() {
        let h = harness();
        let good = mod_with_file(ModId(30), 1, PAYLOAD);
        serve_mod(&h.transport, &good, PAYLOAD);
        let bad = mod_with_file(ModId(31), 1, b"never matches");
        serve_mod(&h.transport, &bad, PAYLOAD);
        let leaving = mod_with_file(ModId(32), 1, PAYLOAD);
        serve_mod(&h.transport, &leaving, PAYLOAD);

        for id in [30, 31, 32] {
            h.installer.subscribe(USER, ModId(id)).await.unwrap();
        }
        h.installer.unsubscribe(USER, ModId(32)).unwrap();
        assert_eq!(h.installer.next_work_item().unwrap().id(), ModId(30));

        let report = h.installer.run_pending().await.unwrap();
        assert_eq!(report.installed, vec![ModId(30)]);
        assert_eq!(report.uninstalled, vec![ModId(32)]);
        // Every attempt in the retry budget is spent on the broken mod.
        assert_eq!(
            report.failed,
            vec![(ModId(31), ErrorCode::RetryableInstallError); 3]
        );
        assert!(h.installer.next_work_item().is_none());
        assert!(!h.installer.entry(ModId(31)).unwrap().should_retry());
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let h = harness();
        let metadata = mod_with_file(ModId(40), 1, PAYLOAD);
        serve_mod(&h.transport, &metadata, PAYLOAD);
        h.installer.ensure_installed(USER, ModId(40)).await.unwrap();

        let reopened = ModInstaller::new(
            h.installer.config().clone(),
            test_context(h.transport.clone()),
            h.store.clone(),
        )
        .unwrap();
        let entry = reopened.entry(ModId(40)).unwrap();
        assert_eq!(entry.state(), ModState::Installed);
        assert_eq!(entry.subscribers().len(), 1);
        assert_eq!(entry.size_on_disk(), Some(PAYLOAD.len() as u64));
    }

    #[tokio::test]
    async fn test_fetch_game_info() {
        let h = harness();
        h.transport.respond("/v1/games/1", 200, r#"{"id": 1, "name": "Test Game", "ugc_name": "mods"}"#);
        let game = h.installer.fetch_game_info().await.unwrap();
        assert_eq!(game.name, "Test Game");
        assert_eq!(game.ugc_name, "mods");
    }
}
