// Application State
// The vault sync service: wires settings, gateway, aggregator, coordinator and watcher

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use super::events::ChangeEvent;
use super::settings::Settings;
use super::status::{StatusSnapshot, SubscriptionId, SyncStatus};
use super::watcher::{VaultWatcher, WatcherError};
use crate::constants::{SETTINGS_FILE_NAME, VCS_METADATA_DIR};
use crate::operations::aggregator::{ChangeAggregator, OperationSink};
use crate::operations::git::{CommitInfo, Gateway, GitGateway, InitConfig, RepoStatus};
use crate::operations::sync::{self, ManualSyncOutcome, SyncCoordinator};

/// One synchronized vault.
///
/// Owns the live settings; every component reads them through a watch
/// channel, so an update applies to the next operation without a restart.
pub struct VaultSync {
    vault_root: PathBuf,
    settings: watch::Sender<Arc<Settings>>,
    gateway: Arc<dyn Gateway>,
    coordinator: SyncCoordinator,
    aggregator: ChangeAggregator,
    watcher: Mutex<Option<VaultWatcher>>,
}

impl VaultSync {
    /// Assemble a service around any gateway. Must be called within a tokio runtime.
    pub fn new(vault_root: impl Into<PathBuf>, settings: Settings, gateway: Arc<dyn Gateway>) -> Self {
        let (tx, rx) = watch::channel(Arc::new(settings));
        let coordinator = SyncCoordinator::new(Arc::clone(&gateway), rx.clone());
        let sink: Arc<dyn OperationSink> = Arc::new(coordinator.clone());
        let aggregator = ChangeAggregator::new(rx, sink);

        Self {
            vault_root: vault_root.into(),
            settings: tx,
            gateway,
            coordinator,
            aggregator,
            watcher: Mutex::new(None),
        }
    }

    /// Open a vault on disk with the git gateway and the vault's settings file
    pub fn open(vault_root: impl Into<PathBuf>) -> Result<Self> {
        let vault_root = vault_root.into();
        let settings = Settings::load_from_vault(&vault_root)?;
        let gateway = Arc::new(GitGateway::new(&vault_root));
        Ok(Self::new(vault_root, settings, gateway))
    }

    /// Detect the vault root directory
    pub fn detect_vault_root() -> Result<PathBuf> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;

        // Walk up looking for a settings file or a repository
        let mut current = Some(cwd.as_path());
        while let Some(dir) = current {
            if dir.join(SETTINGS_FILE_NAME).exists() || dir.join(VCS_METADATA_DIR).exists() {
                return Ok(dir.to_path_buf());
            }
            current = dir.parent();
        }

        // Fall back to current directory
        Ok(cwd)
    }

    pub fn vault_root(&self) -> &Path {
        &self.vault_root
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn aggregator(&self) -> &ChangeAggregator {
        &self.aggregator
    }

    // ── Settings ─────────────────────────────────────────────────

    /// Current settings snapshot
    pub fn settings(&self) -> Arc<Settings> {
        self.settings.borrow().clone()
    }

    /// Settings receiver for components outside the service
    pub fn settings_receiver(&self) -> watch::Receiver<Arc<Settings>> {
        self.settings.subscribe()
    }

    /// Validate and publish new settings; applies to the next operation
    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        let settings = settings.validated()?;
        let auto_sync = settings.auto_sync;
        self.settings.send_replace(Arc::new(settings));

        if !auto_sync {
            self.aggregator.stop();
        }
        info!(auto_sync, "settings updated");
        Ok(())
    }

    /// Validate, publish and write the settings file
    pub fn save_settings(&self, settings: Settings) -> Result<()> {
        self.update_settings(settings)?;
        self.settings().save(&self.vault_root.join(SETTINGS_FILE_NAME))
    }

    /// Flip auto-sync; returns the new value
    pub fn toggle_auto_sync(&self) -> Result<bool> {
        let mut settings = (*self.settings()).clone();
        settings.auto_sync = !settings.auto_sync;
        let enabled = settings.auto_sync;
        self.update_settings(settings)?;
        Ok(enabled)
    }

    // ── Status ───────────────────────────────────────────────────

    pub fn status(&self) -> StatusSnapshot {
        self.coordinator.status()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StatusSnapshot) + Send + Sync + 'static,
    {
        self.coordinator.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.coordinator.unsubscribe(id)
    }

    // ── Repository ───────────────────────────────────────────────

    /// Create the repository if needed, register the remote, then run the startup checks
    pub async fn init_repository(&self) -> sync::Result<SyncStatus> {
        let settings = self.settings();

        if !self.gateway.is_initialized().await? {
            self.gateway
                .init(&InitConfig {
                    branch: settings.branch.clone(),
                    committer: settings.committer(),
                })
                .await?;
            info!(root = %self.vault_root.display(), branch = %settings.branch, "repository created");

            if let Some(remote) = settings.remote() {
                self.gateway.add_remote(&remote.name, &remote.url).await?;
                info!(remote = %remote.name, url = %remote.url, "remote added");
            }
        }

        Ok(self.coordinator.initialize().await)
    }

    /// Startup checks against an existing repository
    pub async fn initialize(&self) -> SyncStatus {
        self.coordinator.initialize().await
    }

    pub async fn manual_sync(&self) -> sync::Result<ManualSyncOutcome> {
        self.coordinator.perform_manual_sync().await
    }

    pub async fn push(&self) -> sync::Result<()> {
        self.coordinator.push().await
    }

    pub async fn pull(&self) -> sync::Result<()> {
        self.coordinator.pull().await
    }

    pub async fn check_connection(&self) -> sync::Result<bool> {
        self.coordinator.check_connection().await
    }

    pub async fn repo_status(&self) -> sync::Result<RepoStatus> {
        Ok(self.gateway.status().await?)
    }

    pub async fn log(&self, limit: usize) -> sync::Result<Vec<CommitInfo>> {
        Ok(self.gateway.log(limit).await?)
    }

    pub async fn current_branch(&self) -> sync::Result<String> {
        Ok(self.gateway.current_branch().await?)
    }

    pub async fn list_branches(&self) -> sync::Result<Vec<String>> {
        Ok(self.gateway.list_branches().await?)
    }

    // ── Watching ─────────────────────────────────────────────────

    /// Offer a change event as if the watcher had observed it
    pub fn handle_event(&self, event: ChangeEvent) -> bool {
        self.aggregator.accept(event)
    }

    /// Start the filesystem watcher; a running watcher is replaced
    pub fn start_watching(&self) -> std::result::Result<(), WatcherError> {
        let watcher = VaultWatcher::start(&self.vault_root, self.aggregator.clone())?;
        if let Some(previous) = self.watcher.lock().replace(watcher) {
            previous.stop();
        }
        Ok(())
    }

    /// Stop the watcher and discard changes still inside the debounce window
    pub fn stop_watching(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
        self.aggregator.stop();
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Wait for queued operations to finish
    pub async fn wait_idle(&self) {
        self.coordinator.wait_idle().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service(dir: &Path) -> VaultSync {
        VaultSync::new(dir, Settings::default(), Arc::new(GitGateway::new(dir)))
    }

    #[tokio::test]
    async fn test_update_settings_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let bad = Settings {
            branch: String::new(),
            ..Settings::default()
        };
        assert!(service.update_settings(bad).is_err());
        assert_eq!(*service.settings(), Settings::default());
    }

    #[tokio::test]
    async fn test_toggle_auto_sync_drops_pending_changes() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        assert!(service.settings().auto_sync);

        assert!(service.handle_event(ChangeEvent::created("note.md")));
        assert_eq!(service.aggregator().pending_len(), 1);

        assert!(!service.toggle_auto_sync().unwrap());
        assert_eq!(service.aggregator().pending_len(), 0);
        assert!(!service.handle_event(ChangeEvent::created("note.md")));

        assert!(service.toggle_auto_sync().unwrap());
    }

    #[tokio::test]
    async fn test_save_settings_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let settings = Settings {
            debounce_ms: 1500,
            ..Settings::default()
        };
        service.save_settings(settings.clone()).unwrap();

        assert_eq!(Settings::load_from_vault(dir.path()).unwrap(), settings);
        assert_eq!(service.settings().debounce_ms, 1500);
    }

    #[tokio::test]
    async fn test_subscribe_through_service() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let id = service.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // No repository in an empty directory
        assert_eq!(service.initialize().await, SyncStatus::Offline);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(service.unsubscribe(id));
    }
}
