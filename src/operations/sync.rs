// Sync Coordinator
// Serializes sync operations against the gateway, retries them, and owns the sync status

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

use super::aggregator::OperationSink;
use super::git::{CommitOutcome, Gateway, GatewayError};
use super::operation::{SyncOperation, SyncTrigger};
use super::retry::RetryPolicy;
use crate::core::settings::Settings;
use crate::core::status::{StatusBroadcaster, StatusSnapshot, SubscriptionId, SyncStatus};

/// Errors reported to direct callers
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No remote configured")]
    NoRemote,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Result of a manual sync request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualSyncOutcome {
    /// Another sync was running; nothing was done
    AlreadyInProgress,
    /// The working tree was clean
    NothingToSync,
    /// Local changes were committed (and pushed if configured)
    Synced { commit: Option<String>, pushed: bool },
}

struct State {
    queue: VecDeque<SyncOperation>,
    /// Guard: at most one drain task runs at a time
    draining: bool,
    /// Manual syncs, pulls and pushes currently running
    direct: usize,
    snapshot: StatusSnapshot,
}

struct Inner {
    gateway: Arc<dyn Gateway>,
    settings: watch::Receiver<Arc<Settings>>,
    broadcaster: StatusBroadcaster,
    state: Mutex<State>,
    /// Held for every gateway command sequence so git runs one command at a time
    op_lock: tokio::sync::Mutex<()>,
    idle: Notify,
}

/// Owns the operation queue and the sync status.
///
/// Cloning yields another handle to the same coordinator. Must be used from
/// within a tokio runtime.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    pub fn new(gateway: Arc<dyn Gateway>, settings: watch::Receiver<Arc<Settings>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                settings,
                broadcaster: StatusBroadcaster::new(),
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    draining: false,
                    direct: 0,
                    snapshot: StatusSnapshot::default(),
                }),
                op_lock: tokio::sync::Mutex::new(()),
                idle: Notify::new(),
            }),
        }
    }

    // ── Observation ──────────────────────────────────────────────

    pub fn status(&self) -> StatusSnapshot {
        self.inner.state.lock().snapshot.clone()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StatusSnapshot) + Send + Sync + 'static,
    {
        self.inner.broadcaster.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.broadcaster.unsubscribe(id)
    }

    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.state.lock().draining
    }

    /// Wait until the queue is empty and no drain is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            {
                let state = self.inner.state.lock();
                if !state.draining && state.queue.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    fn settings(&self) -> Arc<Settings> {
        self.inner.settings.borrow().clone()
    }

    // ── Status transitions ───────────────────────────────────────

    /// Set the status and announce it to every subscriber before returning
    fn transition(&self, status: SyncStatus, message: Option<String>, synced: bool) {
        let snapshot = {
            let mut state = self.inner.state.lock();
            state.snapshot.status = status;
            state.snapshot.message = message;
            if synced {
                state.snapshot.last_sync = Some(Utc::now());
            }
            state.snapshot.clone()
        };
        debug!(status = %snapshot.status, message = ?snapshot.message, "status transition");
        self.inner.broadcaster.announce(&snapshot);
    }

    /// Move to `syncing` unless it is already showing or a sticky status is
    fn begin_background(&self) {
        let status = self.status().status;
        if status != SyncStatus::Syncing && !status.is_sticky() {
            self.transition(SyncStatus::Syncing, None, false);
        }
    }

    fn fail(&self, err: &GatewayError) {
        let status = if err.is_structural() {
            SyncStatus::Offline
        } else {
            SyncStatus::Error
        };
        self.transition(status, Some(err.to_string()), false);
    }

    // ── Queue ────────────────────────────────────────────────────

    /// Append an operation and start draining if no drain is running.
    ///
    /// Never blocks; the drain runs on a spawned task.
    pub fn enqueue(&self, operation: SyncOperation) {
        debug!(operation = %operation, "enqueued");

        let start = {
            let mut state = self.inner.state.lock();
            state.queue.push_back(operation);
            !std::mem::replace(&mut state.draining, true)
        };

        if start {
            let this = self.clone();
            tokio::spawn(async move { this.drain().await });
        }
    }

    async fn drain(&self) {
        self.begin_background();

        let mut committed = 0usize;
        let mut push_failure: Option<String> = None;

        loop {
            let next = self.inner.state.lock().queue.pop_front();

            if let Some(operation) = next {
                if self.process(operation).await {
                    committed += 1;
                }
                continue;
            }

            if let Err(err) = self.trailing_push().await {
                warn!(error = %err, "push after drain failed; commits kept locally");
                push_failure = Some(err.to_string());
            }

            // A direct operation that ended mid-drain left the announcement to us
            if !self.status().status.is_sticky() {
                let message = match push_failure.take() {
                    Some(err) => format!("Committed locally, push failed: {err}"),
                    None => format!("Synced {committed} operation(s)"),
                };
                self.transition(SyncStatus::Idle, Some(message), true);
            }

            let done = {
                let mut state = self.inner.state.lock();
                if state.queue.is_empty() {
                    state.draining = false;
                    true
                } else {
                    false
                }
            };

            if done {
                break;
            }
            // More work arrived during the push
            committed = 0;
            self.begin_background();
        }

        self.inner.idle.notify_waiters();
    }

    /// One processing round; returns whether the operation completed.
    ///
    /// Transient failures re-queue the operation at the front until its
    /// rounds run out.
    async fn process(&self, mut operation: SyncOperation) -> bool {
        let settings = self.settings();
        let policy = RetryPolicy::from(&settings.retry);
        operation.attempts += 1;

        let result = self.execute(&operation, &settings, policy).await;

        match result {
            Ok(()) => {
                self.inner.state.lock().snapshot.last_sync = Some(Utc::now());
                true
            }
            Err(err) if err.is_transient() && operation.attempts < settings.retry.max_requeues => {
                warn!(
                    operation_id = operation.id,
                    trigger = operation.trigger.label(),
                    paths = ?operation.paths(),
                    round = operation.attempts,
                    max_rounds = settings.retry.max_requeues,
                    error = %err,
                    "operation failed, re-queued at front"
                );
                self.inner.state.lock().queue.push_front(operation);
                false
            }
            Err(err) => {
                error!(
                    operation_id = operation.id,
                    trigger = operation.trigger.label(),
                    paths = ?operation.paths(),
                    rounds = operation.attempts,
                    attempts_per_round = policy.max_attempts,
                    error = %err,
                    "operation dropped"
                );
                self.fail(&err);
                false
            }
        }
    }

    async fn execute(
        &self,
        operation: &SyncOperation,
        settings: &Settings,
        policy: RetryPolicy,
    ) -> std::result::Result<(), GatewayError> {
        let gateway = &self.inner.gateway;
        let op_lock = &self.inner.op_lock;
        let label = operation.trigger.label();

        match &operation.trigger {
            SyncTrigger::Changes(_) | SyncTrigger::Manual => {
                let paths = operation.staging_paths();
                let paths = paths.as_deref();
                let committer = settings.committer();
                let committer = committer.as_ref();
                let message = operation.message.as_str();
                let outcome = policy
                    .execute(label, move || async move {
                        let _guard = op_lock.lock().await;
                        gateway.commit(message, paths, committer).await
                    })
                    .await?;

                match outcome {
                    CommitOutcome::Committed(hash) => {
                        info!(operation_id = operation.id, commit = %hash, message = %operation.message, "committed")
                    }
                    CommitOutcome::NothingToCommit => {
                        debug!(operation_id = operation.id, "nothing staged, no commit")
                    }
                }
                Ok(())
            }
            SyncTrigger::Pull | SyncTrigger::Push => {
                let Some(remote) = settings.remote() else {
                    warn!(operation_id = operation.id, trigger = label, "no remote configured, skipping");
                    return Ok(());
                };
                let remote = &remote;
                let pull = matches!(operation.trigger, SyncTrigger::Pull);
                policy
                    .execute(label, move || async move {
                        let _guard = op_lock.lock().await;
                        if pull {
                            gateway.pull(remote).await
                        } else {
                            gateway.push(remote).await
                        }
                    })
                    .await
            }
        }
    }

    /// Push once after the queue empties, if auto-push is on and a remote is set
    async fn trailing_push(&self) -> std::result::Result<(), GatewayError> {
        let settings = self.settings();
        let Some(remote) = settings.remote().filter(|_| settings.auto_push) else {
            return Ok(());
        };

        let policy = RetryPolicy::from(&settings.retry);
        let gateway = &self.inner.gateway;
        let op_lock = &self.inner.op_lock;
        let target = &remote;
        policy
            .execute("push", move || async move {
                let _guard = op_lock.lock().await;
                gateway.push(target).await
            })
            .await?;

        info!(remote = %remote.name, branch = %remote.branch, "pushed");
        Ok(())
    }

    // ── Direct operations ────────────────────────────────────────

    /// Check the repository and remote, clearing a sticky status on success
    pub async fn initialize(&self) -> SyncStatus {
        let settings = self.settings();

        match self.inner.gateway.is_initialized().await {
            Ok(true) => {}
            Ok(false) => {
                self.transition(SyncStatus::Offline, Some("Repository not initialized".into()), false);
                return SyncStatus::Offline;
            }
            Err(err) => {
                warn!(error = %err, "repository check failed");
                self.transition(SyncStatus::Offline, Some(err.to_string()), false);
                return SyncStatus::Offline;
            }
        }

        if let Some(remote) = settings.remote() {
            let reachable = self.inner.gateway.test_connection(&remote.url).await.unwrap_or(false);
            if !reachable {
                warn!(url = %remote.url, "remote unreachable");
                self.transition(SyncStatus::Offline, Some(format!("Remote unreachable: {}", remote.url)), false);
                return SyncStatus::Offline;
            }
        }

        self.transition(SyncStatus::Idle, Some("Ready".into()), false);
        SyncStatus::Idle
    }

    /// Probe the configured remote; success clears a sticky status
    pub async fn check_connection(&self) -> Result<bool> {
        let remote = self.settings().remote().ok_or(SyncError::NoRemote)?;

        let reachable = self.inner.gateway.test_connection(&remote.url).await?;
        if reachable {
            self.transition(SyncStatus::Idle, Some(format!("Connected to {}", remote.url)), false);
        } else {
            self.transition(SyncStatus::Offline, Some(format!("Remote unreachable: {}", remote.url)), false);
        }
        Ok(reachable)
    }

    /// Claim the direct-operation slot exclusively; false if any sync is running
    fn try_begin_direct(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.draining || state.direct > 0 || state.snapshot.status == SyncStatus::Syncing {
            return false;
        }
        state.direct += 1;
        true
    }

    /// Release one direct-operation claim; returns whether other work is still running
    fn end_direct(&self) -> bool {
        let busy = {
            let mut state = self.inner.state.lock();
            state.direct = state.direct.saturating_sub(1);
            state.draining || state.direct > 0
        };
        self.inner.idle.notify_waiters();
        busy
    }

    /// Announce a finished direct operation, unless other work still shows `syncing`
    fn finish_direct(&self, busy: bool, message: String, synced: bool) {
        if busy {
            debug!(message = %message, "direct operation done while other work runs");
            if synced {
                self.inner.state.lock().snapshot.last_sync = Some(Utc::now());
            }
        } else {
            self.transition(SyncStatus::Idle, Some(message), synced);
        }
    }

    /// Commit everything that is dirty and push if configured
    pub async fn perform_manual_sync(&self) -> Result<ManualSyncOutcome> {
        if !self.try_begin_direct() {
            info!("manual sync requested while a sync is in progress");
            return Ok(ManualSyncOutcome::AlreadyInProgress);
        }

        let result = self.manual_sync_inner().await;
        let busy = self.end_direct();

        match result {
            Ok((outcome, message)) => {
                let synced = matches!(outcome, ManualSyncOutcome::Synced { .. });
                self.finish_direct(busy, message, synced);
                Ok(outcome)
            }
            Err(err) => {
                if let SyncError::Gateway(err) = &err {
                    error!(trigger = "manual", error = %err, "manual sync failed");
                    self.fail(err);
                }
                Err(err)
            }
        }
    }

    /// Returns the outcome and the status message to announce
    async fn manual_sync_inner(&self) -> Result<(ManualSyncOutcome, String)> {
        let settings = self.settings();
        let _guard = self.inner.op_lock.lock().await;
        self.transition(SyncStatus::Syncing, None, false);

        let status = self.inner.gateway.status().await?;
        if status.is_clean() {
            return Ok((ManualSyncOutcome::NothingToSync, "Nothing to sync".into()));
        }

        let operation = SyncOperation::manual(&settings, status.changed_count());
        let committer = settings.committer();
        let commit = match self.inner.gateway.commit(&operation.message, None, committer.as_ref()).await? {
            CommitOutcome::Committed(hash) => {
                info!(commit = %hash, message = %operation.message, "manual commit");
                Some(hash)
            }
            CommitOutcome::NothingToCommit => None,
        };

        let mut pushed = false;
        if let Some(remote) = settings.remote().filter(|_| settings.auto_push) {
            self.inner.gateway.push(&remote).await?;
            info!(remote = %remote.name, branch = %remote.branch, "pushed");
            pushed = true;
        }

        let message = if pushed {
            format!("Synced {} change(s) and pushed", status.changed_count())
        } else {
            format!("Synced {} change(s)", status.changed_count())
        };
        Ok((ManualSyncOutcome::Synced { commit, pushed }, message))
    }

    /// Pull from the configured remote, reporting failure to the caller
    pub async fn pull(&self) -> Result<()> {
        self.remote_operation(true).await
    }

    /// Push to the configured remote, reporting failure to the caller
    pub async fn push(&self) -> Result<()> {
        self.remote_operation(false).await
    }

    async fn remote_operation(&self, pull: bool) -> Result<()> {
        let label = if pull { "pull" } else { "push" };
        // Fails before any status change
        let remote = self.settings().remote().ok_or(SyncError::NoRemote)?;

        let already_syncing = {
            let mut state = self.inner.state.lock();
            state.direct += 1;
            state.snapshot.status == SyncStatus::Syncing
        };
        if !already_syncing {
            self.transition(SyncStatus::Syncing, None, false);
        }

        let result = {
            let _guard = self.inner.op_lock.lock().await;
            if pull {
                self.inner.gateway.pull(&remote).await
            } else {
                self.inner.gateway.push(&remote).await
            }
        };
        let busy = self.end_direct();

        match result {
            Ok(()) => {
                info!(operation = label, remote = %remote.name, branch = %remote.branch, "done");
                let message = if pull {
                    format!("Pulled from {}/{}", remote.name, remote.branch)
                } else {
                    format!("Pushed to {}/{}", remote.name, remote.branch)
                };
                self.finish_direct(busy, message, true);
                Ok(())
            }
            Err(err) => {
                error!(operation = label, remote = %remote.name, error = %err, "remote operation failed");
                self.fail(&err);
                Err(err.into())
            }
        }
    }
}

impl OperationSink for SyncCoordinator {
    fn submit(&self, operation: SyncOperation) {
        self.enqueue(operation);
    }
}
