// Vault Watcher
// Recursive filesystem watch that feeds change events into the aggregator

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::EventHandler;
use crate::operations::aggregator::ChangeAggregator;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    WatcherCreation(#[from] notify::Error),

    #[error("Failed to watch path {path}: {source}")]
    WatchPath {
        path: PathBuf,
        source: notify::Error,
    },

    #[error("Vault root not accessible: {path}: {source}")]
    Root {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Active watch on a vault root.
///
/// Raw notifications cross from the notify thread to a tokio task over an
/// unbounded channel, where they are converted and offered to the aggregator.
/// Dropping the watcher stops both.
pub struct VaultWatcher {
    root: PathBuf,
    watcher: RecommendedWatcher,
    forward: JoinHandle<()>,
}

impl VaultWatcher {
    /// Start watching `root` recursively
    pub fn start(root: &Path, aggregator: ChangeAggregator) -> Result<Self, WatcherError> {
        // notify reports canonical paths; relativize against the same form
        let root = root.canonicalize().map_err(|source| WatcherError::Root {
            path: root.to_path_buf(),
            source,
        })?;

        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // Receiver gone means the watcher is shutting down
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| WatcherError::WatchPath {
                path: root.clone(),
                source,
            })?;

        let task_root = root.clone();
        let forward = tokio::spawn(async move {
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => {
                        for change in EventHandler::handle(&task_root, event) {
                            aggregator.accept(change);
                        }
                    }
                    Err(err) => warn!(error = %err, "filesystem watch error"),
                }
            }
            debug!("watch channel closed");
        });

        info!(root = %root.display(), "watching vault");
        Ok(Self { root, watcher, forward })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop watching; events already forwarded stay with the aggregator
    pub fn stop(mut self) {
        if let Err(err) = self.watcher.unwatch(&self.root) {
            debug!(error = %err, "unwatch failed");
        }
        info!(root = %self.root.display(), "stopped watching vault");
    }
}

impl Drop for VaultWatcher {
    fn drop(&mut self) {
        self.forward.abort();
    }
}
