// Sync Operations
// Units of work owned by the coordinator queue

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::events::{ChangeEvent, ChangeKind};
use crate::core::settings::Settings;
use crate::utilities::display_name;

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// What caused an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTrigger {
    /// An aggregated burst of file changes, one entry per path
    Changes(Vec<ChangeEvent>),
    /// Commit everything that is dirty
    Manual,
    /// Fetch and merge from the remote
    Pull,
    /// Publish local commits
    Push,
}

impl SyncTrigger {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Changes(_) => "changes",
            Self::Manual => "manual",
            Self::Pull => "pull",
            Self::Push => "push",
        }
    }
}

/// A queued unit of version-control work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOperation {
    pub id: u64,
    pub trigger: SyncTrigger,
    pub message: String,
    pub enqueued_at: DateTime<Utc>,
    /// Processing rounds already spent on this operation
    pub attempts: u32,
}

impl SyncOperation {
    fn new(trigger: SyncTrigger, message: String) -> Self {
        Self {
            id: NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed),
            trigger,
            message,
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }

    /// Build a commit operation for an aggregated batch
    pub fn from_changes(changes: Vec<ChangeEvent>, settings: &Settings) -> Self {
        let (action, filename) = describe_batch(&changes);
        let message = settings.commit_message(&action, &filename);
        Self::new(SyncTrigger::Changes(changes), message)
    }

    /// Build a commit-everything operation for `changed` dirty paths
    pub fn manual(settings: &Settings, changed: usize) -> Self {
        let message = settings.commit_message("Synced", &file_count(changed));
        Self::new(SyncTrigger::Manual, message)
    }

    pub fn pull() -> Self {
        Self::new(SyncTrigger::Pull, String::from("pull"))
    }

    pub fn push() -> Self {
        Self::new(SyncTrigger::Push, String::from("push"))
    }

    /// Paths to stage, or `None` to stage the whole tree.
    ///
    /// A single created, modified or renamed file is staged on its own
    /// (renames stage both locations); deletions and multi-file batches stage
    /// everything.
    pub fn staging_paths(&self) -> Option<Vec<PathBuf>> {
        let SyncTrigger::Changes(changes) = &self.trigger else {
            return None;
        };

        match changes.as_slice() {
            [single] => match &single.kind {
                ChangeKind::Deleted => None,
                ChangeKind::Renamed { from } => Some(vec![from.clone(), single.path.clone()]),
                ChangeKind::Created | ChangeKind::Modified => Some(vec![single.path.clone()]),
            },
            _ => None,
        }
    }

    /// Paths this operation was created for, for logging
    pub fn paths(&self) -> Vec<&PathBuf> {
        match &self.trigger {
            SyncTrigger::Changes(changes) => changes.iter().map(|c| &c.path).collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} ({})", self.id, self.trigger.label(), self.message)
    }
}

/// `{action}` and `{filename}` for a batch of changes
pub fn describe_batch(changes: &[ChangeEvent]) -> (String, String) {
    match changes {
        [] => ("Updated".to_string(), file_count(0)),
        [single] => (single.kind.action().to_string(), display_name(&single.path)),
        [first, rest @ ..] => {
            let action = first.kind.action();
            let shared = rest.iter().all(|c| c.kind.action() == action);
            let action = if shared { action } else { "Updated" };
            (action.to_string(), file_count(changes.len()))
        }
    }
}

fn file_count(n: usize) -> String {
    if n == 1 {
        "1 file".to_string()
    } else {
        format!("{n} files")
    }
}
