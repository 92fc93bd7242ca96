// Event Handling
// Change event types and conversion from raw filesystem notifications

use chrono::{DateTime, Utc};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::path::{Path, PathBuf};

use crate::utilities::vault_relative;

/// What happened to a path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A new file appeared
    Created,

    /// File contents changed
    Modified,

    /// The file was removed
    Deleted,

    /// The file moved; the event path is the new location
    Renamed { from: PathBuf },
}

impl ChangeKind {
    /// Verb used for `{action}` in commit messages
    pub fn action(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Modified => "Modified",
            Self::Deleted => "Deleted",
            Self::Renamed { .. } => "Renamed",
        }
    }
}

/// A single vault-relative filesystem change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create an event observed now
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            observed_at: Utc::now(),
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Created)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Modified)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Deleted)
    }

    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self::new(to, ChangeKind::Renamed { from: from.into() })
    }
}

/// Converts raw `notify` events into vault-relative change events
pub struct EventHandler;

impl EventHandler {
    /// Convert a notify event for a vault rooted at `root`.
    ///
    /// Access and metadata-only notifications produce nothing, as do paths
    /// outside the vault.
    pub fn handle(root: &Path, event: Event) -> Vec<ChangeEvent> {
        let relative = |p: &Path| vault_relative(root, p);

        match event.kind {
            EventKind::Create(CreateKind::Folder) => Vec::new(),
            EventKind::Create(_) => Self::each(&event.paths, relative, ChangeEvent::created),
            EventKind::Remove(_) => Self::each(&event.paths, relative, ChangeEvent::deleted),

            EventKind::Modify(ModifyKind::Name(mode)) => Self::handle_rename(mode, &event.paths, relative),
            EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
            EventKind::Modify(_) => Self::each(&event.paths, relative, ChangeEvent::modified),

            EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
        }
    }

    /// Handle rename notifications
    fn handle_rename(
        mode: RenameMode,
        paths: &[PathBuf],
        relative: impl Fn(&Path) -> Option<PathBuf>,
    ) -> Vec<ChangeEvent> {
        match (mode, paths) {
            (RenameMode::Both, [from, to]) => match (relative(from), relative(to)) {
                (Some(from), Some(to)) => vec![ChangeEvent::renamed(from, to)],
                // Moved in or out of the vault
                (None, Some(to)) => vec![ChangeEvent::created(to)],
                (Some(from), None) => vec![ChangeEvent::deleted(from)],
                (None, None) => Vec::new(),
            },
            (RenameMode::From, _) => Self::each(paths, relative, ChangeEvent::deleted),
            (RenameMode::To, _) => Self::each(paths, relative, ChangeEvent::created),
            // Backends that cannot tell the halves apart: decide by existence
            _ => paths
                .iter()
                .filter_map(|p| {
                    let rel = relative(p)?;
                    Some(if p.exists() {
                        ChangeEvent::created(rel)
                    } else {
                        ChangeEvent::deleted(rel)
                    })
                })
                .collect(),
        }
    }

    fn each(
        paths: &[PathBuf],
        relative: impl Fn(&Path) -> Option<PathBuf>,
        make: fn(PathBuf) -> ChangeEvent,
    ) -> Vec<ChangeEvent> {
        paths.iter().filter_map(|p| relative(p)).map(make).collect()
    }
}
