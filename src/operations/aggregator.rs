// Change Aggregator
// Debounces the stream of accepted change events into sync operations

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::operation::SyncOperation;
use crate::core::events::{ChangeEvent, ChangeKind};
use crate::core::settings::Settings;
use crate::utilities::PatternMatcher;

/// Receiver of operations emitted by the aggregator
pub trait OperationSink: Send + Sync {
    fn submit(&self, operation: SyncOperation);
}

#[derive(Default)]
struct Pending {
    /// One entry per path, in first-seen order
    changes: Vec<ChangeEvent>,
    /// Bumped on every reschedule and on stop; a timer only flushes its own generation
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    settings: watch::Receiver<Arc<Settings>>,
    sink: Arc<dyn OperationSink>,
    pending: Mutex<Pending>,
    /// Rebuilt whenever the configured exclusion patterns change
    matcher: Mutex<PatternMatcher>,
}

/// Collapses bursts of change events into one operation per quiet period.
///
/// A single global timer is kept: every accepted event replaces the pending
/// flush with a new one a full debounce window away. Must be used from
/// within a tokio runtime.
#[derive(Clone)]
pub struct ChangeAggregator {
    inner: Arc<Inner>,
}

impl ChangeAggregator {
    pub fn new(settings: watch::Receiver<Arc<Settings>>, sink: Arc<dyn OperationSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                sink,
                pending: Mutex::new(Pending::default()),
                matcher: Mutex::new(PatternMatcher::default()),
            }),
        }
    }

    /// Offer an event; returns whether it was accepted into the pending batch
    pub fn accept(&self, event: ChangeEvent) -> bool {
        let settings = self.inner.settings.borrow().clone();

        if !settings.auto_sync {
            trace!(path = %event.path.display(), "auto-sync disabled, ignoring change");
            return false;
        }

        let filtered = {
            let mut matcher = self.inner.matcher.lock();
            if !matcher.is_for(&settings.exclude_patterns) {
                *matcher = PatternMatcher::new(settings.exclude_patterns.clone());
            }
            filter_event(event, &matcher)
        };
        let Some(event) = filtered else {
            return false;
        };
        debug!(path = %event.path.display(), action = event.kind.action(), "change accepted");

        let mut pending = self.inner.pending.lock();
        match pending.changes.iter_mut().find(|c| c.path == event.path) {
            // Last action wins, first-seen position is kept
            Some(existing) => *existing = event,
            None => pending.changes.push(event),
        }

        pending.generation += 1;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }

        let generation = pending.generation;
        let delay = settings.debounce();
        let inner = Arc::clone(&self.inner);
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            Self::flush(&inner, generation);
        }));

        true
    }

    /// Cancel the pending flush and discard unflushed events
    pub fn stop(&self) {
        let mut pending = self.inner.pending.lock();
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.generation += 1;

        let dropped = std::mem::take(&mut pending.changes);
        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), "aggregator stopped with unflushed changes");
        }
    }

    /// Number of distinct paths waiting for the window to close
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().changes.len()
    }

    /// Whether a flush is scheduled
    pub fn is_pending(&self) -> bool {
        self.inner.pending.lock().timer.is_some()
    }

    fn flush(inner: &Inner, generation: u64) {
        let changes = {
            let mut pending = inner.pending.lock();
            if pending.generation != generation {
                return;
            }
            pending.timer = None;
            std::mem::take(&mut pending.changes)
        };

        if changes.is_empty() {
            return;
        }

        let settings = inner.settings.borrow().clone();
        let operation = SyncOperation::from_changes(changes, &settings);
        debug!(operation = %operation, "debounce window closed");
        inner.sink.submit(operation);
    }
}

/// Apply the change filter, rewriting renames that cross the exclusion boundary
fn filter_event(event: ChangeEvent, matcher: &PatternMatcher) -> Option<ChangeEvent> {
    let accepted = matcher.should_sync(&event.path);

    match event.kind {
        ChangeKind::Renamed { from } => {
            let from_accepted = matcher.should_sync(&from);
            let observed_at = event.observed_at;
            let kind_path = match (from_accepted, accepted) {
                (true, true) => Some((ChangeKind::Renamed { from }, event.path)),
                (false, true) => Some((ChangeKind::Created, event.path)),
                (true, false) => Some((ChangeKind::Deleted, from)),
                (false, false) => None,
            };
            kind_path.map(|(kind, path)| ChangeEvent { path, kind, observed_at })
        }
        _ if accepted => Some(event),
        _ => {
            trace!(path = %event.path.display(), "change filtered out");
            None
        }
    }
}
