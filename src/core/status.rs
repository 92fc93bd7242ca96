// Sync Status
// Observable sync state and the synchronous publish/subscribe registry

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Coarse state of the sync machinery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    /// Nothing in flight
    Idle,
    /// A queue drain or a direct operation is running
    Syncing,
    /// The last operation failed; sticky until a corrective action succeeds
    Error,
    /// Repository or remote unavailable; sticky until a corrective action succeeds
    Offline,
}

impl SyncStatus {
    /// Whether this status survives unrelated successful activity
    pub fn is_sticky(self) -> bool {
        matches!(self, Self::Error | Self::Offline)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Error => "error",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status plus context, as seen by observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: SyncStatus,
    pub message: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            message: None,
            last_sync: None,
        }
    }
}

/// Handle returned by [`StatusBroadcaster::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&StatusSnapshot) + Send + Sync>;

/// Observer registry for status transitions.
///
/// Subscribers are called synchronously, in registration order, from the
/// thread performing the transition. The registry lock is released before
/// any callback runs, so callbacks may subscribe, unsubscribe or read status.
#[derive(Default)]
pub struct StatusBroadcaster {
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
    next_id: AtomicU64,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every future transition
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StatusSnapshot) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Call every current subscriber with the new snapshot
    pub(crate) fn announce(&self, snapshot: &StatusSnapshot) {
        let subscribers: Vec<Callback> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in subscribers {
            callback(snapshot);
        }
    }
}

impl fmt::Debug for StatusBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusBroadcaster")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: SyncStatus) -> StatusSnapshot {
        StatusSnapshot {
            status,
            ..StatusSnapshot::default()
        }
    }

    #[test]
    fn test_announce_in_registration_order() {
        let broadcaster = StatusBroadcaster::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            broadcaster.subscribe(move |s| seen.lock().push((tag, s.status)));
        }

        broadcaster.announce(&snapshot(SyncStatus::Syncing));

        assert_eq!(
            *seen.lock(),
            vec![
                ("first", SyncStatus::Syncing),
                ("second", SyncStatus::Syncing),
                ("third", SyncStatus::Syncing),
            ]
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let broadcaster = StatusBroadcaster::new();
        let count = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&count);
        let id = broadcaster.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        broadcaster.announce(&snapshot(SyncStatus::Idle));
        assert!(broadcaster.unsubscribe(id));
        assert!(!broadcaster.unsubscribe(id));
        broadcaster.announce(&snapshot(SyncStatus::Error));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn test_callback_may_subscribe_during_announce() {
        let broadcaster = Arc::new(StatusBroadcaster::new());
        let inner = Arc::clone(&broadcaster);
        broadcaster.subscribe(move |_| {
            inner.subscribe(|_| {});
        });

        broadcaster.announce(&snapshot(SyncStatus::Idle));
        assert_eq!(broadcaster.subscriber_count(), 2);
    }

    #[test]
    fn test_sticky_states() {
        assert!(SyncStatus::Error.is_sticky());
        assert!(SyncStatus::Offline.is_sticky());
        assert!(!SyncStatus::Idle.is_sticky());
        assert!(!SyncStatus::Syncing.is_sticky());
    }
}
