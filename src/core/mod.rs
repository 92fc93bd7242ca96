// Core infrastructure module
// Settings, change events, sync status, the watcher and the service that ties them together

pub mod app;
pub mod app_config;
pub mod events;
pub mod settings;
pub mod status;
pub mod watcher;

pub use app::VaultSync;
pub use events::{ChangeEvent, ChangeKind, EventHandler};
pub use settings::{AuthMode, NotificationLevel, RemoteConfig, RetrySettings, Settings};
pub use status::{StatusBroadcaster, StatusSnapshot, SubscriptionId, SyncStatus};
pub use watcher::{VaultWatcher, WatcherError};
