// Vault Sync Library
// Watches a notes vault and turns file changes into git commits

// Core infrastructure - settings, events, status and the service
pub mod core;

// Operations - git gateway, debouncing, retries and the coordinator
pub mod operations;

// Render - terminal status line
pub mod render;

// Utilities - path helpers and the change filter
pub mod utilities;

// Application constants
pub mod constants;

// Re-export commonly used items for convenience
pub use core::{ChangeEvent, ChangeKind, Settings, StatusSnapshot, SyncStatus, VaultSync};
pub use operations::{Gateway, GatewayError, GitGateway, ManualSyncOutcome, SyncCoordinator, SyncError};
