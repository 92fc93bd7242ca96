// Application Constants
// Fixed names, bounds and timeouts shared across modules

use std::time::Duration;

/// Settings file looked up in the vault root
pub const SETTINGS_FILE_NAME: &str = ".vault-sync.yaml";

/// Version-control metadata directory, never synced
pub const VCS_METADATA_DIR: &str = ".git";

/// Lower bound for the debounce window in milliseconds
pub const MIN_DEBOUNCE_MS: u64 = 100;

/// Upper bound for the debounce window in milliseconds
pub const MAX_DEBOUNCE_MS: u64 = 5000;

/// How long a remote reachability probe may take
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound for a push or pull
pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of entries shown by `vault-sync log`
pub const DEFAULT_LOG_LIMIT: usize = 10;

/// OS and editor files that are never synced, matched on the file name
pub const TRANSIENT_FILE_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Transient file name prefixes (office lock files, emacs lock links)
pub const TRANSIENT_FILE_PREFIXES: &[&str] = &[".~lock.", "~$", ".#"];

/// Transient file name suffixes (swap, backup, partial download files)
pub const TRANSIENT_FILE_SUFFIXES: &[&str] = &[
    "~",
    ".swp",
    ".swo",
    ".swx",
    ".tmp",
    ".temp",
    ".bak",
    ".crdownload",
    ".part",
];
