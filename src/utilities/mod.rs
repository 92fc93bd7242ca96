// Utilities module
// Path helpers and the change filter

pub mod paths;
pub mod patterns;

pub use paths::{display_name, normalize_path, vault_relative};
pub use patterns::{glob_match, is_system_path, matches_pattern, should_sync, PatternMatcher};
