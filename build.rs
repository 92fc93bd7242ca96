// Build script - reads config.yaml at compile time and generates settings defaults
// This allows changing defaults during development without editing source code

use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Tell Cargo to rerun if config.yaml changes
    println!("cargo:rerun-if-changed=src/config.yaml");

    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("compiled_config.rs");

    // Try to read config.yaml from src/, fall back to hardcoded defaults if not found
    let config = if Path::new("src/config.yaml").exists() {
        let content = fs::read_to_string("src/config.yaml")
            .expect("Failed to read src/config.yaml");
        parse_config(&content)
    } else {
        CompiledConfig::default()
    };

    // Generate Rust code with the compiled-in values
    let generated = format!(
        r#"// Auto-generated from config.yaml at compile time
// Do not edit - modify config.yaml and rebuild instead

pub const REMOTE_NAME: &str = {remote_name:?};
pub const BRANCH: &str = {branch:?};
pub const AUTH_MODE: &str = {auth_mode:?};
pub const AUTO_SYNC: bool = {auto_sync};
pub const AUTO_PUSH: bool = {auto_push};
pub const COMMIT_TEMPLATE: &str = {commit_template:?};
pub const DEBOUNCE_MS: u64 = {debounce_ms};
pub const NOTIFICATIONS: &str = {notifications:?};

pub const RETRY_ATTEMPTS: u32 = {retry_attempts};
pub const RETRY_BASE_DELAY_MS: u64 = {retry_base_delay_ms};
pub const MAX_REQUEUES: u32 = {max_requeues};

pub const EXCLUDE_PATTERNS: &[&str] = &[
{excludes}
];
"#,
        remote_name = config.remote_name,
        branch = config.branch,
        auth_mode = config.auth_mode,
        auto_sync = config.auto_sync,
        auto_push = config.auto_push,
        commit_template = config.commit_template,
        debounce_ms = config.debounce_ms,
        notifications = config.notifications,
        retry_attempts = config.retry_attempts,
        retry_base_delay_ms = config.retry_base_delay_ms,
        max_requeues = config.max_requeues,
        excludes = config.exclude_patterns
            .iter()
            .map(|e| format!("    {:?},", e))
            .collect::<Vec<_>>()
            .join("\n"),
    );

    fs::write(&dest_path, generated).expect("Failed to write compiled config");
}

struct CompiledConfig {
    remote_name: String,
    branch: String,
    auth_mode: String,
    auto_sync: bool,
    auto_push: bool,
    commit_template: String,
    debounce_ms: u64,
    notifications: String,
    retry_attempts: u32,
    retry_base_delay_ms: u64,
    max_requeues: u32,
    exclude_patterns: Vec<String>,
}

impl Default for CompiledConfig {
    fn default() -> Self {
        Self {
            remote_name: "origin".to_string(),
            branch: "main".to_string(),
            auth_mode: "https".to_string(),
            auto_sync: true,
            auto_push: true,
            commit_template: "vault: {action} {filename}".to_string(),
            debounce_ms: 500,
            notifications: "errors".to_string(),
            retry_attempts: 2,
            retry_base_delay_ms: 500,
            max_requeues: 3,
            exclude_patterns: vec![
                ".obsidian/workspace*".to_string(),
                ".trash/*".to_string(),
            ],
        }
    }
}

fn parse_config(content: &str) -> CompiledConfig {
    let mut config = CompiledConfig::default();

    // Simple YAML parsing (avoiding external dependencies in build script)
    let mut in_defaults = false;
    let mut in_retry = false;
    let mut in_excludes = false;

    for line in content.lines() {
        let trimmed = line.trim();

        // Track which section we're in
        if trimmed.starts_with("defaults:") {
            in_defaults = true;
            in_retry = false;
            in_excludes = false;
            continue;
        } else if trimmed.starts_with("retry:") {
            in_defaults = false;
            in_retry = true;
            in_excludes = false;
            continue;
        } else if trimmed.starts_with("exclude_patterns:") {
            in_defaults = false;
            in_retry = false;
            in_excludes = true;
            config.exclude_patterns.clear(); // Start fresh when we see the section
            continue;
        }

        if let Some((key, value)) = parse_kv(trimmed) {
            let value = unquote(value);
            if in_defaults {
                match key {
                    "remote_name" => config.remote_name = value.to_string(),
                    "branch" => config.branch = value.to_string(),
                    "auth_mode" => config.auth_mode = value.to_string(),
                    "auto_sync" => config.auto_sync = parse_bool(value),
                    "auto_push" => config.auto_push = parse_bool(value),
                    "commit_template" => config.commit_template = value.to_string(),
                    "debounce_ms" => config.debounce_ms = value.parse().unwrap_or(500),
                    "notifications" => config.notifications = value.to_string(),
                    _ => {}
                }
            } else if in_retry {
                match key {
                    "attempts" => config.retry_attempts = value.parse().unwrap_or(2),
                    "base_delay_ms" => config.retry_base_delay_ms = value.parse().unwrap_or(500),
                    "max_requeues" => config.max_requeues = value.parse().unwrap_or(3),
                    _ => {}
                }
            }
        }

        // Parse list items for exclude_patterns
        if in_excludes && trimmed.starts_with("- ") {
            config.exclude_patterns.push(unquote(&trimmed[2..]).to_string());
            continue;
        }

        // Stop parsing excludes when we hit a non-list line
        if in_excludes && !trimmed.starts_with("- ") && !trimmed.is_empty() && !trimmed.starts_with('#') {
            in_excludes = false;
        }
    }

    config
}

fn parse_kv(line: &str) -> Option<(&str, &str)> {
    // Skip comments, empty lines and list items
    if line.starts_with('#') || line.is_empty() || line.starts_with("- ") {
        return None;
    }

    // Find the colon separator
    let colon_pos = line.find(':')?;
    let key = line[..colon_pos].trim();
    let mut value = line[colon_pos + 1..].trim();

    // Remove inline comments (but not a # inside a quoted value)
    if !value.starts_with('"') && !value.starts_with('\'') {
        if let Some(comment_pos) = value.find(" #") {
            value = value[..comment_pos].trim();
        }
    }

    // Skip if value is empty (section header)
    if value.is_empty() {
        return None;
    }

    Some((key, value))
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"').trim_matches('\'')
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "yes" | "1")
}
