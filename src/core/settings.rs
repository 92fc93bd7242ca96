// Vault Settings
// Per-vault configuration loaded from .vault-sync.yaml

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::constants::{MAX_DEBOUNCE_MS, MIN_DEBOUNCE_MS, SETTINGS_FILE_NAME};
use crate::operations::git::Committer;

/// How the remote authenticates; decides which non-interactive git knobs are set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Ssh,
    Https,
}

/// Which status transitions the terminal status line reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// Every transition
    All,
    /// Only error and offline transitions
    Errors,
    /// Nothing
    #[serde(alias = "off")]
    None,
}

/// Retry budget for queued operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Gateway attempts per processing round
    pub attempts: u32,

    /// Delay before the first retry; doubled after every failed attempt
    pub base_delay_ms: u64,

    /// Processing rounds (initial plus re-queues) before an operation is dropped
    pub max_requeues: u32,
}

/// Everything the gateway needs to reach the remote.
///
/// Operations capture this once when they start, so a settings change never
/// redirects a push that is already running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub name: String,
    pub url: String,
    pub branch: String,
    pub auth_mode: AuthMode,
}

/// Vault-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Remote repository URL (or local path); unset means local-only
    pub remote_url: Option<String>,

    /// Git remote name
    pub remote_name: String,

    /// Branch to commit on and push to
    pub branch: String,

    /// Remote authentication mode
    pub auth_mode: AuthMode,

    /// Commit automatically when files change
    pub auto_sync: bool,

    /// Push after every drained batch of commits
    pub auto_push: bool,

    /// Commit message template with `{action}` and `{filename}` placeholders
    pub commit_template: String,

    /// Quiet period after the last change before committing
    pub debounce_ms: u64,

    /// Glob patterns (vault-relative) that are never synced
    pub exclude_patterns: Vec<String>,

    /// Committer identity override
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,

    /// Status line verbosity
    pub notifications: NotificationLevel,

    /// Retry budget for queued operations
    pub retry: RetrySettings,
}

impl Settings {
    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;

        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings YAML: {}", path.display()))?;

        settings.validated()
    }

    /// Load settings from a vault root, using defaults if the vault has none
    pub fn load_from_vault(vault_root: &Path) -> Result<Self> {
        let path = vault_root.join(SETTINGS_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize settings")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;

        Ok(())
    }

    /// Normalize and check the settings.
    ///
    /// The debounce window is clamped into range; a blank remote URL counts
    /// as no remote.
    pub fn validated(mut self) -> Result<Self> {
        self.debounce_ms = self.debounce_ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);

        self.remote_url = self
            .remote_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        if let Some(url) = &self.remote_url {
            if url.chars().any(char::is_whitespace) {
                bail!("Remote URL must not contain whitespace: {url:?}");
            }
        }
        if self.commit_template.trim().is_empty() {
            bail!("Commit message template must not be empty");
        }
        if self.branch.trim().is_empty() {
            bail!("Branch name must not be empty");
        }
        if self.retry.attempts == 0 || self.retry.max_requeues == 0 {
            bail!("Retry attempts and rounds must be at least 1");
        }

        Ok(self)
    }

    /// Remote configuration, if a remote URL is set
    pub fn remote(&self) -> Option<RemoteConfig> {
        self.remote_url.as_ref().map(|url| RemoteConfig {
            name: self.remote_name.clone(),
            url: url.clone(),
            branch: self.branch.clone(),
            auth_mode: self.auth_mode,
        })
    }

    /// Committer override; only used when both name and email are set
    pub fn committer(&self) -> Option<Committer> {
        match (&self.committer_name, &self.committer_email) {
            (Some(name), Some(email)) => Some(Committer {
                name: name.clone(),
                email: email.clone(),
            }),
            _ => None,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Fill the commit template
    pub fn commit_message(&self, action: &str, filename: &str) -> String {
        self.commit_template
            .replace("{action}", action)
            .replace("{filename}", filename)
    }
}
