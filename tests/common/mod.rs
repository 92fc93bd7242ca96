// Test Support
// In-memory gateway with failure injection

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vault_sync::core::settings::{RemoteConfig, RetrySettings, Settings};
use vault_sync::operations::git::{
    CommitInfo, CommitOutcome, Committer, Gateway, GatewayError, InitConfig, RepoStatus, Result,
};

/// Failure to inject into the next matching calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Network,
    Conflict,
    NotARepository,
}

impl Failure {
    fn error(self) -> GatewayError {
        match self {
            Failure::Network => GatewayError::Network("connection refused".into()),
            Failure::Conflict => GatewayError::Conflict("note.md".into()),
            Failure::NotARepository => GatewayError::NotARepository(PathBuf::from("/vault")),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryState {
    pub initialized: bool,
    pub reachable: bool,
    pub remotes: Vec<(String, String)>,
    /// Paths changed since the last commit
    pub dirty: BTreeSet<PathBuf>,
    /// Local history, oldest first
    pub commits: Vec<CommitInfo>,
    /// History the remote has seen, oldest first
    pub remote_commits: Vec<CommitInfo>,
    /// Message of every commit call, including failed ones
    pub commit_calls: Vec<String>,
    pub push_calls: usize,
    /// Remote URL handed to every push call, in call order
    pub push_urls: Vec<String>,
    pub pull_calls: usize,
    /// (message substring, remaining failures, kind); empty substring matches every commit
    pub commit_failures: Vec<(String, usize, Failure)>,
    pub push_failures: usize,
    pub pull_failures: Option<(usize, Failure)>,
}

/// Gateway that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemoryGateway {
    pub state: Mutex<MemoryState>,
    /// Commits wait while a test holds this lock
    pub commit_gate: tokio::sync::Mutex<()>,
    /// Pushes wait while a test holds this lock
    pub push_gate: tokio::sync::Mutex<()>,
}

impl MemoryGateway {
    /// An initialized repository with a reachable remote
    pub fn new() -> Arc<Self> {
        let gateway = Self::default();
        {
            let mut state = gateway.state.lock();
            state.initialized = true;
            state.reachable = true;
        }
        Arc::new(gateway)
    }

    /// Mark a path as changed in the working tree
    pub fn touch(&self, path: impl AsRef<Path>) {
        self.state.lock().dirty.insert(path.as_ref().to_path_buf());
    }

    /// Fail the next `count` commits with a network error
    pub fn fail_next_commits(&self, count: usize) {
        self.fail_commits_matching("", count, Failure::Network);
    }

    /// Fail the next `count` commits whose message contains `needle`
    pub fn fail_commits_matching(&self, needle: &str, count: usize, failure: Failure) {
        self.state.lock().commit_failures.push((needle.to_string(), count, failure));
    }

    pub fn fail_next_pushes(&self, count: usize) {
        self.state.lock().push_failures = count;
    }

    pub fn fail_next_pulls(&self, count: usize, failure: Failure) {
        self.state.lock().pull_failures = Some((count, failure));
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    pub fn commit_messages(&self) -> Vec<String> {
        self.state.lock().commits.iter().map(|c| c.message.clone()).collect()
    }

    pub fn remote_messages(&self) -> Vec<String> {
        self.state.lock().remote_commits.iter().map(|c| c.message.clone()).collect()
    }

    pub fn commit_calls(&self) -> Vec<String> {
        self.state.lock().commit_calls.clone()
    }

    pub fn push_calls(&self) -> usize {
        self.state.lock().push_calls
    }

    pub fn push_urls(&self) -> Vec<String> {
        self.state.lock().push_urls.clone()
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn is_initialized(&self) -> Result<bool> {
        Ok(self.state.lock().initialized)
    }

    async fn init(&self, _config: &InitConfig) -> Result<()> {
        self.state.lock().initialized = true;
        Ok(())
    }

    async fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        self.state.lock().remotes.push((name.to_string(), url.to_string()));
        Ok(())
    }

    async fn commit(
        &self,
        message: &str,
        paths: Option<&[PathBuf]>,
        committer: Option<&Committer>,
    ) -> Result<CommitOutcome> {
        drop(self.commit_gate.lock().await);
        // Yield so concurrent callers interleave as they would with a real process
        tokio::task::yield_now().await;

        let mut state = self.state.lock();
        state.commit_calls.push(message.to_string());

        if !state.initialized {
            return Err(GatewayError::NotARepository(PathBuf::from("/vault")));
        }
        if let Some(entry) = state
            .commit_failures
            .iter_mut()
            .find(|(needle, remaining, _)| *remaining > 0 && message.contains(needle.as_str()))
        {
            entry.1 -= 1;
            return Err(entry.2.error());
        }

        let staged: Vec<PathBuf> = match paths {
            Some(paths) => paths.iter().filter(|p| state.dirty.contains(*p)).cloned().collect(),
            None => state.dirty.iter().cloned().collect(),
        };
        if staged.is_empty() {
            return Ok(CommitOutcome::NothingToCommit);
        }
        for path in &staged {
            state.dirty.remove(path);
        }

        let hash = format!("{:040x}", state.commits.len() + 1);
        let author = committer.map(|c| c.name.clone()).unwrap_or_else(|| "Vault".to_string());
        state.commits.push(CommitInfo {
            hash: hash.clone(),
            author,
            date: Utc::now().into(),
            message: message.to_string(),
        });
        Ok(CommitOutcome::Committed(hash))
    }

    async fn push(&self, remote: &RemoteConfig) -> Result<()> {
        drop(self.push_gate.lock().await);
        tokio::task::yield_now().await;

        let mut state = self.state.lock();
        state.push_calls += 1;
        state.push_urls.push(remote.url.clone());
        if state.push_failures > 0 {
            state.push_failures -= 1;
            return Err(GatewayError::Network("connection refused".into()));
        }
        state.remote_commits = state.commits.clone();
        Ok(())
    }

    async fn pull(&self, _remote: &RemoteConfig) -> Result<()> {
        tokio::task::yield_now().await;

        let mut state = self.state.lock();
        state.pull_calls += 1;
        if let Some((remaining, failure)) = state.pull_failures.as_mut() {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(failure.error());
            }
        }
        Ok(())
    }

    async fn status(&self) -> Result<RepoStatus> {
        let state = self.state.lock();
        if !state.initialized {
            return Err(GatewayError::NotARepository(PathBuf::from("/vault")));
        }
        Ok(RepoStatus {
            modified: state.dirty.iter().cloned().collect(),
            ..RepoStatus::default()
        })
    }

    async fn log(&self, limit: usize) -> Result<Vec<CommitInfo>> {
        Ok(self.state.lock().commits.iter().rev().take(limit).cloned().collect())
    }

    async fn current_branch(&self) -> Result<String> {
        Ok("main".to_string())
    }

    async fn list_branches(&self) -> Result<Vec<String>> {
        Ok(vec!["main".to_string()])
    }

    async fn test_connection(&self, _url: &str) -> Result<bool> {
        Ok(self.state.lock().reachable)
    }
}

/// Settings tuned for tests: short windows and delays
pub fn test_settings() -> Settings {
    Settings {
        debounce_ms: 100,
        commit_template: "vault: {action} {filename}".to_string(),
        exclude_patterns: vec!["*.draft".to_string()],
        retry: RetrySettings {
            attempts: 2,
            base_delay_ms: 10,
            max_requeues: 3,
        },
        ..Settings::default()
    }
}

/// Test settings with a remote configured
pub fn remote_settings() -> Settings {
    Settings {
        remote_url: Some("https://example.com/vault.git".to_string()),
        ..test_settings()
    }
}
