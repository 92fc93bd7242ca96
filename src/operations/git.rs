// Git Operations
// Version-control gateway: the narrow interface the sync core depends on,
// and its implementation on top of the git command-line tool

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::path::{Path, PathBuf};
use std::process::Output;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::constants::{CONNECTION_TIMEOUT, REMOTE_TIMEOUT, VCS_METADATA_DIR};
use crate::core::settings::{AuthMode, RemoteConfig};

/// Failures a gateway call can report
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("Remote unreachable: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Merge conflict: {0}")]
    Conflict(String),

    #[error("Push rejected by remote: {0}")]
    Rejected(String),

    #[error("Timed out waiting for git {0}")]
    Timeout(String),

    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("Failed to run git: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NotARepository(_) | Self::Conflict(_) | Self::Rejected(_))
    }

    /// Whether the repository itself is missing or unusable
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::NotARepository(_))
    }

    /// Classify a failed git invocation from its stderr
    fn classify(repo_path: &Path, command: &str, stderr: &str) -> Self {
        let lower = stderr.to_lowercase();

        if lower.contains("not a git repository") {
            Self::NotARepository(repo_path.to_path_buf())
        } else if lower.contains("conflict")
            || lower.contains("automatic merge failed")
            || lower.contains("unmerged files")
            || lower.contains("would be overwritten by merge")
        {
            Self::Conflict(stderr.trim().to_string())
        } else if lower.contains("authentication failed")
            || lower.contains("permission denied")
            || lower.contains("could not read username")
            || lower.contains("invalid username or password")
        {
            Self::Auth(stderr.trim().to_string())
        } else if lower.contains("could not resolve host")
            || lower.contains("unable to access")
            || lower.contains("connection refused")
            || lower.contains("connection timed out")
            || lower.contains("network is unreachable")
            || lower.contains("could not read from remote repository")
        {
            Self::Network(stderr.trim().to_string())
        } else if lower.contains("[rejected]") || lower.contains("non-fast-forward") {
            Self::Rejected(stderr.trim().to_string())
        } else {
            Self::Command {
                command: command.to_string(),
                stderr: stderr.trim().to_string(),
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Identity recorded on commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

/// Parameters for creating a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitConfig {
    pub branch: String,
    pub committer: Option<Committer>,
}

/// Result of a commit request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A commit was created with this hash
    Committed(String),
    /// Nothing was staged; not an error
    NothingToCommit,
}

/// Working tree status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoStatus {
    pub staged: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub untracked: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    pub conflicted: Vec<PathBuf>,
}

impl RepoStatus {
    /// No staged, modified, untracked, deleted or conflicted paths
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.modified.is_empty()
            && self.untracked.is_empty()
            && self.deleted.is_empty()
            && self.conflicted.is_empty()
    }

    /// Number of distinct changed paths
    pub fn changed_count(&self) -> usize {
        let mut all: Vec<&PathBuf> = self
            .staged
            .iter()
            .chain(&self.modified)
            .chain(&self.untracked)
            .chain(&self.deleted)
            .chain(&self.conflicted)
            .collect();
        all.sort();
        all.dedup();
        all.len()
    }
}

/// One log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub author: String,
    pub date: DateTime<FixedOffset>,
    pub message: String,
}

/// The version-control operations the sync core depends on.
///
/// Every call either returns a defined value or a distinguishable
/// [`GatewayError`]; "nothing to commit" is a successful
/// [`CommitOutcome::NothingToCommit`].
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn is_initialized(&self) -> Result<bool>;

    async fn init(&self, config: &InitConfig) -> Result<()>;

    async fn add_remote(&self, name: &str, url: &str) -> Result<()>;

    /// Stage `paths` (or the whole tree when `None`) and commit
    async fn commit(
        &self,
        message: &str,
        paths: Option<&[PathBuf]>,
        committer: Option<&Committer>,
    ) -> Result<CommitOutcome>;

    async fn push(&self, remote: &RemoteConfig) -> Result<()>;

    async fn pull(&self, remote: &RemoteConfig) -> Result<()>;

    async fn status(&self) -> Result<RepoStatus>;

    /// Most recent commits first
    async fn log(&self, limit: usize) -> Result<Vec<CommitInfo>>;

    async fn current_branch(&self) -> Result<String>;

    async fn list_branches(&self) -> Result<Vec<String>>;

    async fn test_connection(&self, url: &str) -> Result<bool>;
}

/// Gateway backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitGateway {
    repo_path: PathBuf,
}

impl GitGateway {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Build a non-interactive git command in the repository
    fn command(&self, auth_mode: Option<AuthMode>) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_path)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);

        match auth_mode {
            Some(AuthMode::Ssh) if std::env::var_os("GIT_SSH_COMMAND").is_none() => {
                cmd.env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes");
            }
            Some(AuthMode::Https) => {
                cmd.env("GCM_INTERACTIVE", "never");
            }
            _ => {}
        }

        cmd
    }

    /// Run git and return the raw output regardless of exit status
    async fn output(&self, args: &[&str], auth_mode: Option<AuthMode>) -> Result<Output> {
        debug!(repo = %self.repo_path.display(), ?args, "git");
        let mut cmd = self.command(auth_mode);
        cmd.args(args);

        // Only commands that talk to a remote carry an auth mode; bound those
        if auth_mode.is_none() {
            return Ok(cmd.output().await?);
        }
        match tokio::time::timeout(REMOTE_TIMEOUT, cmd.output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(GatewayError::Timeout(args.first().copied().unwrap_or_default().to_string())),
        }
    }

    /// Run git, returning stdout on success and a classified error otherwise
    async fn run(&self, args: &[&str], auth_mode: Option<AuthMode>) -> Result<String> {
        let output = self.output(args, auth_mode).await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            // Some failures (merge conflicts) are reported on stdout
            let mut message = String::from_utf8_lossy(&output.stderr).into_owned();
            if message.trim().is_empty() {
                message = String::from_utf8_lossy(&output.stdout).into_owned();
            }
            Err(GatewayError::classify(
                &self.repo_path,
                args.first().copied().unwrap_or_default(),
                &message,
            ))
        }
    }

    async fn require_repo(&self) -> Result<()> {
        if self.is_initialized().await? {
            Ok(())
        } else {
            Err(GatewayError::NotARepository(self.repo_path.clone()))
        }
    }

    /// Point `remote.name` at the snapshot's URL, adding it if missing
    async fn ensure_remote(&self, remote: &RemoteConfig) -> Result<()> {
        let current = self.output(&["remote", "get-url", &remote.name], None).await?;

        if !current.status.success() {
            return self.add_remote(&remote.name, &remote.url).await;
        }
        if String::from_utf8_lossy(&current.stdout).trim() != remote.url {
            self.run(&["remote", "set-url", &remote.name, &remote.url], None).await?;
        }

        Ok(())
    }

    async fn has_head(&self) -> Result<bool> {
        let output = self.output(&["rev-parse", "--verify", "--quiet", "HEAD"], None).await?;
        Ok(output.status.success())
    }

    /// Whether git ignores an untracked path; tracked paths are never reported
    async fn is_ignored(&self, path: &str) -> Result<bool> {
        let output = self.output(&["check-ignore", "-q", "--", path], None).await?;
        Ok(output.status.success())
    }

    /// Stage one path, handling paths that no longer exist on disk.
    ///
    /// Ignored paths are skipped, leaving nothing staged for them.
    async fn stage_path(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        if self.is_ignored(&path).await? {
            debug!(path = %path, "ignored by git, not staged");
            return Ok(());
        }
        if self.repo_path.join(path.as_ref()).exists() {
            self.run(&["add", "-A", "--", &path], None).await?;
        } else {
            self.run(&["rm", "-r", "-q", "--cached", "--ignore-unmatch", "--", &path], None)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for GitGateway {
    async fn is_initialized(&self) -> Result<bool> {
        Ok(self.repo_path.join(VCS_METADATA_DIR).exists())
    }

    async fn init(&self, config: &InitConfig) -> Result<()> {
        tokio::fs::create_dir_all(&self.repo_path).await?;

        if !self.is_initialized().await? {
            self.run(&["init", "-q"], None).await?;
        }
        if !self.has_head().await? {
            let head = format!("refs/heads/{}", config.branch);
            self.run(&["symbolic-ref", "HEAD", &head], None).await?;
        }
        if let Some(committer) = &config.committer {
            self.run(&["config", "user.name", &committer.name], None).await?;
            self.run(&["config", "user.email", &committer.email], None).await?;
        }

        Ok(())
    }

    async fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        self.require_repo().await?;
        self.run(&["remote", "add", name, url], None).await?;
        Ok(())
    }

    async fn commit(
        &self,
        message: &str,
        paths: Option<&[PathBuf]>,
        committer: Option<&Committer>,
    ) -> Result<CommitOutcome> {
        self.require_repo().await?;

        match paths {
            Some(paths) => {
                for path in paths {
                    self.stage_path(path).await?;
                }
            }
            None => {
                self.run(&["add", "-A"], None).await?;
            }
        }

        let staged = self.output(&["diff", "--cached", "--quiet"], None).await?;
        if staged.status.success() {
            return Ok(CommitOutcome::NothingToCommit);
        }

        let mut args: Vec<String> = Vec::new();
        if let Some(committer) = committer {
            args.push("-c".into());
            args.push(format!("user.name={}", committer.name));
            args.push("-c".into());
            args.push(format!("user.email={}", committer.email));
        }
        args.extend(["commit".into(), "-q".into(), "-m".into(), message.to_string()]);

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args, None).await?;

        let hash = self.run(&["rev-parse", "HEAD"], None).await?;
        Ok(CommitOutcome::Committed(hash.trim().to_string()))
    }

    async fn push(&self, remote: &RemoteConfig) -> Result<()> {
        self.require_repo().await?;
        self.ensure_remote(remote).await?;

        let refspec = format!("HEAD:refs/heads/{}", remote.branch);
        self.run(&["push", "-q", "-u", &remote.name, &refspec], Some(remote.auth_mode))
            .await?;
        Ok(())
    }

    async fn pull(&self, remote: &RemoteConfig) -> Result<()> {
        self.require_repo().await?;
        self.ensure_remote(remote).await?;

        self.run(
            &["pull", "-q", "--no-rebase", "--no-edit", &remote.name, &remote.branch],
            Some(remote.auth_mode),
        )
        .await?;
        Ok(())
    }

    async fn status(&self) -> Result<RepoStatus> {
        self.require_repo().await?;
        let output = self.run(&["status", "--porcelain=v1", "-z", "--untracked-files=all"], None).await?;
        Ok(parse_porcelain(&output))
    }

    async fn log(&self, limit: usize) -> Result<Vec<CommitInfo>> {
        self.require_repo().await?;
        if !self.has_head().await? {
            return Ok(Vec::new());
        }

        let limit = limit.to_string();
        let output = self
            .run(&["log", "-n", &limit, "--format=%H%x1f%an%x1f%aI%x1f%s%x1e"], None)
            .await?;
        Ok(parse_log(&output))
    }

    async fn current_branch(&self) -> Result<String> {
        self.require_repo().await?;
        Ok(self.run(&["branch", "--show-current"], None).await?.trim().to_string())
    }

    async fn list_branches(&self) -> Result<Vec<String>> {
        self.require_repo().await?;
        let output = self.run(&["branch", "--format=%(refname:short)"], None).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn test_connection(&self, url: &str) -> Result<bool> {
        let auth_mode = if url.starts_with("git@") || url.starts_with("ssh://") {
            AuthMode::Ssh
        } else {
            AuthMode::Https
        };

        // ls-remote runs outside the repository so it works before `init`
        let mut cmd = self.command(Some(auth_mode));
        cmd.current_dir(std::env::temp_dir())
            .args(["ls-remote", "--heads", url]);

        match tokio::time::timeout(CONNECTION_TIMEOUT, cmd.output()).await {
            Ok(output) => Ok(output?.status.success()),
            Err(_) => {
                debug!(url, "connection test timed out");
                Ok(false)
            }
        }
    }
}

/// Parse `git status --porcelain=v1 -z` output
fn parse_porcelain(output: &str) -> RepoStatus {
    let mut status = RepoStatus::default();
    let mut entries = output.split('\0').filter(|e| !e.is_empty());

    while let Some(entry) = entries.next() {
        if entry.len() < 4 {
            continue;
        }
        let (code, path) = entry.split_at(3);
        let path = PathBuf::from(path);
        let mut code = code.chars();
        let (x, y) = (code.next().unwrap_or(' '), code.next().unwrap_or(' '));

        // Renames and copies carry the original path as the next entry
        if matches!(x, 'R' | 'C') {
            entries.next();
        }

        match (x, y) {
            ('?', '?') => status.untracked.push(path),
            ('!', '!') => {}
            ('U', _) | (_, 'U') | ('A', 'A') | ('D', 'D') => status.conflicted.push(path),
            _ => {
                if matches!(x, 'M' | 'A' | 'D' | 'R' | 'C' | 'T') {
                    status.staged.push(path.clone());
                }
                if x == 'D' || y == 'D' {
                    status.deleted.push(path.clone());
                }
                if matches!(y, 'M' | 'T') {
                    status.modified.push(path);
                }
            }
        }
    }

    status
}

/// Parse `git log --format=%H%x1f%an%x1f%aI%x1f%s%x1e` output
fn parse_log(output: &str) -> Vec<CommitInfo> {
    output
        .split('\x1e')
        .filter_map(|record| {
            let mut fields = record.trim_matches(|c: char| c == '\n' || c == '\r').split('\x1f');
            let hash = fields.next()?.trim();
            if hash.is_empty() {
                return None;
            }
            let author = fields.next()?;
            let date = DateTime::parse_from_rfc3339(fields.next()?).ok()?;
            let message = fields.next().unwrap_or_default();

            Some(CommitInfo {
                hash: hash.to_string(),
                author: author.to_string(),
                date,
                message: message.to_string(),
            })
        })
        .collect()
}
