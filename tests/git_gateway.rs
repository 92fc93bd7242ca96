// Git Gateway Tests
// Against a real git executable and a local bare remote; skipped when git is missing

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use vault_sync::core::events::ChangeEvent;
use vault_sync::core::settings::Settings;
use vault_sync::core::status::SyncStatus;
use vault_sync::core::VaultSync;
use vault_sync::operations::git::{CommitOutcome, Gateway, GatewayError, GitGateway};
use vault_sync::operations::ManualSyncOutcome;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn bare_remote(dir: &Path) {
    let status = Command::new("git")
        .args(["init", "--bare", "-q"])
        .arg(dir)
        .status()
        .unwrap();
    assert!(status.success());
}

fn remote_log(dir: &Path, branch: &str) -> Vec<String> {
    let output = Command::new("git")
        .arg("--git-dir")
        .arg(dir)
        .args(["log", "--format=%s", branch])
        .output()
        .unwrap();
    String::from_utf8_lossy(&output.stdout).lines().map(String::from).collect()
}

fn settings(remote: &Path) -> Settings {
    Settings {
        remote_url: Some(remote.to_string_lossy().into_owned()),
        debounce_ms: 100,
        commit_template: "vault: {action} {filename}".to_string(),
        committer_name: Some("Vault Test".to_string()),
        committer_email: Some("vault@example.com".to_string()),
        ..Settings::default()
    }
}

async fn settle(service: &VaultSync) {
    tokio::time::sleep(Duration::from_millis(400)).await;
    service.wait_idle().await;
}

#[tokio::test]
async fn test_gateway_requires_repository() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let gateway = GitGateway::new(dir.path());

    assert!(!gateway.is_initialized().await.unwrap());
    let err = gateway.status().await.unwrap_err();
    assert!(matches!(err, GatewayError::NotARepository(_)));
}

#[tokio::test]
async fn test_change_event_reaches_bare_remote() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let vault = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();
    bare_remote(remote.path());

    let service = VaultSync::new(
        vault.path(),
        settings(remote.path()),
        Arc::new(GitGateway::new(vault.path())),
    );
    assert_eq!(service.init_repository().await.unwrap(), SyncStatus::Idle);
    assert_eq!(service.current_branch().await.unwrap(), "main");

    std::fs::write(vault.path().join("note.md"), "# Note\n").unwrap();
    assert!(service.handle_event(ChangeEvent::created("note.md")));
    settle(&service).await;

    let log = service.log(5).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].message, "vault: Created note.md");
    assert_eq!(log[0].author, "Vault Test");
    assert_eq!(remote_log(remote.path(), "main"), vec!["vault: Created note.md"]);
    assert_eq!(service.status().status, SyncStatus::Idle);

    // Clean tree
    assert_eq!(service.manual_sync().await.unwrap(), ManualSyncOutcome::NothingToSync);

    std::fs::write(vault.path().join("a.md"), "a\n").unwrap();
    std::fs::write(vault.path().join("b.md"), "b\n").unwrap();
    let outcome = service.manual_sync().await.unwrap();
    assert!(matches!(outcome, ManualSyncOutcome::Synced { commit: Some(_), pushed: true }));
    assert_eq!(
        remote_log(remote.path(), "main"),
        vec!["vault: Synced 2 files", "vault: Created note.md"]
    );
}

#[tokio::test]
async fn test_single_file_commit_leaves_other_changes_unstaged() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let vault = tempfile::tempdir().unwrap();
    let service = VaultSync::new(
        vault.path(),
        Settings {
            remote_url: None,
            ..settings(vault.path())
        },
        Arc::new(GitGateway::new(vault.path())),
    );
    service.init_repository().await.unwrap();

    std::fs::write(vault.path().join("one.md"), "1\n").unwrap();
    std::fs::write(vault.path().join("two.md"), "2\n").unwrap();

    let committer = service.settings().committer();
    let one = vec![PathBuf::from("one.md")];
    let outcome = service
        .gateway()
        .commit("one", Some(one.as_slice()), committer.as_ref())
        .await
        .unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed(_)));

    let status = service.repo_status().await.unwrap();
    assert_eq!(status.untracked, vec![PathBuf::from("two.md")]);

    // Deleting a committed file is staged even though it no longer exists
    std::fs::remove_file(vault.path().join("one.md")).unwrap();
    let outcome = service
        .gateway()
        .commit("gone", Some(one.as_slice()), committer.as_ref())
        .await
        .unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed(_)));

    let outcome = service
        .gateway()
        .commit("again", Some(one.as_slice()), committer.as_ref())
        .await
        .unwrap();
    assert_eq!(outcome, CommitOutcome::NothingToCommit);
}

#[tokio::test]
async fn test_gitignored_file_completes_without_commit() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let vault = tempfile::tempdir().unwrap();
    let service = VaultSync::new(
        vault.path(),
        Settings {
            remote_url: None,
            ..settings(vault.path())
        },
        Arc::new(GitGateway::new(vault.path())),
    );
    service.init_repository().await.unwrap();

    std::fs::write(vault.path().join(".gitignore"), "ign.md\n").unwrap();
    std::fs::write(vault.path().join("ign.md"), "private\n").unwrap();

    let committer = service.settings().committer();
    let ignored = vec![PathBuf::from("ign.md")];
    let outcome = service
        .gateway()
        .commit("ignored", Some(ignored.as_slice()), committer.as_ref())
        .await
        .unwrap();
    assert_eq!(outcome, CommitOutcome::NothingToCommit);

    assert!(service.handle_event(ChangeEvent::created("ign.md")));
    settle(&service).await;

    let snapshot = service.status();
    assert_eq!(snapshot.status, SyncStatus::Idle, "{:?}", snapshot.message);
    assert!(service.log(1).await.unwrap().is_empty());

    // The queue keeps moving after the ignored file
    std::fs::write(vault.path().join("kept.md"), "kept\n").unwrap();
    assert!(service.handle_event(ChangeEvent::created("kept.md")));
    settle(&service).await;

    let log = service.log(5).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].message, "vault: Created kept.md");
    assert_eq!(service.status().status, SyncStatus::Idle);
}

#[tokio::test]
async fn test_watcher_picks_up_new_file() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let vault = tempfile::tempdir().unwrap();
    let service = VaultSync::new(
        vault.path(),
        Settings {
            remote_url: None,
            ..settings(vault.path())
        },
        Arc::new(GitGateway::new(vault.path())),
    );
    service.init_repository().await.unwrap();
    service.start_watching().unwrap();
    assert!(service.is_watching());

    std::fs::write(vault.path().join("watched.md"), "hello\n").unwrap();

    let mut committed = false;
    for _ in 0..50 {
        settle(&service).await;
        if !service.log(1).await.unwrap().is_empty() {
            committed = true;
            break;
        }
    }
    service.stop_watching();

    assert!(committed, "watcher never produced a commit");
    let log = service.log(1).await.unwrap();
    assert!(log[0].message.contains("watched.md"));
}
