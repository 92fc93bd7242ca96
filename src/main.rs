// Vault Sync
// Command-line front end: watch a vault and keep it committed and pushed

// IMPORTS ------------------>>

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use vault_sync::constants::{DEFAULT_LOG_LIMIT, SETTINGS_FILE_NAME};
use vault_sync::core::{Settings, SyncStatus, VaultSync};
use vault_sync::operations::ManualSyncOutcome;
use vault_sync::render;

//--------------------------------------------------------<<
// CLI ---------------------->>

#[derive(Parser, Debug)]
#[command(name = "vault-sync", version, about = "Keep a notes vault committed and pushed to git")]
struct Cli {
    /// Vault root (defaults to the nearest directory with a settings file or repository)
    #[arg(long, short = 'C', global = true, env = "VAULT_SYNC_ROOT")]
    vault: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress logging
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the vault and sync changes until interrupted
    Watch,

    /// Create the repository and register the remote
    Init {
        /// Remote URL to store in the settings file
        #[arg(long)]
        remote: Option<String>,
    },

    /// Commit everything that changed and push
    Sync,

    /// Push to the configured remote
    Push,

    /// Pull from the configured remote
    Pull,

    /// Show working tree status
    Status,

    /// Show recent commits
    Log {
        #[arg(long, short = 'n', default_value_t = DEFAULT_LOG_LIMIT)]
        limit: usize,
    },

    /// Check that the remote is reachable
    Check,

    /// Print the effective settings
    Config {
        /// Write the effective settings to the vault's settings file
        #[arg(long)]
        write: bool,
    },
}

//--------------------------------------------------------<<

// ┌──────────────────────────────────────────────────────────────────────────────────────────────────────────────────┐
// │                                                 MAIN ENTRY POINT                                                 │
// └──────────────────────────────────────────────────────────────────────────────────────────────────────────────────┘

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let root = match cli.vault {
        Some(path) => path,
        None => VaultSync::detect_vault_root()?,
    };
    let service = VaultSync::open(&root)?;

    match cli.command {
        Commands::Watch => watch(&service).await,
        Commands::Init { remote } => init(&service, remote).await,
        Commands::Sync => {
            match service.manual_sync().await? {
                ManualSyncOutcome::AlreadyInProgress => println!("A sync is already in progress"),
                ManualSyncOutcome::NothingToSync => println!("Nothing to sync"),
                ManualSyncOutcome::Synced { commit, pushed } => {
                    let commit = commit.as_deref().map(short_hash).unwrap_or("-");
                    println!("Committed {commit}{}", if pushed { ", pushed" } else { "" });
                }
            }
            Ok(())
        }
        Commands::Push => {
            service.push().await?;
            println!("Pushed");
            Ok(())
        }
        Commands::Pull => {
            service.pull().await?;
            println!("Pulled");
            Ok(())
        }
        Commands::Status => status(&service).await,
        Commands::Log { limit } => {
            for commit in service.log(limit).await? {
                println!(
                    "{}  {}  {:<16}  {}",
                    short_hash(&commit.hash),
                    commit.date.format("%Y-%m-%d %H:%M"),
                    commit.author,
                    commit.message
                );
            }
            Ok(())
        }
        Commands::Check => {
            if service.check_connection().await? {
                println!("Remote reachable");
                Ok(())
            } else {
                bail!("Remote unreachable")
            }
        }
        Commands::Config { write } => {
            let settings = service.settings();
            print!("{}", serde_yaml::to_string(settings.as_ref()).context("Failed to serialize settings")?);
            if write {
                let path = root.join(SETTINGS_FILE_NAME);
                settings.save(&path)?;
                println!("# written to {}", path.display());
            }
            Ok(())
        }
    }
}

// ┌────────────────────────────────────────────────────────────────────────────────────────────────┐
// │                                           COMMANDS                                             │
// └────────────────────────────────────────────────────────────────────────────────────────────────┘

async fn watch(service: &VaultSync) -> Result<()> {
    render::attach(service);

    let status = service.initialize().await;
    if status == SyncStatus::Offline {
        bail!("{}", service.status().message.unwrap_or_else(|| "Vault is offline".into()));
    }

    service.start_watching()?;
    println!("Watching {} (Ctrl-C to stop)", service.vault_root().display());

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;

    info!("shutting down");
    service.stop_watching();
    service.wait_idle().await;
    Ok(())
}

async fn init(service: &VaultSync, remote: Option<String>) -> Result<()> {
    if let Some(url) = remote {
        let settings = Settings {
            remote_url: Some(url),
            ..(*service.settings()).clone()
        };
        service.save_settings(settings)?;
    }

    let status = service.init_repository().await?;
    render::render_status_line(&mut std::io::stdout().lock(), &service.status())?;
    if status == SyncStatus::Offline {
        bail!("Repository created but the vault is offline");
    }
    Ok(())
}

async fn status(service: &VaultSync) -> Result<()> {
    let settings = service.settings();
    let repo = service.repo_status().await?;
    let branch = service.current_branch().await.unwrap_or_else(|_| settings.branch.clone());

    println!("Vault:     {}", service.vault_root().display());
    println!("Branch:    {branch}");
    println!(
        "Remote:    {}",
        settings.remote_url.as_deref().unwrap_or("(none)")
    );
    println!("Auto-sync: {}", if settings.auto_sync { "on" } else { "off" });

    if repo.is_clean() {
        println!("Working tree clean");
        return Ok(());
    }

    for (label, paths) in [
        ("staged", &repo.staged),
        ("modified", &repo.modified),
        ("untracked", &repo.untracked),
        ("deleted", &repo.deleted),
        ("conflicted", &repo.conflicted),
    ] {
        for path in paths {
            println!("  {label:<10} {}", path.display());
        }
    }
    Ok(())
}

fn short_hash(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}
