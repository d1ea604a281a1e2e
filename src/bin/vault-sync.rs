// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! `vault-sync`: run reconciliation between the local and Dropbox tiers.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use webhook_vault::{
    DropboxCredentials, RunSummary, SyncDirection, SyncRequest, SyncScope, Vault, VaultConfig,
};

#[derive(Debug, Parser)]
#[command(name = "vault-sync", version, about = "Reconcile webhook submissions between local storage and Dropbox")]
struct Cli {
    /// Config file (.toml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured data directory; a default ledger path moves next to it
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Overrides the sync ledger file
    #[arg(long, global = true)]
    ledger_path: Option<PathBuf>,

    #[arg(long, env = "DROPBOX_APP_KEY", global = true, hide_env_values = true)]
    app_key: Option<String>,

    #[arg(long, env = "DROPBOX_APP_SECRET", global = true, hide_env_values = true)]
    app_secret: Option<String>,

    #[arg(long, env = "DROPBOX_REFRESH_TOKEN", global = true, hide_env_values = true)]
    refresh_token: Option<String>,

    #[arg(long, env = "DROPBOX_ACCESS_TOKEN", global = true, hide_env_values = true)]
    access_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// One reconciliation run
    Sync {
        /// both, to-remote or from-remote
        #[arg(long, default_value = "both")]
        direction: SyncDirection,
        /// Re-read every transfer from its destination
        #[arg(long)]
        verify: bool,
        /// Transfer everything, not only what is missing
        #[arg(long)]
        force: bool,
    },
    /// Upload every local submission
    Backup,
    /// Download every remote submission
    Restore,
    /// Download every remote submission of one sender
    RestoreSender { sender: String },
    /// Upload one submission
    BackupFile { sender: String, id: String },
    /// Print the sync ledger as JSON
    Status,
    /// Check that the Dropbox credentials work
    TestConnection,
    /// Run periodic syncs until interrupted
    Daemon {
        /// Seconds between runs (defaults to the configured interval)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

impl Cli {
    fn load_config(&self) -> Result<VaultConfig> {
        let mut config = match &self.config {
            Some(path) => VaultConfig::from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => VaultConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.relocate_data_dir(dir.clone());
        }
        if let Some(path) = &self.ledger_path {
            config.ledger_path = path.clone();
        }

        let base = config.dropbox.clone();
        let pick = |flag: &Option<String>, existing: Option<&String>| {
            flag.clone().or_else(|| existing.cloned()).unwrap_or_default()
        };
        let credentials = DropboxCredentials {
            app_key: pick(&self.app_key, base.as_ref().map(|c| &c.app_key)),
            app_secret: pick(&self.app_secret, base.as_ref().map(|c| &c.app_secret)),
            refresh_token: pick(&self.refresh_token, base.as_ref().map(|c| &c.refresh_token)),
            access_token: self
                .access_token
                .clone()
                .or_else(|| base.as_ref().and_then(|c| c.access_token.clone())),
        };
        if credentials.is_complete() {
            config.dropbox = Some(credentials);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let vault = Vault::open(config).await.context("opening vault")?;

    let request = match cli.command {
        Command::Sync { direction, verify, force } => {
            SyncRequest::new(direction).with_verify(verify).with_force(force)
        }
        Command::Backup => SyncRequest::new(SyncDirection::ToRemote).with_force(true),
        Command::Restore => SyncRequest::new(SyncDirection::FromRemote).with_force(true),
        Command::RestoreSender { sender } => SyncRequest::new(SyncDirection::FromRemote)
            .with_force(true)
            .with_scope(SyncScope::Sender { sender: webhook_vault::sanitize::sanitize_sender(&sender)? }),
        Command::BackupFile { sender, id } => SyncRequest::new(SyncDirection::ToRemote)
            .with_force(true)
            .with_verify(true)
            .with_scope(SyncScope::Submission {
                sender: webhook_vault::sanitize::sanitize_sender(&sender)?,
                id,
            }),
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&vault.sync_status().await)?);
            return Ok(());
        }
        Command::TestConnection => return test_connection(&vault).await,
        Command::Daemon { interval_secs } => return daemon(&vault, interval_secs).await,
    };

    let summary = vault.sync_worker().run(request).await?;
    report(&summary);
    if !summary.success {
        std::process::exit(1);
    }
    Ok(())
}

fn report(summary: &RunSummary) {
    let verdict = if summary.success { "Successful" } else { "Failed" };
    println!(
        "Sync {}: {} files synced, {} files failed",
        verdict, summary.files_synced, summary.files_failed
    );
    for error in summary.errors.iter().take(5) {
        println!("  - {}", error);
    }
    if summary.errors.len() > 5 {
        println!("  ... and {} more", summary.errors.len() - 5);
    }
}

async fn test_connection(vault: &Vault) -> Result<()> {
    let remote = vault.remote().require()?;
    if remote.check().await {
        println!("Dropbox connection OK (root: {})", remote.layout().root());
        Ok(())
    } else {
        bail!("Dropbox connection failed; check the app key, secret and refresh token")
    }
}

async fn daemon(vault: &Vault, interval_secs: Option<u64>) -> Result<()> {
    let interval = interval_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .or_else(|| vault.config().sync_interval())
        .context("no sync interval: pass --interval-secs or set sync_interval_secs")?;

    let scheduler = webhook_vault::SyncScheduler::new(std::sync::Arc::clone(vault.sync_worker()), Some(interval));
    scheduler.start();
    tracing::info!(interval_secs = interval.as_secs(), "vault-sync daemon running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("Shutting down");
    scheduler.stop().await;
    Ok(())
}
