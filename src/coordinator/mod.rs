// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Vault coordinator.
//!
//! The [`Vault`] ties the tiers together:
//! - the local filesystem tier ([`SubmissionStore`])
//! - the remote tier, when configured ([`RemoteCapability`])
//! - the sync ledger ([`SyncStatusStore`])
//! - the background reconciler ([`SyncWorker`])
//!
//! Ingestion lives in `ingest.rs`, the merged read path in `read.rs`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use webhook_vault::{MemoryRemote, SubmitOptions, Vault, VaultConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), webhook_vault::VaultError> {
//! let vault = Vault::with_remote(VaultConfig::default(), Some(Arc::new(MemoryRemote::new()))).await?;
//!
//! let payload = json!({"title": "Order", "data": {"x": 1}});
//! let result = vault.submit("acme", payload, &SubmitOptions::default()).await?;
//! let id = result.reference().unwrap_or_default().to_string();
//!
//! let found = vault.get_submission("acme", &id).await?;
//! assert!(found.is_found());
//! # Ok(())
//! # }
//! ```

mod ingest;
mod read;
mod types;

pub use read::sort_listing;
pub use types::{IngestOutcome, LocalWriteReport, Lookup, RemoteWriteReport, SubmitResult};

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::VaultConfig;
use crate::error::VaultError;
use crate::ledger::{SyncStatus, SyncStatusStore};
use crate::storage::dropbox::DropboxRemote;
use crate::storage::guarded::{GuardedRemote, RemoteCapability};
use crate::storage::layout::RemoteLayout;
use crate::storage::local::SubmissionStore;
use crate::storage::traits::RemoteStore;
use crate::submission::IdGenerator;
use crate::sync::{SyncRequest, SyncScheduler, SyncSettings, SyncWorker, TriggerOutcome};

/// Dual-tier submission store.
pub struct Vault {
    config: VaultConfig,
    local: SubmissionStore,
    remote: RemoteCapability,
    ledger: Arc<SyncStatusStore>,
    ids: IdGenerator,
    worker: Arc<SyncWorker>,
}

impl Vault {
    /// Open a vault from configuration. Dropbox is used when complete
    /// credentials are configured; otherwise the vault runs local-only.
    pub async fn open(config: VaultConfig) -> Result<Self, VaultError> {
        let remote: Option<Arc<dyn RemoteStore>> = match config.usable_credentials() {
            Some(credentials) => Some(Arc::new(DropboxRemote::new(credentials.clone())?)),
            None => None,
        };
        Self::with_remote(config, remote).await
    }

    /// Open a vault over any [`RemoteStore`]; `None` means local-only.
    pub async fn with_remote(config: VaultConfig, remote: Option<Arc<dyn RemoteStore>>) -> Result<Self, VaultError> {
        let capability = match remote {
            Some(store) => RemoteCapability::Enabled(Arc::new(GuardedRemote::new(
                store,
                RemoteLayout::new(config.remote_root.clone()),
                config.remote_timeout(),
                config.circuit_config(),
            ))),
            None => RemoteCapability::disabled("no Dropbox credentials configured"),
        };
        Self::with_capability(config, capability).await
    }

    pub async fn with_capability(config: VaultConfig, remote: RemoteCapability) -> Result<Self, VaultError> {
        tokio::fs::create_dir_all(&config.data_dir).await.map_err(|e| {
            VaultError::Config(format!("cannot create data dir {}: {}", config.data_dir.display(), e))
        })?;
        if let Some(reason) = remote.disabled_reason() {
            warn!(reason, "Remote storage disabled, running local-only");
        }

        let local = SubmissionStore::new(config.data_dir.clone());
        let ledger = Arc::new(
            SyncStatusStore::open(config.ledger_path.clone(), config.history_limit, config.last_errors_limit).await,
        );
        let settings = SyncSettings {
            verify_attempts: config.verify_attempts,
            max_run_duration: config.max_run_duration(),
            transfer_retry: config.retry_policy(2),
        };
        let worker = Arc::new(SyncWorker::new(local.clone(), remote.clone(), Arc::clone(&ledger), settings));

        info!(
            data_dir = %config.data_dir.display(),
            remote_enabled = remote.is_enabled(),
            "Vault opened"
        );
        Ok(Self {
            config,
            local,
            remote,
            ledger,
            ids: IdGenerator::new(),
            worker,
        })
    }

    #[must_use]
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    #[must_use]
    pub fn local(&self) -> &SubmissionStore {
        &self.local
    }

    #[must_use]
    pub fn remote(&self) -> &RemoteCapability {
        &self.remote
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<SyncStatusStore> {
        &self.ledger
    }

    #[must_use]
    pub fn sync_worker(&self) -> &Arc<SyncWorker> {
        &self.worker
    }

    /// Full ledger contents for reporting.
    pub async fn sync_status(&self) -> SyncStatus {
        self.worker.status().await
    }

    /// Start a background run and return at once.
    pub fn trigger_sync(&self, request: SyncRequest) -> TriggerOutcome {
        self.worker.trigger(request)
    }

    /// A scheduler over this vault's worker using the configured interval.
    /// The caller owns its start/stop lifecycle.
    #[must_use]
    pub fn scheduler(&self) -> SyncScheduler {
        SyncScheduler::new(Arc::clone(&self.worker), self.config.sync_interval())
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("data_dir", &self.config.data_dir)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}
