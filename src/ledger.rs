// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable sync ledger.
//!
//! A single JSON file owned by [`SyncStatusStore`]. Every read-modify-write
//! happens under one async mutex, and the file is rewritten atomically
//! while that mutex is held, so a fallback append from the ingestion path
//! can never be lost to a concurrent sync run rewriting the same ledger.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::VaultError;
use crate::metrics;
use crate::storage::local::write_atomic;

/// A submission known to be missing from the remote tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSync {
    pub sender: String,
    pub submission_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_fallback: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// Failed reconciliation attempts so far
    #[serde(default)]
    pub attempts: u32,
}

/// Summary of one finished reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub start_time: DateTime<Utc>,
    /// Seconds
    pub duration: f64,
    #[serde(default)]
    pub direction: String,
    pub files_synced: u64,
    #[serde(default)]
    pub files_failed: u64,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// The ledger contents, as exposed to reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncStatus {
    pub last_sync: Option<DateTime<Utc>>,
    pub last_successful_sync: Option<DateTime<Utc>>,
    pub last_sync_duration: Option<f64>,
    pub total_syncs: u64,
    pub successful_syncs: u64,
    /// Cumulative across runs
    pub files_synced: u64,
    /// Most recent first
    pub last_errors: Vec<String>,
    pub pending_sync: Vec<PendingSync>,
    pub in_progress: bool,
    /// Most recent first
    pub history: Vec<HistoryEntry>,
}

impl SyncStatus {
    /// Mark a run as started.
    pub fn begin_run(&mut self, started_at: DateTime<Utc>) {
        self.in_progress = true;
        self.last_sync = Some(started_at);
    }

    /// Record a finished run and clear `in_progress`.
    pub fn finish_run(&mut self, entry: HistoryEntry) {
        self.total_syncs += 1;
        self.files_synced += entry.files_synced;
        if entry.success {
            self.successful_syncs += 1;
            self.last_successful_sync = Some(entry.start_time + chrono::Duration::milliseconds((entry.duration * 1000.0) as i64));
        }
        self.last_sync_duration = Some(entry.duration);
        for err in entry.errors.iter().rev() {
            self.last_errors.insert(0, err.clone());
        }
        self.history.insert(0, entry);
        self.in_progress = false;
    }

    pub fn push_error(&mut self, error: impl Into<String>) {
        self.last_errors.insert(0, error.into());
    }

    /// Queue a submission for reconciliation. An entry for the same
    /// (sender, id) is replaced rather than duplicated.
    pub fn enqueue(&mut self, entry: PendingSync) {
        self.pending_sync
            .retain(|p| !(p.sender == entry.sender && p.submission_id == entry.submission_id));
        self.pending_sync.push(entry);
    }

    /// Remove a pending entry, returning whether one was present.
    pub fn dequeue(&mut self, sender: &str, submission_id: &str) -> bool {
        let before = self.pending_sync.len();
        self.pending_sync
            .retain(|p| !(p.sender == sender && p.submission_id == submission_id));
        self.pending_sync.len() != before
    }

    fn trim(&mut self, history_limit: usize, last_errors_limit: usize) {
        self.history.truncate(history_limit);
        self.last_errors.truncate(last_errors_limit);
    }
}

/// Single-writer owner of the ledger file.
pub struct SyncStatusStore {
    path: PathBuf,
    state: Mutex<SyncStatus>,
    history_limit: usize,
    last_errors_limit: usize,
}

impl SyncStatusStore {
    /// Load the ledger, or start empty if it is missing or unreadable.
    ///
    /// A ledger left with `in_progress = true` belongs to a run that died
    /// with its process; the flag is cleared and written back.
    pub async fn open(path: impl Into<PathBuf>, history_limit: usize, last_errors_limit: usize) -> Self {
        let path = path.into();
        let mut status = load(&path).await;
        let stale = status.in_progress;
        if stale {
            warn!(path = %path.display(), "Ledger has a stale in-progress run; resetting");
            status.in_progress = false;
            status.push_error("previous sync run did not finish (process stopped mid-run)");
        }
        status.trim(history_limit, last_errors_limit);
        metrics::set_pending_sync(status.pending_sync.len());

        let store = Self {
            path,
            state: Mutex::new(status),
            history_limit,
            last_errors_limit,
        };
        if stale {
            let snapshot = store.state.lock().await.clone();
            if let Err(e) = persist(&store.path, &snapshot).await {
                warn!(error = %e, "Could not write back reset ledger");
            }
        }
        store
    }

    /// In-memory ledger, not backed by a file. Intended for tests.
    pub fn ephemeral(history_limit: usize, last_errors_limit: usize) -> Self {
        Self {
            path: PathBuf::new(),
            state: Mutex::new(SyncStatus::default()),
            history_limit,
            last_errors_limit,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> SyncStatus {
        self.state.lock().await.clone()
    }

    /// Apply `f` to the ledger and persist the result.
    ///
    /// The in-memory ledger always reflects the mutation; an `Err` means
    /// only that the file could not be rewritten.
    pub async fn mutate<F, R>(&self, f: F) -> Result<R, VaultError>
    where
        F: FnOnce(&mut SyncStatus) -> R,
    {
        let mut state = self.state.lock().await;
        let out = f(&mut state);
        state.trim(self.history_limit, self.last_errors_limit);
        metrics::set_pending_sync(state.pending_sync.len());
        persist(&self.path, &state).await?;
        Ok(out)
    }

    pub async fn enqueue_pending(&self, entry: PendingSync) -> Result<(), VaultError> {
        self.mutate(|status| status.enqueue(entry)).await
    }
}

async fn load(path: &Path) -> SyncStatus {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(status) => status,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable ledger, starting empty");
                SyncStatus::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No ledger yet, starting empty");
            SyncStatus::default()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read ledger, starting empty");
            SyncStatus::default()
        }
    }
}

async fn persist(path: &Path, status: &SyncStatus) -> Result<(), VaultError> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    let bytes = serde_json::to_vec_pretty(status)
        .map_err(|e| VaultError::Ledger(format!("cannot encode ledger: {}", e)))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| VaultError::Ledger(format!("cannot create {}: {}", parent.display(), e)))?;
    }
    write_atomic(path, &bytes)
        .await
        .map_err(|e| VaultError::Ledger(format!("cannot write {}: {}", path.display(), e)))
}
