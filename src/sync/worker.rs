// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reconciliation runs between the local and remote tiers.
//!
//! # State machine
//!
//! ```text
//! Idle ──try_acquire──► Running ──► Completed (no transfer errors)
//!   ▲                      │    └──► Failed (errors, timeout, panic)
//!   └──────────────────────┘  permit dropped, in_progress cleared
//! ```
//!
//! Only one run executes at a time. The ledger's `in_progress` flag is set
//! in the same mutation that starts the run and cleared in the one that
//! records it, and the run is bounded by a timeout and shielded from
//! panics so that final mutation always happens. The persisted flag trails
//! the run permit on both edges, so [`SyncWorker::status`] reports
//! `in_progress` from the permit itself.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::VaultError;
use crate::ledger::{HistoryEntry, PendingSync, SyncStatus, SyncStatusStore};
use crate::metrics;
use crate::resilience::retry::{retry, RetryConfig};
use crate::sanitize::is_canonical_sender;
use crate::storage::guarded::{GuardedRemote, RemoteCapability};
use crate::storage::local::SubmissionStore;
use crate::storage::same_content;
use crate::submission::is_well_formed;

/// Which way a run moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncDirection {
    /// fromRemote, then toRemote
    Both,
    ToRemote,
    FromRemote,
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Both => write!(f, "both"),
            Self::ToRemote => write!(f, "toRemote"),
            Self::FromRemote => write!(f, "fromRemote"),
        }
    }
}

impl FromStr for SyncDirection {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "both" => Ok(Self::Both),
            "toremote" | "todropbox" | "backup" => Ok(Self::ToRemote),
            "fromremote" | "fromdropbox" | "restore" => Ok(Self::FromRemote),
            _ => Err(VaultError::Config(format!("unknown sync direction: {:?}", s))),
        }
    }
}

/// What part of the vault a run covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SyncScope {
    #[default]
    All,
    Sender { sender: String },
    Submission { sender: String, id: String },
}

impl SyncScope {
    fn includes_sender(&self, sender: &str) -> bool {
        match self {
            Self::All => true,
            Self::Sender { sender: s } | Self::Submission { sender: s, .. } => s == sender,
        }
    }

    fn includes(&self, sender: &str, id: &str) -> bool {
        match self {
            Self::Submission { sender: s, id: i } => s == sender && i == id,
            other => other.includes_sender(sender),
        }
    }
}

/// Parameters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub direction: SyncDirection,
    /// Transfer everything, not only what the destination lacks
    pub force: bool,
    /// Re-read every transfer from its destination
    pub verify: bool,
    pub scope: SyncScope,
}

impl SyncRequest {
    #[must_use]
    pub fn new(direction: SyncDirection) -> Self {
        Self { direction, force: false, verify: false, scope: SyncScope::All }
    }

    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: SyncScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Per-direction transfer counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectionStats {
    pub files_synced: u64,
    pub files_failed: u64,
    /// Already present at the destination
    pub files_skipped: u64,
}

/// Summary of one run, also recorded in the ledger history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub direction: SyncDirection,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub files_synced: u64,
    pub files_failed: u64,
    pub to_remote: DirectionStats,
    pub from_remote: DirectionStats,
    pub errors: Vec<String>,
    pub success: bool,
}

/// Answer to a fire-and-forget trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    Started,
    AlreadyInProgress,
}

/// Worker tuning, usually derived from [`crate::VaultConfig`].
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Transfers per file within a run when verification keeps failing
    pub verify_attempts: u32,
    pub max_run_duration: Duration,
    /// Transient-error retries for each individual transfer
    pub transfer_retry: RetryConfig,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            verify_attempts: 3,
            max_run_duration: Duration::from_secs(3600),
            transfer_retry: RetryConfig::query(),
        }
    }
}

/// Clears the running flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
        metrics::set_sync_in_progress(false);
    }
}

#[derive(Default)]
struct RunContext {
    to_remote: DirectionStats,
    from_remote: DirectionStats,
    errors: Vec<String>,
}

impl RunContext {
    fn error(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!(error = %msg, "Sync error");
        self.errors.push(msg);
    }
}

pub struct SyncWorker {
    local: SubmissionStore,
    remote: RemoteCapability,
    ledger: Arc<SyncStatusStore>,
    settings: SyncSettings,
    running: AtomicBool,
}

impl SyncWorker {
    pub fn new(
        local: SubmissionStore,
        remote: RemoteCapability,
        ledger: Arc<SyncStatusStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            local,
            remote,
            ledger,
            settings,
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<SyncStatusStore> {
        &self.ledger
    }

    /// Ledger snapshot with `in_progress` taken from the run permit.
    pub async fn status(&self) -> SyncStatus {
        let mut status = self.ledger.snapshot().await;
        status.in_progress = self.is_running();
        status
    }

    fn try_acquire(&self) -> Option<RunGuard<'_>> {
        if self.running.swap(true, Ordering::AcqRel) {
            None
        } else {
            metrics::set_sync_in_progress(true);
            Some(RunGuard(&self.running))
        }
    }

    /// Run to completion. A second concurrent call is rejected.
    pub async fn run(&self, request: SyncRequest) -> Result<RunSummary, VaultError> {
        let Some(_guard) = self.try_acquire() else {
            return Err(VaultError::SyncInProgress);
        };
        Ok(self.execute(request).await)
    }

    /// Start a run on a detached task and return immediately.
    pub fn trigger(self: &Arc<Self>, request: SyncRequest) -> TriggerOutcome {
        if self.running.swap(true, Ordering::AcqRel) {
            debug!("Sync trigger ignored, run already in progress");
            return TriggerOutcome::AlreadyInProgress;
        }
        metrics::set_sync_in_progress(true);

        let worker = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = RunGuard(&worker.running);
            let summary = worker.execute(request).await;
            if summary.success {
                info!(files_synced = summary.files_synced, "Triggered sync finished");
            } else {
                warn!(
                    files_synced = summary.files_synced,
                    files_failed = summary.files_failed,
                    "Triggered sync finished with errors"
                );
            }
        });
        TriggerOutcome::Started
    }

    #[tracing::instrument(skip(self), fields(direction = %request.direction, force = request.force, verify = request.verify))]
    async fn execute(&self, request: SyncRequest) -> RunSummary {
        let started_at = Utc::now();
        let clock = Instant::now();
        if let Err(e) = self.ledger.mutate(|s| s.begin_run(started_at)).await {
            warn!(error = %e, "Could not persist run start");
        }
        info!("Sync run started");

        let mut ctx = RunContext::default();
        let limit = self.settings.max_run_duration;
        let outcome = tokio::time::timeout(
            limit,
            AssertUnwindSafe(self.reconcile(&request, &mut ctx)).catch_unwind(),
        )
        .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                error!("Sync run panicked");
                ctx.error("sync run aborted: internal panic");
            }
            Err(_) => ctx.error(format!("sync run exceeded {}s limit and was stopped", limit.as_secs())),
        }

        let finished_at = Utc::now();
        let duration = clock.elapsed();
        let files_synced = ctx.to_remote.files_synced + ctx.from_remote.files_synced;
        let files_failed = ctx.to_remote.files_failed + ctx.from_remote.files_failed;
        let summary = RunSummary {
            direction: request.direction,
            started_at,
            finished_at,
            duration_secs: duration.as_secs_f64(),
            files_synced,
            files_failed,
            success: ctx.errors.is_empty(),
            to_remote: ctx.to_remote,
            from_remote: ctx.from_remote,
            errors: ctx.errors,
        };

        let entry = HistoryEntry {
            start_time: started_at,
            duration: summary.duration_secs,
            direction: summary.direction.to_string(),
            files_synced: summary.files_synced,
            files_failed: summary.files_failed,
            success: summary.success,
            errors: summary.errors.clone(),
        };
        if let Err(e) = self.ledger.mutate(|s| s.finish_run(entry)).await {
            error!(error = %e, "Could not persist run summary");
        }
        metrics::record_sync_run(&summary.direction.to_string(), summary.success, files_synced, duration);
        info!(files_synced, files_failed, success = summary.success, "Sync run finished");
        summary
    }

    async fn reconcile(&self, request: &SyncRequest, ctx: &mut RunContext) {
        let remote = match &self.remote {
            RemoteCapability::Enabled(remote) => Arc::clone(remote),
            RemoteCapability::Disabled { reason } => {
                ctx.error(format!("remote storage unavailable: {}", reason));
                return;
            }
        };

        match request.direction {
            SyncDirection::Both => {
                self.from_remote(&remote, request, ctx).await;
                self.to_remote(&remote, request, ctx).await;
            }
            SyncDirection::ToRemote => self.to_remote(&remote, request, ctx).await,
            SyncDirection::FromRemote => self.from_remote(&remote, request, ctx).await,
        }
    }

    async fn to_remote(&self, remote: &GuardedRemote, request: &SyncRequest, ctx: &mut RunContext) {
        let handled = self.drain_pending(remote, request, ctx).await;

        let senders = match &request.scope {
            SyncScope::All => match self.local.list_senders().await {
                Ok(senders) => senders,
                Err(e) => {
                    ctx.to_remote.files_failed += 1;
                    ctx.error(format!("list local senders: {}", e));
                    return;
                }
            },
            SyncScope::Sender { sender } | SyncScope::Submission { sender, .. } => vec![sender.clone()],
        };

        for sender in senders {
            let ids = match self.local.list_ids(&sender).await {
                Ok(ids) => ids,
                Err(e) => {
                    ctx.to_remote.files_failed += 1;
                    ctx.error(format!("list local {}: {}", sender, e));
                    continue;
                }
            };
            let remote_ids: HashSet<String> = if request.force {
                HashSet::new()
            } else {
                match remote.list_sender_objects(&sender).await {
                    Ok(objects) => objects.into_iter().map(|o| o.id).collect(),
                    Err(e) => {
                        ctx.to_remote.files_failed += 1;
                        ctx.error(format!("list remote {}: {}", sender, e));
                        continue;
                    }
                }
            };

            for id in ids {
                if !request.scope.includes(&sender, &id) || handled.contains(&(sender.clone(), id.clone())) {
                    continue;
                }
                if remote_ids.contains(&id) {
                    ctx.to_remote.files_skipped += 1;
                    continue;
                }
                let bytes = match self.local.read_raw(&sender, &id).await {
                    Ok(Some(bytes)) => bytes,
                    Ok(None) => continue,
                    Err(e) => {
                        ctx.to_remote.files_failed += 1;
                        ctx.error(format!("read local {}/{}: {}", sender, id, e));
                        continue;
                    }
                };
                if !is_well_formed(&bytes) {
                    warn!(sender = %sender, id = %id, "Skipping corrupted local file");
                    ctx.to_remote.files_skipped += 1;
                    continue;
                }
                match self.upload(remote, &sender, &id, &bytes, request.verify, ctx).await {
                    Ok(()) => ctx.to_remote.files_synced += 1,
                    Err(msg) => {
                        ctx.to_remote.files_failed += 1;
                        ctx.error(msg);
                    }
                }
            }
        }
    }

    /// Resolve queued gaps first. Returns every entry attempted, so the
    /// walk that follows does not transfer them a second time.
    async fn drain_pending(
        &self,
        remote: &GuardedRemote,
        request: &SyncRequest,
        ctx: &mut RunContext,
    ) -> HashSet<(String, String)> {
        let pending: Vec<PendingSync> = self
            .ledger
            .snapshot()
            .await
            .pending_sync
            .into_iter()
            .filter(|p| request.scope.includes(&p.sender, &p.submission_id))
            .collect();
        let mut handled = HashSet::new();
        if !pending.is_empty() {
            info!(count = pending.len(), "Resolving pending submissions");
        }

        for entry in pending {
            let (sender, id) = (entry.sender.clone(), entry.submission_id.clone());
            handled.insert((sender.clone(), id.clone()));
            let bytes = match self.local.read_raw(&sender, &id).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    ctx.to_remote.files_failed += 1;
                    ctx.error(format!("pending {}/{}: local copy missing, dropped from queue", sender, id));
                    self.update_ledger(|s| {
                        s.dequeue(&sender, &id);
                    })
                    .await;
                    continue;
                }
                Err(e) => {
                    let msg = format!("pending {}/{}: read local: {}", sender, id, e);
                    self.record_pending_failure(&sender, &id, &msg).await;
                    ctx.to_remote.files_failed += 1;
                    ctx.error(msg);
                    continue;
                }
            };

            match self.upload(remote, &sender, &id, &bytes, request.verify, ctx).await {
                Ok(()) => {
                    self.update_ledger(|s| {
                        s.dequeue(&sender, &id);
                    })
                    .await;
                    ctx.to_remote.files_synced += 1;
                }
                Err(msg) => {
                    self.record_pending_failure(&sender, &id, &msg).await;
                    ctx.to_remote.files_failed += 1;
                    ctx.error(msg);
                }
            }
        }
        handled
    }

    async fn record_pending_failure(&self, sender: &str, id: &str, msg: &str) {
        self.update_ledger(|s| {
            if let Some(p) = s
                .pending_sync
                .iter_mut()
                .find(|p| p.sender == sender && p.submission_id == id)
            {
                p.attempts += 1;
                p.error = Some(msg.to_string());
            }
        })
        .await;
    }

    async fn update_ledger<F>(&self, f: F)
    where
        F: FnOnce(&mut crate::ledger::SyncStatus),
    {
        if let Err(e) = self.ledger.mutate(f).await {
            warn!(error = %e, "Could not persist ledger update");
        }
    }

    async fn from_remote(&self, remote: &GuardedRemote, request: &SyncRequest, ctx: &mut RunContext) {
        let folders = match &request.scope {
            SyncScope::All => match remote.list_sender_folders().await {
                Ok(folders) => folders,
                Err(e) => {
                    ctx.from_remote.files_failed += 1;
                    ctx.error(format!("list remote senders: {}", e));
                    return;
                }
            },
            SyncScope::Sender { sender } | SyncScope::Submission { sender, .. } => vec![sender.clone()],
        };

        for sender in folders {
            if !is_canonical_sender(&sender) {
                warn!(folder = %sender, "Skipping remote folder with a non-canonical sender name");
                continue;
            }
            let objects = match remote.list_sender_objects(&sender).await {
                Ok(objects) => objects,
                Err(e) => {
                    ctx.from_remote.files_failed += 1;
                    ctx.error(format!("list remote {}: {}", sender, e));
                    continue;
                }
            };

            for object in objects {
                if !request.scope.includes(&sender, &object.id) {
                    continue;
                }
                let stamp = match self.local.stamp(&sender, &object.id).await {
                    Ok(stamp) => stamp,
                    Err(e) => {
                        ctx.from_remote.files_failed += 1;
                        ctx.error(format!("stat local {}/{}: {}", sender, object.id, e));
                        continue;
                    }
                };
                let needed = match stamp {
                    _ if request.force => true,
                    None => true,
                    Some(local) => {
                        let newer = matches!(
                            (object.entry.modified, local.modified),
                            (Some(remote_at), Some(local_at)) if remote_at > local_at
                        );
                        newer && local.size != object.entry.size
                    }
                };
                if !needed {
                    ctx.from_remote.files_skipped += 1;
                    continue;
                }
                match self.download(remote, &sender, &object.id, request.verify, ctx).await {
                    Ok(()) => ctx.from_remote.files_synced += 1,
                    Err(msg) => {
                        ctx.from_remote.files_failed += 1;
                        ctx.error(msg);
                    }
                }
            }
        }
    }

    /// Upload one submission; each verification mismatch is recorded and retried.
    async fn upload(
        &self,
        remote: &GuardedRemote,
        sender: &str,
        id: &str,
        bytes: &[u8],
        verify: bool,
        ctx: &mut RunContext,
    ) -> Result<(), String> {
        let attempts = self.settings.verify_attempts.max(1);
        for attempt in 1..=attempts {
            retry("sync_upload", &self.settings.transfer_retry, || {
                remote.write_submission(sender, id, bytes)
            })
            .await
            .map_err(|e| format!("upload {}/{}: {}", sender, id, e))?;

            if !verify {
                debug!(sender, id, "Uploaded");
                return Ok(());
            }
            match remote.verify_submission(sender, id, bytes).await {
                Ok(true) => {
                    debug!(sender, id, attempt, "Uploaded and verified");
                    return Ok(());
                }
                Ok(false) => ctx.error(format!(
                    "verify {}/{}: remote copy differs (attempt {}/{})",
                    sender, id, attempt, attempts
                )),
                Err(e) => return Err(format!("verify {}/{}: {}", sender, id, e)),
            }
        }
        Err(format!("upload {}/{}: verification failed {} times", sender, id, attempts))
    }

    async fn download(
        &self,
        remote: &GuardedRemote,
        sender: &str,
        id: &str,
        verify: bool,
        ctx: &mut RunContext,
    ) -> Result<(), String> {
        let attempts = self.settings.verify_attempts.max(1);
        for attempt in 1..=attempts {
            let bytes = retry("sync_download", &self.settings.transfer_retry, || {
                remote.read_submission(sender, id)
            })
            .await
            .map_err(|e| format!("download {}/{}: {}", sender, id, e))?
            .ok_or_else(|| format!("download {}/{}: removed from remote during run", sender, id))?;

            if !is_well_formed(&bytes) {
                metrics::record_corruption("remote");
                return Err(format!("download {}/{}: remote copy is corrupted, not restored", sender, id));
            }
            self.local
                .put(sender, id, &bytes)
                .await
                .map_err(|e| format!("write local {}/{}: {}", sender, id, e))?;

            if !verify {
                debug!(sender, id, "Downloaded");
                return Ok(());
            }
            match self.local.read_raw(sender, id).await {
                Ok(Some(actual)) if same_content(&actual, &bytes) => {
                    debug!(sender, id, attempt, "Downloaded and verified");
                    return Ok(());
                }
                Ok(_) => ctx.error(format!(
                    "verify {}/{}: local copy differs (attempt {}/{})",
                    sender, id, attempt, attempts
                )),
                Err(e) => return Err(format!("verify {}/{}: {}", sender, id, e)),
            }
        }
        Err(format!("download {}/{}: verification failed {} times", sender, id, attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::CircuitConfig;
    use crate::storage::layout::RemoteLayout;
    use crate::storage::memory::MemoryRemote;
    use tempfile::tempdir;

    fn settings() -> SyncSettings {
        SyncSettings {
            verify_attempts: 2,
            max_run_duration: Duration::from_secs(10),
            transfer_retry: RetryConfig::test(),
        }
    }

    fn worker(dir: &std::path::Path, memory: Arc<MemoryRemote>) -> SyncWorker {
        let remote = GuardedRemote::new(
            memory,
            RemoteLayout::new("/WebhookBackup"),
            Duration::from_secs(1),
            CircuitConfig::default(),
        );
        SyncWorker::new(
            SubmissionStore::new(dir.join("data")),
            RemoteCapability::Enabled(Arc::new(remote)),
            Arc::new(SyncStatusStore::ephemeral(100, 20)),
            settings(),
        )
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("both".parse::<SyncDirection>().unwrap(), SyncDirection::Both);
        assert_eq!("to-remote".parse::<SyncDirection>().unwrap(), SyncDirection::ToRemote);
        assert_eq!("toRemote".parse::<SyncDirection>().unwrap(), SyncDirection::ToRemote);
        assert_eq!("from_dropbox".parse::<SyncDirection>().unwrap(), SyncDirection::FromRemote);
        assert!("sideways".parse::<SyncDirection>().is_err());
        assert_eq!(SyncDirection::FromRemote.to_string(), "fromRemote");
    }

    #[tokio::test]
    async fn test_to_remote_uploads_missing() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(MemoryRemote::new());
        let worker = worker(dir.path(), memory.clone());
        worker.local.put("acme", "1", b"{\"a\": 1}").await.unwrap();
        worker.local.put("acme", "2", b"{\"a\": 2}").await.unwrap();
        memory.insert("/WebhookBackup/acme/2.json", "{\"a\": 2}");

        let summary = worker
            .run(SyncRequest::new(SyncDirection::ToRemote).with_verify(true))
            .await
            .unwrap();

        assert!(summary.success, "errors: {:?}", summary.errors);
        assert_eq!(summary.to_remote.files_synced, 1);
        assert_eq!(summary.to_remote.files_skipped, 1);
        assert!(memory.contains("/WebhookBackup/acme/1.json"));
    }

    #[tokio::test]
    async fn test_from_remote_downloads_missing_and_skips_bad_folders() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(MemoryRemote::new());
        memory.insert("/WebhookBackup/acme/1.json", "{\"a\": 1}");
        memory.insert("/WebhookBackup/.hidden/1.json", "{}");
        memory.insert("/WebhookBackup/acme/broken.json", "{nope");
        let worker = worker(dir.path(), memory);

        let summary = worker.run(SyncRequest::new(SyncDirection::FromRemote)).await.unwrap();

        assert_eq!(summary.from_remote.files_synced, 1);
        assert_eq!(summary.from_remote.files_failed, 1); // corrupted remote copy
        assert!(!summary.success);
        assert!(worker.local.exists("acme", "1").await.unwrap());
        assert!(!worker.local.exists("acme", "broken").await.unwrap());
    }

    #[tokio::test]
    async fn test_force_transfers_everything() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(MemoryRemote::new());
        let worker = worker(dir.path(), memory.clone());
        worker.local.put("acme", "1", b"{}").await.unwrap();
        memory.insert("/WebhookBackup/acme/1.json", "{}");

        let summary = worker
            .run(SyncRequest::new(SyncDirection::ToRemote).with_force(true))
            .await
            .unwrap();
        assert_eq!(summary.to_remote.files_synced, 1);
        assert_eq!(memory.write_count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_remote_fails_run() {
        let dir = tempdir().unwrap();
        let worker = SyncWorker::new(
            SubmissionStore::new(dir.path()),
            RemoteCapability::disabled("no credentials"),
            Arc::new(SyncStatusStore::ephemeral(100, 20)),
            settings(),
        );

        let summary = worker.run(SyncRequest::new(SyncDirection::Both)).await.unwrap();
        assert!(!summary.success);
        assert_eq!(summary.errors, vec!["remote storage unavailable: no credentials".to_string()]);

        let status = worker.ledger().snapshot().await;
        assert_eq!(status.total_syncs, 1);
        assert!(!status.in_progress);
    }

    #[tokio::test]
    async fn test_scope_limits_run() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(MemoryRemote::new());
        let worker = worker(dir.path(), memory.clone());
        worker.local.put("acme", "1", b"{}").await.unwrap();
        worker.local.put("acme", "2", b"{}").await.unwrap();
        worker.local.put("beta", "1", b"{}").await.unwrap();

        let request = SyncRequest::new(SyncDirection::ToRemote).with_scope(SyncScope::Submission {
            sender: "acme".into(),
            id: "2".into(),
        });
        let summary = worker.run(request).await.unwrap();

        assert_eq!(summary.to_remote.files_synced, 1);
        assert!(memory.contains("/WebhookBackup/acme/2.json"));
        assert!(!memory.contains("/WebhookBackup/acme/1.json"));
        assert!(!memory.contains("/WebhookBackup/beta/1.json"));
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let dir = tempdir().unwrap();
        let worker = worker(dir.path(), Arc::new(MemoryRemote::new()));

        let guard = worker.try_acquire().unwrap();
        assert!(worker.is_running());
        let err = worker.run(SyncRequest::new(SyncDirection::Both)).await.unwrap_err();
        assert!(matches!(err, VaultError::SyncInProgress));

        drop(guard);
        assert!(!worker.is_running());
        assert!(worker.run(SyncRequest::new(SyncDirection::Both)).await.is_ok());
    }

    #[tokio::test]
    async fn test_status_follows_run_permit() {
        let dir = tempdir().unwrap();
        let worker = worker(dir.path(), Arc::new(MemoryRemote::new()));

        // Permit held, ledger not yet marked: a run is starting.
        let guard = worker.try_acquire().unwrap();
        assert!(!worker.ledger().snapshot().await.in_progress);
        assert!(worker.status().await.in_progress);

        // Ledger still marked after the permit is gone: a run has ended.
        worker.ledger().mutate(|s| s.begin_run(Utc::now())).await.unwrap();
        drop(guard);
        assert!(worker.ledger().snapshot().await.in_progress);
        assert!(!worker.status().await.in_progress);
    }
}
