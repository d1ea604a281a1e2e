// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Periodic and on-demand run scheduling.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::VaultError;

use super::worker::{SyncDirection, SyncRequest, SyncWorker, TriggerOutcome};

/// Drives a [`SyncWorker`] on a fixed interval.
///
/// Ticks that land while a run is still going are skipped, never queued.
/// With no interval the scheduler only forwards manual triggers.
pub struct SyncScheduler {
    worker: Arc<SyncWorker>,
    interval: Option<Duration>,
    request: SyncRequest,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(worker: Arc<SyncWorker>, interval: Option<Duration>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            worker,
            interval,
            request: SyncRequest::new(SyncDirection::Both),
            shutdown,
            handle: Mutex::new(None),
        }
    }

    /// Request issued on every tick (default: both directions).
    #[must_use]
    pub fn with_request(mut self, request: SyncRequest) -> Self {
        self.request = request;
        self
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Spawn the interval loop. Calling it twice is a no-op.
    pub fn start(&self) {
        let Some(period) = self.interval else {
            debug!("No sync interval configured, scheduler stays manual");
            return;
        };
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return;
        }

        let worker = Arc::clone(&self.worker);
        let request = self.request.clone();
        let mut shutdown = self.shutdown.subscribe();
        info!(interval_secs = period.as_secs(), "Sync scheduler started");

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; the first run waits a full period.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match worker.run(request.clone()).await {
                            Ok(summary) if summary.success => {
                                debug!(files_synced = summary.files_synced, "Scheduled sync finished");
                            }
                            Ok(summary) => {
                                warn!(errors = summary.errors.len(), "Scheduled sync finished with errors");
                            }
                            Err(VaultError::SyncInProgress) => {
                                debug!("Scheduled tick skipped, run already in progress");
                            }
                            Err(e) => warn!(error = %e, "Scheduled sync failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Sync scheduler stopped");
        }));
    }

    /// Fire-and-forget run with an explicit request.
    pub fn trigger(&self, request: SyncRequest) -> TriggerOutcome {
        self.worker.trigger(request)
    }

    /// Stop the loop and wait for a tick in flight to finish.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sync scheduler task ended abnormally");
            }
        }
    }
}
