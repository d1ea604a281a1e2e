// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for webhook-vault.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `webhook_vault_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for size histograms
//!
//! # Labels
//! - `tier`: local, remote
//! - `operation`: write, read, list, ensure_folder, authenticate
//! - `status`: success, error, rejected

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a storage operation outcome
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "webhook_vault_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "webhook_vault_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record an ingestion result (`stored`, `fallback`, `failed`)
pub fn record_ingest(outcome: &str) {
    counter!(
        "webhook_vault_ingest_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record how many retries a remote upload needed
pub fn record_upload_retries(retries: usize) {
    histogram!("webhook_vault_upload_retries").record(retries as f64);
}

/// Record a read-heal write-back into the local tier
pub fn record_heal(status: &str) {
    counter!(
        "webhook_vault_heal_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a corrupted document found on either tier
pub fn record_corruption(tier: &str) {
    counter!(
        "webhook_vault_corruption_detected_total",
        "tier" => tier.to_string()
    )
    .increment(1);
}

/// Set number of entries waiting in the pending-sync queue
pub fn set_pending_sync(count: usize) {
    gauge!("webhook_vault_pending_sync").set(count as f64);
}

/// Record one completed reconciliation run
pub fn record_sync_run(direction: &str, success: bool, files_synced: u64, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "webhook_vault_sync_runs_total",
        "direction" => direction.to_string(),
        "status" => status
    )
    .increment(1);
    counter!("webhook_vault_files_synced_total").increment(files_synced);
    histogram!(
        "webhook_vault_sync_run_seconds",
        "direction" => direction.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Set whether a sync run is executing (1) or not (0)
pub fn set_sync_in_progress(running: bool) {
    gauge!("webhook_vault_sync_in_progress").set(if running { 1.0 } else { 0.0 });
}

/// Record circuit breaker call
pub fn record_circuit_call(circuit: &str, outcome: &str) {
    counter!(
        "webhook_vault_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set remote health (1 healthy, 0 unhealthy)
pub fn set_remote_healthy(healthy: bool) {
    gauge!("webhook_vault_remote_healthy").set(if healthy { 1.0 } else { 0.0 });
}

/// Record a timeout error
pub fn record_timeout(tier: &str, operation: &str) {
    counter!(
        "webhook_vault_timeouts_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record bytes written to a tier
pub fn record_bytes_written(tier: &str, bytes: usize) {
    counter!(
        "webhook_vault_bytes_written_total",
        "tier" => tier.to_string()
    )
    .increment(bytes as u64);
}

/// Record bytes read from a tier
pub fn record_bytes_read(tier: &str, bytes: usize) {
    counter!(
        "webhook_vault_bytes_read_total",
        "tier" => tier.to_string()
    )
    .increment(bytes as u64);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these are no-ops; they must not panic.
    #[test]
    fn test_metrics_without_recorder() {
        record_operation("remote", "write", "success");
        record_ingest("fallback");
        record_upload_retries(2);
        record_sync_run("both", true, 3, Duration::from_millis(5));
        set_pending_sync(1);
        let _timer = LatencyTimer::new("local", "read");
    }
}
