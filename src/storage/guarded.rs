// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The remote tier as the vault sees it.
//!
//! Every call into the [`RemoteStore`] goes through [`GuardedRemote`],
//! which bounds it with a timeout, routes it through a circuit breaker,
//! and tracks consecutive failures. Absence (`NotFound`) and permanent
//! errors are answers from a reachable store and never trip the breaker.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::layout::{id_from_file_name, RemoteLayout};
use super::traits::{RemoteEntry, RemoteStore, StorageError, WriteAck};
use super::same_content;
use crate::metrics::{self, LatencyTimer};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
use crate::sanitize::validate_id;

/// Consecutive-failure health tracking for the remote store.
pub struct RemoteHealth {
    healthy: AtomicBool,
    failures: AtomicU64,
    /// Serializes explicit health checks
    checking: Mutex<()>,
}

impl RemoteHealth {
    /// Failures in a row before the remote is reported unhealthy
    pub const UNHEALTHY_AFTER: u64 = 3;

    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true), // Assume healthy until proven otherwise
            failures: AtomicU64::new(0),
            checking: Mutex::new(()),
        }
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Release);
        if !self.healthy.swap(true, Ordering::AcqRel) {
            metrics::set_remote_healthy(true);
        }
    }

    pub fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= Self::UNHEALTHY_AFTER && self.healthy.swap(false, Ordering::AcqRel) {
            metrics::set_remote_healthy(false);
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }
}

impl Default for RemoteHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// A submission object found in a remote sender folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub id: String,
    pub entry: RemoteEntry,
}

/// Timeout + circuit breaker + health around a [`RemoteStore`].
pub struct GuardedRemote {
    inner: Arc<dyn RemoteStore>,
    layout: RemoteLayout,
    timeout: Duration,
    circuit: CircuitBreaker,
    health: RemoteHealth,
}

impl GuardedRemote {
    pub fn new(
        inner: Arc<dyn RemoteStore>,
        layout: RemoteLayout,
        timeout: Duration,
        circuit: CircuitConfig,
    ) -> Self {
        Self {
            inner,
            layout,
            timeout,
            circuit: CircuitBreaker::new("remote", circuit),
            health: RemoteHealth::new(),
        }
    }

    #[must_use]
    pub fn layout(&self) -> &RemoteLayout {
        &self.layout
    }

    #[must_use]
    pub fn health(&self) -> &RemoteHealth {
        &self.health
    }

    #[must_use]
    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    async fn guarded<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T, StorageError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let _timer = LatencyTimer::new("remote", operation);
        let limit = self.timeout;

        // Inner Ok(Err(_)) = the store answered with an error that says
        // nothing about its availability.
        let outcome = self
            .circuit
            .call(|| async move {
                match tokio::time::timeout(limit, f()).await {
                    Ok(Ok(value)) => Ok(Ok(value)),
                    Ok(Err(e)) if e.is_not_found() || matches!(e, StorageError::Permanent(_)) => Ok(Err(e)),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(StorageError::Timeout {
                        operation: operation.to_string(),
                        after_ms: limit.as_millis() as u64,
                    }),
                }
            })
            .await;

        match outcome {
            Ok(Ok(value)) => {
                self.health.record_success();
                metrics::record_operation("remote", operation, "success");
                Ok(value)
            }
            Ok(Err(e)) => {
                self.health.record_success();
                let status = if e.is_not_found() { "not_found" } else { "error" };
                metrics::record_operation("remote", operation, status);
                Err(e)
            }
            Err(CircuitError::Rejected) => {
                self.health.record_failure();
                metrics::record_operation("remote", operation, "rejected");
                Err(StorageError::Transient(format!(
                    "remote circuit open, {} not attempted",
                    operation
                )))
            }
            Err(CircuitError::Inner(e)) => {
                self.health.record_failure();
                if matches!(e, StorageError::Timeout { .. }) {
                    metrics::record_timeout("remote", operation);
                }
                metrics::record_operation("remote", operation, "error");
                debug!(operation, error = %e, "Remote call failed");
                Err(e)
            }
        }
    }

    pub async fn authenticate(&self) -> Result<(), StorageError> {
        self.guarded("authenticate", || self.inner.authenticate()).await
    }

    pub async fn ensure_folder(&self, path: &str) -> Result<bool, StorageError> {
        self.guarded("ensure_folder", || self.inner.ensure_folder(path)).await
    }

    pub async fn list_folder(&self, path: &str) -> Result<Vec<RemoteEntry>, StorageError> {
        self.guarded("list_folder", || self.inner.list_folder(path)).await
    }

    pub async fn read_object(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let bytes = self.guarded("read_object", || self.inner.read_object(path)).await?;
        metrics::record_bytes_read("remote", bytes.len());
        Ok(bytes)
    }

    pub async fn write_object(&self, path: &str, bytes: &[u8]) -> Result<WriteAck, StorageError> {
        let ack = self.guarded("write_object", || self.inner.write_object(path, bytes)).await?;
        metrics::record_bytes_written("remote", bytes.len());
        Ok(ack)
    }

    /// Explicit health probe. Concurrent probes share one authenticate call.
    pub async fn check(&self) -> bool {
        let _guard = self.health.checking.lock().await;
        match self.authenticate().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Remote health check failed");
                false
            }
        }
    }

    pub async fn ensure_sender_folder(&self, sender: &str) -> Result<bool, StorageError> {
        self.ensure_folder(&self.layout.sender_folder(sender)).await
    }

    /// Sender folder names under the root. A missing root is empty.
    pub async fn list_sender_folders(&self) -> Result<Vec<String>, StorageError> {
        match self.list_folder(self.layout.root()).await {
            Ok(entries) => Ok(entries
                .into_iter()
                .filter(|e| e.is_folder)
                .map(|e| e.name)
                .collect()),
            Err(StorageError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Submission objects in a sender folder. A missing folder is empty.
    pub async fn list_sender_objects(&self, sender: &str) -> Result<Vec<RemoteObject>, StorageError> {
        let entries = match self.list_folder(&self.layout.sender_folder(sender)).await {
            Ok(entries) => entries,
            Err(StorageError::NotFound) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(entries
            .into_iter()
            .filter(|e| !e.is_folder)
            .filter_map(|entry| {
                let id = id_from_file_name(&entry.name)?.to_string();
                validate_id(&id).ok()?;
                Some(RemoteObject { id, entry })
            })
            .collect())
    }

    /// A submission's bytes, `None` if the remote does not have it.
    pub async fn read_submission(&self, sender: &str, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self.read_object(&self.layout.object_path(sender, id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write a submission, creating the sender folder on demand.
    pub async fn write_submission(&self, sender: &str, id: &str, bytes: &[u8]) -> Result<WriteAck, StorageError> {
        let path = self.layout.object_path(sender, id);
        match self.write_object(&path, bytes).await {
            Err(StorageError::NotFound) => {
                self.ensure_sender_folder(sender).await?;
                self.write_object(&path, bytes).await
            }
            other => other,
        }
    }

    /// Re-read a submission and compare it with `expected`.
    pub async fn verify_submission(&self, sender: &str, id: &str, expected: &[u8]) -> Result<bool, StorageError> {
        Ok(self
            .read_submission(sender, id)
            .await?
            .map(|actual| same_content(&actual, expected))
            .unwrap_or(false))
    }
}

/// Whether the vault may use the remote tier, decided once at construction.
#[derive(Clone)]
pub enum RemoteCapability {
    Enabled(Arc<GuardedRemote>),
    Disabled { reason: String },
}

impl RemoteCapability {
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self::Disabled { reason: reason.into() }
    }

    #[must_use]
    pub fn remote(&self) -> Option<&Arc<GuardedRemote>> {
        match self {
            Self::Enabled(remote) => Some(remote),
            Self::Disabled { .. } => None,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    #[must_use]
    pub fn disabled_reason(&self) -> Option<&str> {
        match self {
            Self::Enabled(_) => None,
            Self::Disabled { reason } => Some(reason),
        }
    }

    /// The remote, or the error degraded callers report.
    pub fn require(&self) -> Result<&Arc<GuardedRemote>, StorageError> {
        match self {
            Self::Enabled(remote) => Ok(remote),
            Self::Disabled { reason } => Err(StorageError::Permanent(format!(
                "remote storage unavailable: {}",
                reason
            ))),
        }
    }
}

impl std::fmt::Debug for GuardedRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedRemote")
            .field("root", &self.layout().root())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for RemoteCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enabled(remote) => f
                .debug_struct("Enabled")
                .field("root", &remote.layout().root())
                .finish(),
            Self::Disabled { reason } => f.debug_struct("Disabled").field("reason", reason).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryRemote;
    use async_trait::async_trait;

    fn guarded(inner: Arc<dyn RemoteStore>) -> GuardedRemote {
        GuardedRemote::new(
            inner,
            RemoteLayout::new("/WebhookBackup"),
            Duration::from_millis(100),
            CircuitConfig::test(),
        )
    }

    struct SlowRemote;

    #[async_trait]
    impl RemoteStore for SlowRemote {
        async fn authenticate(&self) -> Result<(), StorageError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
        async fn ensure_folder(&self, _path: &str) -> Result<bool, StorageError> {
            Ok(true)
        }
        async fn list_folder(&self, _path: &str) -> Result<Vec<RemoteEntry>, StorageError> {
            Ok(Vec::new())
        }
        async fn read_object(&self, _path: &str) -> Result<Vec<u8>, StorageError> {
            Err(StorageError::NotFound)
        }
        async fn write_object(&self, path: &str, bytes: &[u8]) -> Result<WriteAck, StorageError> {
            Ok(WriteAck { path: path.to_string(), size: bytes.len() as u64, revision: None })
        }
    }

    #[tokio::test]
    async fn test_write_creates_sender_folder() {
        let memory = Arc::new(MemoryRemote::new());
        let remote = guarded(memory.clone());

        remote.write_submission("acme", "1", b"{}").await.unwrap();
        assert!(memory.contains("/WebhookBackup/acme/1.json"));
        assert!(remote.verify_submission("acme", "1", b"{}").await.unwrap());
        assert!(!remote.verify_submission("acme", "1", b"{ }").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_folders_list_empty() {
        let remote = guarded(Arc::new(MemoryRemote::new()));

        assert!(remote.list_sender_folders().await.unwrap().is_empty());
        assert!(remote.list_sender_objects("ghost").await.unwrap().is_empty());
        assert!(remote.read_submission("ghost", "1").await.unwrap().is_none());
        // Absence is not a failure
        assert_eq!(remote.health().failure_count(), 0);
    }

    #[tokio::test]
    async fn test_list_sender_objects_filters_entries() {
        let memory = Arc::new(MemoryRemote::new());
        memory.insert("/WebhookBackup/acme/1.json", "{}");
        memory.insert("/WebhookBackup/acme/readme.txt", "hi");
        memory.insert("/WebhookBackup/acme/nested/2.json", "{}");
        let remote = guarded(memory);

        let objects = remote.list_sender_objects("acme").await.unwrap();
        let ids: Vec<_> = objects.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
        assert_eq!(remote.list_sender_folders().await.unwrap(), vec!["acme".to_string()]);
    }

    #[tokio::test]
    async fn test_timeout_is_transient_and_counted() {
        let remote = guarded(Arc::new(SlowRemote));

        let err = remote.authenticate().await.unwrap_err();
        assert!(matches!(err, StorageError::Timeout { .. }));
        assert!(err.is_transient());
        assert_eq!(remote.health().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_health_goes_unhealthy_after_repeated_failures() {
        let memory = Arc::new(MemoryRemote::new());
        memory.set_online(false);
        let remote = guarded(memory);

        for _ in 0..RemoteHealth::UNHEALTHY_AFTER {
            assert!(remote.authenticate().await.is_err());
        }
        assert!(!remote.health().is_healthy());
    }

    #[test]
    fn test_capability_require() {
        let cap = RemoteCapability::disabled("no credentials");
        assert!(!cap.is_enabled());
        assert_eq!(cap.disabled_reason(), Some("no credentials"));
        let err = cap.require().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Permanent storage error: remote storage unavailable: no credentials"
        );
    }
}
