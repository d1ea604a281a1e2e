//! # Webhook Vault
//!
//! Durable two-tier storage for webhook JSON submissions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Ingest Layer                         │
//! │  • submit() / ingest() with per-request SubmitOptions       │
//! │  • Sender sanitization, monotonic per-sender ids            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   (retry + verify, circuit breaker)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Remote tier (Dropbox)                     │
//! │  • Source of truth: {root}/{sender}/{id}.json               │
//! │  • Optional: absent credentials mean local-only mode        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              (mirror on success, fallback on failure)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Local tier (filesystem)                    │
//! │  • Read cache and fallback store                            │
//! │  • Atomic writes, corruption reported not raised            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   (SyncWorker reconciliation)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Sync ledger                          │
//! │  • pending_sync queue, counters, bounded history            │
//! │  • Single writer, persisted atomically                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use webhook_vault::{SubmitOptions, SyncDirection, SyncRequest, Vault, VaultConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), webhook_vault::VaultError> {
//!     let vault = Vault::open(VaultConfig::default()).await?;
//!
//!     let payload = json!({"sender": "acme", "title": "Order", "data": {"x": 1}});
//!     let result = vault.ingest(payload, Some("10.0.0.7"), &SubmitOptions::default()).await?;
//!     println!("{}", result.to_json());
//!
//!     // Reads go local → remote, healing the local tier on the way
//!     for entry in vault.list_submissions("acme").await? {
//!         println!("{} {}", entry.id, entry.title);
//!     }
//!
//!     // Reconcile in the background
//!     vault.trigger_sync(SyncRequest::new(SyncDirection::Both));
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`VaultConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`Vault`] (ingestion and merged reads)
//! - [`storage`]: Local tier, remote stores (Dropbox, memory) and the guarded remote
//! - [`sync`]: Reconciliation worker and scheduler
//! - [`ledger`]: Durable sync status
//! - [`resilience`]: Circuit breaker and retry logic

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod resilience;
pub mod sanitize;
pub mod storage;
pub mod submission;
pub mod submit_options;
pub mod sync;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::{DropboxCredentials, VaultConfig};
pub use coordinator::{IngestOutcome, LocalWriteReport, Lookup, RemoteWriteReport, SubmitResult, Vault};
pub use error::VaultError;
pub use ledger::{HistoryEntry, PendingSync, SyncStatus, SyncStatusStore};
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitConfig};
pub use resilience::retry::RetryConfig;
pub use storage::dropbox::DropboxRemote;
pub use storage::guarded::{GuardedRemote, RemoteCapability};
pub use storage::local::{LocalRead, SubmissionStore};
pub use storage::memory::MemoryRemote;
pub use storage::traits::{RemoteEntry, RemoteStore, StorageError, WriteAck};
pub use submission::{Origin, Submission, SubmissionMeta};
pub use submit_options::SubmitOptions;
pub use sync::{
    DirectionStats, RunSummary, SyncDirection, SyncRequest, SyncScheduler, SyncScope, SyncSettings,
    SyncWorker, TriggerOutcome,
};
