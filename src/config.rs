// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the vault.
//!
//! # Example
//!
//! ```
//! use webhook_vault::VaultConfig;
//!
//! // Minimal config (uses defaults, local-only until credentials are added)
//! let config = VaultConfig::default();
//! assert_eq!(config.remote_root, "/WebhookBackup");
//! assert!(config.dropbox.is_none());
//!
//! // Full config
//! let config = VaultConfig {
//!     data_dir: "/var/lib/vault/data".into(),
//!     remote_timeout_ms: 10_000,
//!     sync_interval_secs: Some(3600),
//!     ..Default::default()
//! };
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::VaultError;
use crate::resilience::circuit_breaker::CircuitConfig;
use crate::resilience::retry::RetryConfig;

/// Dropbox OAuth credentials (refresh-token flow).
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct DropboxCredentials {
    pub app_key: String,
    pub app_secret: String,
    pub refresh_token: String,
    /// Optional pre-issued access token, refreshed when it expires
    #[serde(default)]
    pub access_token: Option<String>,
}

impl DropboxCredentials {
    /// Credentials are usable only when every required part is present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.app_key.trim().is_empty()
            && !self.app_secret.trim().is_empty()
            && !self.refresh_token.trim().is_empty()
    }
}

// Never print secrets.
impl std::fmt::Debug for DropboxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropboxCredentials")
            .field("app_key", &self.app_key)
            .field("app_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Configuration for the vault.
///
/// All fields have sensible defaults. Remote storage is enabled only when
/// `dropbox` holds complete credentials; otherwise the vault runs local-only.
#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    /// Root directory for local submission files (one subdirectory per sender)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Location of the sync ledger (JSON)
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Remote folder holding one folder per sender
    #[serde(default = "default_remote_root")]
    pub remote_root: String,

    /// Upper bound for any single remote call
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,

    /// Backoff between transient retries
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Verified transfers retried this many times per sync run
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,

    /// Hard cap for one reconciliation run
    #[serde(default = "default_max_run_duration_secs")]
    pub max_run_duration_secs: u64,

    /// Periodic sync interval (None = on demand only)
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,

    /// Ledger retention
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_last_errors_limit")]
    pub last_errors_limit: usize,

    /// Remote circuit breaker
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,
    #[serde(default = "default_circuit_recovery_secs")]
    pub circuit_recovery_secs: u64,

    /// Dropbox credentials (None = local-only)
    #[serde(default)]
    pub dropbox: Option<DropboxCredentials>,
}

fn default_data_dir() -> PathBuf { PathBuf::from("./data") }
fn default_ledger_path() -> PathBuf { PathBuf::from("./sync_status.json") }
fn default_remote_root() -> String { "/WebhookBackup".to_string() }
fn default_remote_timeout_ms() -> u64 { 30_000 }
fn default_retry_initial_delay_ms() -> u64 { 500 }
fn default_retry_max_delay_ms() -> u64 { 30_000 }
fn default_verify_attempts() -> u32 { 3 }
fn default_max_run_duration_secs() -> u64 { 3600 }
fn default_history_limit() -> usize { 100 }
fn default_last_errors_limit() -> usize { 20 }
fn default_circuit_failure_threshold() -> u32 { 5 }
fn default_circuit_recovery_secs() -> u64 { 30 }

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ledger_path: default_ledger_path(),
            remote_root: default_remote_root(),
            remote_timeout_ms: default_remote_timeout_ms(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            verify_attempts: default_verify_attempts(),
            max_run_duration_secs: default_max_run_duration_secs(),
            sync_interval_secs: None,
            history_limit: default_history_limit(),
            last_errors_limit: default_last_errors_limit(),
            circuit_failure_threshold: default_circuit_failure_threshold(),
            circuit_recovery_secs: default_circuit_recovery_secs(),
            dropbox: None,
        }
    }
}

impl VaultConfig {
    /// Load from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> Result<Self, VaultError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| VaultError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)
                .map_err(|e| VaultError::Config(format!("invalid TOML in {}: {}", path.display(), e))),
            "json" => serde_json::from_str(&contents)
                .map_err(|e| VaultError::Config(format!("invalid JSON in {}: {}", path.display(), e))),
            _ => Err(VaultError::Config(format!("unsupported config file extension: {:?}", ext))),
        }
    }

    /// Move the data directory. A ledger still at its default path moves
    /// with it, next to the new directory; an explicitly set one stays put.
    pub fn relocate_data_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        if self.ledger_path == default_ledger_path() {
            let name = self.ledger_path.file_name().unwrap_or_default().to_owned();
            self.ledger_path = dir.parent().unwrap_or(Path::new("")).join(name);
        }
        self.data_dir = dir;
    }

    /// Credentials that are complete enough to try the remote tier.
    #[must_use]
    pub fn usable_credentials(&self) -> Option<&DropboxCredentials> {
        self.dropbox.as_ref().filter(|c| c.is_complete())
    }

    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    #[must_use]
    pub fn max_run_duration(&self) -> Duration {
        Duration::from_secs(self.max_run_duration_secs)
    }

    #[must_use]
    pub fn sync_interval(&self) -> Option<Duration> {
        self.sync_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Retry policy for remote writes, with `max_retries` retries after the first attempt.
    #[must_use]
    pub fn retry_policy(&self, max_retries: usize) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms.max(self.retry_initial_delay_ms)),
            factor: 2.0,
            max_retries: Some(max_retries),
        }
    }

    #[must_use]
    pub fn circuit_config(&self) -> CircuitConfig {
        CircuitConfig {
            failure_threshold: self.circuit_failure_threshold.max(1),
            success_threshold: 1,
            recovery_timeout: Duration::from_secs(self.circuit_recovery_secs),
        }
    }
}
