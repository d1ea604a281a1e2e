// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff.
//!
//! Only transient failures are retried; a permanent failure returns at once.
//! Every policy is bounded: there is no retry-forever mode.
//!
//! # Example
//!
//! ```
//! use webhook_vault::{RetryConfig, VaultConfig};
//!
//! // Ingestion: 3 retries after the first attempt, delays from config
//! let upload = VaultConfig::default().retry_policy(3);
//! assert_eq!(upload.max_retries, Some(3));
//!
//! // Sync transfers: quick retry, then fail
//! let query = RetryConfig::query();
//! assert_eq!(query.max_retries, Some(2));
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::storage::traits::StorageError;

/// Errors that know whether retrying them is worthwhile.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for StorageError {
    fn is_transient(&self) -> bool {
        StorageError::is_transient(self)
    }
}

/// Configuration for operation retry behavior.
///
/// `max_retries` counts retries *after* the first attempt, so
/// `Some(3)` means at most four calls. `None` is treated as zero retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_retries: Option<usize>,
}

impl RetryConfig {
    /// Quick retry for reads that a caller is waiting on.
    #[must_use]
    pub fn query() -> Self {
        Self {
            max_retries: Some(2),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[must_use]
    pub fn test() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: usize) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 1..retry {
            delay = delay.mul_f64(self.factor).min(self.max_delay);
        }
        delay.min(self.max_delay.max(self.initial_delay))
    }
}

/// Outcome of a retried operation, including how many retries it took.
#[derive(Debug)]
pub struct Retried<T, E> {
    pub result: Result<T, E>,
    pub retries: usize,
}

/// Run `operation` until it succeeds, fails permanently, or runs out of retries.
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + Retryable,
{
    retry_counted(operation_name, config, operation).await.result
}

/// Like [`retry`], but also reports the number of retries performed.
pub async fn retry_counted<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Retried<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + Retryable,
{
    let max_retries = config.max_retries.unwrap_or(0);
    let mut delay = config.initial_delay;
    let mut retries = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if retries > 0 {
                    info!("Operation '{}' succeeded after {} retries", operation_name, retries);
                }
                return Retried { result: Ok(val), retries };
            }
            Err(err) => {
                if !err.is_transient() {
                    warn!("Operation '{}' failed permanently: {}", operation_name, err);
                    return Retried { result: Err(err), retries };
                }
                if retries >= max_retries {
                    warn!(
                        "Operation '{}' failed after {} retries: {}",
                        operation_name, retries, err
                    );
                    return Retried { result: Err(err), retries };
                }

                retries += 1;
                warn!(
                    "Operation '{}' failed (retry {}/{}): {}. Retrying in {:?}...",
                    operation_name, retries, max_retries, err, delay
                );

                sleep(delay).await;
                delay = (delay.mul_f64(config.factor)).min(config.max_delay);
            }
        }
    }
}
