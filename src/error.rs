// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

use crate::storage::traits::StorageError;

/// Top-level error for vault operations.
///
/// Input problems (`InvalidSender`, `InvalidId`, `InvalidPayload`) are
/// permanent and never retried. Storage failures carry their own
/// transient/permanent classification in [`StorageError`].
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Invalid sender name: {0:?}")]
    InvalidSender(String),
    #[error("Invalid submission id: {0:?}")]
    InvalidId(String),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Sync ledger error: {0}")]
    Ledger(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("A sync run is already in progress")]
    SyncInProgress,
}

impl VaultError {
    /// Whether this error is the caller's fault (bad input) rather than the system's.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSender(_) | Self::InvalidId(_) | Self::InvalidPayload(_)
        )
    }
}
