// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Error taxonomy shared by both storage tiers.
///
/// `Transient` and `Timeout` are retryable; `Permanent` and `Auth` are not.
/// `NotFound` is an absence, not a failure, and callers usually turn it
/// into an `Option` or a typed outcome.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found")]
    NotFound,
    #[error("Transient storage error: {0}")]
    Transient(String),
    #[error("Permanent storage error: {0}")]
    Permanent(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Operation '{operation}' timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether a retry has a reasonable chance of succeeding.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) | Self::Timeout { .. } => true,
            Self::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::InvalidInput
                    | std::io::ErrorKind::InvalidData
                    | std::io::ErrorKind::NotFound
            ),
            Self::NotFound | Self::Permanent(_) | Self::Auth(_) => false,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// One child of a remote folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_folder: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Acknowledgement of a remote write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    /// Path as reported back by the store
    pub path: String,
    /// Number of bytes the store says it holds
    pub size: u64,
    /// Store-specific revision or object id, if any
    pub revision: Option<String>,
}

/// Capability boundary over the remote object store.
///
/// Paths are absolute, `/`-separated, and already built from sanitized
/// segments (see [`crate::storage::layout::RemoteLayout`]).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Obtain (or refresh) whatever credentials the store needs.
    async fn authenticate(&self) -> Result<(), StorageError>;

    /// Create `path` and any missing parents. Returns `true` if the folder
    /// exists afterwards; an already existing folder is not an error.
    async fn ensure_folder(&self, path: &str) -> Result<bool, StorageError>;

    /// List the direct children of a folder. A missing folder is `NotFound`.
    async fn list_folder(&self, path: &str) -> Result<Vec<RemoteEntry>, StorageError>;

    /// Read a whole object.
    async fn read_object(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Write (overwrite) a whole object.
    async fn write_object(&self, path: &str, bytes: &[u8]) -> Result<WriteAck, StorageError>;
}
