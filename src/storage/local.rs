// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local filesystem tier.
//!
//! Layout: `{root}/{sender}/{id}.json`, one file per submission. Writes go
//! to a uniquely named temp file in the target directory, are fsynced,
//! then renamed into place, so a reader never observes a half-written
//! document. Temp files start with `.` and never match the listing filter.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::layout::{file_name, id_from_file_name};
use super::traits::StorageError;
use crate::metrics;
use crate::sanitize::{is_canonical_sender, validate_id};
use crate::submission::{Origin, Submission, SubmissionMeta};

/// Outcome of a local read.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalRead {
    Found(Submission),
    /// The file exists but does not parse; `size` is its raw byte length.
    Corrupted { size: u64 },
    NotFound,
}

/// Size and modification time of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Filesystem persistence keyed by (sender, id).
///
/// Callers pass already-sanitized senders; anything that is not a
/// canonical segment is refused so no path can escape `root`.
#[derive(Debug, Clone)]
pub struct SubmissionStore {
    root: PathBuf,
}

impl SubmissionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_segments(sender: &str, id: &str) -> Result<(), StorageError> {
        if !is_canonical_sender(sender) {
            return Err(StorageError::Permanent(format!("invalid sender segment: {:?}", sender)));
        }
        validate_id(id).map_err(|e| StorageError::Permanent(e.to_string()))
    }

    #[must_use]
    pub fn sender_dir(&self, sender: &str) -> PathBuf {
        self.root.join(sender)
    }

    #[must_use]
    pub fn path_for(&self, sender: &str, id: &str) -> PathBuf {
        self.sender_dir(sender).join(file_name(id))
    }

    /// Create the sender directory. An existing directory is not an error.
    pub async fn ensure_sender_dir(&self, sender: &str) -> Result<PathBuf, StorageError> {
        if !is_canonical_sender(sender) {
            return Err(StorageError::Permanent(format!("invalid sender segment: {:?}", sender)));
        }
        let dir = self.sender_dir(sender);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Atomically write (or overwrite) a submission file.
    pub async fn put(&self, sender: &str, id: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        Self::check_segments(sender, id)?;
        let dir = self.ensure_sender_dir(sender).await?;
        let final_path = dir.join(file_name(id));

        match write_atomic(&final_path, bytes).await {
            Ok(()) => {
                metrics::record_operation("local", "write", "success");
                metrics::record_bytes_written("local", bytes.len());
                debug!(sender, id, bytes = bytes.len(), "Local write committed");
                Ok(final_path)
            }
            Err(e) => {
                metrics::record_operation("local", "write", "error");
                warn!(sender, id, error = %e, "Local write failed");
                Err(e)
            }
        }
    }

    /// Raw bytes of a stored submission, `None` if absent.
    pub async fn read_raw(&self, sender: &str, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if Self::check_segments(sender, id).is_err() {
            return Ok(None);
        }
        match fs::read(self.path_for(sender, id)).await {
            Ok(bytes) => {
                metrics::record_bytes_read("local", bytes.len());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read and parse a submission.
    pub async fn get(&self, sender: &str, id: &str) -> Result<LocalRead, StorageError> {
        let Some(bytes) = self.read_raw(sender, id).await? else {
            return Ok(LocalRead::NotFound);
        };
        match Submission::from_bytes(sender, id, &bytes, Origin::Local) {
            Some(sub) => Ok(LocalRead::Found(sub)),
            None => {
                metrics::record_corruption("local");
                warn!(sender, id, size = bytes.len(), "Corrupted local submission");
                Ok(LocalRead::Corrupted { size: bytes.len() as u64 })
            }
        }
    }

    pub async fn exists(&self, sender: &str, id: &str) -> Result<bool, StorageError> {
        Ok(self.stamp(sender, id).await?.is_some())
    }

    /// Size and mtime of a stored file, `None` if absent.
    pub async fn stamp(&self, sender: &str, id: &str) -> Result<Option<FileStamp>, StorageError> {
        if Self::check_segments(sender, id).is_err() {
            return Ok(None);
        }
        match fs::metadata(self.path_for(sender, id)).await {
            Ok(meta) if meta.is_file() => Ok(Some(FileStamp {
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids stored for a sender, sorted. A missing sender directory is empty.
    pub async fn list_ids(&self, sender: &str) -> Result<Vec<String>, StorageError> {
        if !is_canonical_sender(sender) {
            return Ok(Vec::new());
        }
        let mut entries = match fs::read_dir(self.sender_dir(sender)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(id) = id_from_file_name(name) else { continue };
            if validate_id(id).is_err() {
                continue;
            }
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Listing entries for a sender. Unreadable or unparsable files are
    /// reported as corrupted entries and never stop the enumeration.
    pub async fn list(&self, sender: &str) -> Result<Vec<SubmissionMeta>, StorageError> {
        let ids = self.list_ids(sender).await?;
        let mut metas = Vec::with_capacity(ids.len());
        for id in ids {
            match fs::read(self.path_for(sender, &id)).await {
                Ok(bytes) => {
                    let meta = SubmissionMeta::from_bytes(sender, &id, &bytes, Origin::Local);
                    if meta.corrupted {
                        metrics::record_corruption("local");
                    }
                    metas.push(meta);
                }
                // Removed between listing and reading
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(sender, id = %id, error = %e, "Unreadable local submission");
                    let size = fs::metadata(self.path_for(sender, &id))
                        .await
                        .map(|m| m.len())
                        .unwrap_or(0);
                    metas.push(SubmissionMeta::corrupted(sender, &id, size, Origin::Local));
                }
            }
        }
        Ok(metas)
    }

    /// Sender directories present locally, sorted.
    pub async fn list_senders(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut senders = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_canonical_sender(name) {
                    senders.push(name.to_string());
                }
            }
        }
        senders.sort();
        Ok(senders)
    }
}

/// Write `bytes` to a uniquely named temp file beside `final_path`, fsync,
/// then rename over `final_path`. The parent directory must exist.
pub(crate) async fn write_atomic(final_path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::Permanent(format!("not a file path: {}", final_path.display())))?;
    let temp_path = final_path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    let result = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, final_path).await?;
        Ok::<(), StorageError>(())
    }
    .await;

    if result.is_err() {
        if let Err(cleanup) = fs::remove_file(&temp_path).await {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %temp_path.display(), error = %cleanup, "Failed to remove temp file");
            }
        }
    }
    result
}
