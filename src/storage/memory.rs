// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process [`RemoteStore`] for tests and local development.
//!
//! Behaves like a hierarchical object store: writes require the parent
//! folder to exist, listing a missing folder is `NotFound`. Can be taken
//! offline to simulate an unreachable remote.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};

use super::traits::{RemoteEntry, RemoteStore, StorageError, WriteAck};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    modified: DateTime<Utc>,
}

pub struct MemoryRemote {
    objects: DashMap<String, StoredObject>,
    folders: DashSet<String>,
    online: AtomicBool,
    revision: AtomicU64,
    writes: AtomicU64,
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "",
        Some(idx) => &path[..idx],
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn normalize(path: &str) -> String {
    path.trim_end_matches('/').to_string()
}

impl MemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            folders: DashSet::new(),
            online: AtomicBool::new(true),
            revision: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Take the store offline (every call fails transiently) or back online.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Number of stored objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Successful writes since creation
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.objects.contains_key(&normalize(path))
    }

    /// Direct object access, bypassing the online switch.
    #[must_use]
    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.get(&normalize(path)).map(|o| o.bytes.clone())
    }

    /// Seed an object, creating its parent folders.
    pub fn insert(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.insert_at(path, bytes, Utc::now());
    }

    /// Seed an object with an explicit modification time.
    pub fn insert_at(&self, path: &str, bytes: impl Into<Vec<u8>>, modified: DateTime<Utc>) {
        let path = normalize(path);
        self.add_folder_chain(parent_of(&path));
        self.revision.fetch_add(1, Ordering::SeqCst);
        self.objects.insert(path, StoredObject { bytes: bytes.into(), modified });
    }

    fn add_folder_chain(&self, folder: &str) {
        let mut current = folder;
        while !current.is_empty() {
            self.folders.insert(current.to_string());
            current = parent_of(current);
        }
    }

    fn check_online(&self, operation: &str) -> Result<(), StorageError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(StorageError::Transient(format!("remote offline during {}", operation)))
        }
    }

    fn folder_exists(&self, path: &str) -> bool {
        path.is_empty() || self.folders.contains(path)
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn authenticate(&self) -> Result<(), StorageError> {
        self.check_online("authenticate")
    }

    async fn ensure_folder(&self, path: &str) -> Result<bool, StorageError> {
        self.check_online("ensure_folder")?;
        let path = normalize(path);
        if self.objects.contains_key(&path) {
            return Err(StorageError::Permanent(format!("{} is an object, not a folder", path)));
        }
        self.add_folder_chain(&path);
        Ok(true)
    }

    async fn list_folder(&self, path: &str) -> Result<Vec<RemoteEntry>, StorageError> {
        self.check_online("list_folder")?;
        let path = normalize(path);
        if !self.folder_exists(&path) {
            return Err(StorageError::NotFound);
        }

        let mut entries: Vec<RemoteEntry> = self
            .folders
            .iter()
            .filter(|f| parent_of(f.key()) == path)
            .map(|f| RemoteEntry {
                name: name_of(f.key()).to_string(),
                is_folder: true,
                size: 0,
                modified: None,
            })
            .collect();
        entries.extend(
            self.objects
                .iter()
                .filter(|o| parent_of(o.key()) == path)
                .map(|o| RemoteEntry {
                    name: name_of(o.key()).to_string(),
                    is_folder: false,
                    size: o.bytes.len() as u64,
                    modified: Some(o.modified),
                }),
        );
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read_object(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.check_online("read_object")?;
        self.objects
            .get(&normalize(path))
            .map(|o| o.bytes.clone())
            .ok_or(StorageError::NotFound)
    }

    async fn write_object(&self, path: &str, bytes: &[u8]) -> Result<WriteAck, StorageError> {
        self.check_online("write_object")?;
        let path = normalize(path);
        if !self.folder_exists(parent_of(&path)) {
            return Err(StorageError::NotFound);
        }
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        self.objects.insert(
            path.clone(),
            StoredObject { bytes: bytes.to_vec(), modified: Utc::now() },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(WriteAck {
            path,
            size: bytes.len() as u64,
            revision: Some(format!("rev{}", revision)),
        })
    }
}
