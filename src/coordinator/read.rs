// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Merged reads: local first, remote on a gap, heal on the way back.

use std::cmp::{Ordering, Reverse};
use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::error::VaultError;
use crate::metrics;
use crate::sanitize::{is_canonical_sender, sanitize_sender, validate_id};
use crate::storage::guarded::GuardedRemote;
use crate::storage::local::LocalRead;
use crate::submission::{Origin, Submission, SubmissionMeta};

use super::types::Lookup;
use super::Vault;

impl Vault {
    /// Senders known to either tier, sorted and deduplicated.
    pub async fn list_senders(&self) -> Result<Vec<String>, VaultError> {
        let mut senders = self.local.list_senders().await?;
        if let Some(remote) = self.remote.remote() {
            match remote.list_sender_folders().await {
                Ok(folders) => senders.extend(folders.into_iter().filter(|f| is_canonical_sender(f))),
                Err(e) => warn!(error = %e, "Remote sender listing failed, showing local senders only"),
            }
        }
        senders.sort();
        senders.dedup();
        Ok(senders)
    }

    /// All submissions of a sender, newest first, one entry per id.
    ///
    /// Remote entries missing locally are fetched and cached locally on the
    /// way; a sender unknown to both tiers yields an empty listing.
    #[tracing::instrument(skip(self))]
    pub async fn list_submissions(&self, sender: &str) -> Result<Vec<SubmissionMeta>, VaultError> {
        let Ok(sender) = sanitize_sender(sender) else {
            return Ok(Vec::new());
        };

        let mut listing = match self.local.list(&sender).await {
            Ok(local) => local,
            Err(e) => {
                warn!(sender = %sender, error = %e, "Local listing failed, continuing with remote");
                Vec::new()
            }
        };
        let seen: HashSet<String> = listing.iter().map(|m| m.id.clone()).collect();

        if let Some(remote) = self.remote.remote() {
            listing.extend(self.remote_only_entries(remote, &sender, &seen).await);
        }
        sort_listing(&mut listing);
        Ok(listing)
    }

    async fn remote_only_entries(
        &self,
        remote: &GuardedRemote,
        sender: &str,
        seen: &HashSet<String>,
    ) -> Vec<SubmissionMeta> {
        let objects = match remote.list_sender_objects(sender).await {
            Ok(objects) => objects,
            Err(e) => {
                warn!(sender, error = %e, "Remote listing failed, showing local entries only");
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        for object in objects.into_iter().filter(|o| !seen.contains(&o.id)) {
            let bytes = match remote.read_submission(sender, &object.id).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    warn!(sender, id = %object.id, error = %e, "Skipping unreadable remote entry");
                    continue;
                }
            };
            let meta = SubmissionMeta::from_bytes(sender, &object.id, &bytes, Origin::Remote);
            if meta.corrupted {
                metrics::record_corruption("remote");
            } else {
                self.heal(sender, &object.id, &bytes).await;
            }
            entries.push(meta);
        }
        entries
    }

    /// One submission, reserved keys stripped.
    ///
    /// Invalid names, absence from both tiers and remote failures all
    /// resolve to [`Lookup::NotFound`].
    #[tracing::instrument(skip(self))]
    pub async fn get_submission(&self, sender: &str, id: &str) -> Result<Lookup, VaultError> {
        let Ok(sender) = sanitize_sender(sender) else {
            return Ok(Lookup::NotFound);
        };
        if validate_id(id).is_err() {
            return Ok(Lookup::NotFound);
        }

        match self.local.get(&sender, id).await {
            Ok(LocalRead::Found(sub)) => return Ok(Lookup::Found(sub)),
            Ok(LocalRead::Corrupted { size }) => {
                debug!(sender = %sender, id, size, "Local copy corrupted, trying remote");
            }
            Ok(LocalRead::NotFound) => {}
            Err(e) => warn!(sender = %sender, id, error = %e, "Local read failed, trying remote"),
        }

        let Some(remote) = self.remote.remote() else {
            return Ok(Lookup::NotFound);
        };
        let bytes = match remote.read_submission(&sender, id).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(Lookup::NotFound),
            Err(e) => {
                warn!(sender = %sender, id, error = %e, "Remote read failed");
                return Ok(Lookup::NotFound);
            }
        };
        match Submission::from_bytes(&sender, id, &bytes, Origin::Remote) {
            Some(sub) => {
                self.heal(&sender, id, &bytes).await;
                Ok(Lookup::Found(sub))
            }
            None => {
                metrics::record_corruption("remote");
                warn!(sender = %sender, id, "Remote copy corrupted");
                Ok(Lookup::NotFound)
            }
        }
    }

    /// Best-effort write-back of remote bytes into the local tier.
    async fn heal(&self, sender: &str, id: &str, bytes: &[u8]) {
        match self.local.put(sender, id, bytes).await {
            Ok(_) => {
                metrics::record_heal("success");
                debug!(sender, id, "Healed local copy from remote");
            }
            Err(e) => {
                metrics::record_heal("error");
                warn!(sender, id, error = %e, "Read-heal write failed");
            }
        }
    }
}

/// Listing order: timestamp descending (entries without one last), then
/// local before remote, then id descending.
pub fn sort_listing(entries: &mut [SubmissionMeta]) {
    entries.sort_by(|a, b| {
        compare_timestamps(a.timestamp.as_deref(), b.timestamp.as_deref())
            .then_with(|| origin_rank(a.origin).cmp(&origin_rank(b.origin)))
            .then_with(|| b.id.cmp(&a.id))
    });
}

fn origin_rank(origin: Origin) -> u8 {
    match origin {
        Origin::Local => 0,
        Origin::Remote => 1,
    }
}

/// Position of a timestamp in the listing order. Instants sort before text
/// that does not parse, and both sort before a missing timestamp, so the
/// order stays total whatever mix of formats a folder holds.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum TimestampKey<'a> {
    Instant(Reverse<DateTime<Utc>>),
    Text(Reverse<&'a str>),
    Missing,
}

impl<'a> TimestampKey<'a> {
    fn of(timestamp: Option<&'a str>) -> Self {
        let Some(raw) = timestamp else {
            return Self::Missing;
        };
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Self::Instant(Reverse(at.with_timezone(&Utc)));
        }
        // Offset-less ISO-8601 is read as UTC.
        match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            Ok(naive) => Self::Instant(Reverse(naive.and_utc())),
            Err(_) => Self::Text(Reverse(raw)),
        }
    }
}

fn compare_timestamps(a: Option<&str>, b: Option<&str>) -> Ordering {
    TimestampKey::of(a).cmp(&TimestampKey::of(b))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::storage::memory::MemoryRemote;
    use crate::submit_options::SubmitOptions;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn meta(id: &str, ts: Option<&str>, origin: Origin) -> SubmissionMeta {
        SubmissionMeta {
            id: id.into(),
            sender: "acme".into(),
            title: "t".into(),
            timestamp: ts.map(str::to_string),
            size: 1,
            origin,
            corrupted: ts.is_none(),
        }
    }

    #[test]
    fn test_sort_listing() {
        let mut entries = vec![
            meta("a", None, Origin::Local),
            meta("b", Some("2025-01-01T00:00:00Z"), Origin::Remote),
            meta("c", Some("2025-01-01T00:00:00Z"), Origin::Local),
            meta("d", Some("2025-06-01T00:00:00Z"), Origin::Remote),
            meta("e", Some("2025-01-01T00:00:00Z"), Origin::Local),
        ];
        sort_listing(&mut entries);
        let ids: Vec<&str> = entries.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "e", "c", "b", "a"]);
    }

    #[test]
    fn test_sort_listing_mixed_offsets_is_chronological() {
        let entries = vec![
            meta("sydney", Some("2025-01-01T09:00:00+10:00"), Origin::Local), // 2024-12-31T23:00Z
            meta("utc", Some("2025-01-01T00:00:00Z"), Origin::Local),
            meta("naive", Some("2025-01-01T00:30:00.250000"), Origin::Remote),
            meta("unknown", Some("Unknown"), Origin::Local),
            meta("garbled", Some("yesterday"), Origin::Local),
            meta("none", None, Origin::Local),
        ];

        let mut forward = entries.clone();
        sort_listing(&mut forward);
        let mut backward: Vec<_> = entries.into_iter().rev().collect();
        sort_listing(&mut backward);
        assert_eq!(forward, backward);

        let ids: Vec<&str> = forward.iter().map(|m| m.id.as_str()).collect();
        // Instants newest first, then unparsable text descending, then missing.
        assert_eq!(ids, vec!["naive", "utc", "sydney", "garbled", "unknown", "none"]);
    }

    #[tokio::test]
    async fn test_list_merges_without_duplicates() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(MemoryRemote::new());
        let vault = vault(dir.path(), Some(memory.clone())).await;

        let stored = vault.submit("acme", json!({"n": 1}), &SubmitOptions::default()).await.unwrap();
        memory.insert(
            "/WebhookBackup/acme/20240101000000000000.json",
            r#"{"n": 0, "_meta": {"id": "20240101000000000000", "sender": "acme", "timestamp": "2024-01-01T00:00:00Z"}}"#,
        );

        let listing = vault.list_submissions("acme").await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].id, stored.id.unwrap());
        assert_eq!(listing[0].origin, Origin::Local);
        assert_eq!(listing[1].origin, Origin::Remote);

        // Healed: now served from local storage only.
        assert!(vault.local().exists("acme", "20240101000000000000").await.unwrap());
        let again = vault.list_submissions("acme").await.unwrap();
        assert!(again.iter().all(|m| m.origin == Origin::Local));
    }

    #[tokio::test]
    async fn test_list_reads_legacy_envelopes_from_remote() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(MemoryRemote::new());
        memory.insert(
            "/WebhookBackup/acme/20240501100000123456.json",
            r#"{"data": {"x": 1}, "_meta": {"timestamp": "2024-05-01T10:00:00.123456", "title": "Order", "ip": "10.0.0.7"}}"#,
        );
        memory.insert(
            "/WebhookBackup/acme/20240502083000000000.json",
            r#"{"data": 2, "_meta": {"timestamp": "2024-05-02T08:30:00", "title": "Submission 20240502083000000000", "direct_to_dropbox": true}}"#,
        );
        memory.insert("/WebhookBackup/acme/broken.json", "{not json");
        let vault = vault(dir.path(), Some(memory)).await;

        let listing = vault.list_submissions("acme").await.unwrap();
        let ids: Vec<&str> = listing.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["20240502083000000000", "20240501100000123456", "broken"]);
        assert_eq!(listing[0].title, "Submission 20240502083000000000");
        assert_eq!(listing[1].title, "Order");
        assert_eq!(listing[1].timestamp.as_deref(), Some("2024-05-01T10:00:00.123456"));

        let found = vault.get_submission("acme", "20240501100000123456").await.unwrap();
        match found {
            Lookup::Found(sub) => assert_eq!(sub.payload, json!({"data": {"x": 1}})),
            other => panic!("expected a hit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_corrupted_remote_listed_not_cached() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(MemoryRemote::new());
        memory.insert("/WebhookBackup/acme/bad.json", "{not json");
        let vault = vault(dir.path(), Some(memory)).await;

        let listing = vault.list_submissions("acme").await.unwrap();
        assert_eq!(listing.len(), 1);
        assert!(listing[0].corrupted);
        assert_eq!(listing[0].title, "Corrupted Data");
        assert!(!vault.local().exists("acme", "bad").await.unwrap());
        assert_eq!(vault.get_submission("acme", "bad").await.unwrap(), Lookup::NotFound);
    }

    #[tokio::test]
    async fn test_get_heals_corrupted_local_copy() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(MemoryRemote::new());
        memory.insert("/WebhookBackup/acme/7.json", r#"{"data": {"x": 1}}"#);
        let vault = vault(dir.path(), Some(memory)).await;
        vault.local().put("acme", "7", b"garbage").await.unwrap();

        let found = vault.get_submission("acme", "7").await.unwrap().into_option().unwrap();
        assert_eq!(found.payload, json!({"data": {"x": 1}}));
        assert_eq!(found.origin, Origin::Remote);

        let healed = vault.get_submission("acme", "7").await.unwrap().into_option().unwrap();
        assert_eq!(healed.origin, Origin::Local);
        assert_eq!(healed.payload, found.payload);
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_lookups() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(MemoryRemote::new());
        let vault = vault(dir.path(), Some(memory.clone())).await;

        assert!(vault.list_submissions("ghost-sender").await.unwrap().is_empty());
        assert_eq!(vault.get_submission("ghost-sender", "1").await.unwrap(), Lookup::NotFound);
        assert_eq!(vault.get_submission("acme", "../etc").await.unwrap(), Lookup::NotFound);
        assert!(vault.list_submissions("///").await.unwrap().is_empty());

        memory.set_online(false);
        assert_eq!(vault.get_submission("acme", "1").await.unwrap(), Lookup::NotFound);
        assert!(vault.list_submissions("acme").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_senders_union() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(MemoryRemote::new());
        memory.insert("/WebhookBackup/beta/1.json", "{}");
        memory.insert("/WebhookBackup/acme/1.json", "{}");
        memory.insert("/WebhookBackup/.private/1.json", "{}");
        let vault = vault(dir.path(), Some(memory.clone())).await;
        vault.local().put("acme", "2", b"{}").await.unwrap();
        vault.local().put("gamma", "1", b"{}").await.unwrap();

        assert_eq!(vault.list_senders().await.unwrap(), vec!["acme", "beta", "gamma"]);

        memory.set_online(false);
        assert_eq!(vault.list_senders().await.unwrap(), vec!["acme", "gamma"]);
    }
}
