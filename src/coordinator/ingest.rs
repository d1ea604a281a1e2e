// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Ingestion: remote first, local mirror, local fallback.
//!
//! Every accepted submission ends in one of two places: the remote tier
//! (optionally mirrored locally), or the local tier under a fallback id
//! with a `pending_sync` entry. Only a failing fallback write loses the
//! request, and that is reported as a terminal failure with a fix hint.

use chrono::Utc;
use serde_json::Value;
use tracing::{error, warn};

use crate::error::VaultError;
use crate::ledger::PendingSync;
use crate::metrics;
use crate::resilience::retry::retry_counted;
use crate::sanitize::sanitize_sender;
use crate::storage::guarded::GuardedRemote;
use crate::storage::traits::StorageError;
use crate::submit_options::SubmitOptions;
use crate::submission::{build_document, encode_document, fallback_id, Envelope, IssuedId};

use super::types::{IngestOutcome, LocalWriteReport, RemoteWriteReport, SubmitResult};
use super::Vault;

/// Per-step diagnostics: `info!` when the caller asked for debug output.
macro_rules! step {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

impl Vault {
    /// Store `payload` (a JSON object) for `sender`.
    ///
    /// Input errors are returned as `Err`; storage failures are reported in
    /// the returned [`SubmitResult`].
    pub async fn submit(
        &self,
        sender: &str,
        payload: Value,
        options: &SubmitOptions,
    ) -> Result<SubmitResult, VaultError> {
        self.store(sender, payload, None, options).await
    }

    /// Ingestion boundary: the sender is the payload's `sender` field,
    /// or the source address when the payload names none.
    pub async fn ingest(
        &self,
        payload: Value,
        source_addr: Option<&str>,
        options: &SubmitOptions,
    ) -> Result<SubmitResult, VaultError> {
        let sender = payload
            .get("sender")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .or_else(|| source_addr.map(str::to_string))
            .ok_or_else(|| VaultError::InvalidSender("no sender field and no source address".into()))?;
        self.store(&sender, payload, source_addr, options).await
    }

    #[tracing::instrument(skip(self, payload, options), fields(verify = options.verify_upload, max_retries = options.max_retries))]
    async fn store(
        &self,
        raw_sender: &str,
        payload: Value,
        source: Option<&str>,
        options: &SubmitOptions,
    ) -> Result<SubmitResult, VaultError> {
        let sender = sanitize_sender(raw_sender)?;
        let Value::Object(fields) = payload else {
            return Err(VaultError::InvalidPayload("payload must be a JSON object".into()));
        };
        let issued = self.ids.next(&sender);
        let mut envelope = Envelope {
            id: issued.id.clone(),
            sender: sender.clone(),
            title: fields.get("title").and_then(Value::as_str).map(str::to_string),
            timestamp: issued.timestamp(),
            source: source.map(str::to_string),
            fallback: false,
        };
        let bytes = encode_document(&build_document(&fields, &envelope)?)?;
        step!(options.debug, sender = %sender, id = %issued.id, bytes = bytes.len(), "Submission encoded");

        let Some(remote) = self.remote.remote() else {
            step!(options.debug, sender = %sender, "Remote disabled, storing locally");
            return Ok(self.store_local_only(&sender, &issued, &bytes).await);
        };

        let report = self.upload(remote, &sender, &issued.id, &bytes, options).await;
        if report.success {
            let local = if options.sync_to_local {
                Some(self.mirror_local(&sender, &issued.id, &bytes, options.debug).await)
            } else {
                None
            };
            metrics::record_ingest("stored");
            return Ok(SubmitResult {
                success: true,
                outcome: IngestOutcome::Stored,
                sender,
                id: Some(issued.id),
                fallback_id: None,
                error: None,
                fix_hint: None,
                remote: report,
                local,
                queued_for_sync: false,
            });
        }

        // Remote exhausted: persist locally under a fallback id and queue it.
        let remote_error = report.error.clone().unwrap_or_else(|| "remote write failed".into());
        let fid = fallback_id(&issued.id);
        envelope.id = fid.clone();
        envelope.fallback = true;
        let fallback_bytes = encode_document(&build_document(&fields, &envelope)?)?;

        match self.local.put(&sender, &fid, &fallback_bytes).await {
            Ok(path) => {
                let pending = PendingSync {
                    sender: sender.clone(),
                    submission_id: fid.clone(),
                    timestamp: issued.at,
                    is_fallback: true,
                    error: Some(remote_error.clone()),
                    attempts: 0,
                };
                if let Err(e) = self.ledger.enqueue_pending(pending).await {
                    // Applied in memory; the next successful ledger write persists it.
                    warn!(sender = %sender, id = %fid, error = %e, "Pending entry not yet persisted");
                }
                warn!(sender = %sender, id = %fid, error = %remote_error, "Remote write failed, stored fallback copy");
                metrics::record_ingest("fallback");
                Ok(SubmitResult {
                    success: true,
                    outcome: IngestOutcome::Fallback,
                    sender,
                    id: None,
                    fallback_id: Some(fid),
                    error: Some(remote_error),
                    fix_hint: None,
                    remote: report,
                    local: Some(LocalWriteReport {
                        success: true,
                        path: Some(path.display().to_string()),
                        error: None,
                    }),
                    queued_for_sync: true,
                })
            }
            Err(e) => {
                error!(sender = %sender, id = %fid, remote_error = %remote_error, local_error = %e, "Submission lost: both tiers rejected it");
                metrics::record_ingest("failed");
                Ok(SubmitResult {
                    success: false,
                    outcome: IngestOutcome::Failed,
                    sender,
                    id: None,
                    fallback_id: None,
                    error: Some(format!("remote: {}; local fallback: {}", remote_error, e)),
                    fix_hint: Some(self.fix_hint(&e, Some(&remote_error))),
                    remote: report,
                    local: Some(LocalWriteReport { success: false, path: None, error: Some(e.to_string()) }),
                    queued_for_sync: false,
                })
            }
        }
    }

    async fn upload(
        &self,
        remote: &GuardedRemote,
        sender: &str,
        id: &str,
        bytes: &[u8],
        options: &SubmitOptions,
    ) -> RemoteWriteReport {
        let path = remote.layout().object_path(sender, id);
        let verify = options.verify_upload;
        let policy = self.config.retry_policy(options.max_retries);
        let path_ref = path.as_str();

        let attempt = retry_counted("remote_upload", &policy, || async move {
            remote.authenticate().await?;
            remote.ensure_sender_folder(sender).await?;
            remote.write_object(path_ref, bytes).await?;
            if verify && !remote.verify_submission(sender, id, bytes).await? {
                return Err(StorageError::Transient(format!("verification mismatch for {}", path_ref)));
            }
            Ok(())
        })
        .await;
        metrics::record_upload_retries(attempt.retries);

        match attempt.result {
            Ok(()) => {
                step!(options.debug, path = %path, retries = attempt.retries, verified = verify, "Remote write committed");
                RemoteWriteReport {
                    attempted: true,
                    success: true,
                    path: Some(path),
                    retries: attempt.retries,
                    verified: verify,
                    error: None,
                }
            }
            Err(e) => RemoteWriteReport {
                attempted: true,
                success: false,
                path: Some(path),
                retries: attempt.retries,
                verified: false,
                error: Some(e.to_string()),
            },
        }
    }

    async fn mirror_local(&self, sender: &str, id: &str, bytes: &[u8], debug: bool) -> LocalWriteReport {
        match self.local.put(sender, id, bytes).await {
            Ok(path) => {
                step!(debug, path = %path.display(), "Local mirror written");
                LocalWriteReport { success: true, path: Some(path.display().to_string()), error: None }
            }
            Err(e) => {
                warn!(sender, id, error = %e, "Local mirror failed; remote copy is authoritative");
                LocalWriteReport { success: false, path: None, error: Some(e.to_string()) }
            }
        }
    }

    async fn store_local_only(&self, sender: &str, issued: &IssuedId, bytes: &[u8]) -> SubmitResult {
        let remote = RemoteWriteReport {
            error: self.remote.disabled_reason().map(str::to_string),
            ..RemoteWriteReport::default()
        };
        match self.local.put(sender, &issued.id, bytes).await {
            Ok(path) => {
                metrics::record_ingest("stored");
                SubmitResult {
                    success: true,
                    outcome: IngestOutcome::Stored,
                    sender: sender.to_string(),
                    id: Some(issued.id.clone()),
                    fallback_id: None,
                    error: None,
                    fix_hint: None,
                    remote,
                    local: Some(LocalWriteReport { success: true, path: Some(path.display().to_string()), error: None }),
                    queued_for_sync: false,
                }
            }
            Err(e) => {
                error!(sender, id = %issued.id, error = %e, "Local-only write failed");
                metrics::record_ingest("failed");
                SubmitResult {
                    success: false,
                    outcome: IngestOutcome::Failed,
                    sender: sender.to_string(),
                    id: None,
                    fallback_id: None,
                    error: Some(e.to_string()),
                    fix_hint: Some(self.fix_hint(&e, None)),
                    remote,
                    local: Some(LocalWriteReport { success: false, path: None, error: Some(e.to_string()) }),
                    queued_for_sync: false,
                }
            }
        }
    }

    fn fix_hint(&self, local: &StorageError, remote: Option<&str>) -> String {
        let mut hint = format!(
            "check that {} exists, is writable and has free space",
            self.config.data_dir.display()
        );
        if matches!(local, StorageError::Permanent(_)) {
            hint = "the sender name or id cannot be stored; resend with a plain sender name".to_string();
        }
        if remote.is_some() {
            hint.push_str("; also check the Dropbox credentials and network connectivity");
        }
        hint
    }
}
