//! Public result types for the vault coordinator.

use serde::Serialize;

use crate::submission::Submission;

/// How an ingestion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestOutcome {
    /// Committed to the remote tier (or to the local tier in local-only mode)
    Stored,
    /// Remote write failed; committed locally under a fallback id and queued
    Fallback,
    /// Neither tier accepted the submission
    Failed,
}

impl std::fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stored => write!(f, "stored"),
            Self::Fallback => write!(f, "fallback"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// What happened on the remote tier during one ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteWriteReport {
    pub attempted: bool,
    pub success: bool,
    pub path: Option<String>,
    /// Retries after the first attempt
    pub retries: usize,
    pub verified: bool,
    pub error: Option<String>,
}

/// What happened on the local tier during one ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocalWriteReport {
    pub success: bool,
    pub path: Option<String>,
    pub error: Option<String>,
}

/// Result of [`super::Vault::submit`].
///
/// Every non-failed result carries a resolvable reference: `id` when the
/// submission was stored normally, `fallback_id` when it went through
/// the fallback path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitResult {
    pub success: bool,
    pub outcome: IngestOutcome,
    pub sender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_id: Option<String>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    pub remote: RemoteWriteReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalWriteReport>,
    pub queued_for_sync: bool,
}

impl SubmitResult {
    /// The id to read this submission back with.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        self.id.as_deref().or(self.fallback_id.as_deref())
    }

    #[must_use]
    pub fn stored_remote(&self) -> bool {
        self.remote.success
    }

    #[must_use]
    pub fn stored_local(&self) -> bool {
        self.local.as_ref().map(|l| l.success).unwrap_or(false)
    }

    /// The JSON object handed back to the ingestion caller.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({"success": false, "error": format!("cannot encode result: {}", e)})
        })
    }
}

/// Outcome of [`super::Vault::get_submission`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Submission),
    NotFound,
}

impl Lookup {
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    #[must_use]
    pub fn into_option(self) -> Option<Submission> {
        match self {
            Self::Found(sub) => Some(sub),
            Self::NotFound => None,
        }
    }
}
