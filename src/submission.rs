// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Submission data model.
//!
//! On both tiers a submission is one pretty-printed JSON document: the
//! caller's object, minus its top-level `sender` and `title`, plus a
//! reserved `_meta` envelope. Readers never see the reserved keys.
//!
//! ```text
//! {
//!   "data": { "x": 1 },
//!   "_meta": {
//!     "id": "20250101120000000001",
//!     "sender": "acme",
//!     "title": "Order",
//!     "timestamp": "2025-01-01T12:00:00.000001Z",
//!     "source": "10.0.0.7",
//!     "fallback": false
//!   }
//! }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::VaultError;

/// Envelope key injected at ingestion.
pub const META_KEY: &str = "_meta";
/// Bookkeeping key some older documents carry; stripped like `_meta`.
pub const SYNC_KEY: &str = "_sync";
/// Title used when the caller sent none.
pub const DEFAULT_TITLE: &str = "Untitled";
/// Title shown for a document whose bytes do not parse.
pub const CORRUPTED_TITLE: &str = "Corrupted Data";

const FALLBACK_SUFFIX: &str = "_fallback";

/// Which tier a record was read from. Set at read time, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

/// Ingestion metadata stored under [`META_KEY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub fallback: bool,
}

/// Listing entry for one stored submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionMeta {
    pub id: String,
    pub sender: String,
    pub title: String,
    pub timestamp: Option<String>,
    pub size: u64,
    pub origin: Origin,
    pub corrupted: bool,
}

impl SubmissionMeta {
    /// Describe stored bytes. Bytes that are not a JSON object yield a
    /// corrupted entry rather than an error.
    #[must_use]
    pub fn from_bytes(sender: &str, id: &str, bytes: &[u8], origin: Origin) -> Self {
        match parse_object(bytes) {
            Some(doc) => Self {
                id: id.to_string(),
                sender: sender.to_string(),
                title: title_of(&doc),
                timestamp: timestamp_of(&doc),
                size: bytes.len() as u64,
                origin,
                corrupted: false,
            },
            None => Self::corrupted(sender, id, bytes.len() as u64, origin),
        }
    }

    #[must_use]
    pub fn corrupted(sender: &str, id: &str, size: u64, origin: Origin) -> Self {
        Self {
            id: id.to_string(),
            sender: sender.to_string(),
            title: CORRUPTED_TITLE.to_string(),
            timestamp: None,
            size,
            origin,
            corrupted: true,
        }
    }
}

/// A submission as returned to readers, reserved keys removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub id: String,
    pub sender: String,
    pub title: String,
    pub timestamp: Option<String>,
    pub payload: Value,
    pub origin: Origin,
    /// True when this copy was written by the fallback path
    pub fallback: bool,
}

impl Submission {
    /// Parse stored bytes. `None` means the bytes are corrupted.
    #[must_use]
    pub fn from_bytes(sender: &str, id: &str, bytes: &[u8], origin: Origin) -> Option<Self> {
        let doc = parse_object(bytes)?;
        Some(Self {
            id: id.to_string(),
            sender: sender.to_string(),
            title: title_of(&doc),
            timestamp: timestamp_of(&doc),
            fallback: meta_field(&doc, "fallback").and_then(Value::as_bool).unwrap_or(false),
            payload: strip_reserved(Value::Object(doc)),
            origin,
        })
    }
}

/// Whether bytes parse as a stored submission document.
#[must_use]
pub fn is_well_formed(bytes: &[u8]) -> bool {
    parse_object(bytes).is_some()
}

fn parse_object(bytes: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

// Envelope fields are read one by one: documents written before `id` and
// `sender` were added carry only `{timestamp, title, ip}` or
// `{timestamp, title, direct_to_dropbox}`.
fn meta_field<'a>(doc: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    doc.get(META_KEY).and_then(|meta| meta.get(key))
}

fn text_field(doc: &Map<String, Value>, key: &str) -> Option<String> {
    meta_field(doc, key)
        .and_then(Value::as_str)
        .or_else(|| doc.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

fn title_of(doc: &Map<String, Value>) -> String {
    text_field(doc, "title").unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

fn timestamp_of(doc: &Map<String, Value>) -> Option<String> {
    text_field(doc, "timestamp")
}

/// Remove the reserved keys from a document.
#[must_use]
pub fn strip_reserved(mut doc: Value) -> Value {
    if let Value::Object(map) = &mut doc {
        map.remove(META_KEY);
        map.remove(SYNC_KEY);
    }
    doc
}

/// Build the stored document: caller payload minus `sender`/`title`, plus the envelope.
pub fn build_document(payload: &Map<String, Value>, envelope: &Envelope) -> Result<Value, VaultError> {
    let mut doc = payload.clone();
    doc.remove("sender");
    doc.remove("title");
    doc.remove(SYNC_KEY);
    let meta = serde_json::to_value(envelope)
        .map_err(|e| VaultError::InvalidPayload(format!("cannot encode envelope: {}", e)))?;
    doc.insert(META_KEY.to_string(), meta);
    Ok(Value::Object(doc))
}

/// Pretty-printed bytes of a document.
pub fn encode_document(doc: &Value) -> Result<Vec<u8>, VaultError> {
    serde_json::to_vec_pretty(doc)
        .map_err(|e| VaultError::InvalidPayload(format!("cannot encode document: {}", e)))
}

/// Fallback id for a normal id.
#[must_use]
pub fn fallback_id(id: &str) -> String {
    format!("{}{}", id, FALLBACK_SUFFIX)
}

#[must_use]
pub fn is_fallback_id(id: &str) -> bool {
    id.ends_with(FALLBACK_SUFFIX)
}

/// A freshly issued id and the instant it encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedId {
    pub id: String,
    pub at: DateTime<Utc>,
}

impl IssuedId {
    /// ISO-8601 timestamp for the envelope.
    #[must_use]
    pub fn timestamp(&self) -> String {
        self.at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// Time-based ids, strictly increasing per sender.
///
/// Ids are `YYYYMMDDHHMMSS` plus six digits of microseconds (UTC). When the
/// clock has not moved past the last id issued for a sender, the last
/// value plus one microsecond is used, so concurrent submissions never collide.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: DashMap<String, i64>,
}

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, sender: &str) -> IssuedId {
        self.next_at(sender, Utc::now())
    }

    fn next_at(&self, sender: &str, now: DateTime<Utc>) -> IssuedId {
        let now_us = now.timestamp_micros();
        let micros = {
            let mut last = self.last.entry(sender.to_string()).or_insert(i64::MIN);
            let next = if now_us > *last { now_us } else { *last + 1 };
            *last = next;
            next
        };
        let at = DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or(now);
        IssuedId {
            id: at.format("%Y%m%d%H%M%S%6f").to_string(),
            at,
        }
    }
}
