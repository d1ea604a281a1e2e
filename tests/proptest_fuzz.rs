//! Property-based tests (fuzzing) for vault input handling.
//!
//! Uses proptest to generate hostile sender names, ids and stored bytes and
//! verify the vault never panics and never lets a path escape its root.
//!
//! Run with: `cargo test --test proptest_fuzz`

use proptest::prelude::*;
use serde_json::{Map, Value};

use webhook_vault::coordinator::sort_listing;
use webhook_vault::sanitize::{is_canonical_sender, sanitize_sender, validate_id, MAX_SEGMENT_LEN};
use webhook_vault::submission::{build_document, encode_document, Envelope, IdGenerator};
use webhook_vault::{Origin, Submission, SubmissionMeta, SubmissionStore};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Sender names mixing safe characters, separators, traversal and unicode
fn hostile_sender_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        ".*",
        "[a-zA-Z0-9 ._/\\\\-]{0,200}",
        Just("..".to_string()),
        Just("../../etc/passwd".to_string()),
        Just(" \t\n".to_string()),
    ]
}

/// Arbitrary JSON values (including non-object documents)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,   // depth
        64,  // max nodes
        10,  // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
                prop::collection::hash_map(".*", inner, 0..10)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

fn payload_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::hash_map("[a-z_]{1,8}", arbitrary_json_strategy(), 0..8)
        .prop_map(|m| m.into_iter().collect())
}

fn meta_strategy() -> impl Strategy<Value = SubmissionMeta> {
    (
        "[0-9]{6}",
        prop::option::of(0i64..2_000_000_000),
        any::<bool>(),
    )
        .prop_map(|(id, secs, remote)| SubmissionMeta {
            id,
            sender: "acme".into(),
            title: "t".into(),
            timestamp: secs.and_then(|s| chrono::DateTime::from_timestamp(s, 0)).map(|t| t.to_rfc3339()),
            size: 0,
            origin: if remote { Origin::Remote } else { Origin::Local },
            corrupted: false,
        })
}

// =============================================================================
// Sanitization
// =============================================================================

proptest! {
    #[test]
    fn sanitized_sender_is_a_safe_segment(raw in hostile_sender_strategy()) {
        if let Ok(clean) = sanitize_sender(&raw) {
            prop_assert!(!clean.is_empty());
            prop_assert!(clean.len() <= MAX_SEGMENT_LEN);
            prop_assert!(clean.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
            prop_assert!(!clean.starts_with('.') && !clean.ends_with('.'));
            prop_assert!(clean != "..");
            prop_assert!(is_canonical_sender(&clean));
        }
    }

    #[test]
    fn sanitization_is_idempotent(raw in hostile_sender_strategy()) {
        if let Ok(once) = sanitize_sender(&raw) {
            prop_assert_eq!(sanitize_sender(&once).unwrap(), once);
        }
    }

    #[test]
    fn id_validation_matches_charset(id in ".{0,140}") {
        let expected = !id.is_empty()
            && id.len() <= MAX_SEGMENT_LEN
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        prop_assert_eq!(validate_id(&id).is_ok(), expected);
    }
}

// =============================================================================
// Documents and corruption
// =============================================================================

proptest! {
    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let meta = SubmissionMeta::from_bytes("acme", "1", &bytes, Origin::Local);
        let parsed = Submission::from_bytes("acme", "1", &bytes, Origin::Local);
        prop_assert_eq!(meta.corrupted, parsed.is_none());
        prop_assert_eq!(meta.size, bytes.len() as u64);
        if meta.corrupted {
            prop_assert_eq!(meta.title, "Corrupted Data");
        }
    }

    #[test]
    fn non_object_json_is_corrupted(value in arbitrary_json_strategy()) {
        let bytes = serde_json::to_vec(&value).unwrap();
        let meta = SubmissionMeta::from_bytes("acme", "1", &bytes, Origin::Remote);
        prop_assert_eq!(meta.corrupted, !value.is_object());
    }

    #[test]
    fn readers_never_see_reserved_keys(payload in payload_strategy(), title in prop::option::of("[a-zA-Z ]{0,12}")) {
        let envelope = Envelope {
            id: "20250101000000000000".into(),
            sender: "acme".into(),
            title: title.clone(),
            timestamp: "2025-01-01T00:00:00.000000Z".into(),
            source: None,
            fallback: false,
        };
        let bytes = encode_document(&build_document(&payload, &envelope).unwrap()).unwrap();
        let sub = Submission::from_bytes("acme", "20250101000000000000", &bytes, Origin::Local).unwrap();

        let mut expected = payload.clone();
        for key in ["sender", "title", "_meta", "_sync"] {
            expected.remove(key);
        }
        prop_assert_eq!(sub.payload, Value::Object(expected));
        prop_assert_eq!(sub.title, title.unwrap_or_else(|| "Untitled".into()));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn corrupted_files_never_abort_listing(
        files in prop::collection::btree_map("[0-9]{1,8}", prop::collection::vec(any::<u8>(), 0..64), 1..12)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = SubmissionStore::new(dir.path());

        let listed = rt.block_on(async {
            for (id, bytes) in &files {
                store.put("acme", id, bytes).await.unwrap();
            }
            store.list("acme").await.unwrap()
        });

        prop_assert_eq!(listed.len(), files.len());
        for meta in listed {
            let bytes = &files[&meta.id];
            prop_assert_eq!(meta.size, bytes.len() as u64);
            let is_object = matches!(serde_json::from_slice::<Value>(bytes), Ok(Value::Object(_)));
            prop_assert_eq!(meta.corrupted, !is_object);
        }
    }
}

// =============================================================================
// Ids and ordering
// =============================================================================

proptest! {
    #[test]
    fn ids_strictly_increase_per_sender(count in 1usize..200) {
        let ids = IdGenerator::new();
        let mut last = String::new();
        for _ in 0..count {
            let next = ids.next("acme");
            prop_assert!(next.id > last, "{} not after {}", next.id, last);
            prop_assert_eq!(next.id.len(), 20);
            prop_assert!(validate_id(&next.id).is_ok());
            last = next.id;
        }
    }

    #[test]
    fn listing_order_is_total_and_stable(mut entries in prop::collection::vec(meta_strategy(), 0..30)) {
        // Ids identify entries uniquely within a listing.
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries.dedup_by(|a, b| a.id == b.id);

        let mut forward = entries.clone();
        sort_listing(&mut forward);
        let mut backward: Vec<_> = entries.into_iter().rev().collect();
        sort_listing(&mut backward);
        prop_assert_eq!(&forward, &backward);

        // Timestamps never increase; entries without one come last.
        let first_none = forward.iter().position(|m| m.timestamp.is_none()).unwrap_or(forward.len());
        prop_assert!(forward[first_none..].iter().all(|m| m.timestamp.is_none()));
        for pair in forward[..first_none].windows(2) {
            prop_assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }
}

#[test]
fn sort_prefers_local_on_equal_timestamps() {
    let meta = |id: &str, origin| SubmissionMeta {
        id: id.into(),
        sender: "acme".into(),
        title: "t".into(),
        timestamp: Some("2025-01-01T00:00:00Z".into()),
        size: 0,
        origin,
        corrupted: false,
    };
    let mut entries = vec![meta("9", Origin::Remote), meta("1", Origin::Local)];
    sort_listing(&mut entries);
    assert_eq!(entries[0].origin, Origin::Local);
}
