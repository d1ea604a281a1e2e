// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Path-segment hygiene for untrusted sender names and submission ids.
//!
//! Every sender and id reaches the filesystem and the remote store only
//! after passing through this module.

use crate::error::VaultError;

/// Upper bound for a single path segment.
pub const MAX_SEGMENT_LEN: usize = 128;

/// Reduce an untrusted sender name to a safe path segment.
///
/// ASCII letters, digits, `.`, `_` and `-` survive; whitespace becomes `_`;
/// everything else is dropped. Leading and trailing `.`/`_` are trimmed so
/// the result can never be `.`, `..` or a hidden file.
///
/// ```
/// use webhook_vault::sanitize::sanitize_sender;
///
/// assert_eq!(sanitize_sender("acme corp").unwrap(), "acme_corp");
/// assert_eq!(sanitize_sender("../../etc/passwd").unwrap(), "etcpasswd");
/// assert!(sanitize_sender("///").is_err());
/// ```
pub fn sanitize_sender(raw: &str) -> Result<String, VaultError> {
    let mut out = String::with_capacity(raw.len().min(MAX_SEGMENT_LEN));
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
        } else if ch.is_whitespace() {
            out.push('_');
        }
    }

    let is_edge = |c: char| c == '.' || c == '_';
    let clipped: String = out.trim_matches(is_edge).chars().take(MAX_SEGMENT_LEN).collect();
    let clipped = clipped.trim_end_matches(is_edge);
    if clipped.is_empty() {
        return Err(VaultError::InvalidSender(raw.to_string()));
    }
    Ok(clipped.to_string())
}

/// Whether `name` is already a canonical sender segment.
#[must_use]
pub fn is_canonical_sender(name: &str) -> bool {
    sanitize_sender(name).map(|s| s == name).unwrap_or(false)
}

/// Validate a submission id. Ids are never rewritten, only accepted or refused.
pub fn validate_id(id: &str) -> Result<(), VaultError> {
    let ok = !id.is_empty()
        && id.len() <= MAX_SEGMENT_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(VaultError::InvalidId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_sender_unchanged() {
        assert_eq!(sanitize_sender("acme").unwrap(), "acme");
        assert_eq!(sanitize_sender("acme-01.prod").unwrap(), "acme-01.prod");
    }

    #[test]
    fn test_whitespace_and_symbols() {
        assert_eq!(sanitize_sender("my sender!").unwrap(), "my_sender");
        assert_eq!(sanitize_sender("a/b\\c").unwrap(), "abc");
        assert_eq!(sanitize_sender("éclair").unwrap(), "clair");
    }

    #[test]
    fn test_ip_address_sender() {
        assert_eq!(sanitize_sender("192.168.1.20").unwrap(), "192.168.1.20");
        assert_eq!(sanitize_sender("::1").unwrap(), "1");
    }

    #[test]
    fn test_traversal_and_hidden_rejected() {
        assert_eq!(sanitize_sender("..").ok(), None);
        assert_eq!(sanitize_sender(".hidden").unwrap(), "hidden");
        assert_eq!(sanitize_sender("../x").unwrap(), "x");
        assert!(sanitize_sender("").is_err());
        assert!(sanitize_sender("   ").is_err());
    }

    #[test]
    fn test_length_is_clipped() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_sender(&long).unwrap().len(), MAX_SEGMENT_LEN);
    }

    #[test]
    fn test_canonical_sender() {
        assert!(is_canonical_sender("acme"));
        assert!(!is_canonical_sender("acme corp"));
        assert!(!is_canonical_sender(".."));
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("20261014093000123456").is_ok());
        assert!(validate_id("20261014093000123456_fallback").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("../secret").is_err());
        assert!(validate_id("a.json").is_err());
        assert!(validate_id(&"1".repeat(129)).is_err());
    }
}
