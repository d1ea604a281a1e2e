// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

pub mod traits;
pub mod layout;
pub mod local;
pub mod memory;
pub mod dropbox;
pub mod guarded;

use sha2::{Digest, Sha256};

/// Hex SHA-256 of a document's bytes.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Transfer verification: same length and same SHA-256.
#[must_use]
pub fn same_content(actual: &[u8], expected: &[u8]) -> bool {
    actual.len() == expected.len() && Sha256::digest(actual) == Sha256::digest(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_content() {
        assert!(same_content(b"{\"a\":1}", b"{\"a\":1}"));
        assert!(!same_content(b"{\"a\":1}", b"{\"a\":2}"));
        assert!(!same_content(b"{}", b"{ }"));
    }

    #[test]
    fn test_content_hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
