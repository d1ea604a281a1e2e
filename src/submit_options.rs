// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-submission options for the ingestion path.
//!
//! The vault always tries the remote tier first. These options decide how
//! hard it tries, whether a copy lands locally, and how loud it is about it.
//!
//! # Example
//!
//! ```rust
//! use webhook_vault::SubmitOptions;
//!
//! // Default: verified upload, 3 retries, local mirror
//! let opts = SubmitOptions::default();
//! assert!(opts.verify_upload);
//!
//! // Fire-and-forget: single unverified attempt, no local mirror
//! let opts = SubmitOptions::default()
//!     .with_verify(false)
//!     .with_max_retries(0)
//!     .with_local_mirror(false);
//! assert_eq!(opts.max_retries, 0);
//! ```

use serde::Deserialize;

/// Options accepted by [`crate::Vault::submit`].
///
/// Deserializable so the host can pass the caller's options bag straight through.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubmitOptions {
    /// Re-read the uploaded object and compare length + SHA-256
    pub verify_upload: bool,
    /// Retries after the first remote attempt
    pub max_retries: usize,
    /// Mirror the uploaded bytes into the local tier
    pub sync_to_local: bool,
    /// Log every step at info level
    pub debug: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            verify_upload: true,
            max_retries: 3,
            sync_to_local: true,
            debug: false,
        }
    }
}

impl SubmitOptions {
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify_upload = verify;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn with_local_mirror(mut self, mirror: bool) -> Self {
        self.sync_to_local = mirror;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}
