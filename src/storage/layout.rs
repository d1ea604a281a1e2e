// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Naming conventions shared by both tiers.

/// File extension for stored submissions (both tiers).
pub const SUBMISSION_EXT: &str = "json";

/// File name for a submission id.
#[must_use]
pub fn file_name(id: &str) -> String {
    format!("{}.{}", id, SUBMISSION_EXT)
}

/// Submission id for a stored file name, if it carries the submission extension.
#[must_use]
pub fn id_from_file_name(name: &str) -> Option<&str> {
    name.strip_suffix(".json").filter(|id| !id.is_empty())
}

/// Remote path construction rooted at a single backup folder.
///
/// ```
/// use webhook_vault::storage::layout::RemoteLayout;
///
/// let layout = RemoteLayout::new("/WebhookBackup/");
/// assert_eq!(layout.sender_folder("acme"), "/WebhookBackup/acme");
/// assert_eq!(layout.object_path("acme", "42"), "/WebhookBackup/acme/42.json");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    root: String,
}

impl RemoteLayout {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let trimmed = root.trim_end_matches('/');
        // An empty root addresses the store's top level, children become "/{sender}".
        let root = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    #[must_use]
    pub fn sender_folder(&self, sender: &str) -> String {
        format!("{}/{}", self.root, sender)
    }

    #[must_use]
    pub fn object_path(&self, sender: &str, id: &str) -> String {
        format!("{}/{}/{}", self.root, sender, file_name(id))
    }
}
