// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! [`RemoteStore`] over the Dropbox HTTP API.
//!
//! Authentication uses the OAuth refresh-token flow. The access token is
//! cached and refreshed once when a call comes back 401; a second 401 is
//! an [`StorageError::Auth`] failure.
//!
//! Error mapping:
//! - 409 with `not_found` in the summary: `NotFound`
//! - 429, 5xx, connect and timeout failures: `Transient`
//! - 401 after a refresh, 400/401 from the token endpoint: `Auth`
//! - any other 4xx: `Permanent`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::traits::{RemoteEntry, RemoteStore, StorageError, WriteAck};
use crate::config::DropboxCredentials;

pub const TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";
pub const API_BASE: &str = "https://api.dropboxapi.com/2";
pub const CONTENT_BASE: &str = "https://content.dropboxapi.com/2";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    entries: Vec<DropboxEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct DropboxEntry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    server_modified: Option<DateTime<Utc>>,
}

impl DropboxEntry {
    /// Deleted entries carry no object; they are dropped from listings.
    fn into_remote_entry(self) -> Option<RemoteEntry> {
        let is_folder = match self.tag.as_str() {
            "folder" => true,
            "file" => false,
            _ => return None,
        };
        Some(RemoteEntry {
            name: self.name,
            is_folder,
            size: self.size,
            modified: self.server_modified,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    path_display: Option<String>,
    size: u64,
    #[serde(default)]
    rev: Option<String>,
}

/// Endpoint roots, overridable for a proxy or a local fake.
#[derive(Debug, Clone)]
pub struct DropboxEndpoints {
    pub token_url: String,
    pub api_base: String,
    pub content_base: String,
}

impl Default for DropboxEndpoints {
    fn default() -> Self {
        Self {
            token_url: TOKEN_URL.to_string(),
            api_base: API_BASE.to_string(),
            content_base: CONTENT_BASE.to_string(),
        }
    }
}

pub struct DropboxRemote {
    client: Client,
    credentials: DropboxCredentials,
    endpoints: DropboxEndpoints,
    token: RwLock<Option<String>>,
}

impl DropboxRemote {
    pub fn new(credentials: DropboxCredentials) -> Result<Self, StorageError> {
        Self::with_endpoints(credentials, DropboxEndpoints::default())
    }

    pub fn with_endpoints(credentials: DropboxCredentials, endpoints: DropboxEndpoints) -> Result<Self, StorageError> {
        let client = Client::builder()
            .user_agent(concat!("webhook-vault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StorageError::Permanent(format!("cannot build HTTP client: {}", e)))?;
        let token = credentials.access_token.clone().filter(|t| !t.trim().is_empty());
        Ok(Self {
            client,
            credentials,
            endpoints,
            token: RwLock::new(token),
        })
    }

    async fn refresh_token(&self) -> Result<String, StorageError> {
        let response = self
            .client
            .post(&self.endpoints.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("client_id", self.credentials.app_key.as_str()),
                ("client_secret", self.credentials.app_secret.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                    StorageError::Auth(format!("token refresh rejected: {}", summary(&body)))
                }
                other => classify(other, &body),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Auth(format!("malformed token response: {}", e)))?;
        *self.token.write() = Some(token.access_token.clone());
        info!("Refreshed Dropbox access token");
        Ok(token.access_token)
    }

    async fn access_token(&self) -> Result<String, StorageError> {
        let cached = self.token.read().clone();
        if let Some(token) = cached {
            return Ok(token);
        }
        self.refresh_token().await
    }

    /// Send a request built by `build`, refreshing the token once on 401.
    async fn send<F>(&self, build: F) -> Result<Response, StorageError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.access_token().await?;
        let response = build(&token).send().await.map_err(transport_error)?;
        let response = if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Access token rejected, refreshing");
            let token = self.refresh_token().await?;
            build(&token).send().await.map_err(transport_error)?
        } else {
            response
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            *self.token.write() = None;
            return Err(StorageError::Auth(summary(&body)));
        }
        Err(classify(status, &body))
    }

    async fn rpc(&self, endpoint: &str, arg: serde_json::Value) -> Result<Response, StorageError> {
        let url = format!("{}/{}", self.endpoints.api_base, endpoint);
        self.send(|token| self.client.post(&url).bearer_auth(token).json(&arg))
            .await
    }
}

/// Dropbox addresses its top level as "" rather than "/".
fn api_path(path: &str) -> &str {
    if path == "/" { "" } else { path }
}

fn summary(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error_summary").and_then(|s| s.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

fn classify(status: StatusCode, body: &str) -> StorageError {
    let summary = summary(body);
    if status == StatusCode::CONFLICT && summary.contains("not_found") {
        StorageError::NotFound
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StorageError::Transient(format!("HTTP {}: {}", status.as_u16(), summary))
    } else if status == StatusCode::UNAUTHORIZED {
        StorageError::Auth(summary)
    } else {
        StorageError::Permanent(format!("HTTP {}: {}", status.as_u16(), summary))
    }
}

fn transport_error(err: reqwest::Error) -> StorageError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        StorageError::Transient(err.to_string())
    } else {
        StorageError::Permanent(err.to_string())
    }
}

#[async_trait]
impl RemoteStore for DropboxRemote {
    async fn authenticate(&self) -> Result<(), StorageError> {
        self.rpc("users/get_current_account", serde_json::Value::Null).await?;
        Ok(())
    }

    async fn ensure_folder(&self, path: &str) -> Result<bool, StorageError> {
        let arg = json!({"path": api_path(path), "autorename": false});
        match self.rpc("files/create_folder_v2", arg).await {
            Ok(_) => {
                info!(path, "Created remote folder");
                Ok(true)
            }
            // path/conflict/folder: already there
            Err(StorageError::Permanent(msg)) if msg.contains("conflict") => Ok(true),
            Err(e) => Err(e),
        }
    }

    async fn list_folder(&self, path: &str) -> Result<Vec<RemoteEntry>, StorageError> {
        let mut page: ListFolderResponse = self
            .rpc("files/list_folder", json!({"path": api_path(path), "recursive": false}))
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Permanent(format!("malformed list_folder response: {}", e)))?;

        let mut entries: Vec<RemoteEntry> = page
            .entries
            .drain(..)
            .filter_map(DropboxEntry::into_remote_entry)
            .collect();

        while page.has_more {
            page = self
                .rpc("files/list_folder/continue", json!({"cursor": page.cursor}))
                .await?
                .json()
                .await
                .map_err(|e| StorageError::Permanent(format!("malformed list_folder response: {}", e)))?;
            entries.extend(page.entries.drain(..).filter_map(DropboxEntry::into_remote_entry));
        }
        debug!(path, count = entries.len(), "Listed remote folder");
        Ok(entries)
    }

    async fn read_object(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let url = format!("{}/files/download", self.endpoints.content_base);
        let arg = json!({"path": path}).to_string();
        let response = self
            .send(|token| {
                self.client
                    .post(&url)
                    .bearer_auth(token)
                    .header("Dropbox-API-Arg", arg.as_str())
            })
            .await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }

    async fn write_object(&self, path: &str, bytes: &[u8]) -> Result<WriteAck, StorageError> {
        let url = format!("{}/files/upload", self.endpoints.content_base);
        let arg = json!({"path": path, "mode": "overwrite", "mute": true}).to_string();
        let response = self
            .send(|token| {
                self.client
                    .post(&url)
                    .bearer_auth(token)
                    .header("Dropbox-API-Arg", arg.as_str())
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(bytes.to_vec())
            })
            .await?;
        let ack: UploadResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Permanent(format!("malformed upload response: {}", e)))?;
        if ack.size != bytes.len() as u64 {
            warn!(path, sent = bytes.len(), stored = ack.size, "Upload size mismatch");
        }
        Ok(WriteAck {
            path: ack.path_display.unwrap_or_else(|| path.to_string()),
            size: ack.size,
            revision: ack.rev,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        let body = r#"{"error_summary": "path/not_found/..", "error": {".tag": "path"}}"#;
        assert!(classify(StatusCode::CONFLICT, body).is_not_found());
    }

    #[test]
    fn test_classify_retryable() {
        assert!(classify(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(classify(StatusCode::SERVICE_UNAVAILABLE, "down").is_transient());
        assert!(!classify(StatusCode::BAD_REQUEST, "bad").is_transient());
    }

    #[test]
    fn test_classify_conflict_is_permanent() {
        let body = r#"{"error_summary": "path/conflict/folder/.."}"#;
        let err = classify(StatusCode::CONFLICT, body);
        assert!(matches!(err, StorageError::Permanent(ref m) if m.contains("conflict")));
    }

    #[test]
    fn test_list_folder_response_parsing() {
        let body = r#"{
            "entries": [
                {".tag": "folder", "name": "acme", "id": "id:1"},
                {".tag": "file", "name": "1.json", "size": 42, "server_modified": "2025-01-01T12:00:00Z"},
                {".tag": "deleted", "name": "gone.json"}
            ],
            "cursor": "abc",
            "has_more": false
        }"#;
        let page: ListFolderResponse = serde_json::from_str(body).unwrap();
        let entries: Vec<_> = page.entries.into_iter().filter_map(DropboxEntry::into_remote_entry).collect();

        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_folder);
        assert_eq!(entries[1].size, 42);
        assert!(entries[1].modified.is_some());
    }

    #[test]
    fn test_api_path_root() {
        assert_eq!(api_path("/"), "");
        assert_eq!(api_path(""), "");
        assert_eq!(api_path("/WebhookBackup"), "/WebhookBackup");
    }

    #[test]
    fn test_preissued_token_is_cached() {
        let remote = DropboxRemote::new(DropboxCredentials {
            app_key: "k".into(),
            app_secret: "s".into(),
            refresh_token: "r".into(),
            access_token: Some("tok".into()),
        })
        .unwrap();
        assert_eq!(remote.token.read().as_deref(), Some("tok"));
    }
}
