//! Credential storage
//!
//! Credential storage itself is an external collaborator (OS keychains,
//! encrypted stores); this module defines the interface the OAuth client
//! talks to plus a plain JSON-file implementation that matches the on-disk
//! credential shape agent CLIs write, useful as a fallback and in tests.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::SourceError;

/// OAuth credentials for one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// OAuth access token
    pub access_token: String,
    /// OAuth refresh token
    pub refresh_token: String,
    /// Expiration time in milliseconds since epoch
    pub expires_at: Option<i64>,
}

/// Read/write access to stored credentials, keyed by service name
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read credentials for a service; `Ok(None)` when nothing is stored
    async fn read(&self, service: &str) -> Result<Option<Credentials>, SourceError>;

    /// Persist (replace) credentials for a service
    async fn write(&self, service: &str, credentials: &Credentials) -> Result<(), SourceError>;
}

// ============================================================================
// File-Backed Store
// ============================================================================

/// JSON-file credential store.
///
/// The file holds one object per service name with camelCase token fields,
/// e.g. `{"statbar": {"accessToken": "...", "refreshToken": "...",
/// "expiresAt": 1735000000000}}`.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Create a store backed by the given file path
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default credentials path under the home directory
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".statbar")
            .join("credentials.json")
    }

    fn load_all(&self) -> Result<HashMap<String, Credentials>, SourceError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let parsed: HashMap<String, Credentials> = serde_json::from_str(&content)?;
        Ok(parsed)
    }

    fn store_all(&self, all: &HashMap<String, Credentials>) -> Result<(), SourceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(all)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn read(&self, service: &str) -> Result<Option<Credentials>, SourceError> {
        let all = self.load_all()?;
        Ok(all.get(service).cloned())
    }

    async fn write(&self, service: &str, credentials: &Credentials) -> Result<(), SourceError> {
        let mut all = self.load_all()?;
        all.insert(service.to_string(), credentials.clone());
        self.store_all(&all)
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// In-memory credential store for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct pre-seeded with one service entry
    pub fn with_entry(service: &str, credentials: Credentials) -> Self {
        let mut entries = HashMap::new();
        entries.insert(service.to_string(), credentials);
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn read(&self, service: &str) -> Result<Option<Credentials>, SourceError> {
        Ok(self.entries.read().await.get(service).cloned())
    }

    async fn write(&self, service: &str, credentials: &Credentials) -> Result<(), SourceError> {
        self.entries
            .write()
            .await
            .insert(service.to_string(), credentials.clone());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_credentials() -> Credentials {
        Credentials {
            access_token: "access_123".to_string(),
            refresh_token: "refresh_456".to_string(),
            expires_at: Some(1_735_000_000_000),
        }
    }

    #[test]
    fn test_credentials_camel_case_serde() {
        let json = r#"{
            "accessToken": "access_123",
            "refreshToken": "refresh_456",
            "expiresAt": 1735000000000
        }"#;

        let creds: Credentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds, sample_credentials());

        let round = serde_json::to_string(&creds).unwrap();
        assert!(round.contains("accessToken"));
        assert!(round.contains("refreshToken"));
    }

    #[test]
    fn test_credentials_missing_expiry() {
        let json = r#"{"accessToken": "a", "refreshToken": "r", "expiresAt": null}"#;
        let creds: Credentials = serde_json::from_str(json).unwrap();
        assert!(creds.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));

        assert!(store.read("statbar").await.unwrap().is_none());

        store.write("statbar", &sample_credentials()).await.unwrap();
        let loaded = store.read("statbar").await.unwrap().unwrap();
        assert_eq!(loaded, sample_credentials());

        // Unknown service stays empty
        assert!(store.read("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));

        store.write("statbar", &sample_credentials()).await.unwrap();

        let rotated = Credentials {
            access_token: "access_new".to_string(),
            refresh_token: "refresh_new".to_string(),
            expires_at: None,
        };
        store.write("statbar", &rotated).await.unwrap();

        let loaded = store.read("statbar").await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "access_new");
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileCredentialStore::new(path);
        let err = store.read("statbar").await.unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryCredentialStore::new();
        assert!(store.read("statbar").await.unwrap().is_none());

        store.write("statbar", &sample_credentials()).await.unwrap();
        let loaded = store.read("statbar").await.unwrap().unwrap();
        assert_eq!(loaded.refresh_token, "refresh_456");
    }
}
