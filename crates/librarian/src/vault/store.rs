//! Persisted delegated-credential records.
//!
//! The store holds one [`UserCredential`] per user, keyed by the stable
//! subject id the identity layer supplies. Token fields are ciphertext
//! produced by [`super::cipher::TokenCipher`]; plaintext never reaches this
//! module. Updates are all-or-nothing: a record is replaced wholesale and
//! the backing file is written atomically (temp file, then rename).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("credential store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file or a record could not be (de)serialized.
    #[error("credential store serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A previous writer panicked while holding the lock.
    #[error("credential store lock poisoned")]
    Poisoned,
}

/// One user's delegated credential, as persisted.
///
/// Only ciphertext is stored for token values. The record is mutated in two
/// places: the vault rewrites the token fields on refresh, and the
/// root-folder selection rewrites `root_folder_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserCredential {
    /// Stable external subject id.
    pub user_id: String,
    /// Sealed access token (base64 over nonce + ciphertext).
    pub encrypted_access_token: String,
    /// Sealed refresh token; absent until the user completes offline consent.
    pub encrypted_refresh_token: Option<String>,
    /// When the current access token expires; `None` forces a refresh on
    /// first use.
    pub access_token_expires_at: Option<SystemTime>,
    /// Folder chosen as the library root; `None` until the user sets it.
    pub root_folder_id: Option<String>,
}

/// Read/update access to credential records.
///
/// `update` replaces the whole record for its user id; implementations must
/// not expose partially-written records.
pub trait CredentialStore: Send + Sync {
    /// Fetch the record for a user, if one exists.
    fn get(&self, user_id: &str) -> Result<Option<UserCredential>, StoreError>;

    /// Insert or replace the record for `credential.user_id`.
    fn update(&self, credential: &UserCredential) -> Result<(), StoreError>;
}

/// Wrapper for serializing the credential file.
#[derive(Debug, Serialize, Deserialize)]
struct CredentialFileData {
    /// Version of the file format (for future migrations).
    version: u32,
    credentials: Vec<UserCredential>,
}

impl Default for CredentialFileData {
    fn default() -> Self {
        Self {
            version: 1,
            credentials: Vec::new(),
        }
    }
}

/// JSON-file-backed credential store.
///
/// Suitable for single-process deployments and tests; production setups
/// swap in a database-backed implementation of [`CredentialStore`].
pub struct JsonCredentialStore {
    path: PathBuf,
    records: RwLock<HashMap<String, UserCredential>>,
}

impl JsonCredentialStore {
    /// Open a store backed by the given path, loading existing records.
    ///
    /// A missing file starts the store empty; an unreadable or unparsable
    /// file is an error rather than silent data loss.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut records = HashMap::new();

        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let data: CredentialFileData = serde_json::from_str(&contents)?;
            for credential in data.credentials {
                records.insert(credential.user_id.clone(), credential);
            }
            tracing::debug!(count = records.len(), path = %path.display(), "loaded credential records");
        } else {
            tracing::debug!(path = %path.display(), "credential file not found, starting empty");
        }

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole map to disk atomically. Called with the write lock
    /// held so concurrent updates serialize.
    fn persist(&self, records: &HashMap<String, UserCredential>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = CredentialFileData {
            version: 1,
            credentials: records.values().cloned().collect(),
        };
        let contents = serde_json::to_string_pretty(&data)?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &contents)?;
        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }
}

impl CredentialStore for JsonCredentialStore {
    fn get(&self, user_id: &str) -> Result<Option<UserCredential>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(user_id).cloned())
    }

    fn update(&self, credential: &UserCredential) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        records.insert(credential.user_id.clone(), credential.clone());
        self.persist(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample(user_id: &str) -> UserCredential {
        UserCredential {
            user_id: user_id.to_string(),
            encrypted_access_token: "sealed-at".to_string(),
            encrypted_refresh_token: Some("sealed-rt".to_string()),
            access_token_expires_at: Some(SystemTime::now() + Duration::from_secs(3600)),
            root_folder_id: None,
        }
    }

    #[test]
    fn test_open_missing_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonCredentialStore::open(temp_dir.path().join("creds.json")).unwrap();
        assert!(store.get("alice").unwrap().is_none());
    }

    #[test]
    fn test_update_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonCredentialStore::open(temp_dir.path().join("creds.json")).unwrap();

        store.update(&sample("alice")).unwrap();
        let loaded = store.get("alice").unwrap().unwrap();
        assert_eq!(loaded.user_id, "alice");
        assert_eq!(loaded.encrypted_access_token, "sealed-at");
    }

    #[test]
    fn test_update_replaces_whole_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonCredentialStore::open(temp_dir.path().join("creds.json")).unwrap();

        store.update(&sample("alice")).unwrap();

        let mut changed = sample("alice");
        changed.encrypted_access_token = "sealed-at-2".to_string();
        changed.root_folder_id = Some("root-1".to_string());
        store.update(&changed).unwrap();

        let loaded = store.get("alice").unwrap().unwrap();
        assert_eq!(loaded.encrypted_access_token, "sealed-at-2");
        assert_eq!(loaded.root_folder_id.as_deref(), Some("root-1"));
    }

    #[test]
    fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("creds.json");

        {
            let store = JsonCredentialStore::open(&path).unwrap();
            store.update(&sample("alice")).unwrap();
            store.update(&sample("bob")).unwrap();
        }

        let reopened = JsonCredentialStore::open(&path).unwrap();
        assert!(reopened.get("alice").unwrap().is_some());
        assert!(reopened.get("bob").unwrap().is_some());
        assert!(reopened.get("carol").unwrap().is_none());
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("creds.json");
        let store = JsonCredentialStore::open(&path).unwrap();
        store.update(&sample("alice")).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("creds.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            JsonCredentialStore::open(&path),
            Err(StoreError::Serialize(_))
        ));
    }
}
