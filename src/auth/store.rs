//! Durable session persistence.
//!
//! [`SessionStore`] owns exactly one slot: the [`SessionEnvelope`] under a
//! fixed key, on top of any [`KeyValueStore`] backend. Every write replaces
//! the whole envelope.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use super::error::{AuthError, StorageError};
use super::types::SessionEnvelope;

/// Key under which the session envelope is stored by default.
pub const DEFAULT_SESSION_KEY: &str = "sensorsp-user";

/// Device-local string blob storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Overwrites any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Succeeds when the key is already absent.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// One file per key inside a data directory.
///
/// Writes go to a sibling temp file that is fsynced and renamed over the
/// target, so readers see either the old value or the new one.
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

/// Keys become file names; anything outside `[A-Za-z0-9._-]` is replaced.
fn file_stem(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        format!("_{stem}")
    } else {
        stem
    }
}

async fn write_then_rename(tmp: &Path, target: &Path, value: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(value.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp, target).await
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let target = self.path_for(key);
        let tmp = target.with_extension("json.tmp");
        let written = write_then_rename(&tmp, &target, value).await;
        if written.is_err() {
            if let Err(e) = tokio::fs::remove_file(&tmp).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %tmp.display(), "Failed to remove temp session file: {e}");
                }
            }
        }
        written.map_err(StorageError::from)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store, for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Typed access to the single session slot.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn with_default_key(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::new(backend, DEFAULT_SESSION_KEY)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn save(&self, envelope: &SessionEnvelope) -> Result<(), AuthError> {
        let encoded = serde_json::to_string(envelope).map_err(|e| AuthError::Storage {
            message: format!("could not encode session: {e}"),
        })?;
        self.backend.set(&self.key, &encoded).await?;
        Ok(())
    }

    /// `Ok(None)` when nothing (or only whitespace) is stored;
    /// `CorruptSession` when something is stored but does not decode.
    pub async fn load(&self) -> Result<Option<SessionEnvelope>, AuthError> {
        let Some(raw) = self.backend.get(&self.key).await? else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| AuthError::CorruptSession {
                reason: e.to_string(),
            })
    }

    pub async fn clear(&self) -> Result<(), AuthError> {
        self.backend.remove(&self.key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::ErrorKind;
    use crate::auth::types::User;
    use tempfile::TempDir;

    fn envelope(token: Option<&str>, message: &str) -> SessionEnvelope {
        SessionEnvelope {
            user: User {
                id: "1".into(),
                username: "a".into(),
                email: "a@b.com".into(),
                created_at: "2024-05-01T10:00:00Z".into(),
                token: None,
            },
            token: token.map(str::to_string),
            message: message.into(),
        }
    }

    fn file_store() -> (TempDir, Arc<FileKeyValueStore>, SessionStore) {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(FileKeyValueStore::new(tmp.path().join("session")));
        let store = SessionStore::with_default_key(backend.clone());
        (tmp, backend, store)
    }

    #[tokio::test]
    async fn save_then_load_returns_same_envelope() {
        let (_tmp, _backend, store) = file_store();
        for e in [
            envelope(Some("jwt1"), "Login successful"),
            envelope(None, ""),
            envelope(Some("ünïcødé"), "Registro exitoso ✅"),
        ] {
            store.save(&e).await.unwrap();
            assert_eq!(store.load().await.unwrap(), Some(e));
        }
    }

    #[tokio::test]
    async fn load_missing_is_none() {
        let (_tmp, _backend, store) = file_store();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let (_tmp, _backend, store) = file_store();
        store.clear().await.unwrap();
        store.save(&envelope(None, "ok")).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn truncated_json_is_corrupt() {
        let (_tmp, backend, store) = file_store();
        backend
            .set(DEFAULT_SESSION_KEY, r#"{"user":{"id":"1","usern"#)
            .await
            .unwrap();
        let err = store.load().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptSession);
    }

    #[tokio::test]
    async fn envelope_without_user_is_corrupt() {
        let (_tmp, backend, store) = file_store();
        backend
            .set(DEFAULT_SESSION_KEY, r#"{"token":"jwt","message":"hi"}"#)
            .await
            .unwrap();
        assert_eq!(store.load().await.unwrap_err().kind(), ErrorKind::CorruptSession);
    }

    #[tokio::test]
    async fn blank_value_is_treated_as_absent() {
        let (_tmp, backend, store) = file_store();
        backend.set(DEFAULT_SESSION_KEY, "  \n").await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_leaves_no_temp_file_behind() {
        let (_tmp, backend, store) = file_store();
        store.save(&envelope(Some("t"), "ok")).await.unwrap();
        let names: Vec<String> = std::fs::read_dir(backend.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["sensorsp-user.json".to_string()]);
    }

    #[tokio::test]
    async fn failed_rename_cleans_up_temp_file() {
        let tmp = TempDir::new().unwrap();
        let backend = FileKeyValueStore::new(tmp.path());
        // A non-empty directory at the target path makes the rename fail.
        let target = tmp.path().join("sensorsp-user.json");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), "x").unwrap();

        assert!(backend.set(DEFAULT_SESSION_KEY, "{}").await.is_err());
        assert!(!tmp.path().join("sensorsp-user.json.tmp").exists());
        assert!(target.join("keep").exists());
    }

    #[tokio::test]
    async fn persisted_json_matches_wire_shape() {
        let (_tmp, backend, store) = file_store();
        store.save(&envelope(Some("jwt1"), "ok")).await.unwrap();
        let raw = backend.get(DEFAULT_SESSION_KEY).await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["user"]["createdAt"], "2024-05-01T10:00:00Z");
        assert!(json["user"].get("token").is_none());
        assert_eq!(json["token"], "jwt1");
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = SessionStore::new(Arc::new(MemoryKeyValueStore::new()), "custom-key");
        assert_eq!(store.key(), "custom-key");
        let e = envelope(Some("jwt"), "ok");
        store.save(&e).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(e));
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[test]
    fn file_stem_sanitizes_keys() {
        assert_eq!(file_stem("sensorsp-user"), "sensorsp-user");
        assert_eq!(file_stem("../etc/passwd"), ".._etc_passwd");
        assert_eq!(file_stem(""), "_");
        assert_eq!(file_stem(".."), "_..");
    }
}
