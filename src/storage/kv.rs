//! Key-value storage backends.
//!
//! [`MemoryStore`] plays the role of tab-scoped storage: it lives as long
//! as the process and can be given a byte quota. [`FileStore`] is the
//! durable store, one JSON file per key with atomic writes.
//!
//! ```
//! use lecture_tutor::storage::MemoryStore;
//!
//! let store = MemoryStore::new();
//! let shared = store.clone();
//! assert!(format!("{shared:?}").contains("MemoryStore"));
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::TutorError;

/// Async string key-value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, TutorError>;

    /// Write (overwrite) a value.
    async fn set(&self, key: &str, value: &str) -> Result<(), TutorError>;

    /// Remove a key. Removing an absent key is `Ok(())`.
    async fn remove(&self, key: &str) -> Result<(), TutorError>;

    /// Remove every key.
    async fn clear(&self) -> Result<(), TutorError>;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<String>, TutorError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), TutorError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), TutorError> {
        (**self).remove(key).await
    }

    async fn clear(&self) -> Result<(), TutorError> {
        (**self).clear().await
    }
}

/// In-memory store, cheaply cloneable; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    /// Create an empty store without a quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that rejects writes once keys plus values
    /// would exceed `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Arc::default(),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, TutorError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), TutorError> {
        let mut entries = self.entries.write().await;
        if let Some(quota) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(TutorError::Storage(format!(
                    "quota exceeded writing {key}: {needed} > {quota} bytes"
                )));
            }
        }
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), TutorError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), TutorError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// Durable store: `{data_dir}/{key}.json`, written atomically
/// (temp file, fsync, rename).
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `data_dir`, creating the directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, TutorError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|e| {
            TutorError::Storage(format!(
                "failed to create storage directory {}: {e}",
                data_dir.display()
            ))
        })?;
        Ok(Self { data_dir })
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, TutorError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(TutorError::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.data_dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, TutorError> {
        let path = self.key_path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TutorError::Storage(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), TutorError> {
        let path = self.key_path(key)?;
        let tmp_path = self.data_dir.join(format!(".{key}.tmp"));
        std::fs::write(&tmp_path, value.as_bytes()).map_err(|e| {
            TutorError::Storage(format!(
                "failed to write temp file {}: {e}",
                tmp_path.display()
            ))
        })?;

        if let Ok(file) = std::fs::File::open(&tmp_path) {
            let _ = file.sync_all();
        }

        std::fs::rename(&tmp_path, &path).map_err(|e| {
            TutorError::Storage(format!(
                "failed to rename temp file to {}: {e}",
                path.display()
            ))
        })
    }

    async fn remove(&self, key: &str) -> Result<(), TutorError> {
        let path = self.key_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TutorError::Storage(format!(
                "failed to delete {}: {e}",
                path.display()
            ))),
        }
    }

    async fn clear(&self) -> Result<(), TutorError> {
        let entries = std::fs::read_dir(&self.data_dir).map_err(|e| {
            TutorError::Storage(format!(
                "failed to read storage directory {}: {e}",
                self.data_dir.display()
            ))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                std::fs::remove_file(&path).map_err(|e| {
                    TutorError::Storage(format!("failed to delete {}: {e}", path.display()))
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("k").await.unwrap().is_none());
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.remove("k").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn memory_store_clones_share_entries() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set("k", "v").await.unwrap();
        assert_eq!(other.get("k").await.unwrap().as_deref(), Some("v"));
        other.clear().await.unwrap();
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn memory_store_quota_rejects_oversized_write() {
        let store = MemoryStore::with_quota(10);
        store.set("k", "1234").await.unwrap();
        match store.set("k2", "123456789").await {
            Err(TutorError::Storage(msg)) => assert!(msg.contains("quota exceeded")),
            other => unreachable!("expected quota error, got {other:?}"),
        }
        // Overwriting the same key only counts the new value.
        store.set("k", "12345678").await.unwrap();
    }

    #[tokio::test]
    async fn file_store_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store")).unwrap();

        store.set("preferences", "{\"a\":1}").await.unwrap();
        assert_eq!(
            store.get("preferences").await.unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        assert!(store.data_dir().join("preferences.json").exists());

        store.set("other", "x").await.unwrap();
        store.clear().await.unwrap();
        assert!(store.get("preferences").await.unwrap().is_none());
        assert!(store.get("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.remove("missing").await.unwrap();
    }

    #[tokio::test]
    async fn file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert!(store.set("../escape", "x").await.is_err());
        assert!(store.get("").await.is_err());
    }

    #[test]
    fn store_is_object_safe() {
        fn _takes_arc_store(_store: Arc<dyn KeyValueStore>) {}
    }
}
