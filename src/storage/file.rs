//! Single-file JSON backend.
//!
//! The whole namespace lives in one JSON object on disk, loaded on first use
//! and rewritten after every mutation. Writes go to a sibling temp file that is
//! renamed over the original, so a crash never leaves a half-written file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::traits::{StorageBackend, StorageError};

pub struct JsonFileStorage {
    path: PathBuf,
    /// Loaded lazily; `None` until the first operation.
    entries: Mutex<Option<BTreeMap<String, Value>>>,
}

impl JsonFileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, Value>, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Storage file absent, starting empty");
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Ok(BTreeMap::new());
        }
        let entries: BTreeMap<String, Value> =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                location: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        info!(path = %self.path.display(), entries = entries.len(), "Storage file loaded");
        Ok(entries)
    }

    async fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec(entries).map_err(|e| StorageError::Backend(e.to_string()))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "Storage file written");
        Ok(())
    }

    /// Run `f` against a copy of the loaded map and persist it if it reports
    /// a change. The copy replaces the loaded map only once it is on disk, so
    /// a failed write leaves both untouched and a retry sees the same change.
    async fn mutate<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, Value>) -> bool + Send,
    {
        let mut guard = self.entries.lock().await;
        let mut next = match guard.as_ref() {
            Some(entries) => entries.clone(),
            None => self.load().await?,
        };
        if f(&mut next) {
            self.persist(&next).await?;
        }
        *guard = Some(next);
        Ok(())
    }

    async fn read<R, F>(&self, f: F) -> Result<R, StorageError>
    where
        F: FnOnce(&BTreeMap<String, Value>) -> R + Send,
    {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        match guard.as_ref() {
            Some(entries) => Ok(f(entries)),
            None => Ok(f(&BTreeMap::new())),
        }
    }
}

#[async_trait]
impl StorageBackend for JsonFileStorage {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError> {
        self.read(|entries| entries.keys().cloned().collect()).await
    }

    async fn get_item(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.read(|entries| entries.get(key).cloned()).await
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let key = key.to_string();
        self.mutate(move |entries| {
            entries.insert(key, value);
            true
        })
        .await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.mutate(|entries| entries.remove(key).is_some()).await
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<(String, Option<Value>)>, StorageError> {
        self.read(|entries| {
            keys.iter()
                .map(|key| (key.clone(), entries.get(key).cloned()))
                .collect()
        })
        .await
    }

    async fn multi_set(&self, items: Vec<(String, Value)>) -> Result<(), StorageError> {
        if items.is_empty() {
            return Ok(());
        }
        self.mutate(move |entries| {
            entries.extend(items);
            true
        })
        .await
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        self.mutate(|entries| {
            let before = entries.len();
            for key in keys {
                entries.remove(key);
            }
            entries.len() != before
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStorage::new(dir.path().join("absent.json"));

        assert!(store.get_all_keys().await.unwrap().is_empty());
        assert!(store.get_item("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileStorage::new(&path);
        store
            .multi_set(vec![
                ("a".to_string(), json!("\"one\"")),
                ("b".to_string(), json!({"n": 2})),
            ])
            .await
            .unwrap();
        store.remove_item("a").await.unwrap();
        drop(store);

        let reopened = JsonFileStorage::new(&path);
        assert_eq!(reopened.get_all_keys().await.unwrap(), vec!["b".to_string()]);
        assert_eq!(reopened.get_item("b").await.unwrap(), Some(json!({"n": 2})));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = JsonFileStorage::new(&path);
        let err = store.get_all_keys().await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_failed_write_is_retried_onto_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let tmp = dir.path().join("store.json.tmp");

        let store = JsonFileStorage::new(&path);
        store.set_item("a", json!("1")).await.unwrap();

        // a directory in the temp file's place makes the write fail
        tokio::fs::create_dir(&tmp).await.unwrap();
        let err = store.remove_item("a").await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert_eq!(store.get_all_keys().await.unwrap(), vec!["a".to_string()]);

        tokio::fs::remove_dir(&tmp).await.unwrap();
        store.remove_item("a").await.unwrap();
        drop(store);

        let reopened = JsonFileStorage::new(&path);
        assert!(reopened.get_all_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_bulk_remove_is_retried_onto_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let tmp = dir.path().join("store.json.tmp");

        let store = JsonFileStorage::new(&path);
        store
            .multi_set(vec![("a".to_string(), json!(1)), ("b".to_string(), json!(2))])
            .await
            .unwrap();

        tokio::fs::create_dir(&tmp).await.unwrap();
        let keys = vec!["a".to_string()];
        assert!(store.multi_remove(&keys).await.is_err());

        tokio::fs::remove_dir(&tmp).await.unwrap();
        store.multi_remove(&keys).await.unwrap();
        drop(store);

        let reopened = JsonFileStorage::new(&path);
        assert_eq!(reopened.get_all_keys().await.unwrap(), vec!["b".to_string()]);
    }
}
