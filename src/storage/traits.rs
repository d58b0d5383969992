use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failure reported by a storage backend.
///
/// Cloneable so one flush outcome can be handed to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Storage I/O error: {0}")]
    Io(String),
    #[error("Corrupt storage data at '{location}': {message}")]
    Corrupt {
        location: String,
        message: String,
    },
    /// A layer failed while encoding a dirty key for a flush.
    #[error("Failed to encode '{key}' for storage: {message}")]
    Encode {
        key: String,
        message: String,
    },
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// Abstract key/value backend the storage proxy persists into.
///
/// Only the single-key methods and `get_all_keys` are required. The bulk
/// variants fall back to sequential single-key calls; backends that can batch
/// natively should override them, the proxy always calls the bulk forms.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Human-readable backend name, used in logs.
    fn name(&self) -> &str {
        "storage"
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError>;
    async fn get_item(&self, key: &str) -> Result<Option<Value>, StorageError>;
    async fn set_item(&self, key: &str, value: Value) -> Result<(), StorageError>;
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Read many keys at once. Missing keys come back as `None`.
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<(String, Option<Value>)>, StorageError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let value = self.get_item(key).await?;
            out.push((key.clone(), value));
        }
        Ok(out)
    }

    async fn multi_set(&self, items: Vec<(String, Value)>) -> Result<(), StorageError> {
        for (key, value) in items {
            self.set_item(&key, value).await?;
        }
        Ok(())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            self.remove_item(key).await?;
        }
        Ok(())
    }
}
