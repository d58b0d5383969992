//! Error types for the cache and the offline queue.
//!
//! Backend failures are [`StorageError`]; everything the cache surfaces wraps
//! them in [`CacheError`] so callers can tell a failed hydration from a failed
//! flush. Layer failures are never caught inside the pipeline.

use thiserror::Error;

use crate::storage::traits::StorageError;

#[derive(Error, Debug)]
pub enum CacheError {
    /// Enumerating or reading the backend failed during restore.
    #[error("failed to read from storage: {0}")]
    StorageRead(#[source] StorageError),

    /// A scheduled or forced flush failed to write/remove.
    #[error("failed to write to storage: {0}")]
    StorageWrite(#[source] StorageError),

    /// JSON encode/decode failure inside the serialize layer.
    #[error("serialization failed for key '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A custom layer refused to transform a key/value.
    #[error("layer '{layer}' failed on key '{key}': {message}")]
    Layer {
        layer: String,
        key: String,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum OfflineError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The caller-supplied `execute` hook failed for a record.
    #[error("execution of record '{id}' failed: {message}")]
    Execution { id: String, message: String },

    /// A persisted record could not be (de)serialized.
    #[error("record '{id}' could not be encoded: {source}")]
    Record {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl OfflineError {
    /// Convenience for `execute` implementations.
    pub fn execution(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            id: id.into(),
            message: message.into(),
        }
    }
}
