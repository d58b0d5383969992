use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::traits::{StorageBackend, StorageError};

/// Process-local backend. Shared between caches by wrapping it in an `Arc`.
pub struct MemoryStorage {
    data: DashMap<String, Value>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current item count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Clear all items
    pub fn clear(&self) {
        self.data.clear();
    }

    /// Sorted copy of everything stored, raw keys and values.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.data.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn get_item(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.data.get(key).map(|r| r.value().clone()))
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.data.remove(key);
        Ok(())
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<(String, Option<Value>)>, StorageError> {
        Ok(keys
            .iter()
            .map(|key| (key.clone(), self.data.get(key).map(|r| r.value().clone())))
            .collect())
    }

    async fn multi_set(&self, items: Vec<(String, Value)>) -> Result<(), StorageError> {
        for (key, value) in items {
            self.data.insert(key, value);
        }
        Ok(())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            self.data.remove(key);
        }
        Ok(())
    }
}
