//! Shared backend wrappers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use cache_persist::{MemoryStorage, StorageBackend, StorageError};

// =============================================================================
// Recording Storage - observe bulk calls issued by flushes
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    MultiSet(Vec<(String, Value)>),
    MultiRemove(Vec<String>),
}

/// Memory backend that logs every bulk write/remove.
pub struct RecordingStorage {
    pub inner: MemoryStorage,
    calls: Mutex<Vec<Call>>,
}

impl RecordingStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStorage::new(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn sets(&self) -> Vec<Vec<(String, Value)>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::MultiSet(items) => Some(items),
                Call::MultiRemove(_) => None,
            })
            .collect()
    }

    pub fn removes(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::MultiRemove(keys) => Some(keys),
                Call::MultiSet(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl StorageBackend for RecordingStorage {
    fn name(&self) -> &str {
        "recording"
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.get_all_keys().await
    }

    async fn get_item(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_item(key).await
    }

    async fn multi_set(&self, items: Vec<(String, Value)>) -> Result<(), StorageError> {
        self.calls.lock().push(Call::MultiSet(items.clone()));
        self.inner.multi_set(items).await
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        self.calls.lock().push(Call::MultiRemove(keys.to_vec()));
        self.inner.multi_remove(keys).await
    }
}

// =============================================================================
// Failing Storage - switchable error injection
// =============================================================================

/// Memory backend whose reads and writes can be made to fail on demand.
pub struct FailingStorage {
    pub inner: MemoryStorage,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    write_attempts: AtomicU64,
    error_msg: String,
}

impl FailingStorage {
    pub fn new(error_msg: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStorage::new(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            write_attempts: AtomicU64::new(0),
            error_msg: error_msg.to_string(),
        })
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of bulk write/remove calls attempted, failed or not.
    pub fn write_attempts(&self) -> u64 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    fn maybe_fail_read(&self) -> Result<(), StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(StorageError::Backend(self.error_msg.clone()))
        } else {
            Ok(())
        }
    }

    fn maybe_fail_write(&self) -> Result<(), StorageError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StorageError::Backend(self.error_msg.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageBackend for FailingStorage {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError> {
        self.maybe_fail_read()?;
        self.inner.get_all_keys().await
    }

    async fn get_item(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.maybe_fail_read()?;
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.maybe_fail_write()?;
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.maybe_fail_write()?;
        self.inner.remove_item(key).await
    }

    async fn multi_set(&self, items: Vec<(String, Value)>) -> Result<(), StorageError> {
        self.maybe_fail_write()?;
        self.inner.multi_set(items).await
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        self.maybe_fail_write()?;
        self.inner.multi_remove(keys).await
    }
}

// =============================================================================
// Slow Storage - keep a flush in flight
// =============================================================================

/// Memory backend whose bulk writes touching a key ending in `suffix` take
/// `delay` to land.
pub struct SlowStorage {
    pub inner: MemoryStorage,
    suffix: String,
    delay: Duration,
}

impl SlowStorage {
    pub fn new(suffix: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStorage::new(),
            suffix: suffix.to_string(),
            delay,
        })
    }
}

#[async_trait]
impl StorageBackend for SlowStorage {
    fn name(&self) -> &str {
        "slow"
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.get_all_keys().await
    }

    async fn get_item(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_item(key).await
    }

    async fn multi_set(&self, items: Vec<(String, Value)>) -> Result<(), StorageError> {
        if items.iter().any(|(key, _)| key.ends_with(&self.suffix)) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.multi_set(items).await
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        self.inner.multi_remove(keys).await
    }
}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
