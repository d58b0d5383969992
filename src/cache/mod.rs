// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The write-back cache.
//!
//! Memory is authoritative: reads and writes are synchronous and never touch
//! storage. Every write marks its key dirty with the [`StorageProxy`], which
//! persists the final in-memory value in debounced batches.
//!
//! # Lifecycle
//!
//! ```text
//!   Unhydrated ──restore()──► Restoring ──storage read ok──► Hydrated
//!        ▲                        │
//!        └──── read failed ───────┘   (a later restore() may retry)
//! ```
//!
//! # Example
//!
//! ```
//! use cache_persist::{Cache, CacheOptions};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), cache_persist::CacheError> {
//! let cache = Cache::new(CacheOptions::default());
//! cache.restore().await?;
//!
//! cache.set("todo1", json!("buy milk"));
//! assert_eq!(cache.get("todo1"), Some(json!("buy milk")));
//!
//! // Durability checkpoint
//! cache.flush().await?;
//! # Ok(())
//! # }
//! ```

pub mod subscription;
pub mod types;

pub use subscription::{Callback, Subscribers, Subscription};
pub use types::{CacheState, DataCache};

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, warn};

use crate::config::CacheOptions;
use crate::error::CacheError;
use crate::proxy::{NoStorageProxy, PersistProxy, StorageProxy};

/// In-memory key/value state persisted in the background.
pub struct Cache {
    data: Arc<RwLock<DataCache>>,
    proxy: Arc<dyn StorageProxy>,
    state_tx: watch::Sender<CacheState>,
    state_rx: watch::Receiver<CacheState>,
    restored: OnceCell<()>,
    subscribers: Subscribers<DataCache>,
}

impl Cache {
    /// Build a cache. Nothing is read until [`restore`](Self::restore).
    pub fn new(options: CacheOptions) -> Self {
        let data = Arc::new(RwLock::new(DataCache::new()));
        let proxy: Arc<dyn StorageProxy> = if options.config.disable_persist {
            Arc::new(NoStorageProxy)
        } else {
            Arc::new(PersistProxy::new(&options, Arc::clone(&data)))
        };
        let (state_tx, state_rx) = watch::channel(CacheState::Unhydrated);

        Self {
            data,
            proxy,
            state_tx,
            state_rx,
            restored: OnceCell::new(),
            subscribers: Subscribers::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Load persisted state into memory, replacing whatever is there.
    ///
    /// Runs once: concurrent callers wait for the same read and later calls
    /// return immediately. A failed read leaves the cache unhydrated so the
    /// caller can try again.
    #[tracing::instrument(skip(self), fields(storage = self.proxy.name()))]
    pub async fn restore(&self) -> Result<(), CacheError> {
        self.restored
            .get_or_try_init(|| async {
                self.set_state(CacheState::Restoring);
                match self.proxy.restore().await {
                    Ok(restored) => {
                        debug!(entries = restored.len(), "Cache hydrated");
                        *self.data.write() = restored;
                        self.set_state(CacheState::Hydrated);
                        Ok(())
                    }
                    Err(e) => {
                        warn!(error = %e, "Cache restore failed");
                        self.set_state(CacheState::Unhydrated);
                        Err(e)
                    }
                }
            })
            .await
            .map(|_| ())
    }

    #[must_use]
    pub fn is_rehydrated(&self) -> bool {
        self.restored.initialized()
    }

    #[must_use]
    pub fn state(&self) -> CacheState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch hydration state changes
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<CacheState> {
        self.state_rx.clone()
    }

    fn set_state(&self, state: CacheState) {
        self.state_tx.send_replace(state);
    }

    /// Name of the backend behind this cache (`"none"` when persistence is
    /// disabled).
    #[must_use]
    pub fn storage_name(&self) -> &str {
        self.proxy.name()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// True for tombstones too.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Copy of the whole map.
    #[must_use]
    pub fn get_state(&self) -> DataCache {
        self.data.read().clone()
    }

    #[must_use]
    pub fn get_all_keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════

    pub fn set(&self, key: &str, value: Value) {
        self.data.write().insert(key.to_string(), value);
        self.proxy.set_item(key);
    }

    /// Drop `key` from memory and, eventually, from storage.
    pub fn remove(&self, key: &str) {
        self.data.write().remove(key);
        self.proxy.remove_item(key);
    }

    /// Keep `key` as a `null` tombstone. Use [`remove`](Self::remove) to make
    /// it absent.
    pub fn delete(&self, key: &str) {
        self.set(key, Value::Null);
    }

    /// Empty memory and remove this cache's keys from storage. Returns `false`
    /// if storage could not be purged; memory is emptied either way.
    pub async fn purge(&self) -> bool {
        self.data.write().clear();
        self.proxy.purge().await
    }

    /// Alias of [`purge`](Self::purge).
    pub async fn clear(&self) -> bool {
        self.purge().await
    }

    /// Swap the whole map and rewrite storage to match.
    pub async fn replace(&self, data: DataCache) -> Result<(), CacheError> {
        *self.data.write() = data.clone();
        self.proxy.replace(&data).await
    }

    /// Write every pending change now. Resolves when storage acknowledged.
    pub async fn flush(&self) -> Result<(), CacheError> {
        self.proxy.flush().await.map_err(CacheError::StorageWrite)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Observers
    // ═══════════════════════════════════════════════════════════════════════

    /// Register an observer. Registering the same `Arc` twice is a no-op.
    pub fn subscribe(&self, callback: Callback<DataCache>) -> Subscription {
        self.subscribers.subscribe(callback)
    }

    /// Call every observer synchronously, in registration order, with `state`
    /// or a snapshot of the current map.
    pub fn notify(&self, state: Option<&DataCache>, message: Option<&str>) {
        match state {
            Some(state) => self.subscribers.notify(state, message),
            None => {
                let snapshot = self.get_state();
                self.subscribers.notify(&snapshot, message);
            }
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("storage", &self.proxy.name())
            .field("state", &self.state())
            .field("entries", &self.data.read().len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::storage::{MemoryStorage, StorageBackend};
    use parking_lot::Mutex;
    use serde_json::json;

    fn cache_on(storage: Arc<MemoryStorage>) -> Cache {
        Cache::new(CacheOptions::default().with_storage(storage))
    }

    #[tokio::test]
    async fn test_get_set_remove_delete() {
        let cache = Cache::new(CacheOptions::default());

        assert_eq!(cache.get("a"), None);
        cache.set("a", json!(1));
        cache.set("a", json!(2));
        assert_eq!(cache.get("a"), Some(json!(2)));

        cache.delete("a");
        assert!(cache.has("a"));
        assert_eq!(cache.get("a"), Some(Value::Null));

        cache.remove("a");
        assert!(!cache.has("a"));
        assert!(cache.get_all_keys().is_empty());
    }

    #[tokio::test]
    async fn test_get_state_is_a_copy() {
        let cache = Cache::new(CacheOptions::default());
        cache.set("a", json!(1));

        let mut snapshot = cache.get_state();
        snapshot.insert("b".into(), json!(2));
        assert!(!cache.has("b"));
    }

    #[tokio::test]
    async fn test_restore_runs_once() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("cache.a", json!("1")).await.unwrap();

        let cache = cache_on(storage.clone());
        assert_eq!(cache.state(), CacheState::Unhydrated);
        assert!(!cache.is_rehydrated());

        let (a, b) = tokio::join!(cache.restore(), cache.restore());
        a.unwrap();
        b.unwrap();
        assert_eq!(cache.state(), CacheState::Hydrated);
        assert_eq!(cache.get("a"), Some(json!(1)));

        // later writes to storage are not picked up again
        storage.set_item("cache.b", json!("2")).await.unwrap();
        cache.restore().await.unwrap();
        assert!(!cache.has("b"));
    }

    #[tokio::test]
    async fn test_purge_empties_memory_and_namespace() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("cache.a", json!("1")).await.unwrap();
        storage.set_item("elsewhere", json!("1")).await.unwrap();

        let cache = cache_on(storage.clone());
        cache.restore().await.unwrap();
        assert!(cache.clear().await);

        assert!(cache.get_all_keys().is_empty());
        assert_eq!(storage.snapshot().keys().collect::<Vec<_>>(), vec!["elsewhere"]);
    }

    #[tokio::test]
    async fn test_replace_swaps_memory_and_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = cache_on(storage.clone());
        cache.set("old", json!(1));
        cache.flush().await.unwrap();

        cache.replace(DataCache::from([("new".to_string(), json!(true))])).await.unwrap();
        assert_eq!(cache.get_all_keys(), vec!["new"]);
        assert_eq!(storage.snapshot().keys().collect::<Vec<_>>(), vec!["cache.new"]);
    }

    #[tokio::test]
    async fn test_disable_persist_never_writes() {
        let storage = Arc::new(MemoryStorage::new());
        let mut options = CacheOptions::new(CacheConfig {
            disable_persist: true,
            ..Default::default()
        });
        options.storage = Some(storage.clone());
        let cache = Cache::new(options);

        cache.restore().await.unwrap();
        cache.set("a", json!(1));
        cache.flush().await.unwrap();

        assert!(storage.is_empty());
        assert_eq!(cache.storage_name(), "none");
        assert!(cache.is_rehydrated());
    }

    #[tokio::test]
    async fn test_notify_uses_snapshot_or_explicit_state() {
        let cache = Cache::new(CacheOptions::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let sub = cache.subscribe(Arc::new(move |state: &DataCache, message: Option<&str>| {
            sink.lock().push((state.len(), message.map(str::to_string)));
        }));

        cache.set("a", json!(1));
        cache.notify(None, None);
        cache.notify(Some(&DataCache::new()), Some("reset"));

        sub.unsubscribe();
        cache.notify(None, None);

        assert_eq!(*seen.lock(), vec![(1, None), (0, Some("reset".to_string()))]);
    }
}
