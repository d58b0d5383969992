// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage proxy: the only component that talks to a storage backend.
//!
//! The proxy owns the layer [`Pipeline`] and the [`WriteScheduler`]. Writes
//! from the cache never touch storage directly: they mark a key dirty and
//! return. The scheduler later hands the drained keys to the flush executor,
//! which looks up the current in-memory value of each key.
//!
//! ```text
//!   Cache::set ──► proxy.set_item(key) ──► scheduler.push(key)
//!                                              │ (debounced)
//!                                              ▼
//!                       memory ──► pipeline.apply_set ──► multi_remove + multi_set
//! ```
//!
//! [`NoStorageProxy`] satisfies the same contract without any I/O and is used
//! when persistence is disabled.

pub mod flush;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::batching::debounce::{SchedulerPhase, WriteScheduler};
use crate::cache::DataCache;
use crate::config::CacheOptions;
use crate::error::CacheError;
use crate::layers::Pipeline;
use crate::storage::traits::{StorageBackend, StorageError};
use crate::storage::MemoryStorage;

use flush::{ProxyWriter, WriteGate};

/// Contract between a [`Cache`](crate::cache::Cache) and its persistence.
#[async_trait]
pub trait StorageProxy: Send + Sync {
    /// Backend name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Read everything this cache owns from storage, decoded.
    async fn restore(&self) -> Result<DataCache, CacheError>;

    /// Schedule persistence of `key`'s current value. Never blocks.
    fn set_item(&self, key: &str);

    /// Schedule deletion of `key` from storage. Never blocks.
    fn remove_item(&self, key: &str);

    /// Drain dirty keys now; resolves once storage acknowledged them.
    async fn flush(&self) -> Result<(), StorageError>;

    /// Remove every key of this cache's namespace. Never fails: a backend
    /// error yields `false`.
    async fn purge(&self) -> bool;

    /// Purge, then write `data` as the complete new content.
    async fn replace(&self, data: &DataCache) -> Result<(), CacheError>;
}

/// Proxy persisting into a [`StorageBackend`] through the layer pipeline.
pub struct PersistProxy {
    backend: Arc<dyn StorageBackend>,
    pipeline: Pipeline,
    scheduler: WriteScheduler,
    gate: WriteGate,
}

impl PersistProxy {
    /// Build from resolved options. `data` is the cache's live map; flushes
    /// read current values from it.
    pub fn new(options: &CacheOptions, data: Arc<RwLock<DataCache>>) -> Self {
        let backend: Arc<dyn StorageBackend> = match &options.storage {
            Some(storage) => Arc::clone(storage),
            None => Arc::new(MemoryStorage::new()),
        };
        let pipeline = Pipeline::from_options(options);
        let gate = WriteGate::default();
        let writer = ProxyWriter {
            backend: Arc::clone(&backend),
            pipeline: pipeline.clone(),
            data,
            gate: Arc::clone(&gate),
        };
        let scheduler = WriteScheduler::new(
            options.config.debounce(),
            Arc::new(writer),
            options.error_handling.clone(),
        );

        debug!(backend = backend.name(), layers = ?pipeline.set_layer_names(), "Storage proxy created");
        Self {
            backend,
            pipeline,
            scheduler,
            gate,
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[must_use]
    pub fn scheduler_phase(&self) -> SchedulerPhase {
        self.scheduler.phase()
    }

    /// Storage keys owned by this cache.
    async fn owned_keys(&self) -> Result<Vec<String>, StorageError> {
        let keys = self.backend.get_all_keys().await?;
        Ok(keys.into_iter().filter(|key| self.pipeline.apply_check(key)).collect())
    }

    /// Callers hold the write gate.
    async fn purge_owned(&self) -> Result<usize, StorageError> {
        let keys = self.owned_keys().await?;
        if !keys.is_empty() {
            self.backend.multi_remove(&keys).await?;
        }
        Ok(keys.len())
    }
}

#[async_trait]
impl StorageProxy for PersistProxy {
    fn name(&self) -> &str {
        self.backend.name()
    }

    #[tracing::instrument(skip_all)]
    async fn restore(&self) -> Result<DataCache, CacheError> {
        let _timer = crate::metrics::LatencyTimer::new(self.backend.name(), "restore");

        let read = async {
            let keys = self.owned_keys().await?;
            self.backend.multi_get(&keys).await
        }
        .await;
        let pairs = match read {
            Ok(pairs) => pairs,
            Err(e) => {
                crate::metrics::record_operation(self.backend.name(), "restore", "error");
                return Err(CacheError::StorageRead(e));
            }
        };

        let mut data = DataCache::new();
        for (key, value) in pairs {
            let Some(value) = value else { continue };
            if let Some((key, value)) = self.pipeline.apply_get(key, value)? {
                data.insert(key, value);
            }
        }

        crate::metrics::record_operation(self.backend.name(), "restore", "success");
        crate::metrics::set_restored_entries(data.len());
        info!(backend = self.backend.name(), entries = data.len(), "Restored cache from storage");
        Ok(data)
    }

    fn set_item(&self, key: &str) {
        self.scheduler.push(key);
    }

    fn remove_item(&self, key: &str) {
        self.scheduler.push(key);
    }

    async fn flush(&self) -> Result<(), StorageError> {
        self.scheduler.flush().await
    }

    #[tracing::instrument(skip_all)]
    async fn purge(&self) -> bool {
        let _gate = self.gate.lock().await;
        match self.purge_owned().await {
            Ok(removed) => {
                crate::metrics::record_operation(self.backend.name(), "purge", "success");
                debug!(removed, "Purged cache namespace");
                true
            }
            Err(e) => {
                crate::metrics::record_operation(self.backend.name(), "purge", "error");
                warn!(error = %e, "Purge failed");
                false
            }
        }
    }

    #[tracing::instrument(skip_all, fields(entries = data.len()))]
    async fn replace(&self, data: &DataCache) -> Result<(), CacheError> {
        let mut items = Vec::with_capacity(data.len());
        for (key, value) in data {
            if let Some(entry) = self.pipeline.apply_set(key.clone(), value.clone())? {
                items.push(entry);
            }
        }

        let _gate = self.gate.lock().await;
        let written = async {
            self.purge_owned().await?;
            if !items.is_empty() {
                self.backend.multi_set(items).await?;
            }
            Ok::<(), StorageError>(())
        }
        .await;

        match written {
            Ok(()) => {
                crate::metrics::record_operation(self.backend.name(), "replace", "success");
                Ok(())
            }
            Err(e) => {
                crate::metrics::record_operation(self.backend.name(), "replace", "error");
                Err(CacheError::StorageWrite(e))
            }
        }
    }
}

impl std::fmt::Debug for PersistProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistProxy")
            .field("backend", &self.backend.name())
            .field("pipeline", &self.pipeline)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// Proxy for `disable_persist`: everything succeeds, nothing is stored.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStorageProxy;

#[async_trait]
impl StorageProxy for NoStorageProxy {
    fn name(&self) -> &str {
        "none"
    }

    async fn restore(&self) -> Result<DataCache, CacheError> {
        Ok(DataCache::new())
    }

    fn set_item(&self, _key: &str) {}

    fn remove_item(&self, _key: &str) {}

    async fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn purge(&self) -> bool {
        true
    }

    async fn replace(&self, _data: &DataCache) -> Result<(), CacheError> {
        Ok(())
    }
}
