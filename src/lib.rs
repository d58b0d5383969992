//! # Cache Persist
//!
//! A write-back key/value cache with a pluggable persistence pipeline, plus an
//! offline-first mutation queue built on top of it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Cache                             │
//! │  • Authoritative in-memory map, synchronous get/set         │
//! │  • Hydration lifecycle (restore once, shared in-flight)     │
//! │  • Observers via subscribe/notify                           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ dirty keys
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Storage Proxy                         │
//! │  • WriteScheduler: debounce (wait) bounded by max_wait      │
//! │  • Flush reads the *current* value of each dirty key        │
//! │  • Layer pipeline: prefix → user layers → serialize         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ multi_remove + multi_set
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Storage Backend                        │
//! │  • MemoryStorage (DashMap), JsonFileStorage (atomic file)   │
//! │  • Anything implementing StorageBackend                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`offline`] queue persists pending operations in its own [`Cache`] and
//! replays them through an [`OfflineHandler`] when connectivity returns.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cache_persist::{Cache, CacheConfig, CacheOptions, JsonFileStorage};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = CacheOptions::new(CacheConfig {
//!         prefix: Some("todos".into()),
//!         ..Default::default()
//!     })
//!     .with_storage(Arc::new(JsonFileStorage::new("todos.json")));
//!
//!     let cache = Cache::new(options);
//!     cache.restore().await.expect("Failed to restore");
//!
//!     cache.set("todo1", json!({"title": "buy milk", "done": false}));
//!     cache.flush().await.expect("Failed to flush");
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cache`]: the [`Cache`] and its observer registry
//! - [`proxy`]: [`StorageProxy`] contract, persisting and no-op proxies
//! - [`batching`]: the debounced [`WriteScheduler`]
//! - [`layers`]: key/value transform [`Layer`]s and the [`Pipeline`]
//! - [`storage`]: [`StorageBackend`] contract and built-in backends
//! - [`offline`]: the [`OfflineFirst`] mutation queue
//! - [`config`]: serde configuration and runtime options

pub mod batching;
pub mod cache;
pub mod config;
pub mod error;
pub mod layers;
pub mod metrics;
pub mod offline;
pub mod proxy;
pub mod storage;

pub use batching::debounce::{DebounceConfig, FlushExecutor, SchedulerPhase, WriteScheduler};
pub use cache::{Cache, CacheState, Callback, DataCache, Subscription};
pub use config::{CacheConfig, CacheOptions, ErrorHandler, OfflineConfig, OfflineOptions};
pub use error::{CacheError, OfflineError};
pub use layers::{FilterKeysLayer, Layer, LayerCapabilities, Pipeline, PrefixLayer, SerializeLayer};
pub use metrics::LatencyTimer;
pub use offline::{ManualNetwork, NetworkStatus, OfflineFirst, OfflineHandler, OfflineRecord, Publish, RecordState};
pub use proxy::{NoStorageProxy, PersistProxy, StorageProxy};
pub use storage::{JsonFileStorage, MemoryStorage, StorageBackend, StorageError};
