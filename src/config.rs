//! Configuration for caches and the offline queue.
//!
//! Plain settings live in serde-deserializable structs with defaults;
//! runtime pieces (layers, backend, error policy) are attached through
//! [`CacheOptions`] and resolved once when a cache is built.
//!
//! # Example
//!
//! ```
//! use cache_persist::config::{CacheConfig, CacheOptions};
//! use cache_persist::storage::MemoryStorage;
//! use std::sync::Arc;
//!
//! // Minimal config (uses defaults)
//! let config = CacheConfig::default();
//! assert_eq!(config.prefix.as_deref(), Some("cache"));
//! assert_eq!(config.throttle_ms, 200);
//!
//! // Raw mode against an explicit backend
//! let options = CacheOptions::new(CacheConfig {
//!     prefix: None,
//!     serialize: false,
//!     ..Default::default()
//! })
//! .with_storage(Arc::new(MemoryStorage::new()));
//! assert!(options.storage.is_some());
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::batching::debounce::DebounceConfig;
use crate::layers::Layer;
use crate::offline::NetworkStatus;
use crate::storage::traits::{StorageBackend, StorageError};

/// Decides what happens after a failed flush: `true` keeps the failed keys
/// queued for the next debounce cycle, `false` drops the batch.
pub type ErrorHandler = Arc<dyn Fn(&StorageError) -> bool + Send + Sync>;

/// Serializable cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Namespace prepended to storage keys; `None` or empty disables it
    #[serde(default = "default_prefix")]
    pub prefix: Option<String>,

    /// JSON-encode values before they reach storage
    #[serde(default = "default_serialize")]
    pub serialize: bool,

    /// Scheduler quiet period in milliseconds (default: 200)
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Longest a dirty key may wait for a flush (default: 600)
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Keep everything in memory and never touch storage
    #[serde(default)]
    pub disable_persist: bool,
}

fn default_prefix() -> Option<String> { Some("cache".to_string()) }
fn default_serialize() -> bool { true }
fn default_throttle_ms() -> u64 { 200 }
fn default_max_wait_ms() -> u64 { 600 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            serialize: default_serialize(),
            throttle_ms: default_throttle_ms(),
            max_wait_ms: default_max_wait_ms(),
            disable_persist: false,
        }
    }
}

impl CacheConfig {
    /// Scheduler timing derived from the throttle settings. `max_wait` never
    /// drops below `wait`.
    #[must_use]
    pub fn debounce(&self) -> DebounceConfig {
        let wait = Duration::from_millis(self.throttle_ms);
        DebounceConfig {
            wait,
            max_wait: Duration::from_millis(self.max_wait_ms).max(wait),
        }
    }
}

/// Everything needed to build a [`Cache`](crate::cache::Cache).
#[derive(Clone)]
pub struct CacheOptions {
    pub config: CacheConfig,
    /// Extra layers transforming keys, applied after the prefix
    pub mutate_keys: Vec<Arc<dyn Layer>>,
    /// Extra layers transforming values, applied before serialization
    pub mutate_values: Vec<Arc<dyn Layer>>,
    /// Backend override; a fresh in-memory backend when `None`
    pub storage: Option<Arc<dyn StorageBackend>>,
    /// Flush failure policy; always continue when `None`
    pub error_handling: Option<ErrorHandler>,
}

impl CacheOptions {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            mutate_keys: Vec::new(),
            mutate_values: Vec::new(),
            storage: None,
            error_handling: None,
        }
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_key_layer(mut self, layer: Arc<dyn Layer>) -> Self {
        self.mutate_keys.push(layer);
        self
    }

    #[must_use]
    pub fn with_value_layer(mut self, layer: Arc<dyn Layer>) -> Self {
        self.mutate_values.push(layer);
        self
    }

    #[must_use]
    pub fn with_error_handling<F>(mut self, handler: F) -> Self
    where
        F: Fn(&StorageError) -> bool + Send + Sync + 'static,
    {
        self.error_handling = Some(Arc::new(handler));
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOptions")
            .field("config", &self.config)
            .field("mutate_keys", &self.mutate_keys.len())
            .field("mutate_values", &self.mutate_values.len())
            .field("storage", &self.storage.as_ref().map(|s| s.name().to_string()))
            .field("error_handling", &self.error_handling.is_some())
            .finish()
    }
}

/// Serializable offline queue settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OfflineConfig {
    /// Never process automatically on reconnect or hydrate
    #[serde(default)]
    pub manual_execution: bool,

    /// Namespace of the queue's own persisted cache
    #[serde(default = "default_offline_prefix")]
    pub prefix: Option<String>,
}

fn default_offline_prefix() -> Option<String> { Some("offline-first".to_string()) }

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            manual_execution: false,
            prefix: default_offline_prefix(),
        }
    }
}

/// Everything needed to build an [`OfflineFirst`](crate::offline::OfflineFirst) queue.
#[derive(Clone, Default)]
pub struct OfflineOptions {
    pub config: OfflineConfig,
    /// Backend for the queue's own cache; in-memory when `None`
    pub storage: Option<Arc<dyn StorageBackend>>,
    /// Connectivity source; the queue assumes it is online when `None`
    pub network: Option<Arc<dyn NetworkStatus>>,
    /// Flush failure policy for the queue's cache
    pub error_handling: Option<ErrorHandler>,
}

impl OfflineOptions {
    pub fn new(config: OfflineConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_network(mut self, network: Arc<dyn NetworkStatus>) -> Self {
        self.network = Some(network);
        self
    }

    #[must_use]
    pub fn with_error_handling<F>(mut self, handler: F) -> Self
    where
        F: Fn(&StorageError) -> bool + Send + Sync + 'static,
    {
        self.error_handling = Some(Arc::new(handler));
        self
    }

    /// Options for the queue's backing cache: records are stored JSON-encoded
    /// under the queue prefix.
    #[must_use]
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            config: CacheConfig {
                prefix: self.config.prefix.clone(),
                serialize: true,
                ..Default::default()
            },
            mutate_keys: Vec::new(),
            mutate_values: Vec::new(),
            storage: self.storage.clone(),
            error_handling: self.error_handling.clone(),
        }
    }
}

impl std::fmt::Debug for OfflineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineOptions")
            .field("config", &self.config)
            .field("storage", &self.storage.as_ref().map(|s| s.name().to_string()))
            .field("network", &self.network.is_some())
            .field("error_handling", &self.error_handling.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.prefix.as_deref(), Some("cache"));
        assert!(config.serialize);
        assert!(!config.disable_persist);

        let debounce = config.debounce();
        assert_eq!(debounce.wait, Duration::from_millis(200));
        assert_eq!(debounce.max_wait, Duration::from_millis(600));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: CacheConfig = serde_json::from_str(r#"{"prefix": "todos", "throttle_ms": 50}"#).unwrap();
        assert_eq!(config.prefix.as_deref(), Some("todos"));
        assert_eq!(config.throttle_ms, 50);
        assert_eq!(config.max_wait_ms, 600);
        assert!(config.serialize);

        let config: CacheConfig = serde_json::from_str(r#"{"prefix": null, "serialize": false}"#).unwrap();
        assert!(config.prefix.is_none());
        assert!(!config.serialize);
    }

    #[test]
    fn test_max_wait_never_below_wait() {
        let config = CacheConfig {
            throttle_ms: 500,
            max_wait_ms: 100,
            ..Default::default()
        };
        assert_eq!(config.debounce().max_wait, Duration::from_millis(500));
    }

    #[test]
    fn test_offline_config_defaults() {
        let config: OfflineConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.manual_execution);
        assert_eq!(config.prefix.as_deref(), Some("offline-first"));
    }

    #[test]
    fn test_offline_cache_options_always_serialize() {
        let options = OfflineOptions::new(OfflineConfig {
            manual_execution: true,
            prefix: Some("jobs".to_string()),
        });
        let cache = options.cache_options();
        assert_eq!(cache.config.prefix.as_deref(), Some("jobs"));
        assert!(cache.config.serialize);
        assert!(cache.storage.is_none());
    }
}
