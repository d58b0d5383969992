//! Public types for the cache.

use std::collections::BTreeMap;

use serde_json::Value;

/// The in-memory key/value map. Sorted so enumeration order is stable.
pub type DataCache = BTreeMap<String, Value>;

/// Hydration lifecycle.
///
/// Use [`super::Cache::state()`] to check the current state or
/// [`super::Cache::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Created, storage not read yet
    Unhydrated,
    /// `restore()` in flight
    Restoring,
    /// Storage content loaded (terminal)
    Hydrated,
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unhydrated => write!(f, "Unhydrated"),
            Self::Restoring => write!(f, "Restoring"),
            Self::Hydrated => write!(f, "Hydrated"),
        }
    }
}
