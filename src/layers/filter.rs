//! Predicate-based allow/deny listing.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use super::{Entry, Layer, LayerCapabilities};
use crate::error::CacheError;

type KeyPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Persists only keys accepted by the predicate. The same predicate drives
/// set, get, remove and check, so rejected keys are neither written, read back
/// nor deleted. It sees keys in storage form, i.e. after any layer configured
/// before it (the prefix layer comes first).
#[derive(Clone)]
pub struct FilterKeysLayer {
    predicate: KeyPredicate,
}

impl FilterKeysLayer {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Whitelist: only the listed keys are persisted.
    ///
    /// Keys are matched in storage form, so behind the default `cache` prefix
    /// list `cache.user`, not `user`.
    ///
    /// ```
    /// use cache_persist::{FilterKeysLayer, Layer};
    /// use serde_json::json;
    ///
    /// let layer = FilterKeysLayer::allow(["cache.user"]);
    /// assert!(layer.check("cache.user"));
    /// assert!(!layer.check("user"));
    /// assert!(layer.set("cache.session".into(), json!(1)).unwrap().is_none());
    /// ```
    pub fn allow<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: HashSet<String> = keys.into_iter().map(Into::into).collect();
        Self::new(move |key| keys.contains(key))
    }

    /// Blacklist: everything except the listed keys is persisted. Keys are
    /// matched in storage form, as for [`allow`](Self::allow).
    pub fn deny<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: HashSet<String> = keys.into_iter().map(Into::into).collect();
        Self::new(move |key| !keys.contains(key))
    }
}

impl std::fmt::Debug for FilterKeysLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterKeysLayer").finish_non_exhaustive()
    }
}

impl Layer for FilterKeysLayer {
    fn name(&self) -> &str {
        "filter-keys"
    }

    fn capabilities(&self) -> LayerCapabilities {
        LayerCapabilities::ALL
    }

    fn set(&self, key: String, value: Value) -> Result<Option<Entry>, CacheError> {
        Ok((self.predicate)(&key).then_some((key, value)))
    }

    fn get(&self, key: String, value: Value) -> Result<Option<Entry>, CacheError> {
        Ok((self.predicate)(&key).then_some((key, value)))
    }

    fn remove(&self, key: String) -> Result<Option<String>, CacheError> {
        Ok((self.predicate)(&key).then_some(key))
    }

    fn check(&self, key: &str) -> bool {
        (self.predicate)(key)
    }
}
