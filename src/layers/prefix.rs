//! Namespace layer: lets several caches share one physical backend.

use serde_json::Value;

use super::{Entry, Layer, LayerCapabilities};
use crate::error::CacheError;

/// Delimiter between the namespace and the application key.
pub const PREFIX_DELIMITER: &str = ".";

/// Prepends `<prefix>.` on write/remove and strips it on read. Storage keys
/// without the prefix belong to someone else: `check` rejects them and `get`
/// vetoes them.
#[derive(Debug, Clone)]
pub struct PrefixLayer {
    namespace: String,
}

impl PrefixLayer {
    pub fn new(prefix: &str) -> Self {
        Self {
            namespace: format!("{}{}", prefix, PREFIX_DELIMITER),
        }
    }

    /// Full namespace including the delimiter.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Layer for PrefixLayer {
    fn name(&self) -> &str {
        "prefix"
    }

    fn capabilities(&self) -> LayerCapabilities {
        LayerCapabilities::ALL
    }

    fn set(&self, key: String, value: Value) -> Result<Option<Entry>, CacheError> {
        Ok(Some((format!("{}{}", self.namespace, key), value)))
    }

    fn get(&self, key: String, value: Value) -> Result<Option<Entry>, CacheError> {
        Ok(key
            .strip_prefix(self.namespace.as_str())
            .map(|stripped| (stripped.to_string(), value)))
    }

    fn remove(&self, key: String) -> Result<Option<String>, CacheError> {
        Ok(Some(format!("{}{}", self.namespace, key)))
    }

    fn check(&self, key: &str) -> bool {
        key.starts_with(self.namespace.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefix_round_trip() {
        let layer = PrefixLayer::new("cache");

        let (key, value) = layer.set("todo1".into(), json!(1)).unwrap().unwrap();
        assert_eq!(key, "cache.todo1");

        let (key, _) = layer.get(key, value).unwrap().unwrap();
        assert_eq!(key, "todo1");
        assert_eq!(layer.remove("todo1".into()).unwrap(), Some("cache.todo1".to_string()));
    }

    #[test]
    fn test_foreign_keys_are_rejected() {
        let layer = PrefixLayer::new("cache");

        assert!(layer.check("cache.a"));
        assert!(!layer.check("other.a"));
        // "cachex.a" shares the letters but not the namespace
        assert!(!layer.check("cachex.a"));
        assert!(layer.get("other.a".into(), json!(1)).unwrap().is_none());
    }
}
