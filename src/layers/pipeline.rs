//! Capability-partitioned layer chain.

use std::sync::Arc;

use serde_json::Value;

use super::{Entry, Layer, PrefixLayer, SerializeLayer};
use crate::config::CacheOptions;
use crate::error::CacheError;

/// Layers split by capability. `gets` is stored in reverse configured order so
/// the last transform applied on write is the first undone on read.
#[derive(Clone, Default)]
pub struct Pipeline {
    sets: Vec<Arc<dyn Layer>>,
    gets: Vec<Arc<dyn Layer>>,
    removes: Vec<Arc<dyn Layer>>,
    checks: Vec<Arc<dyn Layer>>,
}

impl Pipeline {
    /// Partition `layers` (in configured order) by capability.
    pub fn new(layers: Vec<Arc<dyn Layer>>) -> Self {
        let mut pipeline = Self::default();
        for layer in &layers {
            let caps = layer.capabilities();
            if caps.set {
                pipeline.sets.push(layer.clone());
            }
            if caps.remove {
                pipeline.removes.push(layer.clone());
            }
            if caps.check {
                pipeline.checks.push(layer.clone());
            }
        }
        for layer in layers.iter().rev() {
            if layer.capabilities().get {
                pipeline.gets.push(layer.clone());
            }
        }
        pipeline
    }

    /// Build the chain for a cache: prefix first, then key layers, then value
    /// layers, serialization last (closest to storage).
    pub fn from_options(options: &CacheOptions) -> Self {
        let mut layers: Vec<Arc<dyn Layer>> = Vec::new();
        if let Some(prefix) = options.config.prefix.as_deref().filter(|p| !p.is_empty()) {
            layers.push(Arc::new(PrefixLayer::new(prefix)));
        }
        layers.extend(options.mutate_keys.iter().cloned());
        layers.extend(options.mutate_values.iter().cloned());
        if options.config.serialize {
            layers.push(Arc::new(SerializeLayer));
        }
        Self::new(layers)
    }

    /// True when keys and values pass through untouched (raw storage mode).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty() && self.gets.is_empty() && self.removes.is_empty() && self.checks.is_empty()
    }

    /// Names of the write-side layers, in application order.
    #[must_use]
    pub fn set_layer_names(&self) -> Vec<String> {
        self.sets.iter().map(|l| l.name().to_string()).collect()
    }

    pub fn apply_set(&self, key: String, value: Value) -> Result<Option<Entry>, CacheError> {
        let mut entry = (key, value);
        for layer in &self.sets {
            match layer.set(entry.0, entry.1)? {
                Some(next) => entry = next,
                None => return Ok(None),
            }
        }
        Ok(Some(entry))
    }

    pub fn apply_get(&self, key: String, value: Value) -> Result<Option<Entry>, CacheError> {
        let mut entry = (key, value);
        for layer in &self.gets {
            match layer.get(entry.0, entry.1)? {
                Some(next) => entry = next,
                None => return Ok(None),
            }
        }
        Ok(Some(entry))
    }

    pub fn apply_remove(&self, key: String) -> Result<Option<String>, CacheError> {
        let mut key = key;
        for layer in &self.removes {
            match layer.remove(key)? {
                Some(next) => key = next,
                None => return Ok(None),
            }
        }
        Ok(Some(key))
    }

    /// Does a storage key belong to this cache? `true` with no checks.
    #[must_use]
    pub fn apply_check(&self, key: &str) -> bool {
        self.checks.iter().all(|layer| layer.check(key))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |layers: &[Arc<dyn Layer>]| layers.iter().map(|l| l.name().to_string()).collect::<Vec<_>>();
        f.debug_struct("Pipeline")
            .field("sets", &names(&self.sets))
            .field("gets", &names(&self.gets))
            .field("removes", &names(&self.removes))
            .field("checks", &names(&self.checks))
            .finish()
    }
}
