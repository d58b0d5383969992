//! Flush execution: turn drained dirty keys into bulk storage calls.
//!
//! The value written for a key is the one in memory *at flush time*, so a
//! burst of writes collapses to its final state. A key missing from memory is
//! a deletion.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::batching::debounce::FlushExecutor;
use crate::cache::DataCache;
use crate::error::CacheError;
use crate::layers::Pipeline;
use crate::storage::traits::{StorageBackend, StorageError};

/// Bulk calls one flush will issue.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct FlushPlan {
    pub removes: Vec<String>,
    pub sets: Vec<(String, Value)>,
}

impl FlushPlan {
    pub fn is_empty(&self) -> bool {
        self.removes.is_empty() && self.sets.is_empty()
    }
}

/// Serializes backend writes between flushes and purge/replace.
pub(crate) type WriteGate = Arc<tokio::sync::Mutex<()>>;

/// The proxy's side of the scheduler: reads live memory, encodes, writes.
pub(crate) struct ProxyWriter {
    pub backend: Arc<dyn StorageBackend>,
    pub pipeline: Pipeline,
    pub data: Arc<RwLock<DataCache>>,
    pub gate: WriteGate,
}

impl ProxyWriter {
    /// Classify `keys` against current memory and run them through the
    /// pipeline. Vetoed keys are left out.
    pub fn plan(&self, keys: Vec<String>) -> Result<FlushPlan, StorageError> {
        let current: Vec<(String, Option<Value>)> = {
            let data = self.data.read();
            keys.into_iter()
                .map(|key| {
                    let value = data.get(&key).cloned();
                    (key, value)
                })
                .collect()
        };

        let mut plan = FlushPlan::default();
        for (key, value) in current {
            match value {
                Some(value) => {
                    if let Some(entry) = self.pipeline.apply_set(key.clone(), value).map_err(|e| encode_error(&key, e))? {
                        plan.sets.push(entry);
                    }
                }
                None => {
                    if let Some(storage_key) = self.pipeline.apply_remove(key.clone()).map_err(|e| encode_error(&key, e))? {
                        plan.removes.push(storage_key);
                    }
                }
            }
        }
        Ok(plan)
    }
}

fn encode_error(key: &str, err: CacheError) -> StorageError {
    StorageError::Encode {
        key: key.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl FlushExecutor for ProxyWriter {
    async fn execute(&self, keys: Vec<String>) -> Result<(), StorageError> {
        // held from planning to the last bulk call
        let _gate = self.gate.lock().await;
        let plan = self.plan(keys)?;
        if plan.is_empty() {
            return Ok(());
        }

        let backend = self.backend.name().to_string();
        let _timer = crate::metrics::LatencyTimer::new(backend.clone(), "flush");
        let (sets, removes) = (plan.sets.len(), plan.removes.len());

        let result = async {
            if !plan.removes.is_empty() {
                self.backend.multi_remove(&plan.removes).await?;
            }
            if !plan.sets.is_empty() {
                self.backend.multi_set(plan.sets).await?;
            }
            Ok::<(), StorageError>(())
        }
        .await;

        match &result {
            Ok(()) => {
                debug!(backend = %backend, sets, removes, "Flush written to storage");
                crate::metrics::record_storage_writes(&backend, sets, removes);
                crate::metrics::record_operation(&backend, "flush", "success");
            }
            Err(_) => crate::metrics::record_operation(&backend, "flush", "error"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{FilterKeysLayer, PrefixLayer, SerializeLayer};
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn writer(storage: Arc<MemoryStorage>, data: DataCache) -> ProxyWriter {
        ProxyWriter {
            backend: storage,
            pipeline: Pipeline::new(vec![Arc::new(PrefixLayer::new("cache")), Arc::new(SerializeLayer)]),
            data: Arc::new(RwLock::new(data)),
            gate: WriteGate::default(),
        }
    }

    #[test]
    fn test_plan_splits_present_and_absent_keys() {
        let mut data = DataCache::new();
        data.insert("a".into(), json!(1));
        data.insert("tomb".into(), Value::Null);
        let writer = writer(Arc::new(MemoryStorage::new()), data);

        let plan = writer.plan(vec!["a".into(), "gone".into(), "tomb".into()]).unwrap();
        assert_eq!(plan.removes, vec!["cache.gone".to_string()]);
        assert_eq!(
            plan.sets,
            vec![
                ("cache.a".to_string(), json!("1")),
                ("cache.tomb".to_string(), json!("null")),
            ]
        );
    }

    #[test]
    fn test_plan_skips_vetoed_keys() {
        let writer = ProxyWriter {
            backend: Arc::new(MemoryStorage::new()),
            pipeline: Pipeline::new(vec![Arc::new(FilterKeysLayer::deny(["private"]))]),
            data: Arc::new(RwLock::new(DataCache::from([
                ("private".to_string(), json!(1)),
                ("public".to_string(), json!(2)),
            ]))),
            gate: WriteGate::default(),
        };

        let plan = writer.plan(vec!["private".into(), "public".into()]).unwrap();
        assert_eq!(plan.sets, vec![("public".to_string(), json!(2))]);
        assert!(plan.removes.is_empty());
    }

    #[tokio::test]
    async fn test_execute_writes_final_state() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("cache.old", json!("1")).await.unwrap();

        let writer = writer(storage.clone(), DataCache::from([("new".to_string(), json!({"x": 1}))]));
        writer.execute(vec!["old".into(), "new".into()]).await.unwrap();

        let snapshot = storage.snapshot();
        assert!(!snapshot.contains_key("cache.old"));
        assert_eq!(snapshot.get("cache.new"), Some(&json!(r#"{"x":1}"#)));
    }

    #[tokio::test]
    async fn test_execute_with_nothing_to_write_is_ok() {
        let writer = ProxyWriter {
            backend: Arc::new(MemoryStorage::new()),
            pipeline: Pipeline::new(vec![Arc::new(FilterKeysLayer::new(|_| false))]),
            data: Arc::new(RwLock::new(DataCache::new())),
            gate: WriteGate::default(),
        };
        writer.execute(vec!["a".into()]).await.unwrap();
    }
}
