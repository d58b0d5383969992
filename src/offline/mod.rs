// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Offline-first mutation queue.
//!
//! Operations that must eventually reach a remote system are published as
//! [`OfflineRecord`]s into a persisted [`Cache`]. When connectivity is
//! available they are replayed through the caller's [`OfflineHandler`].
//!
//! ```text
//!   publish ──► Queued ──process()──► Start ──execute ok──► Complete ──on_complete──► removed
//!                 ▲                     │                                   │ false
//!                 │                     └─execute err──► on_discard ──true──► removed
//!                 └───────────── state cleared (kept for next pass) ◄── false
//! ```
//!
//! Within one pass, records run in [`OfflineHandler::compare`] order.
//! Parallel records run concurrently; a serial record waits for every
//! parallel record before it, runs alone, and its failure aborts the pass.
//! At most one pass is active per queue.
//!
//! # Example
//!
//! ```
//! use cache_persist::offline::{OfflineFirst, OfflineHandler, OfflineRecord, Publish};
//! use cache_persist::{OfflineError, OfflineOptions};
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//!
//! struct Api;
//!
//! #[async_trait]
//! impl OfflineHandler<Value> for Api {
//!     async fn execute(&self, record: &OfflineRecord<Value>) -> Result<Value, OfflineError> {
//!         Ok(json!({"ok": record.id}))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), OfflineError> {
//! let queue = OfflineFirst::new(Api, OfflineOptions::default());
//! queue.publish(Publish::new(json!({"op": "add"}))).await?;
//! assert_eq!(queue.get_list_mutation()?.len(), 1);
//!
//! queue.process().await?;
//! assert!(queue.get_list_mutation()?.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod handler;
pub mod network;
pub mod record;

pub use handler::OfflineHandler;
pub use network::{ManualNetwork, NetworkStatus};
pub use record::{OfflineRecord, Publish, RecordState, Request};

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, OnceCell};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::cache::{Cache, Callback, Subscribers, Subscription};
use crate::config::{OfflineConfig, OfflineOptions};
use crate::error::OfflineError;

/// Bounds every record payload must satisfy.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Persisted queue of operations replayed when online.
///
/// Cloning is cheap and every clone drives the same queue.
pub struct OfflineFirst<T: Payload> {
    inner: Arc<Inner<T>>,
}

impl<T: Payload> Clone for OfflineFirst<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T: Payload> {
    cache: Cache,
    handler: Arc<dyn OfflineHandler<T>>,
    network: Option<Arc<dyn NetworkStatus>>,
    config: OfflineConfig,
    online: AtomicBool,
    busy: AtomicBool,
    hydrated: OnceCell<()>,
    /// Reconnect listener; holds only a weak reference to the queue
    listener: Mutex<Option<JoinHandle<()>>>,
    subscribers: Subscribers<Vec<OfflineRecord<T>>>,
    last_fetch_time: AtomicI64,
}

impl<T: Payload> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

/// Clears the busy flag however a pass ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: Payload> OfflineFirst<T> {
    pub fn new<H>(handler: H, options: OfflineOptions) -> Self
    where
        H: OfflineHandler<T> + 'static,
    {
        let cache = Cache::new(options.cache_options());
        Self {
            inner: Arc::new(Inner {
                cache,
                handler: Arc::new(handler),
                network: options.network,
                config: options.config,
                online: AtomicBool::new(true),
                busy: AtomicBool::new(false),
                hydrated: OnceCell::new(),
                listener: Mutex::new(None),
                subscribers: Subscribers::new(),
                last_fetch_time: AtomicI64::new(0),
            }),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Status
    // ═══════════════════════════════════════════════════════════════════════

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_manual_execution(&self) -> bool {
        self.inner.config.manual_execution
    }

    #[must_use]
    pub fn is_rehydrated(&self) -> bool {
        self.inner.hydrated.initialized()
    }

    /// True while a processing pass is running.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    /// The queue's backing cache.
    #[must_use]
    pub fn cache(&self) -> &Cache {
        &self.inner.cache
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Hydration & connectivity
    // ═══════════════════════════════════════════════════════════════════════

    /// Restore the persisted queue, read connectivity, start listening for
    /// reconnects and, when online and not manual, kick off a pass.
    ///
    /// Runs once; concurrent callers share the same work.
    #[tracing::instrument(skip(self))]
    pub async fn hydrate(&self) -> Result<(), OfflineError> {
        self.inner
            .hydrated
            .get_or_try_init(|| async {
                self.inner.cache.restore().await?;

                let online = match &self.inner.network {
                    Some(network) => network.fetch().await,
                    None => true,
                };
                self.inner.online.store(online, Ordering::Release);

                if let Some(network) = &self.inner.network {
                    let listener = tokio::spawn(listen(Arc::downgrade(&self.inner), network.changes()));
                    if let Some(previous) = self.inner.listener.lock().replace(listener) {
                        previous.abort();
                    }
                }

                let pending = self.inner.cache.get_all_keys().len();
                crate::metrics::set_offline_pending(pending);
                info!(online, pending, "Offline queue hydrated");

                if online && !self.is_manual_execution() {
                    self.spawn_process();
                }
                Ok::<(), OfflineError>(())
            })
            .await
            .map(|_| ())
    }

    fn spawn_process(&self) {
        let queue = self.clone();
        tokio::spawn(async move {
            if let Err(e) = queue.process().await {
                warn!(error = %e, "Offline processing pass aborted");
            }
        });
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queue
    // ═══════════════════════════════════════════════════════════════════════

    /// Enqueue an operation. Persists and notifies; never executes.
    #[tracing::instrument(skip_all)]
    pub async fn publish(&self, publish: Publish<T>) -> Result<OfflineRecord<T>, OfflineError> {
        let record = OfflineRecord {
            id: publish.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            request: publish.request,
            fetch_time: self.next_fetch_time(),
            state: None,
            retry: None,
            error: None,
            serial: publish.serial,
        };
        let record = self.inner.handler.on_publish(record).await;

        self.store(&record)?;
        self.inner.cache.flush().await?;
        debug!(id = %record.id, serial = record.is_serial(), "Offline record published");
        self.notify();
        Ok(record)
    }

    /// Cancel a queued record. Returns `false` if it was not queued.
    pub fn remove(&self, id: &str) -> bool {
        if !self.inner.cache.has(id) {
            return false;
        }
        self.inner.cache.remove(id);
        self.notify();
        true
    }

    /// All queued records in execution order.
    pub fn get_list_mutation(&self) -> Result<Vec<OfflineRecord<T>>, OfflineError> {
        let mut records = self
            .inner
            .cache
            .get_state()
            .into_iter()
            .map(|(id, value)| serde_json::from_value(value).map_err(|source| OfflineError::Record { id, source }))
            .collect::<Result<Vec<OfflineRecord<T>>, _>>()?;
        records.sort_by(|a, b| self.inner.handler.compare(a, b));
        Ok(records)
    }

    /// Observers receive the ordered record list after every queue change.
    pub fn subscribe(&self, callback: Callback<Vec<OfflineRecord<T>>>) -> Subscription {
        self.inner.subscribers.subscribe(callback)
    }

    fn notify(&self) {
        match self.get_list_mutation() {
            Ok(records) => {
                crate::metrics::set_offline_pending(records.len());
                self.inner.subscribers.notify(&records, None);
            }
            Err(e) => warn!(error = %e, "Cannot notify offline observers"),
        }
    }

    fn store(&self, record: &OfflineRecord<T>) -> Result<(), OfflineError> {
        let value = serde_json::to_value(record).map_err(|source| OfflineError::Record {
            id: record.id.clone(),
            source,
        })?;
        self.inner.cache.set(&record.id, value);
        Ok(())
    }

    /// Milliseconds since the epoch, bumped so every record is strictly newer
    /// than the previous one.
    fn next_fetch_time(&self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        let mut last = self.inner.last_fetch_time.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .inner
                .last_fetch_time
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Processing
    // ═══════════════════════════════════════════════════════════════════════

    /// Run one pass over the queue. A no-op while another pass is running.
    ///
    /// Returns the error that aborted the pass (a failed serial record),
    /// after `finish` was called with it. Failures of parallel records are
    /// logged and settled through `on_discard`.
    #[tracing::instrument(skip(self))]
    pub async fn process(&self) -> Result<(), OfflineError> {
        if self.inner.busy.swap(true, Ordering::AcqRel) {
            debug!("Offline processing already running");
            return Ok(());
        }
        let _busy = BusyGuard(&self.inner.busy);

        let records = self.get_list_mutation()?;
        if records.is_empty() {
            return Ok(());
        }
        info!(records = records.len(), "Processing offline queue");

        self.inner.handler.start(&records).await;
        let outcome = self.run_pass(records.clone()).await;
        self.inner.handler.finish(&records, outcome.as_ref().err()).await;

        if let Err(e) = self.inner.cache.flush().await {
            warn!(error = %e, "Failed to persist offline queue after pass");
        }
        outcome
    }

    async fn run_pass(&self, records: Vec<OfflineRecord<T>>) -> Result<(), OfflineError> {
        let mut parallel = JoinSet::new();

        for record in records {
            let Some(record) = self.inner.handler.on_execute(record).await else {
                continue;
            };

            if record.is_serial() {
                drain(&mut parallel).await;
                self.execute_mutation(record).await?;
            } else {
                let queue = self.clone();
                parallel.spawn(async move { queue.execute_mutation(record).await });
            }
        }

        drain(&mut parallel).await;
        Ok(())
    }

    /// Execute one record and settle it through `on_complete`/`on_discard`.
    #[tracing::instrument(skip_all, fields(id = %record.id))]
    pub async fn execute_mutation(&self, record: OfflineRecord<T>) -> Result<(), OfflineError> {
        let mut record = record;
        record.state = Some(RecordState::Start);
        record.retry = Some(record.attempts() + 1);
        self.store(&record)?;

        let result = self.inner.handler.execute(&record).await;
        let outcome = match result {
            Ok(response) => {
                record.state = Some(RecordState::Complete);
                record.error = None;
                crate::metrics::record_offline_execution("complete");
                if self.inner.handler.on_complete(&record, &response).await {
                    self.inner.cache.remove(&record.id);
                } else {
                    record.state = None;
                    self.store(&record)?;
                }
                Ok(())
            }
            Err(err) => {
                record.error = Some(err.to_string());
                warn!(error = %err, attempts = record.attempts(), "Offline record failed");
                if self.inner.handler.on_discard(&record, &err).await {
                    crate::metrics::record_offline_execution("discarded");
                    self.inner.cache.remove(&record.id);
                } else {
                    crate::metrics::record_offline_execution("requeued");
                    record.state = None;
                    self.store(&record)?;
                }
                Err(err)
            }
        };

        self.notify();
        outcome
    }
}

impl<T: Payload> std::fmt::Debug for OfflineFirst<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineFirst")
            .field("online", &self.is_online())
            .field("manual_execution", &self.is_manual_execution())
            .field("hydrated", &self.is_rehydrated())
            .field("processing", &self.is_processing())
            .field("cache", &self.inner.cache)
            .finish()
    }
}

/// Wait for every parallel execution; their failures were already settled.
async fn drain(parallel: &mut JoinSet<Result<(), OfflineError>>) {
    while let Some(joined) = parallel.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Parallel offline record failed"),
            Err(e) => error!(error = %e, "Parallel offline execution panicked or was cancelled"),
        }
    }
}

async fn listen<T: Payload>(queue: Weak<Inner<T>>, mut changes: watch::Receiver<bool>) {
    while changes.changed().await.is_ok() {
        let online = *changes.borrow_and_update();
        let Some(inner) = queue.upgrade() else {
            return;
        };

        let was_online = inner.online.swap(online, Ordering::AcqRel);
        if was_online == online {
            continue;
        }
        crate::metrics::record_network_change(online);
        info!(online, "Connectivity changed");

        if online && !inner.config.manual_execution {
            OfflineFirst { inner }.spawn_process();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    #[derive(Default)]
    struct Recorder {
        executed: Mutex<Vec<String>>,
        fail: Vec<&'static str>,
        keep_failed: bool,
    }

    #[async_trait]
    impl OfflineHandler<Value> for Recorder {
        async fn execute(&self, record: &OfflineRecord<Value>) -> Result<Value, OfflineError> {
            self.executed.lock().push(record.id.clone());
            if self.fail.iter().any(|id| *id == record.id) {
                return Err(OfflineError::execution(&record.id, "remote rejected"));
            }
            Ok(json!("ok"))
        }

        async fn on_discard(&self, _record: &OfflineRecord<Value>, _error: &OfflineError) -> bool {
            !self.keep_failed
        }
    }

    fn queue(handler: Recorder) -> OfflineFirst<Value> {
        OfflineFirst::new(handler, OfflineOptions::default())
    }

    #[tokio::test]
    async fn test_publish_enqueues_without_executing() {
        let queue = queue(Recorder::default());
        let record = queue.publish(Publish::new(json!(1)).with_id("a")).await.unwrap();

        assert_eq!(record.id, "a");
        assert!(record.state.is_none());
        assert_eq!(queue.get_list_mutation().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_generated_ids_and_increasing_fetch_time() {
        let queue = queue(Recorder::default());
        let first = queue.publish(Publish::new(json!(1))).await.unwrap();
        let second = queue.publish(Publish::new(json!(2))).await.unwrap();

        assert_ne!(first.id, second.id);
        assert!(second.fetch_time > first.fetch_time);

        let order: Vec<_> = queue.get_list_mutation().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(order, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_process_completes_and_removes() {
        let queue = queue(Recorder::default());
        queue.publish(Publish::new(json!(1)).with_id("a")).await.unwrap();
        queue.publish(Publish::new(json!(2)).with_id("b")).await.unwrap();

        queue.process().await.unwrap();
        assert!(queue.get_list_mutation().unwrap().is_empty());
        assert!(!queue.is_processing());
    }

    #[tokio::test]
    async fn test_failed_record_kept_when_discard_declines() {
        let queue = queue(Recorder {
            fail: vec!["a"],
            keep_failed: true,
            ..Default::default()
        });
        queue.publish(Publish::new(json!(1)).with_id("a")).await.unwrap();

        // parallel failures do not abort the pass
        queue.process().await.unwrap();

        let list = queue.get_list_mutation().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].attempts(), 1);
        assert!(list[0].state.is_none());
        assert!(list[0].error.as_deref().unwrap().contains("remote rejected"));
    }

    #[tokio::test]
    async fn test_serial_failure_aborts_pass() {
        let queue = queue(Recorder {
            fail: vec!["a"],
            keep_failed: true,
            ..Default::default()
        });
        queue.publish(Publish::new(json!(1)).with_id("a").serial(true)).await.unwrap();
        queue.publish(Publish::new(json!(2)).with_id("b")).await.unwrap();

        let err = queue.process().await.unwrap_err();
        assert!(matches!(err, OfflineError::Execution { .. }));

        let ids: Vec<_> = queue.get_list_mutation().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(!queue.is_processing());
    }

    #[tokio::test]
    async fn test_remove_cancels_record() {
        let queue = queue(Recorder::default());
        queue.publish(Publish::new(json!(1)).with_id("a")).await.unwrap();

        assert!(queue.remove("a"));
        assert!(!queue.remove("a"));
        queue.process().await.unwrap();
        assert!(queue.get_list_mutation().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hydrate_without_network_assumes_online() {
        let queue = queue(Recorder::default());
        queue.hydrate().await.unwrap();
        assert!(queue.is_online());
        assert!(queue.is_rehydrated());
    }
}
