//! Caller hooks driving how queued records are executed and retired.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::Value;

use super::record::OfflineRecord;
use crate::error::OfflineError;

/// Hooks for an [`OfflineFirst`](super::OfflineFirst) queue. Only
/// [`execute`](OfflineHandler::execute) is required.
#[async_trait]
pub trait OfflineHandler<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Replay the operation against the remote system.
    async fn execute(&self, record: &OfflineRecord<T>) -> Result<Value, OfflineError>;

    /// Adjust a record before it is first persisted.
    async fn on_publish(&self, record: OfflineRecord<T>) -> OfflineRecord<T> {
        record
    }

    /// Last look before execution. `None` means the record was resolved some
    /// other way and is skipped in this pass.
    async fn on_execute(&self, record: OfflineRecord<T>) -> Option<OfflineRecord<T>> {
        Some(record)
    }

    /// `true` removes the record, `false` keeps it for a later pass.
    async fn on_complete(&self, _record: &OfflineRecord<T>, _response: &Value) -> bool {
        true
    }

    /// `true` drops the failed record, `false` keeps it for retry.
    async fn on_discard(&self, _record: &OfflineRecord<T>, _error: &OfflineError) -> bool {
        true
    }

    /// Called once before a pass with the ordered pending list.
    async fn start(&self, _records: &[OfflineRecord<T>]) {}

    /// Called once after a pass, with the error that aborted it, if any.
    async fn finish(&self, _records: &[OfflineRecord<T>], _error: Option<&OfflineError>) {}

    /// Execution order. Oldest first by default.
    fn compare(&self, a: &OfflineRecord<T>, b: &OfflineRecord<T>) -> Ordering {
        a.fetch_time.cmp(&b.fetch_time)
    }
}
