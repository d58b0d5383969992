//! Persisted offline records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Execution marker stored on a record while a pass works on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    Start,
    Complete,
}

/// The operation to replay plus caller-owned side data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<T> {
    pub payload: T,
    /// State to roll back to if the operation is discarded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<Value>,
    /// Optimistic result already applied locally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<Value>,
}

impl<T> Request<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            backup: None,
            sink: None,
        }
    }
}

/// One queued operation as stored in the queue's cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineRecord<T> {
    pub id: String,
    pub request: Request<T>,
    /// Publish time in milliseconds since the Unix epoch, strictly increasing
    /// per queue
    pub fetch_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RecordState>,
    /// Number of execution attempts so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
    /// Last execution failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<bool>,
}

impl<T> OfflineRecord<T> {
    /// Serial records run alone and act as a barrier between parallel ones.
    #[must_use]
    pub fn is_serial(&self) -> bool {
        self.serial.unwrap_or(false)
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.retry.unwrap_or(0)
    }
}

/// Input to [`OfflineFirst::publish`](super::OfflineFirst::publish).
#[derive(Debug, Clone)]
pub struct Publish<T> {
    /// Record id; a fresh UUID when `None`
    pub id: Option<String>,
    pub request: Request<T>,
    pub serial: Option<bool>,
}

impl<T> Publish<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: None,
            request: Request::new(payload),
            serial: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn serial(mut self, serial: bool) -> Self {
        self.serial = Some(serial);
        self
    }

    #[must_use]
    pub fn with_backup(mut self, backup: Value) -> Self {
        self.request.backup = Some(backup);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Value) -> Self {
        self.request.sink = Some(sink);
        self
    }
}
