// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for cache-persist.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `cache_persist_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `backend`: storage backend name (memory, json-file, ...)
//! - `operation`: restore, flush, purge, replace
//! - `status`: success, error, requeued, dropped

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a storage operation outcome
pub fn record_operation(backend: &str, operation: &str, status: &str) {
    counter!(
        "cache_persist_operations_total",
        "backend" => backend.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(backend: &str, operation: &str, duration: Duration) {
    histogram!(
        "cache_persist_operation_seconds",
        "backend" => backend.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// WRITE SCHEDULER
// ═══════════════════════════════════════════════════════════════════════════

/// Record how many dirty keys one flush carried
pub fn record_flush_keys(count: usize) {
    histogram!("cache_persist_flush_keys").record(count as f64);
}

/// Record flush duration
pub fn record_flush_duration(duration: Duration) {
    histogram!("cache_persist_flush_seconds").record(duration.as_secs_f64());
}

/// Record what happened after a failed flush
pub fn record_flush_failure(outcome: &str) {
    counter!(
        "cache_persist_flush_failures_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record writes/removes issued to storage by one flush
pub fn record_storage_writes(backend: &str, sets: usize, removes: usize) {
    counter!("cache_persist_storage_sets_total", "backend" => backend.to_string()).increment(sets as u64);
    counter!("cache_persist_storage_removes_total", "backend" => backend.to_string()).increment(removes as u64);
}

// ═══════════════════════════════════════════════════════════════════════════
// CACHE
// ═══════════════════════════════════════════════════════════════════════════

/// Set number of entries hydrated by the last restore
pub fn set_restored_entries(count: usize) {
    gauge!("cache_persist_restored_entries").set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// OFFLINE QUEUE
// ═══════════════════════════════════════════════════════════════════════════

/// Set number of records waiting in the offline queue
pub fn set_offline_pending(count: usize) {
    gauge!("cache_persist_offline_pending").set(count as f64);
}

/// Record the outcome of executing one offline record
pub fn record_offline_execution(outcome: &str) {
    counter!(
        "cache_persist_offline_executions_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a connectivity transition seen by the offline queue
pub fn record_network_change(online: bool) {
    let state = if online { "online" } else { "offline" };
    counter!(
        "cache_persist_network_changes_total",
        "state" => state
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    backend: String,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(backend: impl Into<String>, operation: &'static str) -> Self {
        Self {
            backend: backend.into(),
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(&self.backend, self.operation, self.start.elapsed());
    }
}
