// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Debounced write scheduling.
//!
//! The [`WriteScheduler`] collects dirty keys and hands them to a
//! [`FlushExecutor`] in batches. A burst of pushes is held back until the
//! stream goes quiet for `wait`, but never longer than `max_wait` after the
//! burst started. At most one flush is in flight at any time.
//!
//! ```text
//!            push                    timer due                execute done
//!   Idle ────────────► Pending ───────────────► Flushing ──────────────────► Idle
//!                        ▲  │ timer early:                │ keys pushed meanwhile
//!                        │  └─ re-arm remaining wait      │ → next batch at once
//!                        └────────────────────────────────┘ error + keep: re-arm
//! ```
//!
//! # Example
//!
//! ```
//! use cache_persist::batching::debounce::{DebounceConfig, FlushExecutor, WriteScheduler, SchedulerPhase};
//! use cache_persist::StorageError;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Print;
//!
//! #[async_trait]
//! impl FlushExecutor for Print {
//!     async fn execute(&self, keys: Vec<String>) -> Result<(), StorageError> {
//!         println!("flushing {keys:?}");
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let scheduler = WriteScheduler::new(DebounceConfig::default(), Arc::new(Print), None);
//! scheduler.push("a");
//! scheduler.push("a");
//! assert_eq!(scheduler.pending_len(), 1);
//!
//! scheduler.flush().await.unwrap();
//! assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ErrorHandler;
use crate::storage::traits::StorageError;

type FlushOutcome = Result<(), StorageError>;

/// Timing for the debounce window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Quiet period that must elapse after the last push
    pub wait: Duration,
    /// Hard ceiling measured from the first push of a burst
    pub max_wait: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_millis(200),
            max_wait: Duration::from_millis(600),
        }
    }
}

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Nothing queued, no timer
    Idle,
    /// Keys queued, waiting for the debounce window
    Pending,
    /// A batch is being written
    Flushing,
}

/// Receives drained batches. Called by at most one task at a time.
#[async_trait]
pub trait FlushExecutor: Send + Sync {
    async fn execute(&self, keys: Vec<String>) -> Result<(), StorageError>;
}

struct SchedulerState {
    /// Dirty keys, deduplicated
    pending: BTreeSet<String>,
    /// A batch is in flight
    busy: bool,
    last_call: Option<Instant>,
    last_invoke: Option<Instant>,
    /// Armed debounce timer, if any
    timer: Option<JoinHandle<()>>,
    /// Bumped on every arm/cancel so a stale timer task exits on wake
    timer_gen: u64,
    /// Callers of `flush()` waiting for the scheduler to go idle
    waiters: Vec<oneshot::Sender<FlushOutcome>>,
}

struct Shared {
    config: DebounceConfig,
    executor: Arc<dyn FlushExecutor>,
    error_handling: Option<ErrorHandler>,
    state: Mutex<SchedulerState>,
}

/// Debounced, single-flight batch writer.
///
/// Armed timers keep the scheduler alive, so keys pushed before the owner is
/// dropped still reach the executor while the runtime is running.
pub struct WriteScheduler {
    shared: Arc<Shared>,
}

impl WriteScheduler {
    pub fn new(
        config: DebounceConfig,
        executor: Arc<dyn FlushExecutor>,
        error_handling: Option<ErrorHandler>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                executor,
                error_handling,
                state: Mutex::new(SchedulerState {
                    pending: BTreeSet::new(),
                    busy: false,
                    last_call: None,
                    last_invoke: None,
                    timer: None,
                    timer_gen: 0,
                    waiters: Vec::new(),
                }),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> DebounceConfig {
        self.shared.config
    }

    #[must_use]
    pub fn phase(&self) -> SchedulerPhase {
        let state = self.shared.state.lock();
        if state.busy {
            SchedulerPhase::Flushing
        } else if state.timer.is_some() || !state.pending.is_empty() {
            SchedulerPhase::Pending
        } else {
            SchedulerPhase::Idle
        }
    }

    /// Number of dirty keys not yet handed to the executor.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Mark `key` dirty. Never blocks on I/O.
    ///
    /// Outside a Tokio runtime no timer can be armed; the key stays pending
    /// until the next [`flush`](Self::flush).
    pub fn push(&self, key: &str) {
        let mut state = self.shared.state.lock();
        let now = Instant::now();
        state.pending.insert(key.to_string());
        state.last_call = Some(now);

        // an in-flight batch or an armed timer will pick the key up
        if state.busy || state.timer.is_some() {
            return;
        }
        state.last_invoke = Some(now);
        arm(&self.shared, &mut state, self.shared.config.wait);
    }

    /// Drain pending keys now and wait until storage acknowledged them.
    ///
    /// If a batch is already in flight, waits for the scheduler to go idle
    /// (including any follow-up batch for keys pushed meanwhile) and returns
    /// that outcome.
    pub async fn flush(&self) -> FlushOutcome {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.shared.state.lock();
            if !state.busy {
                cancel_timer(&mut state);
                if state.pending.is_empty() {
                    return Ok(());
                }
                let keys = begin_batch(&mut state);
                state.waiters.push(tx);
                // spawned so a cancelled caller cannot strand the busy flag
                tokio::spawn(drive(Arc::clone(&self.shared), keys));
            } else {
                state.waiters.push(tx);
            }
        }
        rx.await
            .unwrap_or_else(|_| Err(StorageError::Backend("flush abandoned before completion".to_string())))
    }
}

impl std::fmt::Debug for WriteScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteScheduler")
            .field("config", &self.shared.config)
            .field("phase", &self.phase())
            .field("pending", &self.pending_len())
            .finish()
    }
}

fn arm(shared: &Arc<Shared>, state: &mut SchedulerState, delay: Duration) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        debug!(pending = state.pending.len(), "No runtime, keys stay pending until flush");
        return;
    };
    state.timer_gen += 1;
    let generation = state.timer_gen;
    state.timer = Some(handle.spawn(run_timer(Arc::clone(shared), generation, delay)));
}

fn cancel_timer(state: &mut SchedulerState) {
    state.timer_gen += 1;
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
}

/// Drain the pending set into a batch and mark the scheduler busy.
fn begin_batch(state: &mut SchedulerState) -> Vec<String> {
    state.busy = true;
    state.last_invoke = Some(Instant::now());
    std::mem::take(&mut state.pending).into_iter().collect()
}

async fn run_timer(shared: Arc<Shared>, generation: u64, delay: Duration) {
    let DebounceConfig { wait, max_wait } = shared.config;
    let mut delay = delay;

    loop {
        tokio::time::sleep(delay).await;

        let keys = {
            let mut state = shared.state.lock();
            if state.timer_gen != generation {
                return;
            }
            if state.busy || state.pending.is_empty() {
                // the in-flight batch drains whatever is pending
                state.timer = None;
                return;
            }

            let now = Instant::now();
            let since_call = state.last_call.map_or(wait, |t| now.saturating_duration_since(t));
            let since_invoke = state.last_invoke.map_or(max_wait, |t| now.saturating_duration_since(t));

            if since_call < wait && since_invoke < max_wait {
                delay = (wait - since_call).min(max_wait - since_invoke);
                continue;
            }
            state.timer = None;
            begin_batch(&mut state)
        };

        drive(shared, keys).await;
        return;
    }
}

/// Execute `keys`, then keep draining until nothing is pending or a failure
/// stops the cycle. Resolves every waiting `flush()` with the final outcome.
async fn drive(shared: Arc<Shared>, mut keys: Vec<String>) {
    loop {
        let count = keys.len();
        debug!(count, "Flushing dirty keys");
        crate::metrics::record_flush_keys(count);
        let started = Instant::now();

        let result = shared.executor.execute(keys.clone()).await;
        crate::metrics::record_flush_duration(started.elapsed());

        let err = match result {
            Ok(()) => {
                let mut state = shared.state.lock();
                if !state.pending.is_empty() {
                    keys = begin_batch(&mut state);
                    continue;
                }
                state.busy = false;
                let waiters = std::mem::take(&mut state.waiters);
                drop(state);
                for waiter in waiters {
                    let _ = waiter.send(Ok(()));
                }
                return;
            }
            Err(err) => err,
        };

        // user policy runs without the lock held
        let keep_going = shared.error_handling.as_ref().map_or(true, |handler| handler(&err));

        let mut state = shared.state.lock();
        state.busy = false;
        if keep_going {
            warn!(error = %err, keys = count, "Flush failed, keys requeued for next cycle");
            crate::metrics::record_flush_failure("requeued");
            let now = Instant::now();
            state.pending.extend(keys);
            state.last_call = Some(now);
            state.last_invoke = Some(now);
            cancel_timer(&mut state);
            arm(&shared, &mut state, shared.config.wait);
        } else {
            warn!(error = %err, keys = count, "Flush failed, batch dropped by error policy");
            crate::metrics::record_flush_failure("dropped");
        }
        let waiters = std::mem::take(&mut state.waiters);
        drop(state);
        for waiter in waiters {
            let _ = waiter.send(Err(err.clone()));
        }
        return;
    }
}
