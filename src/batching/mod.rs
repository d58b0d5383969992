//! Write batching.
//!
//! [`debounce::WriteScheduler`] turns a stream of dirty keys into timed,
//! deduplicated batches for the storage proxy.

pub mod debounce;

pub use debounce::{DebounceConfig, FlushExecutor, SchedulerPhase, WriteScheduler};
