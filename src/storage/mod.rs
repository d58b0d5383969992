//! Storage backends the proxy persists into.

pub mod traits;
pub mod memory;
pub mod file;

pub use traits::{StorageBackend, StorageError};
pub use memory::MemoryStorage;
pub use file::JsonFileStorage;
