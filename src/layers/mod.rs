// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Key/value transform layers applied between memory and storage.
//!
//! A [`Layer`] declares which operations it takes part in through
//! [`LayerCapabilities`]. The [`Pipeline`] partitions the configured layers by
//! capability once, at construction:
//!
//! ```text
//!   write:  key,value ──► prefix ──► user layers ──► serialize ──► storage
//!   read:   storage ──► serialize⁻¹ ──► user layers⁻¹ ──► prefix⁻¹ ──► memory
//! ```
//!
//! Returning `None` from `set`/`get`/`remove` vetoes the entry: nothing is
//! written, read back or removed for that key.
//!
//! # Example
//!
//! ```
//! use cache_persist::layers::{Pipeline, PrefixLayer, SerializeLayer};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let pipeline = Pipeline::new(vec![
//!     Arc::new(PrefixLayer::new("cache")),
//!     Arc::new(SerializeLayer),
//! ]);
//!
//! let (key, value) = pipeline.apply_set("todo1".into(), json!("buy milk")).unwrap().unwrap();
//! assert_eq!(key, "cache.todo1");
//! assert_eq!(value, json!("\"buy milk\""));
//! ```

pub mod pipeline;
pub mod prefix;
pub mod serialize;
pub mod filter;

pub use pipeline::Pipeline;
pub use prefix::PrefixLayer;
pub use serialize::SerializeLayer;
pub use filter::FilterKeysLayer;

use serde_json::Value;

use crate::error::CacheError;

/// A key/value pair on its way to or from storage.
pub type Entry = (String, Value);

/// Which pipeline stages a layer participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerCapabilities {
    pub set: bool,
    pub get: bool,
    pub remove: bool,
    pub check: bool,
}

impl LayerCapabilities {
    pub const ALL: Self = Self {
        set: true,
        get: true,
        remove: true,
        check: true,
    };

    /// Value-only transform: encode on write, decode on read.
    pub const VALUES: Self = Self {
        set: true,
        get: true,
        remove: false,
        check: false,
    };
}

/// A named transform contributing to persistence encoding, decoding or
/// filtering. Every method defaults to pass-through, so an implementation only
/// overrides what its [`capabilities`](Layer::capabilities) advertise.
pub trait Layer: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> LayerCapabilities;

    fn set(&self, key: String, value: Value) -> Result<Option<Entry>, CacheError> {
        Ok(Some((key, value)))
    }

    fn get(&self, key: String, value: Value) -> Result<Option<Entry>, CacheError> {
        Ok(Some((key, value)))
    }

    fn remove(&self, key: String) -> Result<Option<String>, CacheError> {
        Ok(Some(key))
    }

    fn check(&self, _key: &str) -> bool {
        true
    }
}
