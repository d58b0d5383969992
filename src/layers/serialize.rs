//! JSON encoding layer, always placed closest to storage.

use serde_json::Value;

use super::{Entry, Layer, LayerCapabilities};
use crate::error::CacheError;

/// Encodes values to JSON text on write and parses them on read. Storage
/// therefore only ever sees `Value::String`. Failures surface as
/// [`CacheError::Serialization`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializeLayer;

impl Layer for SerializeLayer {
    fn name(&self) -> &str {
        "serialize"
    }

    fn capabilities(&self) -> LayerCapabilities {
        LayerCapabilities::VALUES
    }

    fn set(&self, key: String, value: Value) -> Result<Option<Entry>, CacheError> {
        match serde_json::to_string(&value) {
            Ok(text) => Ok(Some((key, Value::String(text)))),
            Err(source) => Err(CacheError::Serialization { key, source }),
        }
    }

    fn get(&self, key: String, value: Value) -> Result<Option<Entry>, CacheError> {
        let text: String = match serde_json::from_value(value) {
            Ok(text) => text,
            Err(source) => return Err(CacheError::Serialization { key, source }),
        };
        match serde_json::from_str(&text) {
            Ok(decoded) => Ok(Some((key, decoded))),
            Err(source) => Err(CacheError::Serialization { key, source }),
        }
    }
}
