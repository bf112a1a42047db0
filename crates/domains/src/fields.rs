//! # Field Mutations
//!
//! Writes are expressed as an ordered list of field mutations rather than a
//! whole document, so the store can resolve server-side sentinels (timestamps,
//! numeric increments) atomically at commit time.

use serde::Serialize;
use serde_json::Value;

/// A single field mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Store the given literal value.
    Set(Value),
    /// Add the delta to the current numeric value (missing counts as 0).
    Increment(i64),
    /// Resolved by the store to a strictly monotonic commit timestamp
    /// (epoch microseconds).
    ServerTimestamp,
}

/// Ordered builder of named field mutations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(String, FieldValue)>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a literal field. Values that fail to serialize become JSON null;
    /// model types in this workspace all serialize infallibly.
    pub fn set(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.0.push((name.into(), FieldValue::Set(value)));
        self
    }

    pub fn increment(mut self, name: impl Into<String>, delta: i64) -> Self {
        self.0.push((name.into(), FieldValue::Increment(delta)));
        self
    }

    pub fn server_timestamp(mut self, name: impl Into<String>) -> Self {
        self.0.push((name.into(), FieldValue::ServerTimestamp));
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (String, FieldValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
