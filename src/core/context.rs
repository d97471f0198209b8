//! Extended state carried alongside the active configuration.
//!
//! Context is arbitrary structured data mutated only by assign actions; guards
//! read it, effects observe it, nothing else touches it. Assign patches for a
//! microstep are merged into one update and applied atomically.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured extended state: a string-keyed map of JSON values.
///
/// # Example
///
/// ```rust
/// use statecraft::Context;
/// use serde_json::json;
///
/// let ctx = Context::new().with("volume", json!(5)).with("title", json!(null));
/// assert_eq!(ctx.get_i64("volume"), Some(5));
/// assert!(ctx.get_str("title").is_none());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    fields: Map<String, Value>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, builder-style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Look up an integer field.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    /// Look up a floating-point field.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    /// Look up a string field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Look up a boolean field.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    /// All fields, in key order.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Merge a computed patch into the context. Later keys overwrite earlier
    /// ones; untouched fields are preserved.
    pub(crate) fn apply(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.fields.insert(key, value);
        }
    }
}
