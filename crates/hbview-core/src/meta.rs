//! Per-request render metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata that accompanies a render request.
///
/// The engine only reads the `view` namespace; everything else is passed
/// through untouched to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderMeta(Value);

impl Default for RenderMeta {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl From<Value> for RenderMeta {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl RenderMeta {
    /// Empty metadata (`{}`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata with `view.bypassCache` set.
    pub fn bypassing_cache() -> Self {
        Self(serde_json::json!({ "view": { "bypassCache": true } }))
    }

    /// The underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume into the underlying JSON value.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Look up a key in the `view` namespace.
    pub fn view(&self, key: &str) -> Option<&Value> {
        self.0.get("view").and_then(|view| view.get(key))
    }

    /// Whether this request must skip the template cache.
    ///
    /// True when `view.bypassCache` is truthy, or when `view.cacheTemplates`
    /// is present and falsy.
    pub fn bypass_cache(&self) -> bool {
        if self.view("bypassCache").is_some_and(is_truthy) {
            return true;
        }
        matches!(self.view("cacheTemplates"), Some(v) if !is_truthy(v))
    }
}

/// Loose truthiness: `null`, `false`, `0` and `""` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
