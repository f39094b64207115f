//! Conversions from `serde_json` values.
//!
//! JSON integers become `Int32` when they fit and `Int64` otherwise;
//! unsigned integers beyond `i64::MAX` and all fractional numbers become
//! `Double`. Objects become documents in their iteration order.

use crate::document::Document;
use crate::value::Value;

impl From<serde_json::Value> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i32::try_from(i).map_or(Value::Int64(i), Value::Int32)
                } else if let Some(u) = n.as_u64() {
                    Value::Double(u as f64)
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Document(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect::<Document>(),
            ),
        }
    }
}
