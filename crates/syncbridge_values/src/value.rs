//! Dynamic BSON-like value type.

use crate::document::Document;
use crate::error::{ValueError, ValueResult};
use crate::object_id::ObjectId;

/// A dynamic BSON-like value.
///
/// This covers the value kinds the sync engine accepts as function
/// arguments and returns as function results or custom user data.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Binary blob.
    Binary(Vec<u8>),
    /// Object identifier.
    ObjectId(ObjectId),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    /// Ordered array of values.
    Array(Vec<Value>),
    /// Ordered document.
    Document(Document),
}

impl Value {
    /// Returns the type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::ObjectId(_) => "objectId",
            Value::DateTime(_) => "datetime",
            Value::Array(_) => "array",
            Value::Document(_) => "document",
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an i64, widening Int32.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as an f64, converting integers.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int32(n) => Some(f64::from(*n)),
            Value::Int64(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get this value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as binary data.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a document.
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a key, if this value is a document.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_document().and_then(|d| d.get(key))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int64(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Binary(b.to_vec())
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::ObjectId(id)
    }
}

impl From<Document> for Value {
    fn from(d: Document) -> Self {
        Value::Document(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

impl TryFrom<Value> for bool {
    type Error = ValueError;

    fn try_from(value: Value) -> ValueResult<Self> {
        value
            .as_bool()
            .ok_or_else(|| ValueError::mismatch("bool", value.type_name()))
    }
}

impl TryFrom<Value> for i64 {
    type Error = ValueError;

    fn try_from(value: Value) -> ValueResult<Self> {
        value
            .as_i64()
            .ok_or_else(|| ValueError::mismatch("int64", value.type_name()))
    }
}

impl TryFrom<Value> for i32 {
    type Error = ValueError;

    fn try_from(value: Value) -> ValueResult<Self> {
        let n = value
            .as_i64()
            .ok_or_else(|| ValueError::mismatch("int32", value.type_name()))?;
        i32::try_from(n).map_err(|_| ValueError::OutOfRange {
            value: n,
            target: "int32",
        })
    }
}

impl TryFrom<Value> for f64 {
    type Error = ValueError;

    fn try_from(value: Value) -> ValueResult<Self> {
        value
            .as_f64()
            .ok_or_else(|| ValueError::mismatch("double", value.type_name()))
    }
}

impl TryFrom<Value> for String {
    type Error = ValueError;

    fn try_from(value: Value) -> ValueResult<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(ValueError::mismatch("string", other.type_name())),
        }
    }
}

impl TryFrom<Value> for Document {
    type Error = ValueError;

    fn try_from(value: Value) -> ValueResult<Self> {
        match value {
            Value::Document(d) => Ok(d),
            other => Err(ValueError::mismatch("document", other.type_name())),
        }
    }
}

impl TryFrom<Value> for Vec<Value> {
    type Error = ValueError;

    fn try_from(value: Value) -> ValueResult<Self> {
        match value {
            Value::Array(a) => Ok(a),
            other => Err(ValueError::mismatch("array", other.type_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_accessors() {
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(true).is_null());

        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int64(42).as_bool(), None);

        assert_eq!(Value::Int32(42).as_i64(), Some(42));
        assert_eq!(Value::Int64(42).as_i64(), Some(42));
        assert_eq!(Value::String("42".into()).as_i64(), None);

        assert_eq!(Value::Int32(2).as_f64(), Some(2.0));
        assert_eq!(Value::from("hello").as_str(), Some("hello"));
        assert_eq!(Value::Binary(vec![1, 2, 3]).as_binary(), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn from_impls() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i64), Value::Int64(42));
        assert_eq!(Value::from(42i32), Value::Int32(42));
        assert_eq!(Value::from(42u32), Value::Int64(42));
        assert_eq!(Value::from(1.5), Value::Double(1.5));
        assert_eq!(Value::from("hello"), Value::String("hello".into()));
        assert_eq!(Value::from(&b"ab"[..]), Value::Binary(vec![b'a', b'b']));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(7i32)), Value::Int32(7));
        assert_eq!(Value::from(()), Value::Null);
    }

    #[test]
    fn try_from_conversions() {
        assert_eq!(i64::try_from(Value::Int32(5)).unwrap(), 5);
        assert_eq!(i32::try_from(Value::Int64(5)).unwrap(), 5);
        assert!(matches!(
            i32::try_from(Value::Int64(i64::MAX)),
            Err(ValueError::OutOfRange { .. })
        ));
        assert_eq!(
            String::try_from(Value::Bool(true)),
            Err(ValueError::mismatch("string", "bool"))
        );
        assert!(Document::try_from(Value::Document(Document::new())).is_ok());
    }

    #[test]
    fn get_on_non_document_is_none() {
        assert_eq!(Value::Int32(1).get("a"), None);
    }
}
