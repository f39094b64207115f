//! # SyncBridge Values
//!
//! BSON-like dynamic values exchanged with the sync engine.
//!
//! Remote function arguments, function results and custom user data all
//! travel as [`Value`]s. This crate only models the values; encoding them
//! onto the wire is the engine's business.
//!
//! ## Example
//!
//! ```
//! use syncbridge_values::{Document, Value};
//!
//! let mut doc = Document::new();
//! doc.insert("name", "Alice");
//! doc.insert("age", 30);
//!
//! let args: Vec<Value> = vec![Value::from(doc), Value::from(42i64)];
//! assert_eq!(args[0].get("name"), Some(&Value::from("Alice")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod json;
mod object_id;
mod value;

pub use document::Document;
pub use error::{ValueError, ValueResult};
pub use object_id::ObjectId;
pub use value::Value;
