//! Error types for the values crate.

use thiserror::Error;

/// Result type for value conversions.
pub type ValueResult<T> = Result<T, ValueError>;

/// Errors that can occur when converting or parsing values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// The value has a different type than requested.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Requested type name.
        expected: &'static str,
        /// Actual type name.
        found: &'static str,
    },

    /// An ObjectId string was not 24 hex digits.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// An integer did not fit the requested width.
    #[error("integer {value} out of range for {target}")]
    OutOfRange {
        /// The offending value.
        value: i64,
        /// Requested type name.
        target: &'static str,
    },
}

impl ValueError {
    /// Creates a type mismatch error.
    pub fn mismatch(expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch { expected, found }
    }
}
