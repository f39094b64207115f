//! Property-based test generators using proptest.

use proptest::prelude::*;
use syncbridge_core::ProgressDirection;
use syncbridge_values::{Document, ObjectId, Value};

/// Strategy for raw `(transferred, transferrable)` pairs.
///
/// Includes zero denominators and transferred counts past the denominator,
/// both of which the engine can report.
pub fn progress_pair_strategy() -> impl Strategy<Value = (u64, u64)> {
    prop_oneof![
        (any::<u64>(), Just(0u64)),
        (0u64..1_000_000, 0u64..1_000_000),
        (any::<u64>(), any::<u64>()),
    ]
}

/// Strategy for a non-decreasing series of transferred counts that ends at
/// `total`.
pub fn transfer_series_strategy() -> impl Strategy<Value = (Vec<u64>, u64)> {
    (1u64..10_000).prop_flat_map(|total| {
        prop::collection::vec(0..=total, 0..16).prop_map(move |mut steps| {
            steps.sort_unstable();
            steps.push(total);
            (steps, total)
        })
    })
}

/// Strategy for a progress direction.
pub fn direction_strategy() -> impl Strategy<Value = ProgressDirection> {
    prop_oneof![Just(ProgressDirection::Upload), Just(ProgressDirection::Download)]
}

/// Strategy for scalar values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::Int32),
        any::<i64>().prop_map(Value::Int64),
        (-1.0e12f64..1.0e12).prop_map(Value::Double),
        "[a-zA-Z0-9 ]{0,24}".prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Binary),
        prop::array::uniform12(any::<u8>()).prop_map(|b| Value::ObjectId(ObjectId::from_bytes(b))),
        any::<i64>().prop_map(Value::DateTime),
    ]
}

/// Strategy for nested values up to a small depth.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,8}", inner), 0..4)
                .prop_map(|pairs| Value::Document(pairs.into_iter().collect())),
        ]
    })
}

/// Strategy for documents with string keys.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::vec(("[a-z]{1,8}", value_strategy()), 0..6)
        .prop_map(|pairs| pairs.into_iter().collect())
}
