//! Property-based test generators using proptest.
//!
//! Keys come from a small alphabet so that generated objects overlap often
//! enough to exercise nested merges.

use pushsync_core::JsonObject;
use proptest::prelude::*;
use serde_json::{Number, Value};

/// Strategy for object keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-e]{1,2}").expect("Invalid regex")
}

/// Strategy for JSON scalars other than null.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| Value::Number(Number::from(n))),
        (-1000.0f64..1000.0).prop_map(|f| Number::from_f64(f).map_or(Value::Null, Value::Number)),
        "[a-z ]{0,8}".prop_map(Value::String),
    ]
    .prop_filter("Scalar must not be null", |v| !v.is_null())
}

/// Strategy for null-free JSON values, nested up to `depth` objects deep.
pub fn value_strategy(depth: u32) -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(depth, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
            prop::collection::btree_map(key_strategy(), inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Strategy for null-free JSON objects.
pub fn json_object_strategy() -> impl Strategy<Value = JsonObject> {
    prop::collection::btree_map(key_strategy(), value_strategy(2), 0..5)
        .prop_map(|map| map.into_iter().collect())
}

/// Strategy for diffs: objects whose values may be null delete markers.
pub fn diff_strategy() -> impl Strategy<Value = JsonObject> {
    let entry = prop_oneof![
        3 => value_strategy(2),
        1 => Just(Value::Null),
    ];
    prop::collection::btree_map(key_strategy(), entry, 0..5).prop_map(|map| map.into_iter().collect())
}

/// Returns true if `value` contains no null anywhere.
pub fn is_null_free(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => items.iter().all(is_null_free),
        Value::Object(map) => map.values().all(is_null_free),
        _ => true,
    }
}
