//! JSON object diff, merge and comparison.
//!
//! All functions operate on [`JsonObject`]s. Arrays are treated as opaque
//! leaves: merge and diff replace them wholesale, never element-wise.

use serde_json::{Map, Number, Value};

/// A JSON object with string keys.
pub type JsonObject = Map<String, Value>;

/// Merges `diff` into `target`.
///
/// For each key of `diff`:
/// - an explicit `null` removes the key when `nulls_delete` is set, and is
///   stored as a `null` otherwise
/// - an object merges recursively into an existing object
/// - anything else replaces the existing value wholesale
///
/// When `nulls_delete` is set, objects copied into places where no object
/// existed are stripped of their nulls as well.
pub fn merge(target: &mut JsonObject, diff: &JsonObject, nulls_delete: bool) {
    for (key, value) in diff {
        match value {
            Value::Null if nulls_delete => {
                target.remove(key);
            }
            Value::Object(sub_diff) => match target.get_mut(key) {
                Some(Value::Object(sub_target)) => merge(sub_target, sub_diff, nulls_delete),
                _ => {
                    let mut fresh = sub_diff.clone();
                    if nulls_delete {
                        strip_nulls(&mut fresh);
                    }
                    target.insert(key.clone(), Value::Object(fresh));
                }
            },
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}

/// Returns `base` with `diff` merged in, leaving both inputs untouched.
#[must_use]
pub fn merged(base: &JsonObject, diff: &JsonObject, nulls_delete: bool) -> JsonObject {
    let mut result = base.clone();
    merge(&mut result, diff, nulls_delete);
    result
}

/// Computes the minimal diff that turns `from` into `to` when merged with
/// nulls deleting keys.
///
/// Keys missing from `to` are emitted as `null`. Objects present on both
/// sides are diffed recursively. Any other differing value is emitted as it
/// appears in `to`.
#[must_use]
pub fn diff(from: &JsonObject, to: &JsonObject) -> JsonObject {
    let mut result = JsonObject::new();

    for (key, from_value) in from {
        let Some(to_value) = to.get(key) else {
            result.insert(key.clone(), Value::Null);
            continue;
        };
        if json_equals(from_value, to_value) {
            continue;
        }
        match (from_value, to_value) {
            (Value::Object(from_obj), Value::Object(to_obj)) => {
                result.insert(key.clone(), Value::Object(diff(from_obj, to_obj)));
            }
            _ => {
                result.insert(key.clone(), to_value.clone());
            }
        }
    }

    for (key, to_value) in to {
        if !from.contains_key(key) {
            result.insert(key.clone(), to_value.clone());
        }
    }

    result
}

/// Removes `null` values from `object`, recursing into nested objects.
///
/// Arrays, and any objects they contain, are left untouched.
pub fn strip_nulls(object: &mut JsonObject) {
    object.retain(|_, value| !value.is_null());
    for value in object.values_mut() {
        if let Value::Object(nested) = value {
            strip_nulls(nested);
        }
    }
}

/// Deep equality where numbers compare by numeric value, so `1` equals `1.0`.
#[must_use]
pub fn json_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| json_equals(a, b))
        }
        (Value::Object(a), Value::Object(b)) => objects_equal(a, b),
        _ => false,
    }
}

/// [`json_equals`] for two objects.
#[must_use]
pub fn objects_equal(a: &JsonObject, b: &JsonObject) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| json_equals(value, other)))
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return a == b;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Converts a value into an object, mapping anything else to `None`.
#[must_use]
pub fn into_object(value: Value) -> Option<JsonObject> {
    match value {
        Value::Object(object) => Some(object),
        _ => None,
    }
}
