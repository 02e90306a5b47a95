//! Benchmark utilities.

use pushsync_core::JsonObject;
use serde_json::{json, Value};

/// Builds an object of `width` keys per level, `depth` levels deep.
///
/// Leaves alternate between numbers, strings and booleans.
pub fn nested_object(depth: usize, width: usize) -> JsonObject {
    (0..width)
        .map(|i| {
            let value = if depth <= 1 {
                match i % 3 {
                    0 => json!(i),
                    1 => json!(format!("value_{i}")),
                    _ => json!(i % 2 == 0),
                }
            } else {
                Value::Object(nested_object(depth - 1, width))
            };
            (format!("key_{i}"), value)
        })
        .collect()
}

/// Returns a copy of `base` where every `stride`th leaf is changed.
pub fn mutate_leaves(base: &JsonObject, stride: usize) -> JsonObject {
    let mut counter = 0;
    mutate(base, stride.max(1), &mut counter)
}

fn mutate(object: &JsonObject, stride: usize, counter: &mut usize) -> JsonObject {
    object
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Object(child) => Value::Object(mutate(child, stride, counter)),
                other => {
                    *counter += 1;
                    if *counter % stride == 0 {
                        json!(format!("changed_{counter}"))
                    } else {
                        other.clone()
                    }
                }
            };
            (key.clone(), value)
        })
        .collect()
}

/// A flat object of `count` custom properties, as an application would put.
pub fn custom_properties(count: usize) -> JsonObject {
    (0..count)
        .map(|i| (format!("string_prop{i}"), json!(format!("v{i}"))))
        .collect()
}
