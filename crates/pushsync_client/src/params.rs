//! Request parameter model.
//!
//! Parameters come in two flavours. Plain string parameters are kept sorted by
//! name and a later `put` replaces an earlier one. Structured parameters hold
//! maps, lists or multi-valued sets and are flattened after the plain ones
//! using `key[sub]` and `key[index]` names.

use pushsync_core::JsonObject;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// A structured parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// A single string.
    Text(String),
    /// Nested parameters, flattened as `key[name]`.
    Map(BTreeMap<String, ParamValue>),
    /// Ordered values, flattened as `key[index]`.
    List(Vec<ParamValue>),
    /// Unordered values, flattened by repeating `key`.
    Set(BTreeSet<String>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl ParamValue {
    fn flatten_into(&self, key: &str, out: &mut Vec<(String, String)>) {
        match self {
            Self::Text(text) => out.push((key.to_string(), text.clone())),
            Self::Map(map) => {
                for (name, value) in map {
                    value.flatten_into(&format!("{key}[{name}]"), out);
                }
            }
            Self::List(values) => {
                for (index, value) in values.iter().enumerate() {
                    value.flatten_into(&format!("{key}[{index}]"), out);
                }
            }
            Self::Set(values) => {
                out.extend(values.iter().map(|v| (key.to_string(), v.clone())));
            }
        }
    }
}

/// Parameters of an API request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    plain: BTreeMap<String, String>,
    structured: BTreeMap<String, ParamValue>,
}

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Params::put`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.put(key, value);
        self
    }

    /// Sets a plain string parameter, replacing a previous one.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.plain.insert(key.into(), value.into());
    }

    /// Sets a structured parameter, replacing a previous one.
    pub fn put_value(&mut self, key: impl Into<String>, value: ParamValue) {
        self.structured.insert(key.into(), value);
    }

    /// Adds a value to a multi-valued parameter.
    ///
    /// The parameter is created as a set when absent. Values added to a list
    /// are appended. Other structured values are left untouched.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let entry = self
            .structured
            .entry(key.into())
            .or_insert_with(|| ParamValue::Set(BTreeSet::new()));
        match entry {
            ParamValue::Set(values) => {
                values.insert(value.into());
            }
            ParamValue::List(values) => values.push(ParamValue::Text(value.into())),
            ParamValue::Text(_) | ParamValue::Map(_) => {}
        }
    }

    /// Removes a parameter of either flavour.
    pub fn remove(&mut self, key: &str) {
        self.plain.remove(key);
        self.structured.remove(key);
    }

    /// Returns true if a parameter of either flavour exists under `key`.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.plain.contains_key(key) || self.structured.contains_key(key)
    }

    /// Returns the plain string parameter under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.plain.get(key).map(String::as_str)
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plain.is_empty() && self.structured.is_empty()
    }

    /// Flattens the parameters into name/value pairs.
    ///
    /// Plain parameters come first in name order, then structured ones.
    #[must_use]
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .plain
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in &self.structured {
            value.flatten_into(key, &mut out);
        }
        out
    }

    /// Encodes the parameters as `application/x-www-form-urlencoded`.
    #[must_use]
    pub fn to_url_encoded(&self) -> String {
        self.pairs()
            .iter()
            .map(|(k, v)| format!("{}={}", form_encode(k), form_encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Stores the flattened pairs as a JSON object of strings.
    ///
    /// A name repeated by a set keeps only its last value.
    #[must_use]
    pub fn to_json(&self) -> JsonObject {
        self.pairs()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect()
    }

    /// Rebuilds plain parameters from [`Params::to_json`] output.
    ///
    /// Non-string values are kept in their JSON text form. Nulls are skipped.
    #[must_use]
    pub fn from_json(object: &JsonObject) -> Self {
        let mut params = Self::new();
        for (key, value) in object {
            match value {
                Value::Null => {}
                Value::String(s) => params.put(key.clone(), s.clone()),
                other => params.put(key.clone(), other.to_string()),
            }
        }
        params
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.put(k, v);
        }
        params
    }
}

/// Form encoding: space becomes `+`, `*` stays as is.
fn form_encode(s: &str) -> String {
    urlencoding::encode(s)
        .replace("%20", "+")
        .replace("%2A", "*")
        .replace('~', "%7E")
}
