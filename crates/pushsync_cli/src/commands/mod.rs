//! CLI command implementations.

pub mod diff;
pub mod inspect;
pub mod merge;
pub mod sign;

use pushsync_core::JsonObject;
use std::path::Path;
use thiserror::Error;

/// Invalid command input.
#[derive(Debug, Error)]
pub enum InputError {
    /// A file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A file does not hold a JSON object.
    #[error("{path} does not hold a JSON object")]
    NotAnObject {
        /// File path.
        path: String,
    },

    /// A file holds invalid JSON.
    #[error("{path} holds invalid JSON: {source}")]
    Json {
        /// File path.
        path: String,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A parameter is not of the form `name=value`.
    #[error("invalid parameter {0:?}, expected name=value")]
    Param(String),

    /// The HTTP method is unknown.
    #[error("unknown HTTP method {0:?}")]
    Method(String),
}

/// Reads a JSON object from `path`.
pub fn read_object(path: &Path) -> Result<JsonObject, InputError> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: display.clone(),
        source,
    })?;
    match serde_json::from_str(&raw) {
        Ok(serde_json::Value::Object(object)) => Ok(object),
        Ok(_) => Err(InputError::NotAnObject { path: display }),
        Err(source) => Err(InputError::Json {
            path: display,
            source,
        }),
    }
}
