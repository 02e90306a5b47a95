//! Error types for the core crate.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while decoding persisted state.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A persisted snapshot could not be understood.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// The snapshot was written by a newer, incompatible version.
    #[error("unsupported snapshot version {found} (latest known is {latest})")]
    UnsupportedVersion {
        /// Version found in the snapshot.
        found: i64,
        /// Latest version this build understands.
        latest: i64,
    },

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let err = CoreError::UnsupportedVersion { found: 9, latest: 2 };
        assert_eq!(
            err.to_string(),
            "unsupported snapshot version 9 (latest known is 2)"
        );
        assert!(CoreError::InvalidSnapshot("not an object".into())
            .to_string()
            .contains("not an object"));
    }
}
