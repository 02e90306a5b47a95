//! Error types for the sync engine.

use pushsync_client::ClientError;
use pushsync_core::CoreError;
use pushsync_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while synchronizing.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The owner has not consented to data transmission.
    #[error("missing user consent")]
    MissingConsent,

    /// The server answered without acknowledging the patch.
    #[error("patch rejected by server: {0}")]
    Rejected(String),

    /// The request could not be completed.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Persisting state failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A snapshot could not be read or written.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Encoding the patch body failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Returns true if retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::MissingConsent => true,
            EngineError::Client(e) => e.is_retryable(),
            _ => false,
        }
    }
}
