//! Error types for the API client.

use serde_json::Value;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Error code for an invalid or expired access token.
pub const ERROR_INVALID_ACCESS_TOKEN: i64 = 11003;

/// Error code for an invalid client id / client secret pair.
pub const ERROR_INVALID_CREDENTIALS: i64 = 11000;

/// Errors that can occur while talking to the API.
///
/// Errors are `Clone` so one outcome can be handed to every task waiting on
/// a shared access token fetch.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// No response was received.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with an error envelope.
    #[error("api error (status {status}, code {code:?}): {}", message.as_deref().unwrap_or("no message"))]
    Api {
        /// HTTP status.
        status: u16,
        /// Error code from the envelope.
        code: Option<i64>,
        /// Error message from the envelope.
        message: Option<String>,
        /// Full response body.
        body: Value,
    },

    /// The response could not be understood.
    #[error("malformed response (status {status}): {body}")]
    MalformedResponse {
        /// HTTP status.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The client was disabled; nothing was sent.
    #[error("client is disabled")]
    Disabled,

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Persisting state failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The task producing the result went away before answering.
    #[error("operation abandoned: {0}")]
    Abandoned(String),
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns the API error code, if the server sent one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => *code,
            _ => None,
        }
    }

    /// Returns true if the access token was rejected.
    pub fn is_invalid_access_token(&self) -> bool {
        self.code() == Some(ERROR_INVALID_ACCESS_TOKEN)
    }

    /// Returns true if the client credentials were rejected.
    pub fn is_invalid_credentials(&self) -> bool {
        self.code() == Some(ERROR_INVALID_CREDENTIALS)
    }

    /// Returns true if this error can be retried.
    ///
    /// Only transport failures are: the server never saw the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { retryable: true, .. })
    }
}

impl From<pushsync_storage::StorageError> for ClientError {
    fn from(err: pushsync_storage::StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}
