//! API responses and error envelopes.

use crate::error::{ClientError, ClientResult};
use pushsync_core::JsonObject;
use serde_json::Value;

/// A successful API response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status.
    pub status: u16,
    /// Parsed JSON body.
    pub body: Value,
}

impl ApiResponse {
    /// Parses a raw HTTP response.
    ///
    /// A 2xx status gives a response; any other status is an error envelope
    /// `{error: {code, status, message}}`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MalformedResponse`] when the body is not a JSON
    /// object, and [`ClientError::Api`] for non-2xx statuses.
    pub fn parse(status: u16, raw_body: &str) -> ClientResult<Self> {
        let body = match serde_json::from_str::<Value>(raw_body) {
            Ok(value @ Value::Object(_)) => value,
            _ => {
                return Err(ClientError::MalformedResponse {
                    status,
                    body: raw_body.to_string(),
                })
            }
        };

        if (200..300).contains(&status) {
            return Ok(Self { status, body });
        }

        let error = body.get("error");
        Err(ClientError::Api {
            status,
            code: error.and_then(|e| e.get("code")).and_then(Value::as_i64),
            message: error
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string),
            body,
        })
    }

    /// The body as an object.
    #[must_use]
    pub fn object(&self) -> Option<&JsonObject> {
        self.body.as_object()
    }

    /// Returns true if the body carries `success: true`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.body.get("success").and_then(Value::as_bool) == Some(true)
    }

    /// Server clock at response time, in milliseconds since the epoch.
    #[must_use]
    pub fn server_time(&self) -> Option<i64> {
        server_time(&self.body)
    }

    /// Time the server spent handling the request, in milliseconds.
    #[must_use]
    pub fn server_took(&self) -> Option<i64> {
        server_took(&self.body)
    }

    /// Remote configuration version announced by the server.
    #[must_use]
    pub fn config_version(&self) -> Option<String> {
        config_version(&self.body)
    }
}

// Side channels are read from error envelopes too, hence the free functions.

pub(crate) fn server_time(body: &Value) -> Option<i64> {
    body.get("_serverTime").and_then(Value::as_i64)
}

pub(crate) fn server_took(body: &Value) -> Option<i64> {
    body.get("_serverTook").and_then(Value::as_i64)
}

pub(crate) fn config_version(body: &Value) -> Option<String> {
    match body.get("_configVersion")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
