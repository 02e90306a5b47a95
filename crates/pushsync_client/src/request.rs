//! Logical API requests.

use crate::error::{ClientError, ClientResult};
use crate::params::Params;
use pushsync_core::{Identity, JsonObject};
use serde_json::{json, Value};
use std::fmt;

/// HTTP method of an API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET
    Get,
    /// PUT
    Put,
    /// POST
    Post,
    /// DELETE
    Delete,
    /// PATCH
    Patch,
}

impl HttpMethod {
    const ALL: [HttpMethod; 5] = [Self::Get, Self::Put, Self::Post, Self::Delete, Self::Patch];

    /// Uppercase method name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }

    /// Parses a method name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(name))
    }

    /// Maps the ordinal used by older persisted requests.
    #[must_use]
    pub fn from_ordinal(ordinal: u64) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    /// Returns true if parameters travel in the query string.
    #[must_use]
    pub fn uses_query_string(self) -> bool {
        matches!(self, Self::Get | Self::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request on behalf of an owner identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// Identity whose access token authenticates the request.
    pub owner: Identity,
    /// HTTP method.
    pub method: HttpMethod,
    /// Resource path relative to the API root, starting with `/`.
    pub resource: String,
    /// Request parameters.
    pub params: Params,
}

impl ApiRequest {
    /// Creates a request.
    pub fn new(owner: Identity, method: HttpMethod, resource: impl Into<String>, params: Params) -> Self {
        Self {
            owner,
            method,
            resource: resource.into(),
            params,
        }
    }

    /// Serializes the request for durable storage.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "userId": self.owner.user_id(),
            "method": self.method.as_str(),
            "resource": self.resource,
            "params": Value::Object(self.params.to_json()),
        })
    }

    /// Reads a request written by [`ApiRequest::to_json`].
    ///
    /// The method may be a name or an ordinal. A missing `userId` means the
    /// anonymous identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the method or resource is missing or invalid.
    pub fn from_json(value: &Value) -> ClientResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| ClientError::InvalidRequest("request is not a JSON object".into()))?;

        let owner = Identity::from_option(object.get("userId").and_then(Value::as_str));
        let method = match object.get("method") {
            Some(Value::String(name)) => HttpMethod::from_name(name),
            Some(Value::Number(n)) => n.as_u64().and_then(HttpMethod::from_ordinal),
            _ => None,
        }
        .ok_or_else(|| ClientError::InvalidRequest(format!("invalid method in {value}")))?;
        let resource = object
            .get("resource")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::InvalidRequest(format!("missing resource in {value}")))?;
        let params = object
            .get("params")
            .and_then(Value::as_object)
            .map(Params::from_json)
            .unwrap_or_default();

        Ok(Self::new(owner, method, resource, params))
    }

    /// Request body as a JSON object, when the `body` parameter holds one.
    #[must_use]
    pub fn json_body(&self) -> Option<JsonObject> {
        self.params
            .get("body")
            .and_then(|body| serde_json::from_str::<Value>(body).ok())
            .and_then(pushsync_core::json::into_object)
    }
}
