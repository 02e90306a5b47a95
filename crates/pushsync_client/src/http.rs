//! HTTP transport backed by reqwest.

use crate::error::{ClientError, ClientResult};
use crate::request::HttpMethod;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Sends requests with a shared [`reqwest::Client`].
///
/// GET and DELETE carry their parameters in the query string. PUT, POST and
/// PATCH send them as a form body.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration, user_agent: &str) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ClientError::transport_fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        debug!(method = %request.method, url = %request.url, "sending request");

        let mut builder = self
            .client
            .request(reqwest_method(request.method), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = if request.method.uses_query_string() {
            builder.query(&request.params)
        } else {
            builder.form(&request.params)
        };

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::transport_retryable(format!("request failed: {e}")))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::transport_retryable(format!("failed to read body: {e}")))?;

        debug!(status, "received response");
        Ok(HttpResponse { status, body })
    }
}
