//! Transport layer abstraction.

use crate::error::{ClientError, ClientResult};
use crate::request::HttpMethod;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A signed HTTP request ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: Url,
    /// Extra headers, including the signature.
    pub headers: Vec<(String, String)>,
    /// Flattened parameters.
    pub params: Vec<(String, String)>,
}

impl HttpRequest {
    /// Returns the first parameter named `name`.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the first header named `name`, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status.
    pub status: u16,
    /// Raw body.
    pub body: String,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Sends signed requests over the network.
///
/// Implementations return an error only when no response was received.
/// Any HTTP status, including errors, is a successful send.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends a request and waits for the response.
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse>;
}

/// A scripted transport for tests.
///
/// Responses are looked up by URL path suffix. One-shot responses queued with
/// [`MockTransport::push_response`] are used first, then the sticky response
/// set with [`MockTransport::set_response`].
#[derive(Debug, Default)]
pub struct MockTransport {
    disconnected: AtomicBool,
    queued: Mutex<HashMap<String, VecDeque<ClientResult<HttpResponse>>>>,
    sticky: Mutex<HashMap<String, ClientResult<HttpResponse>>>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Creates a mock transport with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a one-shot response for paths ending with `resource`.
    pub fn push_response(&self, resource: &str, response: ClientResult<HttpResponse>) {
        self.queued
            .lock()
            .entry(resource.to_string())
            .or_default()
            .push_back(response);
    }

    /// Sets the response used once queued responses are exhausted.
    pub fn set_response(&self, resource: &str, response: ClientResult<HttpResponse>) {
        self.sticky.lock().insert(resource.to_string(), response);
    }

    /// Delays every response.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Makes every send fail with a retryable transport error.
    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    /// Requests sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Requests sent so far to paths ending with `resource`.
    pub fn requests_to(&self, resource: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.path().ends_with(resource))
            .cloned()
            .collect()
    }

    fn next_response(&self, path: &str) -> Option<ClientResult<HttpResponse>> {
        let queued = self
            .queued
            .lock()
            .iter_mut()
            .find(|(resource, responses)| path.ends_with(resource.as_str()) && !responses.is_empty())
            .and_then(|(_, responses)| responses.pop_front());
        queued.or_else(|| {
            self.sticky
                .lock()
                .iter()
                .find(|(resource, _)| path.ends_with(resource.as_str()))
                .map(|(_, response)| response.clone())
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        self.requests.lock().push(request.clone());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(ClientError::transport_retryable("not connected"));
        }
        self.next_response(request.url.path()).unwrap_or_else(|| {
            Err(ClientError::transport_fatal(format!(
                "no mock response for {} {}",
                request.method,
                request.url.path()
            )))
        })
    }
}
