//! Authenticated request runner.

use crate::config::ClientConfig;
use crate::credentials::{AccessTokenRecord, AccessTokenStore};
use crate::error::{ClientError, ClientResult};
use crate::params::Params;
use crate::request::{ApiRequest, HttpMethod};
use crate::response::{self, ApiResponse};
use crate::signer::{RequestSigner, AUTHORIZATION_HEADER};
use crate::time_sync::TimeSync;
use crate::transport::{HttpRequest, Transport};
use parking_lot::Mutex;
use pushsync_core::Identity;
use reqwest::Url;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Resource issuing access tokens.
pub const ACCESS_TOKEN_RESOURCE: &str = "/authentication/accessToken";

type TokenWaiter = oneshot::Sender<ClientResult<AccessTokenRecord>>;

struct ClientInner<T> {
    config: ClientConfig,
    transport: T,
    signer: RequestSigner,
    credentials: Arc<AccessTokenStore>,
    pending_tokens: Mutex<HashMap<Identity, Vec<TokenWaiter>>>,
    time_sync: TimeSync,
    config_version: watch::Sender<Option<String>>,
    disabled: AtomicBool,
}

/// Runs signed requests on behalf of owner identities.
///
/// [`ApiClient::execute`] attaches the owner's access token, fetching one
/// anonymously when none is cached, signs the request and sends it. When the
/// server rejects the token, the token is dropped and the request retried
/// after [`ClientConfig::invalid_token_retry_delay`]. Every other failure is
/// returned to the caller.
///
/// Cloning is cheap; clones share credentials, pending fetches and clocks.
pub struct ApiClient<T: Transport> {
    inner: Arc<ClientInner<T>>,
}

impl<T: Transport> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> std::fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url)
            .field("client_id", &self.inner.config.client_id)
            .field("disabled", &self.is_disabled())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ApiClient<T> {
    /// Creates a client.
    pub fn new(config: ClientConfig, transport: T, credentials: Arc<AccessTokenStore>) -> Self {
        let (config_version, _) = watch::channel(None);
        Self {
            inner: Arc::new(ClientInner {
                signer: RequestSigner::new(&config.client_secret),
                config,
                transport,
                credentials,
                pending_tokens: Mutex::new(HashMap::new()),
                time_sync: TimeSync::new(),
                config_version,
                disabled: AtomicBool::new(false),
            }),
        }
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Credential store.
    pub fn credentials(&self) -> &Arc<AccessTokenStore> {
        &self.inner.credentials
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Server clock estimate.
    pub fn time_sync(&self) -> &TimeSync {
        &self.inner.time_sync
    }

    /// Subscribes to the remote configuration version announced by the
    /// server.
    pub fn subscribe_config_version(&self) -> watch::Receiver<Option<String>> {
        self.inner.config_version.subscribe()
    }

    /// Disables or re-enables the client. A disabled client fails every
    /// request without touching the network.
    pub fn set_disabled(&self, disabled: bool) {
        self.inner.disabled.store(disabled, Ordering::SeqCst);
    }

    /// Returns true if the client is disabled.
    pub fn is_disabled(&self) -> bool {
        self.inner.disabled.load(Ordering::SeqCst)
    }

    /// Executes an authenticated request.
    ///
    /// # Errors
    ///
    /// Returns the first failure other than a rejected access token,
    /// including a failure to obtain a token.
    pub async fn execute(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        loop {
            let token = match self.inner.credentials.access_token(&request.owner) {
                Some(token) => token,
                None => self.fetch_anonymous_access_token(&request.owner, 0).await?.token,
            };

            let mut params = request.params.clone();
            params.put("accessToken", token);

            match self.send_signed(request.method, &request.resource, params).await {
                Err(e) if e.is_invalid_access_token() => {
                    warn!(
                        owner = %request.owner,
                        resource = %request.resource,
                        "access token rejected, retrying with a new one"
                    );
                    if let Err(e) = self.inner.credentials.invalidate(&request.owner) {
                        warn!(owner = %request.owner, error = %e, "failed to persist token invalidation");
                    }
                    tokio::time::sleep(self.inner.config.invalid_token_retry_delay).await;
                }
                other => return other,
            }
        }
    }

    /// Authenticated GET.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`].
    pub async fn get(&self, owner: &Identity, resource: &str, params: Params) -> ClientResult<ApiResponse> {
        self.execute(ApiRequest::new(owner.clone(), HttpMethod::Get, resource, params))
            .await
    }

    /// Authenticated POST.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`].
    pub async fn post(&self, owner: &Identity, resource: &str, params: Params) -> ClientResult<ApiResponse> {
        self.execute(ApiRequest::new(owner.clone(), HttpMethod::Post, resource, params))
            .await
    }

    /// Authenticated PUT.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`].
    pub async fn put(&self, owner: &Identity, resource: &str, params: Params) -> ClientResult<ApiResponse> {
        self.execute(ApiRequest::new(owner.clone(), HttpMethod::Put, resource, params))
            .await
    }

    /// Authenticated PATCH.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`].
    pub async fn patch(&self, owner: &Identity, resource: &str, params: Params) -> ClientResult<ApiResponse> {
        self.execute(ApiRequest::new(owner.clone(), HttpMethod::Patch, resource, params))
            .await
    }

    /// Authenticated DELETE.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`].
    pub async fn delete(&self, owner: &Identity, resource: &str, params: Params) -> ClientResult<ApiResponse> {
        self.execute(ApiRequest::new(owner.clone(), HttpMethod::Delete, resource, params))
            .await
    }

    /// Fetches an access token for `owner` unless one is cached.
    ///
    /// Returns true if a token was fetched.
    ///
    /// # Errors
    ///
    /// Returns the fetch failure once `retries` are exhausted.
    pub async fn fetch_anonymous_access_token_if_needed(&self, owner: &Identity, retries: u32) -> ClientResult<bool> {
        if self.inner.credentials.access_token(owner).is_some() {
            return Ok(false);
        }
        self.fetch_anonymous_access_token(owner, retries).await?;
        Ok(true)
    }

    /// Fetches and stores a new access token for `owner`.
    ///
    /// Concurrent calls for the same identity share a single fetch and all
    /// receive its outcome; `retries` of the call that started the fetch
    /// applies. Failed attempts are retried after
    /// [`ClientConfig::token_retry_interval`], except for rejected client
    /// credentials which are never retried.
    ///
    /// # Errors
    ///
    /// Returns the last failure.
    pub async fn fetch_anonymous_access_token(&self, owner: &Identity, retries: u32) -> ClientResult<AccessTokenRecord> {
        if self.is_disabled() {
            return Err(ClientError::Disabled);
        }

        let (sender, receiver) = oneshot::channel();
        let leader = {
            let mut pending = self.inner.pending_tokens.lock();
            match pending.get_mut(owner) {
                Some(waiters) => {
                    waiters.push(sender);
                    false
                }
                None => {
                    pending.insert(owner.clone(), vec![sender]);
                    true
                }
            }
        };

        if leader {
            let client = self.clone();
            let owner = owner.clone();
            tokio::spawn(async move {
                let result = client.fetch_token_with_retries(&owner, retries).await;
                let waiters = client
                    .inner
                    .pending_tokens
                    .lock()
                    .remove(&owner)
                    .unwrap_or_default();
                debug!(owner = %owner, waiters = waiters.len(), "access token fetch finished");
                for waiter in waiters {
                    let _ = waiter.send(result.clone());
                }
            });
        } else {
            debug!(owner = %owner, "joining access token fetch in progress");
        }

        receiver
            .await
            .map_err(|_| ClientError::Abandoned("access token fetch".into()))?
    }

    async fn fetch_token_with_retries(&self, owner: &Identity, retries: u32) -> ClientResult<AccessTokenRecord> {
        let mut remaining = retries;
        loop {
            match self.fetch_token_once(owner).await {
                Ok(record) => return Ok(record),
                Err(e) if e.is_invalid_credentials() => {
                    error!(error = %e, "invalid client credentials, check clientId and clientSecret");
                    return Err(e);
                }
                Err(ClientError::Disabled) => return Err(ClientError::Disabled),
                Err(e) if remaining > 0 => {
                    warn!(
                        owner = %owner,
                        error = %e,
                        retry_in = ?self.inner.config.token_retry_interval,
                        "failed to fetch access token"
                    );
                    remaining -= 1;
                    tokio::time::sleep(self.inner.config.token_retry_interval).await;
                }
                Err(e) => {
                    warn!(owner = %owner, error = %e, "giving up fetching access token");
                    return Err(e);
                }
            }
        }
    }

    async fn fetch_token_once(&self, owner: &Identity) -> ClientResult<AccessTokenRecord> {
        let config = &self.inner.config;
        let mut params = Params::new()
            .with("clientId", config.client_id.as_str())
            .with("devicePlatform", config.device_platform.as_str())
            .with("deviceModel", config.device_model.as_str());
        if let Some(device_id) = &config.device_id {
            params.put("deviceId", device_id.as_str());
        }
        if let Some(user_id) = owner.user_id() {
            params.put("userId", user_id);
        }

        let response = self
            .send_signed(HttpMethod::Post, ACCESS_TOKEN_RESOURCE, params)
            .await?;
        let record = parse_token_response(&response)?;

        let stored = self
            .inner
            .credentials
            .with_identity(owner, |store| store.store_current(record.clone()));
        if let Err(e) = stored {
            warn!(owner = %owner, error = %e, "failed to persist access token");
        }
        info!(owner = %owner, installation_id = %record.installation_id, "obtained access token");
        Ok(record)
    }

    /// Signs and sends a request without an access token.
    ///
    /// `sdkVersion` is added unless already present.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is disabled, nothing was received, the
    /// body is not a JSON object, or the server answered with an error.
    pub async fn send_signed(&self, method: HttpMethod, resource: &str, mut params: Params) -> ClientResult<ApiResponse> {
        if self.is_disabled() {
            return Err(ClientError::Disabled);
        }
        if !params.has("sdkVersion") {
            params.put("sdkVersion", self.inner.config.sdk_version.as_str());
        }

        let raw_url = format!("{}{}", self.inner.config.base_url, resource);
        let url = Url::parse(&raw_url)
            .map_err(|e| ClientError::InvalidRequest(format!("invalid URL {raw_url}: {e}")))?;
        let pairs = params.pairs();
        let signature = self.inner.signer.authorization_header(method, &url, &pairs)?;

        debug!(%method, resource, "sending signed request");
        let sent = Instant::now();
        let raw = self
            .inner
            .transport
            .send(HttpRequest {
                method,
                url,
                headers: vec![(AUTHORIZATION_HEADER.to_string(), signature)],
                params: pairs,
            })
            .await?;
        let received = Instant::now();

        let result = ApiResponse::parse(raw.status, &raw.body);
        match &result {
            Ok(response) => self.observe(&response.body, sent, received),
            Err(ClientError::MalformedResponse { status, body }) => {
                error!(%method, resource, status, body = %body, "malformed response");
            }
            Err(e) => {
                if let ClientError::Api { body, .. } = e {
                    self.observe(body, sent, received);
                }
                debug!(%method, resource, error = %e, "request failed");
            }
        }
        result
    }

    fn observe(&self, body: &Value, sent: Instant, received: Instant) {
        if let Some(server_time) = response::server_time(body) {
            self.inner.time_sync.record(
                sent,
                received,
                server_time,
                response::server_took(body).unwrap_or(0),
            );
        }
        if let Some(version) = response::config_version(body) {
            self.inner.config_version.send_if_modified(|current| {
                if current.as_deref() == Some(version.as_str()) {
                    false
                } else {
                    debug!(version = %version, "server announced configuration version");
                    *current = Some(version);
                    true
                }
            });
        }
    }
}

fn parse_token_response(response: &ApiResponse) -> ClientResult<AccessTokenRecord> {
    let malformed = || ClientError::MalformedResponse {
        status: response.status,
        body: response.body.to_string(),
    };
    let non_empty = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let data = response.body.get("data");
    let token = non_empty(response.body.get("token")).ok_or_else(malformed)?;
    let installation_id =
        non_empty(data.and_then(|d| d.get("installationId"))).ok_or_else(malformed)?;

    Ok(AccessTokenRecord {
        token,
        session_id: non_empty(data.and_then(|d| d.get("sid"))),
        installation_id,
        user_id: non_empty(data.and_then(|d| d.get("userId"))),
    })
}
