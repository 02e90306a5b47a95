//! Configuration for the API client.

use std::time::Duration;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.wonderpush.com/v1";

/// Configuration for [`ApiClient`](crate::ApiClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Client identifier.
    pub client_id: String,
    /// Client secret, used to sign every request.
    pub client_secret: String,
    /// API root, without trailing slash.
    pub base_url: String,
    /// Platform reported when fetching an access token.
    pub device_platform: String,
    /// Device model reported when fetching an access token.
    pub device_model: String,
    /// Stable device identifier, if known.
    pub device_id: Option<String>,
    /// Value of the `sdkVersion` parameter added to every request.
    pub sdk_version: String,
    /// User agent header.
    pub user_agent: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Delay before retrying a request whose access token was rejected.
    pub invalid_token_retry_delay: Duration,
    /// Delay between anonymous access token fetch attempts.
    pub token_retry_interval: Duration,
}

impl ClientConfig {
    /// Creates a configuration for the given client credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            device_platform: "Android".to_string(),
            device_model: std::env::consts::OS.to_string(),
            device_id: None,
            sdk_version: format!("Rust-{}", env!("CARGO_PKG_VERSION")),
            user_agent: format!("pushsync/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            invalid_token_retry_delay: Duration::from_secs(1),
            token_retry_interval: Duration::from_secs(30),
        }
    }

    /// Sets the API root. A trailing slash is ignored.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Sets the reported device platform.
    pub fn with_device_platform(mut self, platform: impl Into<String>) -> Self {
        self.device_platform = platform.into();
        self
    }

    /// Sets the reported device model.
    pub fn with_device_model(mut self, model: impl Into<String>) -> Self {
        self.device_model = model.into();
        self
    }

    /// Sets the device identifier.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Generates a random device identifier.
    pub fn with_random_device_id(mut self) -> Self {
        self.device_id = Some(uuid::Uuid::new_v4().to_string());
        self
    }

    /// Sets the SDK version parameter.
    pub fn with_sdk_version(mut self, version: impl Into<String>) -> Self {
        self.sdk_version = version.into();
        self
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the delay before retrying after an invalid access token.
    pub fn with_invalid_token_retry_delay(mut self, delay: Duration) -> Self {
        self.invalid_token_retry_delay = delay;
        self
    }

    /// Sets the delay between access token fetch attempts.
    pub fn with_token_retry_interval(mut self, interval: Duration) -> Self {
        self.token_retry_interval = interval;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_builder() {
        let config = ClientConfig::new("id", "secret")
            .with_base_url("http://localhost:8080/v1/")
            .with_device_id("device-1")
            .with_device_model("Pixel")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(config.client_id, "id");
        assert_eq!(config.client_secret, "secret");
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.device_id.as_deref(), Some("device-1"));
        assert_eq!(config.device_model, "Pixel");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.invalid_token_retry_delay, Duration::from_secs(1));
        assert_eq!(config.token_retry_interval, Duration::from_secs(30));
        assert!(config.device_id.is_none());
    }

    #[test]
    fn random_device_ids_differ() {
        let a = ClientConfig::default().with_random_device_id();
        let b = ClientConfig::default().with_random_device_id();
        assert_ne!(a.device_id, b.device_id);
    }
}
