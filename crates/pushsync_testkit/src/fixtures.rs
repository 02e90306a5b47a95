//! API fixtures and client helpers.
//!
//! Response bodies mirror what the server sends, so tests can script a
//! [`MockTransport`] without spelling out JSON each time.

use pushsync_client::{
    AccessTokenStore, ApiClient, ClientConfig, HttpResponse, MockTransport, ACCESS_TOKEN_RESOURCE,
};
use pushsync_core::JsonObject;
use pushsync_storage::{InMemoryStore, KeyValueStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Client id used by fixture clients.
pub const TEST_CLIENT_ID: &str = "test-client";

/// Client secret used by fixture clients.
pub const TEST_CLIENT_SECRET: &str = "test-secret";

/// API root used by fixture clients.
pub const TEST_BASE_URL: &str = "https://api.test.invalid/v1";

/// Converts a JSON literal into an object.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn obj(value: Value) -> JsonObject {
    match value {
        Value::Object(object) => object,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// A successful access token response.
pub fn token_response(token: &str, installation_id: &str) -> HttpResponse {
    HttpResponse::new(
        200,
        json!({
            "token": token,
            "data": {"installationId": installation_id, "sid": format!("sid-{token}")}
        })
        .to_string(),
    )
}

/// An error envelope.
pub fn error_response(status: u16, code: i64, message: &str) -> HttpResponse {
    HttpResponse::new(
        status,
        json!({"error": {"status": status, "code": code, "message": message}}).to_string(),
    )
}

/// The "invalid access token" error.
pub fn invalid_token_response() -> HttpResponse {
    error_response(401, pushsync_client::ERROR_INVALID_ACCESS_TOKEN, "Invalid access token")
}

/// A patch acknowledgement.
pub fn patch_success() -> HttpResponse {
    HttpResponse::new(200, r#"{"success":true}"#)
}

/// A patch answer that does not acknowledge anything.
pub fn patch_refused() -> HttpResponse {
    HttpResponse::new(200, r#"{"success":false}"#)
}

/// Configuration of fixture clients.
pub fn test_config() -> ClientConfig {
    ClientConfig::new(TEST_CLIENT_ID, TEST_CLIENT_SECRET)
        .with_base_url(TEST_BASE_URL)
        .with_device_id("test-device")
        .with_sdk_version("Rust-test")
        .with_invalid_token_retry_delay(Duration::from_secs(1))
        .with_token_retry_interval(Duration::from_secs(30))
}

/// A client over a fresh [`MockTransport`] and in-memory store.
pub fn mock_client() -> ApiClient<MockTransport> {
    mock_client_with_store(Arc::new(InMemoryStore::new()))
}

/// A client over a fresh [`MockTransport`] persisting credentials in `store`.
pub fn mock_client_with_store(store: Arc<dyn KeyValueStore>) -> ApiClient<MockTransport> {
    ApiClient::new(
        test_config(),
        MockTransport::new(),
        Arc::new(AccessTokenStore::new(store)),
    )
}

/// A client whose transport issues tokens and acknowledges every patch.
pub fn scripted_client() -> ApiClient<MockTransport> {
    let client = mock_client();
    client
        .transport()
        .set_response(ACCESS_TOKEN_RESOURCE, Ok(token_response("token", "installation")));
    client
        .transport()
        .set_response("/installation", Ok(patch_success()));
    client
}
