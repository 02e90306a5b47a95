//! Tests for the durable request vault.

use pushsync_client::{
    AccessTokenStore, ApiClient, ApiRequest, ClientConfig, ConsentGate, HttpMethod, HttpResponse, MockTransport,
    Params, RequestQueue, RequestVault, StoredRequestQueue, VaultConfig, VaultStep, ACCESS_TOKEN_RESOURCE,
};
use pushsync_core::Identity;
use pushsync_storage::{InMemoryStore, KeyValueStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn client() -> ApiClient<MockTransport> {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let client = ApiClient::new(
        ClientConfig::new("client", "secret").with_base_url("https://api.example.com/v1"),
        MockTransport::new(),
        Arc::new(AccessTokenStore::new(store)),
    );
    client.transport().set_response(
        ACCESS_TOKEN_RESOURCE,
        Ok(HttpResponse::new(
            200,
            json!({"token": "tok", "data": {"installationId": "inst"}}).to_string(),
        )),
    );
    client
}

fn vault(client: &ApiClient<MockTransport>, consent: &ConsentGate) -> Arc<RequestVault<MockTransport>> {
    let queue: Arc<dyn RequestQueue> =
        Arc::new(StoredRequestQueue::open(Arc::new(InMemoryStore::new())).unwrap());
    Arc::new(RequestVault::new(
        client.clone(),
        queue,
        consent.clone(),
        VaultConfig::default(),
    ))
}

fn event(name: &str) -> ApiRequest {
    ApiRequest::new(
        Identity::anonymous(),
        HttpMethod::Post,
        "/events",
        Params::new().with("body", json!({"type": name}).to_string()),
    )
}

#[tokio::test(start_paused = true)]
async fn due_job_is_delivered() {
    let client = client();
    client
        .transport()
        .set_response("/events", Ok(HttpResponse::new(200, "{}")));
    let vault = vault(&client, &ConsentGate::granted());

    vault.put(&event("open"), Duration::ZERO).unwrap();
    assert!(matches!(vault.execute_next().await.unwrap(), VaultStep::Delivered));
    assert!(vault.is_empty());
    assert!(matches!(vault.execute_next().await.unwrap(), VaultStep::Idle));

    let sent = client.transport().requests_to("/events");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].param("accessToken"), Some("tok"));
}

#[tokio::test(start_paused = true)]
async fn network_failures_back_off() {
    let client = client();
    let vault = vault(&client, &ConsentGate::granted());
    vault.put(&event("open"), Duration::ZERO).unwrap();
    client.transport().set_connected(false);

    match vault.execute_next().await.unwrap() {
        VaultStep::Requeued(delay) => assert_eq!(delay, Duration::from_secs(15)),
        other => panic!("unexpected step {other:?}"),
    }
    assert_eq!(vault.len(), 1);
    assert!(matches!(vault.execute_next().await.unwrap(), VaultStep::Idle));

    tokio::time::advance(Duration::from_secs(15)).await;
    match vault.execute_next().await.unwrap() {
        VaultStep::Requeued(delay) => assert_eq!(delay, Duration::from_millis(22_500)),
        other => panic!("unexpected step {other:?}"),
    }

    client.transport().set_connected(true);
    client
        .transport()
        .set_response("/events", Ok(HttpResponse::new(200, "{}")));
    tokio::time::advance(Duration::from_millis(22_500)).await;
    assert!(matches!(vault.execute_next().await.unwrap(), VaultStep::Delivered));
    assert_eq!(vault.current_backoff(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn server_errors_discard_the_job() {
    let client = client();
    client.transport().set_response(
        "/events",
        Ok(HttpResponse::new(
            400,
            json!({"error": {"status": 400, "code": 10001, "message": "bad"}}).to_string(),
        )),
    );
    let vault = vault(&client, &ConsentGate::granted());
    vault.put(&event("open"), Duration::ZERO).unwrap();

    match vault.execute_next().await.unwrap() {
        VaultStep::Discarded(e) => assert_eq!(e.code(), Some(10001)),
        other => panic!("unexpected step {other:?}"),
    }
    assert!(vault.is_empty());
}

#[tokio::test(start_paused = true)]
async fn jobs_wait_for_consent() {
    let client = client();
    client
        .transport()
        .set_response("/events", Ok(HttpResponse::new(200, "{}")));
    let consent = ConsentGate::new(false);
    let vault = vault(&client, &consent);
    vault.put(&event("open"), Duration::ZERO).unwrap();

    assert!(matches!(vault.execute_next().await.unwrap(), VaultStep::AwaitingConsent));
    assert_eq!(vault.len(), 1);

    let worker = vault.spawn();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(client.transport().requests().is_empty());

    consent.set(true);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(vault.is_empty());
    assert_eq!(client.transport().requests_to("/events").len(), 1);
    worker.abort();
}

#[tokio::test(start_paused = true)]
async fn worker_runs_delayed_jobs_when_due() {
    let client = client();
    client
        .transport()
        .set_response("/events", Ok(HttpResponse::new(200, "{}")));
    let vault = vault(&client, &ConsentGate::granted());
    let worker = vault.spawn();

    vault.put(&event("later"), Duration::from_secs(30)).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    vault.put(&event("now"), Duration::ZERO).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let sent = client.transport().requests_to("/events");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].param("body"), Some(r#"{"type":"now"}"#));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(client.transport().requests_to("/events").len(), 2);
    assert!(vault.is_empty());
    worker.abort();
}
