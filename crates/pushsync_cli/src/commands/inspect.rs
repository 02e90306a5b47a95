//! Inspect command implementation.

use pushsync_client::{AccessTokenRecord, ApiRequest, CREDENTIALS_KEY_PREFIX, VAULT_KEY_PREFIX};
use pushsync_core::{PatchPhase, SyncSnapshot};
use pushsync_engine::DEFAULT_KEY_PREFIX;
use pushsync_storage::{FileStore, KeyValueStore};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Summary of a state file.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Path to the state file.
    pub path: String,
    /// Total number of keys.
    pub keys: usize,
    /// Persisted sync states.
    pub sync_states: Vec<SyncStateSummary>,
    /// Cached credentials.
    pub credentials: Vec<CredentialsSummary>,
    /// Queued requests.
    pub queued_requests: Vec<QueuedRequestSummary>,
    /// Keys that could not be decoded.
    pub unreadable: Vec<String>,
}

/// One persisted sync state.
#[derive(Debug, Serialize)]
pub struct SyncStateSummary {
    /// Storage key.
    pub key: String,
    /// Entity kind.
    pub kind: String,
    /// Owner identity, empty for the anonymous one.
    pub identity: String,
    /// Snapshot format version.
    pub version: i64,
    /// Patch call phase.
    pub phase: String,
    /// Top-level keys of the local state.
    pub sdk_keys: usize,
    /// Top-level keys written but not yet acknowledged.
    pub pending_keys: usize,
    /// Top-level keys of the diff in transit.
    pub inflight_keys: usize,
}

/// One cached credentials record.
#[derive(Debug, Serialize)]
pub struct CredentialsSummary {
    /// Storage key.
    pub key: String,
    /// Installation the token is bound to.
    pub installation_id: String,
    /// User the token was issued for.
    pub user_id: Option<String>,
    /// Token prefix, the rest masked.
    pub token: String,
}

/// One queued request.
#[derive(Debug, Serialize)]
pub struct QueuedRequestSummary {
    /// Storage key.
    pub key: String,
    /// HTTP method.
    pub method: String,
    /// Target resource.
    pub resource: String,
    /// Owner identity.
    pub owner: String,
    /// Earliest delivery time, in milliseconds since the epoch.
    pub not_before: i64,
}

fn phase_name(phase: PatchPhase) -> &'static str {
    match phase {
        PatchPhase::Idle => "idle",
        PatchPhase::Scheduled => "scheduled",
        PatchPhase::InFlight => "in-flight",
        PatchPhase::InFlightAndScheduled => "in-flight+scheduled",
    }
}

fn mask(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    if visible.len() == token.len() {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}

/// Reads a state file and summarizes its content.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("State file does not exist: {}", path.display()).into());
    }
    let store = FileStore::open(path)?;
    let keys = store.keys_with_prefix("")?;

    let mut result = InspectResult {
        path: path.display().to_string(),
        keys: keys.len(),
        sync_states: Vec::new(),
        credentials: Vec::new(),
        queued_requests: Vec::new(),
        unreadable: Vec::new(),
    };

    for key in keys {
        let Some(raw) = store.get(&key)? else {
            continue;
        };
        let decoded = if let Some(rest) = key.strip_prefix(DEFAULT_KEY_PREFIX) {
            let (kind, identity) = rest.split_once('/').unwrap_or((rest, ""));
            SyncSnapshot::from_json_str(&raw).ok().map(|snapshot| {
                result.sync_states.push(SyncStateSummary {
                    key: key.clone(),
                    kind: kind.to_string(),
                    identity: identity.to_string(),
                    version: snapshot.version,
                    phase: phase_name(PatchPhase::from_flags(
                        snapshot.scheduled_patch_call,
                        snapshot.inflight_patch_call,
                    ))
                    .to_string(),
                    sdk_keys: snapshot.sdk_state.len(),
                    pending_keys: snapshot.put_accumulator.len(),
                    inflight_keys: snapshot.inflight_diff.len(),
                });
            })
        } else if key.starts_with(CREDENTIALS_KEY_PREFIX) {
            serde_json::from_str::<AccessTokenRecord>(&raw)
                .ok()
                .map(|record| {
                    result.credentials.push(CredentialsSummary {
                        key: key.clone(),
                        installation_id: record.installation_id,
                        user_id: record.user_id,
                        token: mask(&record.token),
                    });
                })
        } else if key.starts_with(VAULT_KEY_PREFIX) {
            serde_json::from_str::<Value>(&raw).ok().and_then(|job| {
                let request = ApiRequest::from_json(job.get("request")?).ok()?;
                result.queued_requests.push(QueuedRequestSummary {
                    key: key.clone(),
                    method: request.method.as_str().to_string(),
                    resource: request.resource,
                    owner: request.owner.to_string(),
                    not_before: job.get("notBefore").and_then(Value::as_i64).unwrap_or(0),
                });
                Some(())
            })
        } else {
            Some(())
        };
        if decoded.is_none() {
            result.unreadable.push(key);
        }
    }

    Ok(result)
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("State file: {}", result.path);
    println!("Keys: {}", result.keys);

    println!();
    println!("Sync states: {}", result.sync_states.len());
    for state in &result.sync_states {
        println!(
            "  {} [{}] v{} {} (sdk keys: {}, pending: {}, in flight: {})",
            state.kind,
            if state.identity.is_empty() { "anonymous" } else { &state.identity },
            state.version,
            state.phase,
            state.sdk_keys,
            state.pending_keys,
            state.inflight_keys
        );
    }

    println!();
    println!("Credentials: {}", result.credentials.len());
    for credentials in &result.credentials {
        println!(
            "  {} installation={} user={} token={}",
            credentials.key,
            credentials.installation_id,
            credentials.user_id.as_deref().unwrap_or("-"),
            credentials.token
        );
    }

    println!();
    println!("Queued requests: {}", result.queued_requests.len());
    for request in &result.queued_requests {
        println!(
            "  {} {} {} owner={} notBefore={}",
            request.key, request.method, request.resource, request.owner, request.not_before
        );
    }

    if !result.unreadable.is_empty() {
        println!();
        println!("Unreadable keys:");
        for key in &result.unreadable {
            println!("  {key}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_tokens() {
        assert_eq!(mask("abcdefgh"), "abcd****");
        assert_eq!(mask("abc"), "****");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(inspect(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn summarizes_each_kind_of_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let store = FileStore::open(&path).unwrap();
            store
                .put(
                    "sync/installationCustom/alice",
                    r#"{"_syncStateVersion":2,"sdkState":{"a":1,"b":2},"putAccumulator":{"b":2},"scheduledPatchCall":true,"inflightPatchCall":false}"#,
                )
                .unwrap();
            store.put("sync/installation/", "not json").unwrap();
            store
                .put(
                    "credentials/alice",
                    r#"{"token":"abcdefgh","installationId":"inst","userId":"alice"}"#,
                )
                .unwrap();
            store
                .put(
                    "vault/00000000000000000001",
                    r#"{"request":{"userId":null,"method":"POST","resource":"/events","params":{}},"notBefore":42}"#,
                )
                .unwrap();
            store.put("other", "x").unwrap();
        }

        let result = inspect(&path).unwrap();
        assert_eq!(result.keys, 5);

        assert_eq!(result.sync_states.len(), 1);
        let state = &result.sync_states[0];
        assert_eq!(state.key, "sync/installationCustom/alice");
        assert_eq!(state.kind, "installationCustom");
        assert_eq!(state.identity, "alice");
        assert_eq!(state.phase, "scheduled");
        assert_eq!(state.sdk_keys, 2);
        assert_eq!(state.pending_keys, 1);

        assert_eq!(result.credentials.len(), 1);
        assert_eq!(result.credentials[0].installation_id, "inst");
        assert_eq!(result.credentials[0].token, "abcd****");

        assert_eq!(result.queued_requests.len(), 1);
        assert_eq!(result.queued_requests[0].method, "POST");
        assert_eq!(result.queued_requests[0].not_before, 42);

        assert_eq!(result.unreadable, vec!["sync/installation/".to_string()]);
    }
}
