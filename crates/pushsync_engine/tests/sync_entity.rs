//! Scheduling and reconciliation behavior of sync entities.

use async_trait::async_trait;
use parking_lot::Mutex;
use pushsync_client::ConsentGate;
use pushsync_core::{Identity, JsonObject, PatchPhase};
use pushsync_engine::{
    EngineConfig, EngineError, EngineResult, PatchOutcome, PatchSink, SyncKind, SyncRegistry,
};
use pushsync_storage::{InMemoryStore, KeyValueStore};
use pushsync_testkit::obj;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

struct ScriptedSink {
    calls: Mutex<Vec<(Identity, SyncKind, JsonObject)>>,
    results: Mutex<VecDeque<EngineResult<()>>>,
    hold: AtomicBool,
    release: Semaphore,
}

impl ScriptedSink {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            results: Mutex::new(VecDeque::new()),
            hold: AtomicBool::new(false),
            release: Semaphore::new(0),
        }
    }

    fn calls(&self) -> Vec<(Identity, SyncKind, JsonObject)> {
        self.calls.lock().clone()
    }

    fn diffs(&self) -> Vec<JsonObject> {
        self.calls().into_iter().map(|(_, _, diff)| diff).collect()
    }

    fn fail_next(&self, error: EngineError) {
        self.results.lock().push_back(Err(error));
    }

    fn hold(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    fn release_one(&self) {
        self.release.add_permits(1);
    }

    async fn wait_for_calls(&self, count: usize) {
        while self.calls.lock().len() < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl PatchSink for ScriptedSink {
    async fn patch(&self, owner: &Identity, kind: SyncKind, diff: &JsonObject) -> EngineResult<()> {
        self.calls.lock().push((owner.clone(), kind, diff.clone()));
        if self.hold.load(Ordering::SeqCst) {
            if let Ok(permit) = self.release.acquire().await {
                permit.forget();
            }
        }
        self.results.lock().pop_front().unwrap_or(Ok(()))
    }
}

struct Harness {
    registry: Arc<SyncRegistry>,
    sink: Arc<ScriptedSink>,
    store: Arc<InMemoryStore>,
    consent: ConsentGate,
}

fn harness_with(store: Arc<InMemoryStore>, kind: SyncKind, consent: bool) -> Harness {
    let sink = Arc::new(ScriptedSink::new());
    let consent = ConsentGate::new(consent);
    let registry = Arc::new(SyncRegistry::new(
        kind,
        EngineConfig::default(),
        Arc::clone(&store) as Arc<dyn KeyValueStore>,
        Arc::clone(&sink) as Arc<dyn PatchSink>,
        consent.clone(),
    ));
    Harness {
        registry,
        sink,
        store,
        consent,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(InMemoryStore::new()), SyncKind::InstallationCustom, true)
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn write_is_sent_after_quiet_period() {
    let h = harness();
    let entity = h.registry.for_owner(&Identity::anonymous());

    entity.put(&obj(json!({"age": 30})));
    assert_eq!(entity.state().phase(), PatchPhase::Scheduled);

    sleep_ms(4_900).await;
    assert!(h.sink.calls().is_empty());

    sleep_ms(200).await;
    assert_eq!(h.sink.diffs(), vec![obj(json!({"age": 30}))]);
    assert_eq!(entity.state().phase(), PatchPhase::Idle);
    assert_eq!(entity.server_state(), obj(json!({"age": 30})));
}

#[tokio::test(start_paused = true)]
async fn new_write_restarts_quiet_period() {
    let h = harness();
    let entity = h.registry.for_owner(&Identity::anonymous());

    entity.put(&obj(json!({"a": 1})));
    sleep_ms(3_000).await;
    entity.put(&obj(json!({"b": 2})));

    sleep_ms(4_900).await;
    assert!(h.sink.calls().is_empty());

    sleep_ms(200).await;
    assert_eq!(h.sink.diffs(), vec![obj(json!({"a": 1, "b": 2}))]);
}

#[tokio::test(start_paused = true)]
async fn steady_writes_are_flushed_at_the_ceiling() {
    let h = harness();
    let entity = h.registry.for_owner(&Identity::anonymous());

    for i in 0..5 {
        if i > 0 {
            sleep_ms(4_000).await;
        }
        let mut write = JsonObject::new();
        write.insert(format!("k{i}"), json!(i));
        entity.put(&write);
    }
    // Last write at 16 s, ceiling at 20 s.
    sleep_ms(3_900).await;
    assert!(h.sink.calls().is_empty());
    sleep_ms(200).await;
    assert_eq!(h.sink.calls().len(), 1);
    assert_eq!(h.sink.diffs()[0].len(), 5);
}

#[tokio::test(start_paused = true)]
async fn ceiling_survives_a_timer_firing_during_a_call() {
    let h = harness();
    h.sink.hold();
    let entity = h.registry.for_owner(&Identity::anonymous());
    let write = |i: u32| {
        let mut write = JsonObject::new();
        write.insert(format!("k{i}"), json!(i));
        write
    };

    entity.put(&write(0));
    sleep_ms(5_100).await;
    assert_eq!(h.sink.calls().len(), 1);

    // First pending write at 6 s. Its timer fires at 11 s while the call
    // is still held.
    sleep_ms(900).await;
    entity.put(&write(1));
    sleep_ms(5_500).await;
    assert_eq!(h.sink.calls().len(), 1);
    entity.put(&write(2));

    sleep_ms(500).await;
    h.sink.release_one();

    // Writes every 4 s from 16 s. The ceiling is 20 s after the 6 s write.
    for i in 3..6 {
        sleep_ms(4_000).await;
        entity.put(&write(i));
    }
    sleep_ms(1_900).await;
    assert_eq!(h.sink.calls().len(), 1);
    sleep_ms(200).await;
    assert_eq!(h.sink.calls().len(), 2);
    assert_eq!(h.sink.diffs()[1].len(), 5);
}

#[tokio::test(start_paused = true)]
async fn nothing_is_scheduled_without_consent() {
    let h = harness_with(Arc::new(InMemoryStore::new()), SyncKind::InstallationCustom, false);
    let entity = h.registry.for_owner(&Identity::user("alice"));

    entity.put(&obj(json!({"age": 30})));
    sleep_ms(60_000).await;
    assert!(h.sink.calls().is_empty());
    assert_eq!(entity.state().phase(), PatchPhase::Scheduled);

    h.consent.set(true);
    sleep_ms(4_900).await;
    assert!(h.sink.calls().is_empty());
    sleep_ms(200).await;
    assert_eq!(h.sink.calls().len(), 1);
    assert_eq!(h.sink.calls()[0].0, Identity::user("alice"));
}

#[tokio::test(start_paused = true)]
async fn flush_sends_immediately() {
    let h = harness();
    let entity = h.registry.for_owner(&Identity::anonymous());

    entity.put(&obj(json!({"age": 30})));
    let outcome = entity.flush().await;
    assert!(outcome.is_delivered());
    assert_eq!(h.sink.calls().len(), 1);

    // The debounce timer was cancelled.
    sleep_ms(30_000).await;
    assert_eq!(h.sink.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_call_while_in_flight_is_a_no_op() {
    let h = harness();
    h.sink.hold();
    let entity = h.registry.for_owner(&Identity::anonymous());
    entity.put(&obj(json!({"a": 1})));

    let first = tokio::spawn({
        let entity = Arc::clone(&entity);
        async move { entity.perform_scheduled_patch_call().await }
    });
    h.sink.wait_for_calls(1).await;

    let second = entity.perform_scheduled_patch_call().await;
    assert!(matches!(second, PatchOutcome::NotScheduled));
    assert_eq!(h.sink.calls().len(), 1);

    h.sink.release_one();
    assert!(first.await.unwrap().is_delivered());
}

#[tokio::test(start_paused = true)]
async fn write_during_failed_call_is_not_lost() {
    let h = harness();
    h.sink.hold();
    h.sink.fail_next(EngineError::Rejected("boom".into()));
    let entity = h.registry.for_owner(&Identity::anonymous());
    entity.put(&obj(json!({"a": 1})));

    let call = tokio::spawn({
        let entity = Arc::clone(&entity);
        async move { entity.flush().await }
    });
    h.sink.wait_for_calls(1).await;
    assert_eq!(entity.state().phase(), PatchPhase::InFlight);
    assert!(entity.state().put_accumulator().is_empty());

    entity.put(&obj(json!({"b": 2})));
    assert_eq!(entity.state().phase(), PatchPhase::InFlightAndScheduled);
    assert!(matches!(
        entity.perform_scheduled_patch_call().await,
        PatchOutcome::AlreadyInFlight
    ));

    h.sink.release_one();
    assert!(matches!(call.await.unwrap(), PatchOutcome::Failed(EngineError::Rejected(_))));

    let state = entity.state();
    assert_eq!(state.put_accumulator(), &obj(json!({"a": 1, "b": 2})));
    assert!(state.inflight_diff().is_empty());
    assert!(state.server_state().is_empty());
    assert_eq!(state.phase(), PatchPhase::Scheduled);

    // The rescheduled call delivers both writes.
    h.sink.release_one();
    sleep_ms(5_100).await;
    assert_eq!(h.sink.diffs()[1], obj(json!({"a": 1, "b": 2})));
    assert_eq!(entity.server_state(), obj(json!({"a": 1, "b": 2})));
    assert_eq!(entity.state().phase(), PatchPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn write_during_successful_call_is_sent_next() {
    let h = harness();
    h.sink.hold();
    let entity = h.registry.for_owner(&Identity::anonymous());
    entity.put(&obj(json!({"a": 1})));

    let call = tokio::spawn({
        let entity = Arc::clone(&entity);
        async move { entity.flush().await }
    });
    h.sink.wait_for_calls(1).await;
    entity.put(&obj(json!({"b": 2})));
    h.sink.release_one();
    assert!(call.await.unwrap().is_delivered());

    assert_eq!(entity.server_state(), obj(json!({"a": 1})));
    assert_eq!(entity.state().phase(), PatchPhase::Scheduled);

    h.sink.release_one();
    sleep_ms(5_100).await;
    assert_eq!(h.sink.diffs()[1], obj(json!({"b": 2})));
    assert_eq!(entity.server_state(), obj(json!({"a": 1, "b": 2})));
}

#[tokio::test(start_paused = true)]
async fn matching_states_send_nothing() {
    let h = harness();
    let entity = h.registry.for_owner(&Identity::anonymous());
    entity.receive_state(&obj(json!({"age": 30})), true);

    assert!(matches!(entity.flush().await, PatchOutcome::NothingToSend));
    assert!(h.sink.calls().is_empty());
    assert_eq!(entity.state().phase(), PatchPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn null_write_deletes_on_both_sides() {
    let h = harness();
    let entity = h.registry.for_owner(&Identity::anonymous());
    entity.receive_state(&obj(json!({"age": 30})), true);
    entity.flush().await;

    entity.put(&obj(json!({"age": null})));
    assert!(entity.sdk_state().is_empty());

    assert!(entity.flush().await.is_delivered());
    assert_eq!(h.sink.diffs(), vec![obj(json!({"age": null}))]);
    assert!(entity.server_state().is_empty());
}

#[tokio::test(start_paused = true)]
async fn received_diff_is_not_sent_back() {
    let h = harness();
    let entity = h.registry.for_owner(&Identity::anonymous());

    entity.receive_diff(&obj(json!({"tags": ["a"]})));
    assert_eq!(entity.sdk_state(), obj(json!({"tags": ["a"]})));
    assert!(matches!(entity.flush().await, PatchOutcome::NothingToSend));
    assert!(h.sink.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn server_state_change_is_reconciled() {
    let h = harness();
    let entity = h.registry.for_owner(&Identity::anonymous());
    entity.put(&obj(json!({"a": 1, "b": 2})));
    entity.flush().await;

    entity.receive_server_state(&obj(json!({"a": 1})));
    assert!(entity.flush().await.is_delivered());
    assert_eq!(h.sink.diffs()[1], obj(json!({"b": 2})));
}

#[tokio::test(start_paused = true)]
async fn state_is_persisted_after_each_write() {
    let h = harness();
    let owner = Identity::user("alice");
    let entity = h.registry.for_owner(&owner);
    entity.put(&obj(json!({"age": 30})));

    let raw = h.store.get(entity.storage_key()).unwrap().unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(snapshot["_syncStateVersion"], 2);
    assert_eq!(snapshot["sdkState"], json!({"age": 30}));
    assert_eq!(snapshot["putAccumulator"], json!({"age": 30}));
    assert_eq!(snapshot["scheduledPatchCall"], true);
    assert_eq!(snapshot["inflightPatchCall"], false);
    assert_eq!(entity.storage_key(), "sync/installationCustom/alice");
}

#[tokio::test(start_paused = true)]
async fn restore_resumes_an_interrupted_call() {
    let store = Arc::new(InMemoryStore::with_entries([(
        "sync/installationCustom/bob",
        json!({
            "_syncStateVersion": 2,
            "sdkState": {"a": 1, "b": 2},
            "serverState": {},
            "putAccumulator": {"b": 2},
            "inflightDiff": {"a": 1},
            "inflightPutAccumulator": {"a": 1},
            "scheduledPatchCall": false,
            "inflightPatchCall": true
        })
        .to_string(),
    )]));
    let h = harness_with(store, SyncKind::InstallationCustom, true);

    assert_eq!(h.registry.restore().unwrap(), 1);
    let entity = h.registry.for_owner(&Identity::user("bob"));
    let state = entity.state();
    assert_eq!(state.phase(), PatchPhase::Scheduled);
    assert_eq!(state.put_accumulator(), &obj(json!({"a": 1, "b": 2})));
    assert!(state.inflight_diff().is_empty());

    sleep_ms(5_100).await;
    assert_eq!(h.sink.diffs(), vec![obj(json!({"a": 1, "b": 2}))]);
    assert_eq!(entity.server_state(), obj(json!({"a": 1, "b": 2})));
}

#[tokio::test(start_paused = true)]
async fn unreadable_snapshot_starts_fresh() {
    let store = Arc::new(InMemoryStore::with_entries([
        ("sync/installationCustom/", "not json"),
        ("sync/installationCustom/carol", r#"{"_syncStateVersion": 99}"#),
    ]));
    let h = harness_with(store, SyncKind::InstallationCustom, true);

    assert_eq!(h.registry.restore().unwrap(), 2);
    for entity in h.registry.entities() {
        assert_eq!(entity.state().phase(), PatchPhase::Idle);
        assert!(entity.sdk_state().is_empty());
    }
    let mut owners = h.registry.owners();
    owners.sort_by(|a, b| a.as_key().cmp(b.as_key()));
    assert_eq!(owners, vec![Identity::anonymous(), Identity::user("carol")]);
}

#[tokio::test(start_paused = true)]
async fn missing_flags_default_to_a_pending_call() {
    let store = Arc::new(InMemoryStore::with_entries([(
        "sync/installationCustom/dave",
        json!({"sdkState": {"a": 1}, "serverState": {}, "putAccumulator": {"a": 1}}).to_string(),
    )]));
    let h = harness_with(store, SyncKind::InstallationCustom, true);
    h.registry.restore().unwrap();

    sleep_ms(5_100).await;
    assert_eq!(h.sink.diffs(), vec![obj(json!({"a": 1}))]);
}

#[tokio::test(start_paused = true)]
async fn installation_snapshots_are_nested_under_custom_once() {
    let store = Arc::new(InMemoryStore::with_entries([(
        "sync/installation/",
        json!({
            "sdkState": {"age": 30},
            "serverState": {"age": 30},
            "scheduledPatchCall": false
        })
        .to_string(),
    )]));
    let h = harness_with(Arc::clone(&store), SyncKind::Installation, true);
    h.registry.restore().unwrap();

    let entity = h.registry.for_owner(&Identity::anonymous());
    assert_eq!(entity.sdk_state(), obj(json!({"custom": {"age": 30}})));
    assert_eq!(entity.state().upgrade_meta()["version"], 1);

    entity.put(&obj(json!({"lang": "fr"})));
    let again = harness_with(store, SyncKind::Installation, true);
    let restored = again.registry.for_owner(&Identity::anonymous());
    assert_eq!(restored.sdk_state(), obj(json!({"custom": {"age": 30}, "lang": "fr"})));
}

#[tokio::test(start_paused = true)]
async fn fresh_state_keeps_its_shape_across_restarts() {
    for (kind, meta) in [
        (SyncKind::Installation, json!({"version": 1})),
        (SyncKind::InstallationCustom, json!({})),
    ] {
        let store = Arc::new(InMemoryStore::new());
        let h = harness_with(Arc::clone(&store), kind, false);
        let entity = h.registry.for_owner(&Identity::anonymous());
        entity.put(&obj(json!({"preferredLanguage": "fr"})));

        let raw = store.get(entity.storage_key()).unwrap().unwrap();
        let snapshot: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(snapshot["upgradeMeta"], meta, "{kind}");

        for _ in 0..2 {
            let again = harness_with(Arc::clone(&store), kind, false);
            let restored = again.registry.for_owner(&Identity::anonymous());
            assert_eq!(restored.sdk_state(), obj(json!({"preferredLanguage": "fr"})), "{kind}");
            assert_eq!(
                restored.state().put_accumulator(),
                &obj(json!({"preferredLanguage": "fr"})),
                "{kind}"
            );
            restored.put(&obj(json!({})));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn clear_wipes_state_and_cancels_timer() {
    let h = harness();
    let entity = h.registry.for_owner(&Identity::anonymous());
    entity.put(&obj(json!({"a": 1})));

    entity.clear();
    assert!(entity.sdk_state().is_empty());
    assert_eq!(entity.state().phase(), PatchPhase::Idle);

    sleep_ms(30_000).await;
    assert!(h.sink.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn flush_all_covers_every_owner() {
    let h = harness();
    h.registry.for_owner(&Identity::user("a")).put(&obj(json!({"x": 1})));
    h.registry.for_owner(&Identity::user("b")).put(&obj(json!({"y": 2})));
    h.registry.for_owner(&Identity::user("c"));

    let outcomes = h.registry.flush_all().await;
    assert_eq!(outcomes.len(), 3);
    let delivered = outcomes.iter().filter(|(_, o)| o.is_delivered()).count();
    assert_eq!(delivered, 2);
    assert_eq!(h.sink.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn consent_listener_flushes_on_grant() {
    let h = harness_with(Arc::new(InMemoryStore::new()), SyncKind::InstallationCustom, false);
    let listener = h.registry.spawn_consent_listener();
    h.registry.for_owner(&Identity::user("a")).put(&obj(json!({"x": 1})));

    sleep_ms(1_000).await;
    assert!(h.sink.calls().is_empty());

    h.consent.set(true);
    sleep_ms(10).await;
    assert_eq!(h.sink.calls().len(), 1);

    // The deferred timer finds nothing left to send.
    sleep_ms(10_000).await;
    assert_eq!(h.sink.calls().len(), 1);
    listener.abort();
}

#[test]
fn writes_without_a_runtime_are_kept_for_flush() {
    let h = harness();
    let entity = h.registry.for_owner(&Identity::anonymous());
    entity.put(&obj(json!({"a": 1})));
    assert_eq!(entity.state().phase(), PatchPhase::Scheduled);
    assert!(h.store.get(entity.storage_key()).unwrap().is_some());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    assert!(runtime.block_on(entity.flush()).is_delivered());
    assert_eq!(h.sink.diffs(), vec![obj(json!({"a": 1}))]);
}
