//! One synchronized object for one owner.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::patcher::{PatchSink, SyncKind};
use parking_lot::Mutex;
use pushsync_client::ConsentGate;
use pushsync_core::{Identity, JsonObject, PatchStart, SyncState};
use pushsync_storage::KeyValueStore;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of [`SyncEntity::perform_scheduled_patch_call`].
#[derive(Debug)]
pub enum PatchOutcome {
    /// No patch call was scheduled.
    NotScheduled,
    /// A call is in flight; the next one stays scheduled.
    AlreadyInFlight,
    /// Local and server state already agree; nothing was sent.
    NothingToSend,
    /// The server acknowledged the diff.
    Delivered,
    /// Sending failed; the writes are pending again and a new call is
    /// scheduled.
    Failed(EngineError),
}

impl PatchOutcome {
    /// Returns true if a diff reached the server.
    pub fn is_delivered(&self) -> bool {
        matches!(self, PatchOutcome::Delivered)
    }

    /// Returns true if a patch call was sent, whatever its result.
    pub fn dispatched(&self) -> bool {
        matches!(self, PatchOutcome::Delivered | PatchOutcome::Failed(_))
    }
}

#[derive(Debug, Default)]
struct Schedule {
    first_delayed_write: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    consent_waiter: Option<JoinHandle<()>>,
}

impl Schedule {
    fn cancel_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

pub(crate) struct EntityParts {
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) sink: Arc<dyn PatchSink>,
    pub(crate) consent: ConsentGate,
}

/// Keeps one object of one owner in sync with the server.
///
/// Every write goes through the immutable [`SyncState`] transitions, is
/// persisted, then schedules a debounced patch call. The call fires
/// [`EngineConfig::min_delay`] after the last write, but never later than
/// [`EngineConfig::max_delay`] after the first unflushed one. Without
/// consent nothing is scheduled until consent is granted.
///
/// Scheduling needs a Tokio runtime. Outside of one, writes are still
/// applied and persisted, and [`SyncEntity::flush`] sends them.
pub struct SyncEntity {
    owner: Identity,
    kind: SyncKind,
    storage_key: String,
    state: Mutex<Arc<SyncState>>,
    schedule: Mutex<Schedule>,
    parts: EntityParts,
    this: Weak<SyncEntity>,
}

impl std::fmt::Debug for SyncEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEntity")
            .field("owner", &self.owner)
            .field("kind", &self.kind)
            .field("phase", &self.state.lock().phase())
            .finish_non_exhaustive()
    }
}

impl SyncEntity {
    pub(crate) fn new(
        owner: Identity,
        kind: SyncKind,
        storage_key: String,
        state: SyncState,
        parts: EntityParts,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            owner,
            kind,
            storage_key,
            state: Mutex::new(Arc::new(state)),
            schedule: Mutex::new(Schedule::default()),
            parts,
            this: this.clone(),
        })
    }

    /// Owner of the object.
    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    /// Kind of the object.
    pub fn kind(&self) -> SyncKind {
        self.kind
    }

    /// Storage key the snapshot is written under.
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Current state.
    pub fn state(&self) -> Arc<SyncState> {
        Arc::clone(&self.state.lock())
    }

    /// Local desired value.
    pub fn sdk_state(&self) -> JsonObject {
        self.state.lock().sdk_state().clone()
    }

    /// Last value acknowledged by the server.
    pub fn server_state(&self) -> JsonObject {
        self.state.lock().server_state().clone()
    }

    /// Applies a local write and schedules a patch call.
    pub fn put(&self, diff: &JsonObject) {
        self.transition(|state| state.put(diff));
        self.schedule_patch_call();
    }

    /// Replaces the server state and schedules a patch call.
    pub fn receive_server_state(&self, server_state: &JsonObject) {
        self.transition(|state| state.receive_server_state(server_state));
        self.schedule_patch_call();
    }

    /// Replaces server and local state, keeping pending writes unless
    /// `reset_local` is set.
    pub fn receive_state(&self, state: &JsonObject, reset_local: bool) {
        self.transition(|current| current.receive_state(state, reset_local));
        self.schedule_patch_call();
    }

    /// Applies a diff the server already has.
    pub fn receive_diff(&self, diff: &JsonObject) {
        self.transition(|state| state.receive_diff(diff));
        self.schedule_patch_call();
    }

    /// Wipes the object, keeping migration bookkeeping. Any pending timer is
    /// cancelled.
    pub fn clear(&self) {
        {
            let mut schedule = self.schedule.lock();
            schedule.cancel_timer();
            schedule.first_delayed_write = None;
        }
        self.transition(SyncState::cleared);
        info!(owner = %self.owner, kind = %self.kind, "cleared sync state");
    }

    /// Cancels the debounce timer and runs the scheduled patch call now.
    pub async fn flush(&self) -> PatchOutcome {
        self.schedule.lock().cancel_timer();
        self.perform_scheduled_patch_call().await
    }

    /// Runs the scheduled patch call, if any.
    ///
    /// At most one call is in flight: while one is, this returns
    /// [`PatchOutcome::AlreadyInFlight`] and leaves the next call scheduled.
    /// When the call settles and work remains, a new call is scheduled.
    pub async fn perform_scheduled_patch_call(&self) -> PatchOutcome {
        let diff = {
            let mut state = self.state.lock();
            let (next, start) = state.begin_patch_call();
            match start {
                PatchStart::NotScheduled => return PatchOutcome::NotScheduled,
                // The pending call keeps its ceiling anchor.
                PatchStart::AlreadyInFlight => return PatchOutcome::AlreadyInFlight,
                PatchStart::NothingToSend => {
                    self.schedule.lock().first_delayed_write = None;
                    *state = Arc::new(next);
                    self.persist(&state);
                    return PatchOutcome::NothingToSend;
                }
                PatchStart::Dispatch(diff) => {
                    self.schedule.lock().first_delayed_write = None;
                    *state = Arc::new(next);
                    self.persist(&state);
                    diff
                }
            }
        };

        debug!(owner = %self.owner, kind = %self.kind, keys = diff.len(), "sending patch call");
        let result = self.parts.sink.patch(&self.owner, self.kind, &diff).await;

        let scheduled = {
            let mut state = self.state.lock();
            let next = match &result {
                Ok(()) => state.patch_succeeded(),
                Err(_) => state.patch_failed(),
            };
            *state = Arc::new(next);
            self.persist(&state);
            state.phase().is_scheduled()
        };
        if scheduled {
            self.schedule_patch_call();
        }

        match result {
            Ok(()) => {
                debug!(owner = %self.owner, kind = %self.kind, "patch call delivered");
                PatchOutcome::Delivered
            }
            Err(e) => {
                warn!(owner = %self.owner, kind = %self.kind, error = %e, "patch call failed, will retry");
                PatchOutcome::Failed(e)
            }
        }
    }

    /// Arms the debounce timer if a patch call is scheduled.
    ///
    /// Re-arming resets the quiet period but keeps the ceiling anchored at
    /// the first unflushed write. Without consent, a single waiter re-runs
    /// this once consent is granted.
    pub fn schedule_patch_call(&self) {
        if !self.state.lock().phase().is_scheduled() {
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            debug!(owner = %self.owner, kind = %self.kind, "no runtime, patch call waits for a flush");
            return;
        };

        let mut schedule = self.schedule.lock();
        schedule.cancel_timer();

        if !self.parts.consent.is_granted() {
            let waiting = schedule
                .consent_waiter
                .as_ref()
                .is_some_and(|waiter| !waiter.is_finished());
            if !waiting {
                debug!(owner = %self.owner, kind = %self.kind, "patch call deferred until consent");
                let consent = self.parts.consent.clone();
                schedule.consent_waiter = Some(runtime.spawn(async move {
                    consent.wait_granted().await;
                    debug!(owner = %this.owner, kind = %this.kind, "consent granted, scheduling patch call");
                    this.schedule_patch_call();
                }));
            }
            return;
        }

        let now = Instant::now();
        let first = *schedule.first_delayed_write.get_or_insert(now);
        let delay = self
            .parts
            .config
            .debounce_delay(now.saturating_duration_since(first));
        let generation = schedule.generation;
        schedule.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut schedule = this.schedule.lock();
                if schedule.generation != generation {
                    return;
                }
                schedule.timer = None;
            }
            this.perform_scheduled_patch_call().await;
        }));
    }

    fn transition(&self, f: impl FnOnce(&SyncState) -> SyncState) {
        let mut state = self.state.lock();
        *state = Arc::new(f(&**state));
        self.persist(&state);
    }

    fn persist(&self, state: &SyncState) {
        let written = state
            .snapshot()
            .to_json_string()
            .map_err(EngineError::from)
            .and_then(|raw| {
                self.parts
                    .store
                    .put(&self.storage_key, &raw)
                    .map_err(EngineError::from)
            });
        if let Err(e) = written {
            warn!(owner = %self.owner, kind = %self.kind, error = %e, "failed to persist sync state");
        }
    }
}
