//! Per-entity sync state machine.

use crate::json::{self, JsonObject};
use crate::snapshot::{SyncSnapshot, SYNC_STATE_VERSION};
use crate::upgrade::{StateUpgrade, UpgradeTargets};
use tracing::{debug, warn};

/// Scheduling phase of a sync state.
///
/// A write arriving while a patch call is in flight moves the state to
/// [`PatchPhase::InFlightAndScheduled`]: the current attempt keeps running
/// and another one follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatchPhase {
    /// Nothing to do.
    #[default]
    Idle,
    /// A patch call should be performed.
    Scheduled,
    /// A patch call is in flight.
    InFlight,
    /// A patch call is in flight and another one is pending.
    InFlightAndScheduled,
}

impl PatchPhase {
    /// Builds a phase from the two persisted flags.
    #[must_use]
    pub fn from_flags(scheduled: bool, in_flight: bool) -> Self {
        match (scheduled, in_flight) {
            (false, false) => Self::Idle,
            (true, false) => Self::Scheduled,
            (false, true) => Self::InFlight,
            (true, true) => Self::InFlightAndScheduled,
        }
    }

    /// Returns true if a patch call is pending.
    #[must_use]
    pub fn is_scheduled(self) -> bool {
        matches!(self, Self::Scheduled | Self::InFlightAndScheduled)
    }

    /// Returns true if a patch call is in flight.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::InFlight | Self::InFlightAndScheduled)
    }

    fn schedule(self) -> Self {
        match self {
            Self::Idle | Self::Scheduled => Self::Scheduled,
            Self::InFlight | Self::InFlightAndScheduled => Self::InFlightAndScheduled,
        }
    }

    fn land(self) -> Self {
        match self {
            Self::InFlightAndScheduled | Self::Scheduled => Self::Scheduled,
            Self::InFlight | Self::Idle => Self::Idle,
        }
    }
}

/// What [`SyncState::begin_patch_call`] decided.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchStart {
    /// No patch call was scheduled.
    NotScheduled,
    /// A call is already in flight; the pending one stays scheduled.
    AlreadyInFlight,
    /// Server and local state agree; nothing is sent.
    NothingToSend,
    /// Send this diff to the server.
    Dispatch(JsonObject),
}

/// The state of one synchronized JSON object.
///
/// Transitions take `&self` and return the next state, so a caller holding a
/// state value never observes it change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    sdk_state: JsonObject,
    server_state: JsonObject,
    put_accumulator: JsonObject,
    inflight_diff: JsonObject,
    inflight_put_accumulator: JsonObject,
    upgrade_meta: JsonObject,
    phase: PatchPhase,
}

impl SyncState {
    /// Creates an empty, idle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty, idle state that `upgrade` has already seen.
    ///
    /// Migrations record themselves in the upgrade meta, so a later restore
    /// of this state does not migrate it again.
    #[must_use]
    pub fn fresh(upgrade: &dyn StateUpgrade) -> Self {
        let mut state = Self::default();
        upgrade.upgrade(
            &mut state.upgrade_meta,
            UpgradeTargets {
                sdk_state: &mut state.sdk_state,
                server_state: &mut state.server_state,
                put_accumulator: &mut state.put_accumulator,
                inflight_diff: &mut state.inflight_diff,
                inflight_put_accumulator: &mut state.inflight_put_accumulator,
            },
        );
        state
    }

    /// Creates a state from a known local and server value.
    ///
    /// The difference between the two becomes pending work.
    #[must_use]
    pub fn from_sdk_and_server_state(sdk_state: &JsonObject, server_state: &JsonObject) -> Self {
        let mut sdk_state = sdk_state.clone();
        let mut server_state = server_state.clone();
        json::strip_nulls(&mut sdk_state);
        json::strip_nulls(&mut server_state);
        Self {
            put_accumulator: json::diff(&server_state, &sdk_state),
            sdk_state,
            server_state,
            phase: PatchPhase::Scheduled,
            ..Self::default()
        }
    }

    /// Restores a state from a persisted snapshot.
    ///
    /// Nulls are stripped from the server and local state, then `upgrade`
    /// runs. A snapshot taken while a patch call was in flight is treated as
    /// a failed call: its writes go back to the accumulator and a new call
    /// is scheduled.
    #[must_use]
    pub fn restore(snapshot: SyncSnapshot, upgrade: &dyn StateUpgrade) -> Self {
        let SyncSnapshot {
            mut upgrade_meta,
            mut sdk_state,
            mut server_state,
            mut put_accumulator,
            mut inflight_diff,
            mut inflight_put_accumulator,
            scheduled_patch_call,
            inflight_patch_call,
            ..
        } = snapshot;

        json::strip_nulls(&mut sdk_state);
        json::strip_nulls(&mut server_state);

        upgrade.upgrade(
            &mut upgrade_meta,
            UpgradeTargets {
                sdk_state: &mut sdk_state,
                server_state: &mut server_state,
                put_accumulator: &mut put_accumulator,
                inflight_diff: &mut inflight_diff,
                inflight_put_accumulator: &mut inflight_put_accumulator,
            },
        );

        let state = Self {
            sdk_state,
            server_state,
            put_accumulator,
            inflight_diff,
            inflight_put_accumulator,
            upgrade_meta,
            phase: PatchPhase::from_flags(scheduled_patch_call, inflight_patch_call),
        };

        if state.phase.is_in_flight() {
            warn!("restored sync state had a patch call in flight, treating it as failed");
            state.patch_failed()
        } else {
            state
        }
    }

    /// Captures the state in its persisted form.
    #[must_use]
    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            version: SYNC_STATE_VERSION,
            upgrade_meta: self.upgrade_meta.clone(),
            sdk_state: self.sdk_state.clone(),
            server_state: self.server_state.clone(),
            put_accumulator: self.put_accumulator.clone(),
            inflight_diff: self.inflight_diff.clone(),
            inflight_put_accumulator: self.inflight_put_accumulator.clone(),
            scheduled_patch_call: self.phase.is_scheduled(),
            inflight_patch_call: self.phase.is_in_flight(),
        }
    }

    /// Local desired state.
    pub fn sdk_state(&self) -> &JsonObject {
        &self.sdk_state
    }

    /// Last state acknowledged by the server.
    pub fn server_state(&self) -> &JsonObject {
        &self.server_state
    }

    /// Local writes not yet confirmed delivered.
    pub fn put_accumulator(&self) -> &JsonObject {
        &self.put_accumulator
    }

    /// Diff currently in transit.
    pub fn inflight_diff(&self) -> &JsonObject {
        &self.inflight_diff
    }

    /// Accumulator captured when the in-flight call started.
    pub fn inflight_put_accumulator(&self) -> &JsonObject {
        &self.inflight_put_accumulator
    }

    /// Migration bookkeeping.
    pub fn upgrade_meta(&self) -> &JsonObject {
        &self.upgrade_meta
    }

    /// Current scheduling phase.
    pub fn phase(&self) -> PatchPhase {
        self.phase
    }

    /// Applies a local write.
    ///
    /// `diff` lands in the local state (nulls delete) and in the accumulator
    /// (nulls kept as delete markers), then a patch call is scheduled.
    #[must_use]
    pub fn put(&self, diff: &JsonObject) -> Self {
        let mut next = self.clone();
        json::merge(&mut next.sdk_state, diff, true);
        json::merge(&mut next.put_accumulator, diff, false);
        next.phase = next.phase.schedule();
        next
    }

    /// Replaces the server state. The outstanding diff is recomputed on the
    /// next patch call.
    #[must_use]
    pub fn receive_server_state(&self, server_state: &JsonObject) -> Self {
        let mut next = self.clone();
        next.server_state = server_state.clone();
        json::strip_nulls(&mut next.server_state);
        next.phase = next.phase.schedule();
        next
    }

    /// Replaces both server and local state with `state`.
    ///
    /// With `reset_local`, pending writes are dropped. Otherwise the
    /// in-flight diff then the accumulator are replayed on top of the new
    /// local state.
    #[must_use]
    pub fn receive_state(&self, state: &JsonObject, reset_local: bool) -> Self {
        let mut next = self.clone();
        let mut state = state.clone();
        json::strip_nulls(&mut state);
        next.server_state = state.clone();
        next.sdk_state = state;
        if reset_local {
            next.put_accumulator.clear();
        } else {
            json::merge(&mut next.sdk_state, &self.inflight_diff, true);
            json::merge(&mut next.sdk_state, &self.put_accumulator, true);
        }
        next.phase = next.phase.schedule();
        next
    }

    /// Applies a diff the server already knows about.
    #[must_use]
    pub fn receive_diff(&self, diff: &JsonObject) -> Self {
        let mut next = self.clone();
        json::merge(&mut next.server_state, diff, true);
        next.put(diff)
    }

    /// Starts a patch call if one is scheduled and none is in flight.
    #[must_use]
    pub fn begin_patch_call(&self) -> (Self, PatchStart) {
        match self.phase {
            PatchPhase::Idle | PatchPhase::InFlight => (self.clone(), PatchStart::NotScheduled),
            PatchPhase::InFlightAndScheduled => {
                debug!("patch call already in flight, keeping the next one scheduled");
                (self.clone(), PatchStart::AlreadyInFlight)
            }
            PatchPhase::Scheduled => {
                let mut next = self.clone();
                next.phase = PatchPhase::Idle;
                let diff = json::diff(&next.server_state, &next.sdk_state);
                if diff.is_empty() {
                    debug!("no difference with the server state, skipping patch call");
                    next.inflight_diff.clear();
                    next.put_accumulator.clear();
                    return (next, PatchStart::NothingToSend);
                }
                next.inflight_diff = diff.clone();
                next.inflight_put_accumulator = std::mem::take(&mut next.put_accumulator);
                next.phase = PatchPhase::InFlight;
                (next, PatchStart::Dispatch(diff))
            }
        }
    }

    /// Records a successful patch call: the in-flight diff is now server
    /// state.
    #[must_use]
    pub fn patch_succeeded(&self) -> Self {
        if !self.phase.is_in_flight() {
            warn!(phase = ?self.phase, "patch success reported with no call in flight");
            return self.clone();
        }
        let mut next = self.clone();
        json::merge(&mut next.server_state, &self.inflight_diff, true);
        next.inflight_diff.clear();
        next.inflight_put_accumulator.clear();
        next.phase = next.phase.land();
        next
    }

    /// Records a failed patch call.
    ///
    /// Writes captured when the call started go back into the accumulator,
    /// beneath any write made since. A new call is always scheduled.
    #[must_use]
    pub fn patch_failed(&self) -> Self {
        if !self.phase.is_in_flight() {
            warn!(phase = ?self.phase, "patch failure reported with no call in flight");
            return self.clone();
        }
        let mut next = self.clone();
        let mut accumulator = std::mem::take(&mut next.inflight_put_accumulator);
        json::merge(&mut accumulator, &self.put_accumulator, false);
        next.put_accumulator = accumulator;
        next.inflight_diff.clear();
        next.phase = PatchPhase::Scheduled;
        next
    }

    /// Returns an empty state that keeps the migration bookkeeping.
    ///
    /// Used when the owning identity's data is wiped.
    #[must_use]
    pub fn cleared(&self) -> Self {
        Self {
            upgrade_meta: self.upgrade_meta.clone(),
            ..Self::default()
        }
    }
}
