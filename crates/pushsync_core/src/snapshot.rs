//! Persisted form of a [`SyncState`](crate::SyncState).

use crate::error::{CoreError, CoreResult};
use crate::json::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Snapshot format version written by this build.
///
/// - 0: no previous state
/// - 1: initial format
/// - 2: adds `upgradeMeta`, which older snapshots default to `{}`
pub const SYNC_STATE_VERSION: i64 = 2;

/// The JSON document persisted after every mutation of a sync state.
///
/// Absent object fields default to `{}`, `scheduledPatchCall` defaults to
/// `true` and `inflightPatchCall` to `false`, so an unknown saved state is
/// treated as having a flush pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    /// Format version.
    #[serde(rename = "_syncStateVersion", default)]
    pub version: i64,
    /// Client-side migration bookkeeping.
    #[serde(default)]
    pub upgrade_meta: JsonObject,
    /// Local desired state.
    #[serde(default)]
    pub sdk_state: JsonObject,
    /// Server acknowledged state.
    #[serde(default)]
    pub server_state: JsonObject,
    /// Local writes not yet confirmed delivered.
    #[serde(default)]
    pub put_accumulator: JsonObject,
    /// Diff in transit.
    #[serde(default)]
    pub inflight_diff: JsonObject,
    /// Accumulator captured when the in-flight call started.
    #[serde(default)]
    pub inflight_put_accumulator: JsonObject,
    /// Whether a patch call is pending.
    #[serde(default = "default_scheduled")]
    pub scheduled_patch_call: bool,
    /// Whether a patch call was in flight.
    #[serde(default)]
    pub inflight_patch_call: bool,
}

fn default_scheduled() -> bool {
    true
}

impl Default for SyncSnapshot {
    fn default() -> Self {
        Self {
            version: SYNC_STATE_VERSION,
            upgrade_meta: JsonObject::new(),
            sdk_state: JsonObject::new(),
            server_state: JsonObject::new(),
            put_accumulator: JsonObject::new(),
            inflight_diff: JsonObject::new(),
            inflight_put_accumulator: JsonObject::new(),
            scheduled_patch_call: false,
            inflight_patch_call: false,
        }
    }
}

impl SyncSnapshot {
    /// Decodes a snapshot from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an object, if a field has the
    /// wrong type, or if the snapshot comes from a newer format.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        if !value.is_object() {
            return Err(CoreError::InvalidSnapshot(format!(
                "expected a JSON object, got {value}"
            )));
        }
        let snapshot: Self = serde_json::from_value(value)?;
        if snapshot.version > SYNC_STATE_VERSION {
            return Err(CoreError::UnsupportedVersion {
                found: snapshot.version,
                latest: SYNC_STATE_VERSION,
            });
        }
        Ok(snapshot)
    }

    /// Decodes a snapshot from its serialized string form.
    ///
    /// # Errors
    ///
    /// See [`SyncSnapshot::from_value`].
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    /// Encodes the snapshot as a JSON value, stamped with the current version.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_value(&self) -> CoreResult<Value> {
        let mut stamped = self.clone();
        stamped.version = SYNC_STATE_VERSION;
        Ok(serde_json::to_value(stamped)?)
    }

    /// Encodes the snapshot as a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_string(&self) -> CoreResult<String> {
        Ok(self.to_value()?.to_string())
    }
}
