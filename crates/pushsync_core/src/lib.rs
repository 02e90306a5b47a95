//! # pushsync core
//!
//! Pure data model of the pushsync engine. Nothing in this crate performs I/O.
//!
//! This crate provides:
//! - JSON object diff, merge and null stripping ([`json`])
//! - The per-entity sync state machine ([`SyncState`])
//! - The persisted snapshot format ([`SyncSnapshot`]) and upgrade hooks
//! - Owner identities ([`Identity`])
//!
//! ## State machine
//!
//! A [`SyncState`] tracks four JSON objects for one synchronized object:
//!
//! - `server_state`: last value acknowledged by the server
//! - `sdk_state`: local desired value
//! - `put_accumulator`: local writes not yet confirmed delivered
//! - `inflight_diff`: the diff currently in transit
//!
//! Transitions never mutate a state in place. Each one returns a new value,
//! so readers can hold on to a snapshot while the owner moves forward.
//!
//! ## Key Invariants
//!
//! - `sdk_state == server_state + inflight_diff + put_accumulator`
//! - At most one patch call is in flight per state
//! - `inflight_diff` is empty unless a patch call is in flight
//! - `server_state` and `sdk_state` never contain nulls

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod identity;
pub mod json;
mod snapshot;
mod state;
mod upgrade;

pub use error::{CoreError, CoreResult};
pub use identity::Identity;
pub use json::JsonObject;
pub use snapshot::{SyncSnapshot, SYNC_STATE_VERSION};
pub use state::{PatchPhase, PatchStart, SyncState};
pub use upgrade::{NestUnderKey, NoUpgrade, StateUpgrade, UpgradeTargets, UPGRADE_META_VERSION_KEY};
