//! # pushsync engine
//!
//! Keeps locally written installation state eventually consistent with the
//! server.
//!
//! This crate provides:
//! - [`SyncEntity`]: one object of one owner, its persisted state and its
//!   debounced patch calls
//! - [`SyncRegistry`]: every entity of one kind, restored at startup
//! - [`InstallationPatcher`]: delivery of patch calls as `PATCH /installation`
//!
//! ## Architecture
//!
//! ```text
//! put(diff) ──► SyncState transition ──► snapshot persisted
//!                                           │
//!                    debounce timer ◄───────┘
//!                         │ (5 s quiet, 20 s ceiling, consent gated)
//!                         ▼
//!          perform_scheduled_patch_call ──► PatchSink
//!                         │
//!         success: diff folds into server state
//!         failure: writes go back to the accumulator, call rescheduled
//! ```
//!
//! ## Key Invariants
//!
//! - At most one patch call in flight per entity
//! - A write made during a call is never lost, whatever the call's result
//! - Nothing is sent, and no timer runs, while consent is withheld
//! - State is persisted after every transition

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entity;
mod error;
mod patcher;
mod registry;

pub use config::{EngineConfig, DEFAULT_KEY_PREFIX};
pub use entity::{PatchOutcome, SyncEntity};
pub use error::{EngineError, EngineResult};
pub use patcher::{InstallationPatcher, PatchSink, SyncKind, INSTALLATION_RESOURCE};
pub use registry::SyncRegistry;
