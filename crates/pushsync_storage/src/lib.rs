//! # pushsync storage
//!
//! The persisted string map that sync snapshots, credentials and queued
//! requests are written to.
//!
//! Stores are **opaque string maps**: they do not interpret the values they
//! hold. Callers own the encoding of every value.
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral state
//! - [`FileStore`] - A single JSON document on disk, rewritten atomically
//!
//! ## Example
//!
//! ```rust
//! use pushsync_storage::{InMemoryStore, KeyValueStore};
//!
//! let store = InMemoryStore::new();
//! store.put("credentials/alice", "{}").unwrap();
//! assert_eq!(store.get("credentials/alice").unwrap().as_deref(), Some("{}"));
//! assert_eq!(store.keys_with_prefix("credentials/").unwrap(), vec!["credentials/alice"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::KeyValueStore;
