//! Key-value store trait definition.

use crate::error::StorageResult;

/// A persisted map from string keys to string values.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. All methods take `&self`; stores
/// handle their own interior locking so one instance can be shared behind an
/// `Arc` by every component that persists state.
///
/// # Durability
///
/// A successful [`put`](KeyValueStore::put) or
/// [`remove`](KeyValueStore::remove) must survive a process restart for
/// persistent stores. In-memory stores make no such promise.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be persisted. The previous value
    /// is kept in that case.
    fn put(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Lists the keys starting with `prefix`, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;
}
