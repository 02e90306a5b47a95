//! Per-identity access token cache.

use crate::error::ClientResult;
use parking_lot::{ReentrantMutex, RwLock};
use pushsync_core::Identity;
use pushsync_storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key prefix of credential records.
pub const CREDENTIALS_KEY_PREFIX: &str = "credentials/";

/// Credentials issued to one identity.
///
/// There is no expiry: a record is valid until the server rejects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenRecord {
    /// Access token sent with every authenticated request.
    pub token: String,
    /// Session identifier.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Installation the token is bound to.
    pub installation_id: String,
    /// User the token was issued for, as echoed by the server.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Caches credentials per identity and persists them in a [`KeyValueStore`].
///
/// The store also tracks an active identity. Code that must write on behalf
/// of another identity uses [`AccessTokenStore::with_identity`], which
/// switches, runs, and switches back under a reentrant lock.
pub struct AccessTokenStore {
    store: Arc<dyn KeyValueStore>,
    cache: RwLock<HashMap<Identity, Option<AccessTokenRecord>>>,
    active: RwLock<Identity>,
    switch: ReentrantMutex<()>,
}

impl std::fmt::Debug for AccessTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenStore")
            .field("active", &*self.active.read())
            .field("cached", &self.cache.read().len())
            .finish_non_exhaustive()
    }
}

fn storage_key(owner: &Identity) -> String {
    format!("{CREDENTIALS_KEY_PREFIX}{}", owner.as_key())
}

impl AccessTokenStore {
    /// Creates a store with the anonymous identity active.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            active: RwLock::new(Identity::anonymous()),
            switch: ReentrantMutex::new(()),
        }
    }

    /// Returns the credentials of `owner`, if any.
    pub fn get(&self, owner: &Identity) -> Option<AccessTokenRecord> {
        if let Some(cached) = self.cache.read().get(owner) {
            return cached.clone();
        }
        let loaded = self.load(owner);
        // An invalidation or store may have landed while loading; it wins.
        self.cache
            .write()
            .entry(owner.clone())
            .or_insert(loaded)
            .clone()
    }

    /// Returns the access token of `owner`, if any.
    pub fn access_token(&self, owner: &Identity) -> Option<String> {
        self.get(owner).map(|record| record.token)
    }

    /// Returns the installation id of `owner`, if any.
    pub fn installation_id(&self, owner: &Identity) -> Option<String> {
        self.get(owner).map(|record| record.installation_id)
    }

    fn load(&self, owner: &Identity) -> Option<AccessTokenRecord> {
        let raw = match self.store.get(&storage_key(owner)) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(owner = %owner, error = %e, "failed to read credentials");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(owner = %owner, error = %e, "ignoring unreadable credentials");
                None
            }
        }
    }

    /// Stores credentials for `owner`.
    ///
    /// The in-memory cache is updated even if persisting fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    pub fn store(&self, owner: &Identity, record: AccessTokenRecord) -> ClientResult<()> {
        let raw = serde_json::to_string(&record)?;
        self.cache.write().insert(owner.clone(), Some(record));
        self.store.put(&storage_key(owner), &raw)?;
        debug!(owner = %owner, "stored credentials");
        Ok(())
    }

    /// Forgets the token, session id and installation id of `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    pub fn invalidate(&self, owner: &Identity) -> ClientResult<()> {
        self.cache.write().insert(owner.clone(), None);
        self.store.remove(&storage_key(owner))?;
        debug!(owner = %owner, "invalidated credentials");
        Ok(())
    }

    /// The identity whose credentials are current.
    pub fn active_identity(&self) -> Identity {
        self.active.read().clone()
    }

    /// Makes `identity` active and returns the previously active one.
    pub fn set_active_identity(&self, identity: Identity) -> Identity {
        let _guard = self.switch.lock();
        std::mem::replace(&mut *self.active.write(), identity)
    }

    /// Credentials of the active identity.
    pub fn current(&self) -> Option<AccessTokenRecord> {
        self.get(&self.active_identity())
    }

    /// Stores credentials for the active identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    pub fn store_current(&self, record: AccessTokenRecord) -> ClientResult<()> {
        self.store(&self.active_identity(), record)
    }

    /// Runs `f` with `owner` active, then restores the previous identity.
    ///
    /// No other switch can interleave while `f` runs. `f` may switch again.
    pub fn with_identity<R>(&self, owner: &Identity, f: impl FnOnce(&Self) -> R) -> R {
        let _guard = self.switch.lock();
        let previous = std::mem::replace(&mut *self.active.write(), owner.clone());
        let result = f(self);
        *self.active.write() = previous;
        result
    }
}
