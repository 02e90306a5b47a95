//! The set of synchronized objects of one kind, keyed by owner.

use crate::config::EngineConfig;
use crate::entity::{EntityParts, PatchOutcome, SyncEntity};
use crate::error::EngineResult;
use crate::patcher::{PatchSink, SyncKind};
use futures::future::join_all;
use parking_lot::Mutex;
use pushsync_client::ConsentGate;
use pushsync_core::{Identity, StateUpgrade, SyncSnapshot, SyncState};
use pushsync_storage::KeyValueStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Owns the [`SyncEntity`] of every owner for one [`SyncKind`].
///
/// Entities are created on first access, from their persisted snapshot when
/// one exists. The map lock is only held to look up or insert entries.
pub struct SyncRegistry {
    kind: SyncKind,
    config: EngineConfig,
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn PatchSink>,
    consent: ConsentGate,
    upgrade: Box<dyn StateUpgrade>,
    entities: Mutex<HashMap<Identity, Arc<SyncEntity>>>,
}

impl std::fmt::Debug for SyncRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRegistry")
            .field("kind", &self.kind)
            .field("config", &self.config)
            .field("entities", &self.entities.lock().len())
            .finish_non_exhaustive()
    }
}

impl SyncRegistry {
    /// Creates an empty registry.
    pub fn new(
        kind: SyncKind,
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn PatchSink>,
        consent: ConsentGate,
    ) -> Self {
        Self {
            upgrade: kind.upgrade(),
            kind,
            config,
            store,
            sink,
            consent,
            entities: Mutex::new(HashMap::new()),
        }
    }

    /// Kind of the objects in this registry.
    pub fn kind(&self) -> SyncKind {
        self.kind
    }

    /// Consent gate shared by every entity.
    pub fn consent(&self) -> &ConsentGate {
        &self.consent
    }

    fn key_prefix(&self) -> String {
        format!("{}{}/", self.config.key_prefix, self.kind.as_str())
    }

    /// Storage key of `owner`'s snapshot.
    pub fn storage_key(&self, owner: &Identity) -> String {
        format!("{}{}", self.key_prefix(), owner.as_key())
    }

    /// Returns the entity of `owner`, creating it if needed.
    ///
    /// A freshly loaded entity with a pending patch call gets its timer
    /// armed.
    pub fn for_owner(&self, owner: &Identity) -> Arc<SyncEntity> {
        if let Some(entity) = self.entities.lock().get(owner) {
            return Arc::clone(entity);
        }

        let storage_key = self.storage_key(owner);
        let state = self.load_state(owner, &storage_key);
        let candidate = SyncEntity::new(
            owner.clone(),
            self.kind,
            storage_key,
            state,
            EntityParts {
                config: self.config.clone(),
                store: Arc::clone(&self.store),
                sink: Arc::clone(&self.sink),
                consent: self.consent.clone(),
            },
        );

        let (entity, inserted) = {
            let mut entities = self.entities.lock();
            match entities.get(owner) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    entities.insert(owner.clone(), Arc::clone(&candidate));
                    (candidate, true)
                }
            }
        };
        if inserted {
            debug!(owner = %owner, kind = %self.kind, "sync entity created");
            entity.schedule_patch_call();
        }
        entity
    }

    fn load_state(&self, owner: &Identity, storage_key: &str) -> SyncState {
        let raw = match self.store.get(storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return SyncState::fresh(self.upgrade.as_ref()),
            Err(e) => {
                warn!(owner = %owner, kind = %self.kind, error = %e, "failed to read sync state, starting fresh");
                return SyncState::fresh(self.upgrade.as_ref());
            }
        };
        match SyncSnapshot::from_json_str(&raw) {
            Ok(snapshot) => SyncState::restore(snapshot, self.upgrade.as_ref()),
            Err(e) => {
                warn!(owner = %owner, kind = %self.kind, error = %e, "invalid sync state, starting fresh");
                SyncState::fresh(self.upgrade.as_ref())
            }
        }
    }

    /// Loads every persisted entity of this kind.
    ///
    /// Returns the number of entities now in the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub fn restore(&self) -> EngineResult<usize> {
        let prefix = self.key_prefix();
        let keys = self.store.keys_with_prefix(&prefix)?;
        for key in &keys {
            if let Some(owner_key) = key.strip_prefix(&prefix) {
                self.for_owner(&Identity::from_key(owner_key));
            }
        }
        let count = self.entities.lock().len();
        info!(kind = %self.kind, restored = keys.len(), "restored sync state");
        Ok(count)
    }

    /// Owners with an entity in the registry.
    pub fn owners(&self) -> Vec<Identity> {
        self.entities.lock().keys().cloned().collect()
    }

    /// Every entity in the registry.
    pub fn entities(&self) -> Vec<Arc<SyncEntity>> {
        self.entities.lock().values().cloned().collect()
    }

    /// Flushes every entity concurrently.
    pub async fn flush_all(&self) -> Vec<(Identity, PatchOutcome)> {
        let entities = self.entities();
        let outcomes = join_all(entities.iter().map(|entity| entity.flush())).await;
        entities
            .iter()
            .map(|entity| entity.owner().clone())
            .zip(outcomes)
            .collect()
    }

    /// Flushes every entity each time consent becomes granted.
    pub fn spawn_consent_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let mut consent = self.consent.subscribe();
        tokio::spawn(async move {
            while consent.changed().await.is_ok() {
                let granted = *consent.borrow_and_update();
                if granted {
                    debug!(kind = %registry.kind, "consent granted, flushing all entities");
                    registry.flush_all().await;
                }
            }
        })
    }
}
