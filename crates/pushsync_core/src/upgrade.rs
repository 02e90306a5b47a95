//! Client-side migrations applied to restored sync state.

use crate::json::JsonObject;
use serde_json::Value;

/// Key inside `upgradeMeta` that records the applied migration version.
pub const UPGRADE_META_VERSION_KEY: &str = "version";

/// The state objects a migration may rewrite.
#[derive(Debug)]
pub struct UpgradeTargets<'a> {
    /// Local desired state.
    pub sdk_state: &'a mut JsonObject,
    /// Server acknowledged state.
    pub server_state: &'a mut JsonObject,
    /// Pending writes.
    pub put_accumulator: &'a mut JsonObject,
    /// Diff in transit.
    pub inflight_diff: &'a mut JsonObject,
    /// Pending writes captured when the in-flight call started.
    pub inflight_put_accumulator: &'a mut JsonObject,
}

impl UpgradeTargets<'_> {
    /// Applies `f` to every state object.
    pub fn for_each(&mut self, mut f: impl FnMut(&mut JsonObject)) {
        f(self.sdk_state);
        f(self.server_state);
        f(self.put_accumulator);
        f(self.inflight_diff);
        f(self.inflight_put_accumulator);
    }
}

/// A migration hook run every time a state is restored from a snapshot.
///
/// Implementations inspect `upgrade_meta` to decide whether they already ran
/// and record their progress there.
pub trait StateUpgrade: Send + Sync {
    /// Rewrites the restored objects in place.
    fn upgrade(&self, upgrade_meta: &mut JsonObject, targets: UpgradeTargets<'_>);
}

/// Leaves restored state untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUpgrade;

impl StateUpgrade for NoUpgrade {
    fn upgrade(&self, _upgrade_meta: &mut JsonObject, _targets: UpgradeTargets<'_>) {}
}

/// Moves every top-level key of every state object under a single key.
///
/// Used when an entity that only tracked custom properties becomes the full
/// installation: `{"age": 30}` becomes `{"custom": {"age": 30}}`. Runs once,
/// when `upgradeMeta.version` is below [`NestUnderKey::VERSION`]. Empty
/// objects stay empty.
#[derive(Debug, Clone)]
pub struct NestUnderKey {
    key: String,
}

impl NestUnderKey {
    /// Migration version stamped after nesting.
    pub const VERSION: i64 = 1;

    /// Creates a migration nesting under `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The conventional migration nesting under `"custom"`.
    #[must_use]
    pub fn custom() -> Self {
        Self::new("custom")
    }

    fn nest(&self, object: &mut JsonObject) {
        if object.is_empty() {
            return;
        }
        let inner = std::mem::take(object);
        object.insert(self.key.clone(), Value::Object(inner));
    }
}

impl StateUpgrade for NestUnderKey {
    fn upgrade(&self, upgrade_meta: &mut JsonObject, mut targets: UpgradeTargets<'_>) {
        let current = upgrade_meta
            .get(UPGRADE_META_VERSION_KEY)
            .and_then(Value::as_i64)
            .unwrap_or(0);
        if current >= Self::VERSION {
            return;
        }
        targets.for_each(|object| self.nest(object));
        upgrade_meta.insert(UPGRADE_META_VERSION_KEY.to_string(), Value::from(Self::VERSION));
    }
}
