//! Delivery of patch calls.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use pushsync_client::{ApiClient, ConsentGate, Params, Transport};
use pushsync_core::{Identity, JsonObject, NestUnderKey, NoUpgrade, StateUpgrade};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Resource patched by installation sync.
pub const INSTALLATION_RESOURCE: &str = "/installation";

/// What a synchronized object maps to on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncKind {
    /// The whole installation object.
    Installation,
    /// Only the `custom` properties of the installation.
    InstallationCustom,
}

impl SyncKind {
    /// Name used in logs and storage keys.
    pub fn as_str(self) -> &'static str {
        match self {
            SyncKind::Installation => "installation",
            SyncKind::InstallationCustom => "installationCustom",
        }
    }

    /// Wraps a diff into the body of the installation patch call.
    ///
    /// ```
    /// use pushsync_engine::SyncKind;
    /// use serde_json::json;
    ///
    /// let diff = json!({"age": 30}).as_object().unwrap().clone();
    /// let body = SyncKind::InstallationCustom.patch_body(&diff);
    /// assert_eq!(serde_json::Value::Object(body), json!({"custom": {"age": 30}}));
    /// ```
    pub fn patch_body(self, diff: &JsonObject) -> JsonObject {
        match self {
            SyncKind::Installation => diff.clone(),
            SyncKind::InstallationCustom => {
                let mut body = JsonObject::new();
                body.insert("custom".into(), Value::Object(diff.clone()));
                body
            }
        }
    }

    /// Migration applied when restoring a snapshot of this kind.
    ///
    /// Full installation state used to be stored custom-only, so its
    /// snapshots are nested under `custom` once.
    pub fn upgrade(self) -> Box<dyn StateUpgrade> {
        match self {
            SyncKind::Installation => Box::new(NestUnderKey::custom()),
            SyncKind::InstallationCustom => Box::new(NoUpgrade),
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivers one patch call for an entity.
///
/// Called at most once per in-flight episode. Implementations must not
/// retry on their own; a failed call is rescheduled by the entity.
#[async_trait]
pub trait PatchSink: Send + Sync {
    /// Sends `diff` on behalf of `owner`.
    async fn patch(&self, owner: &Identity, kind: SyncKind, diff: &JsonObject) -> EngineResult<()>;
}

/// Sends patch calls as `PATCH /installation` through an [`ApiClient`].
pub struct InstallationPatcher<T: Transport> {
    client: ApiClient<T>,
    consent: ConsentGate,
}

impl<T: Transport> fmt::Debug for InstallationPatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationPatcher")
            .field("client", &self.client)
            .field("consent", &self.consent.is_granted())
            .finish()
    }
}

impl<T: Transport> InstallationPatcher<T> {
    /// Creates a patcher.
    pub fn new(client: ApiClient<T>, consent: ConsentGate) -> Self {
        Self { client, consent }
    }

    /// The client patch calls go through.
    pub fn client(&self) -> &ApiClient<T> {
        &self.client
    }
}

#[async_trait]
impl<T: Transport> PatchSink for InstallationPatcher<T> {
    async fn patch(&self, owner: &Identity, kind: SyncKind, diff: &JsonObject) -> EngineResult<()> {
        if !self.consent.is_granted() {
            return Err(EngineError::MissingConsent);
        }

        let body = serde_json::to_string(&kind.patch_body(diff))?;
        debug!(owner = %owner, %kind, body = %body, "patching installation");
        let response = self
            .client
            .patch(owner, INSTALLATION_RESOURCE, Params::new().with("body", body))
            .await?;

        if response.is_success() {
            Ok(())
        } else {
            Err(EngineError::Rejected(response.body.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn installation_body_is_the_diff() {
        let diff = json!({"preferredLanguage": "fr"}).as_object().unwrap().clone();
        assert_eq!(SyncKind::Installation.patch_body(&diff), diff);
    }

    #[test]
    fn kinds_have_distinct_names() {
        assert_ne!(SyncKind::Installation.as_str(), SyncKind::InstallationCustom.as_str());
        assert_eq!(SyncKind::InstallationCustom.to_string(), "installationCustom");
    }
}
