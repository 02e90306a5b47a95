//! Owner identities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The logical end user a sync state or credential record belongs to.
///
/// `None` is the anonymous identity. An empty user id is treated as
/// anonymous as well, so `Identity::user("")` equals `Identity::anonymous()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub struct Identity(Option<String>);

impl From<Option<String>> for Identity {
    fn from(user_id: Option<String>) -> Self {
        user_id.map_or_else(Self::anonymous, Self::user)
    }
}

impl From<Identity> for Option<String> {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl Identity {
    /// The anonymous identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self(None)
    }

    /// An identity for the given user id.
    pub fn user(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        if user_id.is_empty() {
            Self(None)
        } else {
            Self(Some(user_id))
        }
    }

    /// Builds an identity from an optional user id.
    pub fn from_option(user_id: Option<&str>) -> Self {
        user_id.map_or_else(Self::anonymous, Self::user)
    }

    /// Returns the user id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Returns true for the anonymous identity.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.0.is_none()
    }

    /// Persistence key for this identity: `""` when anonymous.
    #[must_use]
    pub fn as_key(&self) -> &str {
        self.0.as_deref().unwrap_or("")
    }

    /// Inverse of [`Identity::as_key`].
    pub fn from_key(key: &str) -> Self {
        Self::user(key)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(user_id) => f.write_str(user_id),
            None => f.write_str("<anonymous>"),
        }
    }
}
