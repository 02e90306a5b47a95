//! User consent gate.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared flag telling whether data may be sent on the user's behalf.
///
/// Clones share the same flag. Waiters are woken on every transition.
#[derive(Debug, Clone)]
pub struct ConsentGate {
    sender: Arc<watch::Sender<bool>>,
}

impl ConsentGate {
    /// Creates a gate in the given state.
    #[must_use]
    pub fn new(granted: bool) -> Self {
        let (sender, _) = watch::channel(granted);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// A gate that is always granted unless revoked.
    #[must_use]
    pub fn granted() -> Self {
        Self::new(true)
    }

    /// Returns true if consent is currently given.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        *self.sender.borrow()
    }

    /// Gives or withdraws consent.
    pub fn set(&self, granted: bool) {
        self.sender.send_if_modified(|current| {
            let changed = *current != granted;
            *current = granted;
            changed
        });
    }

    /// Subscribes to consent changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    /// Resolves once consent is given; immediately if it already is.
    pub async fn wait_granted(&self) {
        let mut receiver = self.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = receiver.wait_for(|granted| *granted).await;
    }
}

impl Default for ConsentGate {
    fn default() -> Self {
        Self::granted()
    }
}
