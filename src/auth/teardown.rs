// Session teardown
// Clears the store and tells subscribers the session is over

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::store::CredentialStore;
use super::types::{EndReason, SessionEnded};

const EVENT_CAPACITY: usize = 16;

/// Logout / cleanup path shared by the request wrapper and the refresh coordinator
pub struct SessionTeardown {
    store: Arc<CredentialStore>,
    events: broadcast::Sender<SessionEnded>,
}

impl SessionTeardown {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { store, events }
    }

    /// Subscribe to session-ended events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEnded> {
        self.events.subscribe()
    }

    /// End whatever session is live. Returns `true` if one was ended.
    pub fn end(&self, reason: EndReason) -> bool {
        let ended = self.store.clear().is_some();
        if ended {
            self.publish(reason);
        }
        ended
    }

    /// End the session only if it still carries `token`.
    ///
    /// A failure observed for an older token must not tear down a session
    /// that has been replaced since.
    pub fn end_if_current(&self, token: &str, reason: EndReason) -> bool {
        let ended = self.store.clear_if(token).is_some();
        if ended {
            self.publish(reason);
        }
        ended
    }

    fn publish(&self, reason: EndReason) {
        tracing::warn!(reason = ?reason, "Session ended");
        // No subscribers is fine
        let _ = self.events.send(SessionEnded {
            reason,
            at: Utc::now(),
        });
    }
}
