// Single-flight refresh coordination
// However many requests discover an expired token at once, one refresh call is made

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::refresh::{RefreshError, TokenRefresher};
use super::store::CredentialStore;
use super::teardown::SessionTeardown;
use super::types::{Credential, EndReason};

/// Result every waiter of a refresh observes
pub type RefreshResult = Result<Credential, RefreshError>;

type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

/// The one in-flight refresh
struct PendingRefresh {
    id: u64,
    outcome: SharedRefresh,
}

/// What a caller does after inspecting the shared state
enum Step {
    Ready(RefreshResult),
    Wait(SharedRefresh),
}

/// Refresh coordinator
/// Cheap to clone; clones share the same pending slot
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<CredentialStore>,
    teardown: Arc<SessionTeardown>,
    refresher: Arc<dyn TokenRefresher>,
    pending: Mutex<Option<PendingRefresh>>,
    next_id: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        teardown: Arc<SessionTeardown>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                teardown,
                refresher,
                pending: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Obtain a credential newer than `stale`, the token a rejected request carried.
    ///
    /// Attaches to the pending refresh if there is one. Otherwise, if the store
    /// has already moved past `stale`, returns the current credential (or
    /// [`RefreshError::SessionEnded`] if the store is empty) without a network
    /// call. Only when the store still holds `stale` does this caller start a
    /// new refresh.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn request_refresh(&self, stale: Option<&str>) -> RefreshResult {
        let step = {
            let mut pending = self.inner.lock_pending();
            let attached = pending.as_ref().map(|p| (p.id, p.outcome.clone()));
            match attached {
                Some((id, outcome)) => {
                    tracing::debug!(refresh_id = id, "Attaching to pending refresh");
                    Step::Wait(outcome)
                }
                None => {
                    let current = self.inner.store.get();
                    let current_token = current.as_ref().map(|c| c.access_token.as_str());

                    if current_token != stale {
                        match current {
                            Some(credential) => {
                                tracing::debug!("Credential changed since request was sent");
                                Step::Ready(Ok(credential))
                            }
                            None => Step::Ready(Err(RefreshError::SessionEnded)),
                        }
                    } else {
                        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                        let outcome = self.inner.clone().start(id, current);
                        *pending = Some(PendingRefresh {
                            id,
                            outcome: outcome.clone(),
                        });
                        Step::Wait(outcome)
                    }
                }
            }
        };

        match step {
            Step::Ready(result) => result,
            Step::Wait(outcome) => outcome.await,
        }
    }

    /// Whether a refresh is currently in flight
    pub fn is_pending(&self) -> bool {
        self.inner.lock_pending().is_some()
    }
}

impl Inner {
    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingRefresh>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the refresh so it completes even if the initiating caller goes away
    fn start(self: Arc<Self>, id: u64, current: Option<Credential>) -> SharedRefresh {
        tracing::info!(refresh_id = id, "Starting token refresh");

        let expected = current.as_ref().map(|c| c.access_token.clone());
        let task = tokio::spawn(self.clone().run(id, current));
        let inner = self;

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(refresh_id = id, "Refresh task failed: {}", e);
                    if let Some(token) = expected.as_deref() {
                        inner.teardown.end_if_current(token, EndReason::RefreshFailed);
                    }
                    inner.release(id);
                    Err(RefreshError::Aborted(e.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn run(self: Arc<Self>, id: u64, current: Option<Credential>) -> RefreshResult {
        let expected = current.as_ref().map(|c| c.access_token.clone());
        let result = self.refresher.refresh(current).await;

        let result = match result {
            Ok(credential) => {
                if self.store.compare_and_set(expected.as_deref(), credential.clone()) {
                    Ok(credential)
                } else {
                    // Logged out or logged in again while the refresh was in flight
                    tracing::warn!(refresh_id = id, "Session changed during refresh, discarding result");
                    self.store.get().ok_or(RefreshError::SessionEnded)
                }
            }
            Err(e) => {
                tracing::warn!(refresh_id = id, "Token refresh failed: {}", e);
                let ended = match expected.as_deref() {
                    Some(token) => self.teardown.end_if_current(token, EndReason::RefreshFailed),
                    None => false,
                };
                match self.store.get() {
                    // Logged in again while the refresh was in flight
                    Some(credential) if !ended => {
                        tracing::info!(refresh_id = id, "Session replaced during failed refresh");
                        Ok(credential)
                    }
                    _ => Err(e),
                }
            }
        };

        // Store is settled before the slot opens, so later callers see the outcome
        self.release(id);
        result
    }

    fn release(&self, id: u64) {
        let mut pending = self.lock_pending();
        if pending.as_ref().map(|p| p.id) == Some(id) {
            *pending = None;
        }
    }
}
