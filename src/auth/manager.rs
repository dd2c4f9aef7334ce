use reqwest::{header, Client, Url};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::coordinator::{RefreshCoordinator, RefreshResult};
use super::credentials::CredentialSource;
use super::refresh::TokenRefresher;
use super::store::CredentialStore;
use super::teardown::SessionTeardown;
use super::types::{Credential, EndReason, LoginRequest, SessionEnded, TokenResponse};
use crate::error::{ApiError, Result};

/// Authentication manager
/// Owns the session: the live credential, refresh coordination and teardown
pub struct AuthManager {
    /// Current credential
    store: Arc<CredentialStore>,

    /// Logout / cleanup path
    teardown: Arc<SessionTeardown>,

    /// Single-flight refresh
    coordinator: RefreshCoordinator,

    /// HTTP client for login requests
    client: Client,

    /// Login endpoint
    login_url: Url,
}

impl AuthManager {
    /// Create a new AuthManager.
    /// With a `source`, the persisted credential (if any) becomes the live one.
    pub fn new(
        client: Client,
        source: Option<Arc<dyn CredentialSource>>,
        refresher: Arc<dyn TokenRefresher>,
        login_url: Url,
    ) -> Self {
        let store = Arc::new(match source {
            Some(source) => CredentialStore::with_source(source),
            None => CredentialStore::new(),
        });
        let teardown = Arc::new(SessionTeardown::new(store.clone()));
        let coordinator = RefreshCoordinator::new(store.clone(), teardown.clone(), refresher);

        Self {
            store,
            teardown,
            coordinator,
            client,
            login_url,
        }
    }

    /// The live credential, if a session exists
    pub fn current(&self) -> Option<Credential> {
        self.store.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    /// Log in with email and password; on success the returned token is live
    pub async fn login(&self, email: &str, password: &str) -> Result<Credential> {
        tracing::info!(url = %self.login_url, "Logging in as {}", email);

        let response = self
            .client
            .post(self.login_url.clone())
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Login rejected");
            let message = match ApiError::from_status(status, &body) {
                ApiError::Backend { message, .. } => message,
                other => other.to_string(),
            };
            return Err(ApiError::LoginFailed(message));
        }

        let data: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("login response: {}", e)))?;
        let credential = data.into_credential().ok_or_else(|| {
            ApiError::LoginFailed("response does not contain an access token".to_string())
        })?;

        self.store.set(credential.clone());
        tracing::info!(token = %credential.redacted(), "✅ Login successful");

        Ok(credential)
    }

    /// Explicit logout. Returns `false` if there was no session.
    pub fn logout(&self) -> bool {
        self.teardown.end(EndReason::Logout)
    }

    /// Subscribe to session-ended events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEnded> {
        self.teardown.subscribe()
    }

    /// Obtain a credential newer than `stale` (see [`RefreshCoordinator::request_refresh`])
    pub async fn refresh(&self, stale: Option<&str>) -> RefreshResult {
        self.coordinator.request_refresh(stale).await
    }

    /// End the session if it still carries `token`
    pub(crate) fn end_if_current(&self, token: &str, reason: EndReason) -> bool {
        self.teardown.end_if_current(token, reason)
    }
}
