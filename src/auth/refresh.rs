// Token refresh logic

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use thiserror::Error;

use super::types::{Credential, TokenResponse};

/// Maximum length of a response body quoted in a refresh error
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Why a refresh could not produce a new credential.
///
/// Clonable so one failure can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Token refresh is not available for this backend")]
    Unavailable,

    #[error("Refresh request failed: {0}")]
    Transport(String),

    #[error("Refresh rejected: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("Session ended before refresh")]
    SessionEnded,

    #[error("Refresh task aborted: {0}")]
    Aborted(String),
}

/// Backend-specific way of obtaining a new credential
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange the current (expired) credential for a new one
    async fn refresh(&self, current: Option<Credential>) -> Result<Credential, RefreshError>;
}

/// Refresher for backends without a refresh endpoint: every expiry is a logout
pub struct DisabledRefresh;

#[async_trait]
impl TokenRefresher for DisabledRefresh {
    async fn refresh(&self, _current: Option<Credential>) -> Result<Credential, RefreshError> {
        tracing::debug!("No refresh endpoint configured");
        Err(RefreshError::Unavailable)
    }
}

/// Refresh via `POST <url>` authenticated with the expired bearer token
pub struct HttpRefresher {
    client: Client,
    url: Url,
}

impl HttpRefresher {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh(&self, current: Option<Credential>) -> Result<Credential, RefreshError> {
        tracing::info!(url = %self.url, "Refreshing access token...");

        let mut request = self
            .client
            .post(self.url.clone())
            .header(header::ACCEPT, "application/json");
        if let Some(ref credential) = current {
            request = request.bearer_auth(&credential.access_token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %error_text,
                "Token refresh failed"
            );
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message: truncate(&error_text),
            });
        }

        let data: TokenResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

        let credential = data.into_credential().ok_or_else(|| {
            RefreshError::InvalidResponse("response does not contain an access token".to_string())
        })?;

        tracing::info!(
            token = %credential.redacted(),
            expires_at = ?credential.expires_at,
            "Token refreshed"
        );

        Ok(credential)
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}
