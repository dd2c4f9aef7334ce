// Authentication types

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bearer credential for the backend
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,

    /// Expiry hint reported by the backend. Informational only: a 401 is the
    /// sole signal that the token is no longer accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Check whether the expiry hint has passed
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| Utc::now() >= exp).unwrap_or(false)
    }

    /// Short token prefix that is safe to log
    pub fn redacted(&self) -> String {
        let prefix: String = self.access_token.chars().take(8).collect();
        format!("{}...", prefix)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &self.redacted())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Login request body
#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Token payload returned by the login and refresh endpoints.
/// The backend has used both `access_token` and `token` for the same field;
/// `access_token` wins when both are present.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub token: Option<String>,
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    /// Convert into a credential, or `None` if the payload carries no token
    pub fn into_credential(self) -> Option<Credential> {
        let token = self
            .access_token
            .filter(|t| !t.is_empty())
            .or_else(|| self.token.filter(|t| !t.is_empty()))?;
        let mut credential = Credential::new(token);
        if let Some(expires_at) = self.expires_in.and_then(expiry_from_now) {
            credential = credential.with_expires_at(expires_at);
        }
        Some(credential)
    }
}

/// `None` when `expires_in` does not fit a timestamp; the hint is then dropped
fn expiry_from_now(expires_in: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_seconds(expires_in).and_then(|delta| Utc::now().checked_add_signed(delta))
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Explicit logout
    Logout,
    /// The token expired and could not be refreshed
    RefreshFailed,
    /// The backend rejected a freshly refreshed token
    Rejected,
}

/// Event published when the live session is torn down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnded {
    pub reason: EndReason,
    pub at: DateTime<Utc>,
}
