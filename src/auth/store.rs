// Credential store
// Single source of truth for the live bearer token

use std::sync::{Arc, PoisonError, RwLock};

use super::credentials::CredentialSource;
use super::types::Credential;

/// Thread-safe holder of the current credential.
///
/// Reads never touch persistent storage. Writes go to memory first and are
/// then written through to the optional [`CredentialSource`]; a storage
/// failure is logged and does not undo the in-memory change.
pub struct CredentialStore {
    current: RwLock<Option<Credential>>,
    source: Option<Arc<dyn CredentialSource>>,
}

impl CredentialStore {
    /// Create an empty store with no persistence
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            source: None,
        }
    }

    /// Create a store seeded from a persistent source
    pub fn with_source(source: Arc<dyn CredentialSource>) -> Self {
        let seeded = match source.read() {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!("Ignoring unreadable persisted credential: {:#}", e);
                None
            }
        };

        if let Some(ref credential) = seeded {
            tracing::debug!(token = %credential.redacted(), "Restored persisted session");
        }

        Self {
            current: RwLock::new(seeded),
            source: Some(source),
        }
    }

    /// Current credential, or `None` when no session exists
    pub fn get(&self) -> Option<Credential> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current bearer token only
    pub fn token(&self) -> Option<String> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    /// Replace the credential
    pub fn set(&self, credential: Credential) {
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = Some(credential.clone());
        }

        if let Some(ref source) = self.source {
            if let Err(e) = source.write(&credential) {
                tracing::warn!("Failed to persist credential: {:#}", e);
            }
        }
    }

    /// Replace the credential only if the live token is still `expected`
    /// (`None` meaning no session). Returns whether the swap happened.
    pub fn compare_and_set(&self, expected: Option<&str>, credential: Credential) -> bool {
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if current.as_ref().map(|c| c.access_token.as_str()) != expected {
                return false;
            }
            *current = Some(credential.clone());
        }

        if let Some(ref source) = self.source {
            if let Err(e) = source.write(&credential) {
                tracing::warn!("Failed to persist credential: {:#}", e);
            }
        }
        true
    }

    /// Remove the credential, returning the one that was live
    pub fn clear(&self) -> Option<Credential> {
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if previous.is_some() {
            self.erase_persisted();
        }
        previous
    }

    /// Remove the credential only if it still carries `token`.
    /// Returns the removed credential.
    pub fn clear_if(&self, token: &str) -> Option<Credential> {
        let removed = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            match current.as_ref() {
                Some(c) if c.access_token == token => current.take(),
                _ => None,
            }
        };

        if removed.is_some() {
            self.erase_persisted();
        }
        removed
    }

    fn erase_persisted(&self) {
        if let Some(ref source) = self.source {
            if let Err(e) = source.erase() {
                tracing::warn!("Failed to erase persisted credential: {:#}", e);
            }
        }
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
