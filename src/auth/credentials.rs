// Persistent credential sources

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::types::Credential;

/// Durable storage that seeds the credential store across restarts
pub trait CredentialSource: Send + Sync {
    /// Read the persisted credential, if any
    fn read(&self) -> Result<Option<Credential>>;

    /// Persist a credential, replacing any previous one
    fn write(&self, credential: &Credential) -> Result<()>;

    /// Remove the persisted credential. Removing nothing is not an error.
    fn erase(&self) -> Result<()>;
}

/// JSON file source (the CLI keeps it in the user cache directory)
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialSource for FileSource {
    fn read(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file: {}", self.path.display()))?;
        let credential: Credential = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session file: {}", self.path.display()))?;

        Ok(Some(credential))
    }

    fn write(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create session directory: {}", parent.display())
            })?;
        }

        let contents =
            serde_json::to_string_pretty(credential).context("Failed to serialize credential")?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write session file: {}", self.path.display()))?;

        Ok(())
    }

    fn erase(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).with_context(|| {
                format!("Failed to remove session file: {}", self.path.display())
            })?;
        }
        Ok(())
    }
}

/// In-memory source for tests and embedders without durable storage
#[derive(Default)]
pub struct MemorySource {
    slot: Mutex<Option<Credential>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialSource for MemorySource {
    fn read(&self) -> Result<Option<Credential>> {
        Ok(self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn write(&self, credential: &Credential) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }

    fn erase(&self) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_session_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("mojo-session-test-{}", uuid::Uuid::new_v4()))
            .join("session.json")
    }

    #[test]
    fn test_file_source_missing_file() {
        let source = FileSource::new(temp_session_path());
        assert!(source.read().unwrap().is_none());
        // Erasing a file that was never written is fine
        source.erase().unwrap();
    }

    #[test]
    fn test_file_source_write_read_erase() {
        let path = temp_session_path();
        let source = FileSource::new(&path);

        source.write(&Credential::new("persisted-token")).unwrap();
        assert!(path.exists());

        let loaded = source.read().unwrap().unwrap();
        assert_eq!(loaded.access_token, "persisted-token");
        assert!(loaded.expires_at.is_none());

        source.erase().unwrap();
        assert!(!path.exists());
        assert!(source.read().unwrap().is_none());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_file_source_corrupt_file() {
        let path = temp_session_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let source = FileSource::new(&path);
        let err = source.read().unwrap_err();
        assert!(err.to_string().contains("Failed to parse session file"));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new();
        assert!(source.read().unwrap().is_none());

        source.write(&Credential::new("a")).unwrap();
        assert_eq!(source.read().unwrap().unwrap().access_token, "a");

        source.erase().unwrap();
        assert!(source.read().unwrap().is_none());
    }
}
