//! Local persistence for the one in-progress session.
//!
//! Only `running` and `paused` sessions are kept; completion and abandonment
//! clear the record.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::Session;

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("Session store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Session record is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<Session>, SessionStoreError>;
    fn save(&self, session: &Session) -> Result<(), SessionStoreError>;
    fn clear(&self) -> Result<(), SessionStoreError>;

    /// Save `session` if it is active, otherwise clear the record.
    fn sync(&self, session: &Session) -> Result<(), SessionStoreError> {
        if session.is_persistable() {
            self.save(session)
        } else {
            self.clear()
        }
    }
}

/// Keeps the session as a JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Session>, SessionStoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(session)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>, SessionStoreError> {
        Ok(self.slot().clone())
    }

    fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        *self.slot() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        *self.slot() = None;
        Ok(())
    }
}
