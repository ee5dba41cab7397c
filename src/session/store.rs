use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use jiff::Timestamp;
use tracing::{debug, warn};

use crate::errors::Error;

use super::SessionToken;

/// Holds the single authoritative copy of the session credential.
///
/// `load` never returns an expired token.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Option<SessionToken>;
    fn store(&self, token: SessionToken) -> Result<(), Error>;
    fn clear(&self) -> Result<(), Error>;
}

/// Source of the backend-issued CSRF token echoed on mutating requests.
pub trait CsrfStore: Send + Sync {
    fn csrf_token(&self) -> Option<String>;
}

pub(crate) fn live(token: Option<SessionToken>) -> Option<SessionToken> {
    token.filter(|t| {
        let expired = t.is_expired(Timestamp::now());
        if expired {
            debug!(expires_at = ?t.expires_at(), "session token expired; not attaching");
        }
        !expired
    })
}

#[derive(Default)]
pub struct MemorySessionStore {
    token: RwLock<Option<SessionToken>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: SessionToken) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<SessionToken> {
        let guard = self.token.read().unwrap_or_else(PoisonError::into_inner);
        live(guard.clone())
    }

    fn store(&self, token: SessionToken) -> Result<(), Error> {
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(token);
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
        Ok(())
    }
}

/// Persists the session as a JSON snapshot so it survives restarts.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<SessionToken> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "session store unreadable");
                return None;
            }
        };
        match serde_json::from_str::<SessionToken>(&contents) {
            Ok(token) => live(Some(token)),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "session store corrupt");
                None
            }
        }
    }

    fn store(&self, token: SessionToken) -> Result<(), Error> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec(&token)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

pub struct StaticCsrfStore {
    token: String,
}

impl StaticCsrfStore {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl CsrfStore for StaticCsrfStore {
    fn csrf_token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}
