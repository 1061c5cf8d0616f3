//! Persistence of the session id / capture interval pair.
//!
//! Two stable keys, `sessionId` and `captureIntervalMs`, are always
//! written together. Loading never fails: a missing or unreadable backend
//! yields an all-unset [`StoredSession`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PokeritError;

/// Stable key for the session identifier.
pub const SESSION_ID_KEY: &str = "sessionId";
/// Stable key for the capture interval in milliseconds.
pub const CAPTURE_INTERVAL_KEY: &str = "captureIntervalMs";

/// Persisted values, each independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "captureIntervalMs", skip_serializing_if = "Option::is_none")]
    pub capture_interval_ms: Option<u64>,
}

impl StoredSession {
    /// Pick the two keys out of an arbitrary JSON document, ignoring
    /// anything malformed field by field.
    fn from_value(value: &serde_json::Value) -> Self {
        let session_id = value
            .get(SESSION_ID_KEY)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        let capture_interval_ms = value
            .get(CAPTURE_INTERVAL_KEY)
            .and_then(|v| v.as_i64())
            .filter(|ms| *ms > 0)
            .map(|ms| ms as u64);
        Self {
            session_id,
            capture_interval_ms,
        }
    }
}

/// Key-value persistence for the session pair.
///
/// Implementations must make `save` atomic from a reader's perspective:
/// a concurrent `load` sees either the old pair or the new pair.
pub trait SessionStore: Send + Sync {
    /// Read what is persisted. Never fails.
    fn load(&self) -> StoredSession;

    /// Persist both fields as a unit.
    fn save(&self, session: &StoredSession) -> Result<(), PokeritError>;

    /// Forget the persisted session entirely.
    fn clear(&self) -> Result<(), PokeritError>;
}

// ── JsonFileStore ─────────────────────────────────────────────────

/// A JSON document on disk, replaced via write-to-temp + rename.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> StoredSession {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no session file at {}", self.path.display());
                return StoredSession::default();
            }
            Err(e) => {
                warn!("cannot read {}: {e}; starting unset", self.path.display());
                return StoredSession::default();
            }
        };

        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) => StoredSession::from_value(&value),
            Err(e) => {
                warn!("corrupt session file {}: {e}; starting unset", self.path.display());
                StoredSession::default()
            }
        }
    }

    fn save(&self, session: &StoredSession) -> Result<(), PokeritError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(session)?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), PokeritError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ── MemoryStore ───────────────────────────────────────────────────

/// In-process store. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<StoredSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that starts out holding `session`.
    pub fn with(session: StoredSession) -> Self {
        Self {
            slot: Arc::new(Mutex::new(session)),
        }
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> StoredSession {
        match self.slot.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn save(&self, session: &StoredSession) -> Result<(), PokeritError> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|_| PokeritError::Other("session store poisoned".into()))?;
        *guard = session.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), PokeritError> {
        self.save(&StoredSession::default())
    }
}

// ── Tests ────────────────────────────────────────────────────────
