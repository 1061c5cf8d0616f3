//! Session identity and capture cadence.
//!
//! A [`Session`] is the resolved pair the scheduler runs with. The
//! persisted half lives in a [`SessionStore`]; [`Session::resolve`]
//! merges a start request with what was stored.

pub mod store;

pub use store::{JsonFileStore, MemoryStore, SessionStore, StoredSession};

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Capture interval used when neither the request nor the store has one.
pub const DEFAULT_INTERVAL_MS: u64 = 2000;

/// Prefix of generated session identifiers.
const SESSION_PREFIX: &str = "session_";

/// Random characters appended after [`SESSION_PREFIX`].
const SESSION_TOKEN_LEN: usize = 9;

/// One capture run: who we are and how often we capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub capture_interval_ms: u64,
}

impl Session {
    /// Resolve the effective session for a `start` request.
    ///
    /// Precedence for each field is request, then stored, then a fresh
    /// default. Blank ids and non-positive intervals in the request count
    /// as absent.
    pub fn resolve(
        requested_id: Option<&str>,
        requested_interval_ms: Option<i64>,
        stored: &StoredSession,
        default_interval_ms: u64,
    ) -> Self {
        let session_id = requested_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .or_else(|| stored.session_id.clone())
            .unwrap_or_else(generate_session_id);

        let requested = requested_interval_ms.and_then(|ms| match validate_interval(ms) {
            Ok(ms) => Some(ms),
            Err(e) => {
                warn!("{e}; falling back");
                None
            }
        });

        let capture_interval_ms = requested
            .or(stored.capture_interval_ms)
            .unwrap_or(default_interval_ms.max(1));

        Self {
            session_id,
            capture_interval_ms,
        }
    }

    pub fn to_stored(&self) -> StoredSession {
        StoredSession {
            session_id: Some(self.session_id.clone()),
            capture_interval_ms: Some(self.capture_interval_ms),
        }
    }
}

/// Reject non-positive intervals.
pub fn validate_interval(ms: i64) -> Result<u64, ConfigError> {
    if ms > 0 {
        Ok(ms as u64)
    } else {
        Err(ConfigError::InvalidInterval(ms))
    }
}

/// A fresh `session_xxxxxxxxx` identifier (9 lowercase alphanumerics).
pub fn generate_session_id() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_TOKEN_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("{SESSION_PREFIX}{token}")
}
