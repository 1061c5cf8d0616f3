//! Connection state machine for the transport channel.
//!
//! Transitions are validated and return `Result` instead of panicking;
//! only the link driver task mutates the state, observers read it
//! through a `watch` channel.

use serde::{Deserialize, Serialize};

use crate::error::PokeritError;

// ── ConnectionState ──────────────────────────────────────────────

/// The current phase of the server link.
///
/// ```text
///  Disconnected ──► Connecting ──► Open
///       ▲   ▲            │           │
///       │   └────────────┤ (failure) │ (drop)
///       │                ▼           ▼
///       └──────────── Closing ◄──────┘ (explicit close)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No link. Initial state, and where failures land before a retry.
    #[default]
    Disconnected,

    /// WebSocket handshake in progress.
    Connecting,

    /// Handshake done; frames flow both ways.
    Open,

    /// Explicit close in progress (close frame being sent).
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closing => write!(f, "Closing"),
        }
    }
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_disconnected(self) -> bool {
        matches!(self, Self::Disconnected)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), PokeritError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(PokeritError::InvalidTransition(
                "cannot connect: not in Disconnected state",
            )),
        }
    }

    /// Valid from: `Connecting`.
    pub fn mark_open(&mut self) -> Result<(), PokeritError> {
        match self {
            Self::Connecting => {
                *self = Self::Open;
                Ok(())
            }
            _ => Err(PokeritError::InvalidTransition(
                "cannot open: not in Connecting state",
            )),
        }
    }

    /// Valid from: `Connecting`, `Open`.
    pub fn begin_close(&mut self) -> Result<(), PokeritError> {
        match self {
            Self::Connecting | Self::Open => {
                *self = Self::Closing;
                Ok(())
            }
            _ => Err(PokeritError::InvalidTransition(
                "cannot close: not in Connecting or Open state",
            )),
        }
    }

    /// Valid from: `Connecting` (handshake failure), `Open` (drop),
    /// `Closing` (close complete).
    pub fn mark_disconnected(&mut self) -> Result<(), PokeritError> {
        match self {
            Self::Connecting | Self::Open | Self::Closing => {
                *self = Self::Disconnected;
                Ok(())
            }
            Self::Disconnected => Err(PokeritError::InvalidTransition(
                "already Disconnected",
            )),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut state = ConnectionState::Disconnected;

        state.begin_connect().unwrap();
        assert_eq!(state, ConnectionState::Connecting);

        state.mark_open().unwrap();
        assert!(state.is_open());

        state.begin_close().unwrap();
        assert_eq!(state, ConnectionState::Closing);

        state.mark_disconnected().unwrap();
        assert!(state.is_disconnected());
    }

    #[test]
    fn drop_and_retry() {
        let mut state = ConnectionState::Open;
        state.mark_disconnected().unwrap();
        state.begin_connect().unwrap();
        assert_eq!(state, ConnectionState::Connecting);
    }

    #[test]
    fn invalid_transitions() {
        assert!(ConnectionState::Open.begin_connect().is_err());
        assert!(ConnectionState::Disconnected.mark_open().is_err());
        assert!(ConnectionState::Closing.mark_open().is_err());
        assert!(ConnectionState::Disconnected.begin_close().is_err());
        assert!(ConnectionState::Disconnected.mark_disconnected().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionState::Open).unwrap();
        assert_eq!(json, "\"open\"");
        assert_eq!(ConnectionState::Connecting.to_string(), "Connecting");
    }
}
