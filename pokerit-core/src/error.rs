//! Domain-specific error types for the capture core.
//!
//! Every failure the core can observe is typed here, but almost none of
//! them are fatal: capture, decode and transport errors degrade to "skip
//! this cycle" or "retry later". Only operations on a disposed runtime and
//! explicit storage writes surface an `Err` to the caller.

use std::time::Duration;
use thiserror::Error;

/// The canonical umbrella error for the core.
#[derive(Debug, Error)]
pub enum PokeritError {
    // ── Taxonomy ─────────────────────────────────────────────────
    /// The host capture capability failed.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// An inbound message could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The transport failed to open or dropped.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A configuration value was rejected.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    // ── Infrastructure ───────────────────────────────────────────
    /// Reading or writing persisted state failed.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// JSON encoding or decoding failed outside the inbound path.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The runtime actor is gone (disposed or panicked).
    #[error("channel closed")]
    ChannelClosed,

    /// A state machine was asked to make a transition it does not allow.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── CaptureError ──────────────────────────────────────────────────

/// Failure of the boundary capture capability.
///
/// Non-fatal: the scheduler logs it, bumps a counter and waits for the
/// next tick.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The host refused access to the screen.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Nothing to capture (no visible window, missing file, missing tool).
    #[error("capture target unavailable: {0}")]
    Unavailable(String),

    /// The capture program ran but reported failure.
    #[error("capture failed: {0}")]
    Failed(String),

    /// The capture produced zero bytes.
    #[error("capture produced an empty image")]
    Empty,

    /// The capture did not finish in time.
    #[error("capture timed out after {0:?}")]
    Timeout(Duration),

    /// Underlying I/O failure.
    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ── DecodeError ───────────────────────────────────────────────────

/// An inbound frame that cannot be dispatched.
///
/// The transport drops the frame and keeps the connection up.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not valid UTF-8.
    #[error("payload is not utf-8")]
    NotText,

    /// The payload is not parseable JSON (or not a JSON object).
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The object has no string `type` field.
    #[error("message has no type discriminator")]
    MissingType,

    /// The `type` field names a message this client does not know.
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

// ── TransportError ────────────────────────────────────────────────

/// Why a link attempt failed or a live link went away.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The WebSocket handshake failed.
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// The handshake did not finish in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// An open link was closed by the remote end or the network.
    #[error("connection dropped: {0}")]
    Dropped(String),
}

// ── ConfigError ───────────────────────────────────────────────────

/// A rejected configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Capture intervals must be strictly positive.
    #[error("invalid capture interval: {0} ms")]
    InvalidInterval(i64),

    /// A config file existed but could not be parsed.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Convenient From implementations ──────────────────────────────

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for PokeritError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        PokeritError::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for PokeritError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        PokeritError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = PokeritError::from(DecodeError::UnknownType("mystery".into()));
        assert!(e.to_string().contains("mystery"));

        let e = TransportError::Connect {
            url: "ws://localhost:8000/ws/s1".into(),
            reason: "refused".into(),
        };
        assert!(e.to_string().contains("/ws/s1"));
        assert!(e.to_string().contains("refused"));
    }

    #[test]
    fn from_io_is_storage() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let e: PokeritError = io_err.into();
        assert!(matches!(e, PokeritError::Storage(_)));
    }

    #[test]
    fn capture_error_wraps() {
        let e: PokeritError = CaptureError::Empty.into();
        assert!(matches!(e, PokeritError::Capture(CaptureError::Empty)));
    }
}
