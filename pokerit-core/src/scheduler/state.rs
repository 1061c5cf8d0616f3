//! Capture state and the status snapshot reported to the control layer.

use serde::{Deserialize, Serialize};

use crate::transport::ConnectionState;

/// Whether the periodic capture timer is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    #[default]
    Idle,
    Active,
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Active => write!(f, "Active"),
        }
    }
}

/// Per-runtime counters. Tick failures only ever show up here and in logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStats {
    /// Frames handed to an open transport.
    pub frames_sent: u64,
    /// Ticks (or finished captures) dropped because the link was not open
    /// or a capture was still running.
    pub ticks_skipped: u64,
    /// Captures the host capability refused or failed.
    pub capture_failures: u64,
    /// Captures that resolved after the run that asked for them stopped.
    pub stale_discarded: u64,
}

/// Side-effect-free view of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatus {
    pub is_capturing: bool,
    pub session_id: Option<String>,
    /// Milliseconds between ticks.
    pub capture_interval: u64,
    pub connection: ConnectionState,
    #[serde(flatten)]
    pub stats: CaptureStats,
}
