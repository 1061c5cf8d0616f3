//! # pokerit-core
//!
//! Capture/session synchronisation core for the Pokerit screen agent.
//!
//! Periodically grabs a still image of the user's screen and streams it to
//! an analysis server over a WebSocket bound to one session, keeping the
//! session identity and capture cadence across restarts.
//!
//! This crate contains:
//! - **Session**: `Session`, `SessionStore`, the persisted `{sessionId, captureIntervalMs}` pair
//! - **Capture**: `CaptureSource` boundary plus command/file host adapters
//! - **Protocol / Codec**: JSON frames exchanged with the server
//! - **Transport**: `TransportChannel`, a self-reconnecting WebSocket link
//! - **Scheduler**: `CaptureScheduler`, the `Idle`/`Active` timer state machine
//! - **Runtime / Control**: `SessionRuntime` actor and its `ControlSurface` handle
//! - **Error**: `PokeritError`, a `thiserror`-based error hierarchy
//!
//! ```text
//!  ControlSurface ──► SessionRuntime ──► CaptureScheduler ──tick──► CaptureSource
//!                                              │                        │ image
//!                                              ▼                        ▼
//!                                       TransportChannel ◄──── codec::encode
//!                                              │
//!                               inbound ◄──────┴──────► ws://server/ws/<sessionId>
//! ```

pub mod capture;
pub mod codec;
pub mod control;
pub mod error;
pub mod protocol;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{CaptureOptions, CaptureSource, CommandCapture, FileCapture, ImageFormat};
pub use control::{Command, ControlSurface, Response};
pub use error::{CaptureError, ConfigError, DecodeError, PokeritError, TransportError};
pub use protocol::{InboundMessage, OutboundFrame};
pub use runtime::SessionRuntime;
pub use scheduler::{CaptureScheduler, CaptureState, CaptureStats, CaptureStatus, SchedulerConfig};
pub use session::{JsonFileStore, MemoryStore, Session, SessionStore, StoredSession};
pub use transport::{ConnectionState, Transport, TransportChannel, TransportConfig};
