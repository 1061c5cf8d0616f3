//! Persistent, self-repairing connection to the analysis server.
//!
//! ## Sub-modules
//!
//! | Module    | Purpose                                              |
//! |-----------|------------------------------------------------------|
//! | `state`   | `ConnectionState` and its validated transitions       |
//! | `timer`   | Single-shot cancellable reconnect timer               |
//! | `channel` | `TransportChannel`: WebSocket link driver + dispatch  |
//!
//! The [`Transport`] trait is the seam the capture scheduler talks to,
//! so the scheduler can be exercised without a network.

pub mod channel;
pub mod state;
pub mod timer;

pub use channel::TransportChannel;
pub use state::ConnectionState;
pub use timer::ReconnectTimer;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::protocol::{InboundMessage, OutboundFrame};

/// Default server, matching a locally running analysis service.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Fixed delay between a drop and the next connect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

// ── TransportConfig ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base address; `/ws/<sessionId>` is appended per session.
    pub server_url: String,
    /// Wait after an unexpected drop before reconnecting.
    pub reconnect_delay: Duration,
    /// Upper bound on one WebSocket handshake.
    pub connect_timeout: Duration,
    /// Frames buffered between `send` and the socket writer.
    pub outbound_capacity: usize,
    /// How long `close` waits for the link to wind down.
    pub close_grace: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: Duration::from_secs(10),
            outbound_capacity: 8,
            close_grace: Duration::from_secs(1),
        }
    }
}

/// The per-session WebSocket URL for `base`.
///
/// `http://` becomes `ws://`, `https://` becomes `wss://`, and a bare
/// `host:port` is treated as `ws://host:port`.
pub fn endpoint_url(base: &str, session_id: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        format!("ws://{base}")
    };
    format!("{base}/ws/{session_id}")
}

// ── Transport ────────────────────────────────────────────────────

/// What the scheduler needs from a connection.
///
/// `close` is terminal until the next `open`: no retries happen in
/// between. `send` never fails loudly; a frame offered while the link is
/// not open is dropped and `false` is returned. Decoded inbound messages
/// are broadcast on [`inbound`](Self::inbound).
#[async_trait]
pub trait Transport: Send {
    async fn open(&mut self, session_id: &str);

    async fn close(&mut self);

    fn send(&self, frame: &OutboundFrame) -> bool;

    fn state(&self) -> ConnectionState;

    fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Sender side of the inbound broadcast, for handing out
    /// subscriptions.
    fn inbound(&self) -> broadcast::Sender<InboundMessage>;
}
