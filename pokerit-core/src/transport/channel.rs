//! WebSocket transport channel with fixed-delay reconnect.
//!
//! Each `open` spawns one link driver task that owns the socket:
//!
//! ```text
//!   open ──► [Connecting] ──ok──► [Open] ── pump frames ──┐
//!                 │                                       │ drop
//!                 └──fail──► [Disconnected] ◄─────────────┘
//!                                 │
//!                      ReconnectTimer (fixed delay)
//!                                 │
//!                                 └──► [Connecting] ...
//!
//!   close ──► cancel token ──► [Closing] ──► [Disconnected]   (no retry)
//! ```
//!
//! Outbound frames reach the driver through a small bounded queue; a full
//! queue or a non-open link drops the frame. Inbound frames are decoded
//! and broadcast to every subscriber; undecodable ones are dropped.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec;
use crate::error::{PokeritError, TransportError};
use crate::protocol::{InboundMessage, OutboundFrame};
use crate::transport::state::ConnectionState;
use crate::transport::timer::ReconnectTimer;
use crate::transport::{Transport, TransportConfig, endpoint_url};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Subscribers that fall this far behind lose the oldest messages.
const INBOUND_BACKLOG: usize = 64;

/// Budget for sending our close frame on an explicit close.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_millis(500);

// ── TransportChannel ─────────────────────────────────────────────

/// One logical server connection, repaired automatically until closed.
pub struct TransportChannel {
    config: TransportConfig,
    inbound: broadcast::Sender<InboundMessage>,
    link: Option<Link>,
}

/// Handle to the driver task of the current session.
struct Link {
    session_id: String,
    cancel: CancellationToken,
    outbound: mpsc::Sender<String>,
    state: watch::Receiver<ConnectionState>,
    driver: JoinHandle<()>,
}

impl TransportChannel {
    pub fn new(config: TransportConfig) -> Self {
        let (inbound, _) = broadcast::channel(INBOUND_BACKLOG);
        Self {
            config,
            inbound,
            link: None,
        }
    }

    /// Receive every decoded inbound message from now on, across
    /// reconnects and sessions.
    pub fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound.subscribe()
    }

    /// A sender clone, so owners can hand out subscriptions after the
    /// channel itself has been moved.
    pub fn inbound_sender(&self) -> broadcast::Sender<InboundMessage> {
        self.inbound.clone()
    }

    /// Observe state changes of the current link.
    pub fn watch_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.link.as_ref().map(|link| link.state.clone())
    }

    /// Session the current link belongs to.
    pub fn session_id(&self) -> Option<&str> {
        self.link.as_ref().map(|link| link.session_id.as_str())
    }

    pub fn state(&self) -> ConnectionState {
        self.link
            .as_ref()
            .map(|link| *link.state.borrow())
            .unwrap_or_default()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Replace any existing link with a fresh one for `session_id`.
    pub async fn open(&mut self, session_id: &str) {
        self.close().await;

        let url = endpoint_url(&self.config.server_url, session_id);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();

        let driver = LinkDriver {
            url,
            reconnect_delay: self.config.reconnect_delay,
            connect_timeout: self.config.connect_timeout,
            cancel: cancel.clone(),
            outbound: outbound_rx,
            inbound: self.inbound.clone(),
            state_tx,
            state: ConnectionState::Disconnected,
        };

        self.link = Some(Link {
            session_id: session_id.to_string(),
            cancel,
            outbound: outbound_tx,
            state: state_rx,
            driver: tokio::spawn(driver.run()),
        });
    }

    /// Close the link and stop retrying. Idempotent.
    pub async fn close(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        link.cancel.cancel();

        let joined = tokio::time::timeout(self.config.close_grace, &mut link.driver).await;
        match joined {
            Ok(Ok(())) => debug!(session = %link.session_id, "link closed"),
            Ok(Err(e)) => warn!(session = %link.session_id, "link driver failed: {e}"),
            Err(_) => {
                warn!(
                    session = %link.session_id,
                    "link did not close within {:?}; aborting", self.config.close_grace
                );
                link.driver.abort();
            }
        }
        self.link = None;
    }

    /// Queue a frame for the socket writer.
    ///
    /// Returns `false` (and drops the frame) when the link is not open or
    /// the outbound queue is full.
    pub fn send(&self, frame: &OutboundFrame) -> bool {
        let Some(link) = self.link.as_ref().filter(|link| link.state.borrow().is_open()) else {
            trace!(kind = frame.kind(), "link not open; dropping frame");
            return false;
        };

        let text = match codec::encode(frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(kind = frame.kind(), "cannot encode frame: {e}");
                return false;
            }
        };

        match link.outbound.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(kind = frame.kind(), "outbound queue full; dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        if let Some(link) = &self.link {
            link.cancel.cancel();
        }
    }
}

#[async_trait]
impl Transport for TransportChannel {
    async fn open(&mut self, session_id: &str) {
        TransportChannel::open(self, session_id).await
    }

    async fn close(&mut self) {
        TransportChannel::close(self).await
    }

    fn send(&self, frame: &OutboundFrame) -> bool {
        TransportChannel::send(self, frame)
    }

    fn state(&self) -> ConnectionState {
        TransportChannel::state(self)
    }

    fn inbound(&self) -> broadcast::Sender<InboundMessage> {
        self.inbound_sender()
    }
}

// ── LinkDriver ───────────────────────────────────────────────────

/// Why the pump loop returned.
enum LinkExit {
    /// Explicit close (or the channel went away).
    Cancelled,
    /// The remote end or the network ended the link.
    Dropped(TransportError),
}

/// Task that owns the socket of one session.
struct LinkDriver {
    url: String,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    cancel: CancellationToken,
    outbound: mpsc::Receiver<String>,
    inbound: broadcast::Sender<InboundMessage>,
    state_tx: watch::Sender<ConnectionState>,
    state: ConnectionState,
}

impl LinkDriver {
    async fn run(mut self) {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            self.apply(ConnectionState::begin_connect);
            debug!(url = %self.url, attempt, "connecting");

            let exit = match self.connect().await {
                Ok(Some(ws)) => {
                    attempt = 0;
                    self.apply(ConnectionState::mark_open);
                    info!(url = %self.url, "connected to server");
                    self.pump(ws).await
                }
                Ok(None) => LinkExit::Cancelled,
                Err(e) => LinkExit::Dropped(e),
            };

            match exit {
                LinkExit::Cancelled => break,
                LinkExit::Dropped(e) => warn!(url = %self.url, "{e}"),
            }

            self.apply(ConnectionState::mark_disconnected);
            self.discard_queued();

            info!(
                url = %self.url,
                "reconnecting in {:?}", self.reconnect_delay
            );
            let timer = ReconnectTimer::arm(self.reconnect_delay, self.cancel.clone());
            if !timer.fire().await {
                break;
            }
        }

        if !self.state.is_disconnected() {
            self.apply(ConnectionState::mark_disconnected);
        }
        debug!(url = %self.url, "link driver finished");
    }

    /// Run a transition and publish the result.
    fn apply(&mut self, step: fn(&mut ConnectionState) -> Result<(), PokeritError>) {
        if let Err(e) = step(&mut self.state) {
            warn!(state = %self.state, "{e}");
        }
        self.state_tx.send_replace(self.state);
    }

    /// One handshake attempt. `Ok(None)` means cancelled.
    async fn connect(&self) -> Result<Option<WsStream>, TransportError> {
        let attempt = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()));
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(None),
            result = attempt => match result {
                Ok(Ok((ws, _response))) => Ok(Some(ws)),
                Ok(Err(e)) => Err(TransportError::Connect {
                    url: self.url.clone(),
                    reason: e.to_string(),
                }),
                Err(_) => Err(TransportError::ConnectTimeout(self.connect_timeout)),
            },
        }
    }

    /// Move frames both ways until the link ends.
    async fn pump(&mut self, ws: WsStream) -> LinkExit {
        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.apply(ConnectionState::begin_close);
                    match tokio::time::timeout(CLOSE_FRAME_TIMEOUT, sink.send(Message::Close(None))).await {
                        Ok(Ok(())) => trace!("close frame sent"),
                        Ok(Err(e)) => debug!("close frame failed: {e}"),
                        Err(_) => debug!("close frame timed out"),
                    }
                    return LinkExit::Cancelled;
                }
                queued = self.outbound.recv() => match queued {
                    // A peer that stops reading must not hold off close.
                    Some(text) => tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return LinkExit::Cancelled,
                        sent = sink.send(Message::Text(text)) => {
                            if let Err(e) = sent {
                                return LinkExit::Dropped(TransportError::Dropped(e.to_string()));
                            }
                        }
                    },
                    None => return LinkExit::Cancelled,
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.dispatch(text.as_bytes()),
                    Some(Ok(Message::Binary(bytes))) => self.dispatch(&bytes),
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("closed by server ({}): {}", f.code, f.reason))
                            .unwrap_or_else(|| "closed by server".into());
                        return LinkExit::Dropped(TransportError::Dropped(reason));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return LinkExit::Dropped(TransportError::Dropped(e.to_string())),
                    None => return LinkExit::Dropped(TransportError::Dropped("stream ended".into())),
                },
            }
        }
    }

    fn dispatch(&self, bytes: &[u8]) {
        match codec::decode(bytes) {
            Ok(message) => {
                trace!(kind = message.kind(), "inbound message");
                // No subscribers is fine.
                let _ = self.inbound.send(message);
            }
            Err(e) => debug!("dropping inbound frame: {e}"),
        }
    }

    /// Frames queued for a dead link are stale; never replay them.
    fn discard_queued(&mut self) {
        let mut dropped = 0usize;
        while self.outbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "discarded frames queued for the dropped link");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
