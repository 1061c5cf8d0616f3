//! Per-session runtime: one task owns the scheduler and its transport.
//!
//! Commands from any number of [`ControlSurface`] clones are queued on a
//! single channel and applied one at a time, interleaved with timer ticks
//! and capture completions. That queue is what serialises concurrent
//! `start` calls and keeps the persisted session pair consistent.
//!
//! Lifecycle: [`create`](SessionRuntime::create) → `start`/`stop` (any
//! number of times) → [`dispose`](SessionRuntime::dispose).

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capture::CaptureSource;
use crate::control::ControlSurface;
use crate::error::PokeritError;
use crate::protocol::InboundMessage;
use crate::scheduler::{CaptureScheduler, CaptureStatus, SchedulerConfig};
use crate::session::SessionStore;
use crate::transport::{Transport, TransportChannel, TransportConfig};

/// Pending commands beyond this make callers wait.
const REQUEST_QUEUE: usize = 32;

// ── Requests ─────────────────────────────────────────────────────

/// One queued command with its reply slot.
pub(crate) enum Request {
    Start {
        session_id: Option<String>,
        interval_ms: Option<i64>,
        reply: oneshot::Sender<CaptureStatus>,
    },
    Stop {
        reply: oneshot::Sender<CaptureStatus>,
    },
    Status {
        reply: oneshot::Sender<CaptureStatus>,
    },
    Reset {
        reply: oneshot::Sender<Result<CaptureStatus, PokeritError>>,
    },
    UpdateGameState {
        data: Value,
        player_name: Option<String>,
        reply: oneshot::Sender<bool>,
    },
    Dispose {
        reply: oneshot::Sender<()>,
    },
}

// ── SessionRuntime ───────────────────────────────────────────────

pub struct SessionRuntime {
    control: ControlSurface,
    inbound: broadcast::Sender<InboundMessage>,
    actor: JoinHandle<()>,
}

impl SessionRuntime {
    /// Spawn the actor around an idle scheduler.
    pub fn create<T: Transport + 'static>(scheduler: CaptureScheduler<T>) -> Self {
        let inbound = scheduler.transport().inbound();
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
        let actor = tokio::spawn(run_actor(scheduler, rx));
        debug!("session runtime created");
        Self {
            control: ControlSurface::new(tx),
            inbound,
            actor,
        }
    }

    /// Build a runtime backed by a real WebSocket [`TransportChannel`].
    pub fn connect(
        transport: TransportConfig,
        scheduler: SchedulerConfig,
        store: Arc<dyn SessionStore>,
        source: Arc<dyn CaptureSource>,
    ) -> Self {
        let channel = TransportChannel::new(transport);
        Self::create(CaptureScheduler::new(channel, store, source, scheduler))
    }

    /// A cloneable command handle.
    pub fn control(&self) -> ControlSurface {
        self.control.clone()
    }

    /// Decoded server pushes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound.subscribe()
    }

    pub async fn start(
        &self,
        session_id: Option<String>,
        interval_ms: Option<i64>,
    ) -> Result<CaptureStatus, PokeritError> {
        self.control.request_start(session_id, interval_ms).await
    }

    pub async fn stop(&self) -> Result<CaptureStatus, PokeritError> {
        self.control.request_stop().await
    }

    pub async fn status(&self) -> Result<CaptureStatus, PokeritError> {
        self.control.request_status().await
    }

    /// Stop capturing, close the link and wait for the actor to exit.
    pub async fn dispose(self) -> Result<(), PokeritError> {
        let (reply, done) = oneshot::channel();
        // The actor may already be gone; joining below reports that.
        if self.control.send(Request::Dispose { reply }).await.is_ok() {
            let _ = done.await;
        }
        self.actor
            .await
            .map_err(|e| PokeritError::Other(format!("runtime task failed: {e}")))?;
        info!("session runtime disposed");
        Ok(())
    }
}

// ── Actor ────────────────────────────────────────────────────────

async fn run_actor<T: Transport>(
    mut scheduler: CaptureScheduler<T>,
    mut requests: mpsc::Receiver<Request>,
) {
    loop {
        tokio::select! {
            biased;
            request = requests.recv() => match request {
                Some(Request::Dispose { reply }) => {
                    scheduler.stop().await;
                    let _ = reply.send(());
                    break;
                }
                Some(request) => apply(&mut scheduler, request).await,
                None => {
                    debug!("all control handles dropped; shutting down");
                    scheduler.stop().await;
                    break;
                }
            },
            event = scheduler.next_event() => scheduler.handle_event(event),
        }
    }
}

async fn apply<T: Transport>(scheduler: &mut CaptureScheduler<T>, request: Request) {
    // A dropped reply slot just means the caller stopped waiting.
    match request {
        Request::Start {
            session_id,
            interval_ms,
            reply,
        } => {
            let status = scheduler.start(session_id.as_deref(), interval_ms).await;
            let _ = reply.send(status);
        }
        Request::Stop { reply } => {
            let _ = reply.send(scheduler.stop().await);
        }
        Request::Status { reply } => {
            let _ = reply.send(scheduler.status());
        }
        Request::Reset { reply } => {
            let result = scheduler.reset_session().await;
            if let Err(e) = &result {
                warn!("reset rejected: {e}");
            }
            let _ = reply.send(result);
        }
        Request::UpdateGameState {
            data,
            player_name,
            reply,
        } => {
            let _ = reply.send(scheduler.submit_game_state_update(data, player_name));
        }
        Request::Dispose { reply } => {
            // Handled by the loop; kept exhaustive.
            let _ = reply.send(());
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
