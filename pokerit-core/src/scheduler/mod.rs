//! Capture scheduler: the `Idle`/`Active` state machine and its timer.
//!
//! ```text
//!            start (from either state; Active is stopped first)
//!   Idle ───────────────────────────────────────────────► Active
//!    ▲                                                       │
//!    └─────────────────────────── stop ──────────────────────┘
//! ```
//!
//! Invariant: the repeating timer exists iff the state is `Active`.
//!
//! The scheduler is driven from a single task. [`next_event`] yields the
//! next thing that needs attention (a timer tick or a finished capture)
//! and [`handle_event`] reacts to it. Captures run on their own task so a
//! slow host never blocks commands; every capture carries the generation
//! of the run that requested it, and a result whose generation is no
//! longer current is discarded instead of sent.
//!
//! [`next_event`]: CaptureScheduler::next_event
//! [`handle_event`]: CaptureScheduler::handle_event

pub mod state;

pub use state::{CaptureState, CaptureStats, CaptureStatus};

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::capture::{CaptureOptions, CaptureSource, ImageData};
use crate::error::{CaptureError, PokeritError};
use crate::protocol::{OutboundFrame, now_millis};
use crate::session::{DEFAULT_INTERVAL_MS, Session, SessionStore, StoredSession};
use crate::transport::Transport;

// ── SchedulerConfig ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval used when neither the request nor the store has one.
    pub default_interval_ms: u64,
    /// Passed to the capture source on every tick.
    pub capture: CaptureOptions,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: DEFAULT_INTERVAL_MS,
            capture: CaptureOptions::default(),
        }
    }
}

// ── Events ───────────────────────────────────────────────────────

/// Result of one capture, tagged with the run that asked for it.
#[derive(Debug)]
pub struct CaptureOutcome {
    pub generation: u64,
    pub result: Result<ImageData, CaptureError>,
}

#[derive(Debug)]
pub enum SchedulerEvent {
    Tick,
    CaptureDone(CaptureOutcome),
}

// ── CaptureScheduler ─────────────────────────────────────────────

pub struct CaptureScheduler<T: Transport> {
    transport: T,
    store: Arc<dyn SessionStore>,
    source: Arc<dyn CaptureSource>,
    options: Arc<CaptureOptions>,
    default_interval_ms: u64,

    state: CaptureState,
    session_id: Option<String>,
    interval_ms: u64,
    timer: Option<Interval>,

    /// Bumped on every start and stop.
    generation: u64,
    /// Generation of the capture currently running, if any.
    in_flight: Option<u64>,
    completions_tx: mpsc::UnboundedSender<CaptureOutcome>,
    completions_rx: mpsc::UnboundedReceiver<CaptureOutcome>,

    stats: CaptureStats,
}

impl<T: Transport> CaptureScheduler<T> {
    /// Create an idle scheduler, seeded from whatever the store holds.
    pub fn new(
        transport: T,
        store: Arc<dyn SessionStore>,
        source: Arc<dyn CaptureSource>,
        config: SchedulerConfig,
    ) -> Self {
        let stored = store.load();
        let default_interval_ms = config.default_interval_ms.max(1);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        Self {
            transport,
            store,
            source,
            options: Arc::new(config.capture),
            default_interval_ms,
            state: CaptureState::Idle,
            session_id: stored.session_id,
            interval_ms: stored.capture_interval_ms.unwrap_or(default_interval_ms),
            timer: None,
            generation: 0,
            in_flight: None,
            completions_tx,
            completions_rx,
            stats: CaptureStats::default(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == CaptureState::Active
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Snapshot for the control layer. No side effects.
    pub fn status(&self) -> CaptureStatus {
        CaptureStatus {
            is_capturing: self.is_active(),
            session_id: self.session_id.clone(),
            capture_interval: self.interval_ms,
            connection: self.transport.state(),
            stats: self.stats,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Start (or restart) capturing.
    ///
    /// An active run is stopped first. The resolved session is persisted,
    /// the transport is opened for it and the timer is armed; the first
    /// tick fires one interval from now.
    pub async fn start(
        &mut self,
        requested_id: Option<&str>,
        requested_interval_ms: Option<i64>,
    ) -> CaptureStatus {
        if self.is_active() {
            self.stop().await;
        }

        let stored = with_store(Arc::clone(&self.store), |store| store.load())
            .await
            .unwrap_or_else(|e| {
                warn!("{e}; treating session as unset");
                StoredSession::default()
            });
        let known = StoredSession {
            session_id: stored.session_id.or_else(|| self.session_id.clone()),
            capture_interval_ms: stored.capture_interval_ms.or(Some(self.interval_ms)),
        };
        let session = Session::resolve(
            requested_id,
            requested_interval_ms,
            &known,
            self.default_interval_ms,
        );

        let stored = session.to_stored();
        let saved = with_store(Arc::clone(&self.store), move |store| store.save(&stored)).await;
        if let Err(e) = saved.and_then(|r| r) {
            warn!(session = %session.session_id, "cannot persist session: {e}");
        }

        self.transport.open(&session.session_id).await;

        let period = Duration::from_millis(session.capture_interval_ms);
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.generation += 1;
        self.in_flight = None;
        self.timer = Some(timer);
        self.state = CaptureState::Active;
        self.interval_ms = session.capture_interval_ms;
        self.session_id = Some(session.session_id);

        info!(
            session = self.session_id.as_deref().unwrap_or_default(),
            interval_ms = self.interval_ms,
            "capture started"
        );
        self.status()
    }

    /// Stop capturing. A no-op while idle.
    ///
    /// The timer is disarmed before the transport is closed; a capture
    /// still running keeps running but its result will be discarded.
    pub async fn stop(&mut self) -> CaptureStatus {
        if !self.is_active() {
            return self.status();
        }

        self.timer = None;
        self.generation += 1;
        self.state = CaptureState::Idle;
        self.transport.close().await;

        info!(
            session = self.session_id.as_deref().unwrap_or_default(),
            "capture stopped"
        );
        self.status()
    }

    /// Forget the persisted session. Only allowed while idle.
    pub async fn reset_session(&mut self) -> Result<CaptureStatus, PokeritError> {
        if self.is_active() {
            return Err(PokeritError::InvalidTransition(
                "cannot reset session while capturing",
            ));
        }
        with_store(Arc::clone(&self.store), |store| store.clear()).await??;
        self.session_id = None;
        self.interval_ms = self.default_interval_ms;
        info!("session reset");
        Ok(self.status())
    }

    /// Send a manual game-state update over the current link.
    ///
    /// Follows the same rule as capture frames: dropped unless open.
    pub fn submit_game_state_update(&mut self, data: Value, player_name: Option<String>) -> bool {
        let frame = OutboundFrame::GameStateUpdate { data, player_name };
        let sent = self.transport.send(&frame);
        if !sent {
            debug!("link not open; game state update dropped");
        }
        sent
    }

    // ── Event loop ───────────────────────────────────────────────

    /// Wait for the next tick or capture completion.
    ///
    /// Cancel safe. Pends forever while idle with nothing in flight.
    pub async fn next_event(&mut self) -> SchedulerEvent {
        tokio::select! {
            Some(outcome) = self.completions_rx.recv() => SchedulerEvent::CaptureDone(outcome),
            _ = next_tick(&mut self.timer) => SchedulerEvent::Tick,
        }
    }

    pub fn handle_event(&mut self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::Tick => self.on_tick(),
            SchedulerEvent::CaptureDone(outcome) => self.on_capture_done(outcome),
        }
    }

    /// One scheduled cycle: kick off a capture if the link can take it.
    pub fn on_tick(&mut self) {
        if !self.is_active() {
            return;
        }
        if !self.transport.is_open() {
            self.stats.ticks_skipped += 1;
            debug!(connection = %self.transport.state(), "link not open; skipping tick");
            return;
        }
        if self.in_flight == Some(self.generation) {
            self.stats.ticks_skipped += 1;
            debug!("previous capture still running; skipping tick");
            return;
        }

        let generation = self.generation;
        let source = Arc::clone(&self.source);
        let options = Arc::clone(&self.options);
        let completions = self.completions_tx.clone();
        self.in_flight = Some(generation);

        trace!(generation, "capturing");
        tokio::spawn(async move {
            let result = AssertUnwindSafe(source.capture(&options))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(CaptureError::Failed("capture source panicked".into())));
            let _ = completions.send(CaptureOutcome { generation, result });
        });
    }

    /// A capture finished: send it if its run is still the current one.
    pub fn on_capture_done(&mut self, outcome: CaptureOutcome) {
        if self.in_flight == Some(outcome.generation) {
            self.in_flight = None;
        }

        if outcome.generation != self.generation || !self.is_active() {
            self.stats.stale_discarded += 1;
            debug!(
                generation = outcome.generation,
                current = self.generation,
                "discarding capture from a finished run"
            );
            return;
        }

        let image = match outcome.result {
            Ok(image) => image,
            Err(e) => {
                self.stats.capture_failures += 1;
                warn!("capture failed: {e}");
                return;
            }
        };

        let Some(session_id) = self.session_id.clone() else {
            return;
        };
        let frame = OutboundFrame::screen_capture(session_id, image, now_millis());
        if self.transport.send(&frame) {
            self.stats.frames_sent += 1;
            trace!(frames_sent = self.stats.frames_sent, "frame sent");
        } else {
            self.stats.ticks_skipped += 1;
            debug!("link dropped while capturing; frame discarded");
        }
    }
}

/// Run a store operation on the blocking pool; file stores do sync I/O.
async fn with_store<R, F>(store: Arc<dyn SessionStore>, op: F) -> Result<R, PokeritError>
where
    R: Send + 'static,
    F: FnOnce(&dyn SessionStore) -> R + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| PokeritError::Other(format!("session store task failed: {e}")))
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStore;
    use crate::testing::{FakeTransport, GatedCapture, ScriptedCapture};
    use serde_json::json;

    fn scheduler(
        transport: &FakeTransport,
        store: &MemoryStore,
        source: Arc<dyn CaptureSource>,
    ) -> CaptureScheduler<FakeTransport> {
        CaptureScheduler::new(
            transport.clone(),
            Arc::new(store.clone()),
            source,
            SchedulerConfig::default(),
        )
    }

    /// Drive one full tick: timer fires, capture runs, result handled.
    async fn run_tick(s: &mut CaptureScheduler<FakeTransport>) {
        let event = s.next_event().await;
        assert!(matches!(event, SchedulerEvent::Tick));
        s.handle_event(event);
        if s.in_flight.is_some() {
            let done = s.next_event().await;
            assert!(matches!(done, SchedulerEvent::CaptureDone(_)));
            s.handle_event(done);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_tick_sends_capture_frame() {
        let transport = FakeTransport::new();
        let store = MemoryStore::new();
        let mut s = scheduler(&transport, &store, ScriptedCapture::ok());

        let status = s.start(Some("s1"), Some(1000)).await;
        assert!(status.is_capturing);
        assert_eq!(status.capture_interval, 1000);
        assert_eq!(status.session_id.as_deref(), Some("s1"));
        assert_eq!(transport.opened(), vec!["s1".to_string()]);

        let started = Instant::now();
        run_tick(&mut s).await;
        assert_eq!(started.elapsed(), Duration::from_millis(1000));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let value = serde_json::to_value(&sent[0]).unwrap();
        assert_eq!(value["type"], "screen_capture");
        assert_eq!(value["sessionId"], "s1");
        assert_eq!(value["imageData"], "<data>");
        assert!(value["timestamp"].is_u64());

        let status = s.stop().await;
        assert!(!status.is_capturing);
        assert!(!s.timer_armed());
        assert_eq!(transport.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_persists_both_fields() {
        let transport = FakeTransport::new();
        let store = MemoryStore::new();
        let mut s = scheduler(&transport, &store, ScriptedCapture::ok());

        s.start(Some("s9"), Some(750)).await;
        assert_eq!(
            store.load(),
            StoredSession {
                session_id: Some("s9".into()),
                capture_interval_ms: Some(750),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restart_leaves_exactly_one_timer() {
        let transport = FakeTransport::new();
        let store = MemoryStore::new();
        let mut s = scheduler(&transport, &store, ScriptedCapture::ok());

        s.start(Some("s1"), Some(1000)).await;
        s.start(Some("s1"), Some(1000)).await;
        assert!(s.timer_armed());
        assert_eq!(transport.opened().len(), 2);
        assert_eq!(transport.closes(), 1);

        let deadline = Instant::now() + Duration::from_millis(3500);
        let mut ticks = 0;
        loop {
            let event = tokio::select! {
                event = s.next_event() => event,
                _ = tokio::time::sleep_until(deadline) => break,
            };
            if matches!(event, SchedulerEvent::Tick) {
                ticks += 1;
            }
            s.handle_event(event);
        }
        assert_eq!(ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_idle_is_noop() {
        let transport = FakeTransport::new();
        let store = MemoryStore::with(StoredSession {
            session_id: Some("kept".into()),
            capture_interval_ms: Some(900),
        });
        let mut s = scheduler(&transport, &store, ScriptedCapture::ok());

        let before = s.status();
        let after = s.stop().await;
        assert_eq!(before, after);
        assert_eq!(transport.closes(), 0);
        assert_eq!(store.load().session_id.as_deref(), Some("kept"));
    }

    #[tokio::test(start_paused = true)]
    async fn status_before_start_reflects_store() {
        let store = MemoryStore::with(StoredSession {
            session_id: Some("session_abc".into()),
            capture_interval_ms: Some(1500),
        });
        let s = scheduler(&FakeTransport::new(), &store, ScriptedCapture::ok());
        let status = s.status();
        assert!(!status.is_capturing);
        assert_eq!(status.session_id.as_deref(), Some("session_abc"));
        assert_eq!(status.capture_interval, 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_is_skipped_while_transport_not_open() {
        let transport = FakeTransport::unreachable();
        let store = MemoryStore::new();
        let source = ScriptedCapture::ok();
        let mut s = scheduler(&transport, &store, source.clone());

        s.start(Some("s1"), Some(500)).await;
        run_tick(&mut s).await;
        run_tick(&mut s).await;

        assert!(s.is_active());
        assert_eq!(source.calls(), 0);
        assert!(transport.sent().is_empty());
        assert_eq!(s.stats().ticks_skipped, 2);

        // Link comes back: the schedule resumes without a new start.
        transport.set_open(true);
        run_tick(&mut s).await;
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_suppresses_in_flight_capture() {
        let transport = FakeTransport::new();
        let store = MemoryStore::new();
        let gate = GatedCapture::new();
        let mut s = scheduler(&transport, &store, gate.clone());

        s.start(Some("s1"), Some(1000)).await;
        let tick = s.next_event().await;
        s.handle_event(tick);
        while gate.started() == 0 {
            tokio::task::yield_now().await;
        }

        s.stop().await;
        gate.release();

        let done = s.next_event().await;
        assert!(matches!(done, SchedulerEvent::CaptureDone(_)));
        s.handle_event(done);

        assert!(transport.sent().is_empty());
        assert_eq!(s.stats().stale_discarded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_capture_is_not_sent_into_a_new_run() {
        let transport = FakeTransport::new();
        let store = MemoryStore::new();
        let gate = GatedCapture::new();
        let mut s = scheduler(&transport, &store, gate.clone());

        s.start(Some("old"), Some(1000)).await;
        let tick = s.next_event().await;
        s.handle_event(tick);
        while gate.started() == 0 {
            tokio::task::yield_now().await;
        }

        // Restart under a new session before the old capture resolves.
        s.start(Some("new"), Some(1000)).await;
        gate.release();

        let done = s.next_event().await;
        s.handle_event(done);
        assert!(transport.sent().is_empty());
        assert_eq!(s.stats().stale_discarded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_tick_is_skipped() {
        let transport = FakeTransport::new();
        let store = MemoryStore::new();
        let gate = GatedCapture::new();
        let mut s = scheduler(&transport, &store, gate.clone());

        s.start(Some("s1"), Some(100)).await;
        for _ in 0..2 {
            let event = s.next_event().await;
            assert!(matches!(event, SchedulerEvent::Tick));
            s.handle_event(event);
        }
        while gate.started() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(gate.started(), 1);
        assert_eq!(s.stats().ticks_skipped, 1);

        gate.release();
        let done = s.next_event().await;
        s.handle_event(done);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_failure_is_counted_and_schedule_continues() {
        let transport = FakeTransport::new();
        let store = MemoryStore::new();
        let source = ScriptedCapture::failing();
        let mut s = scheduler(&transport, &store, source.clone());

        s.start(Some("s1"), Some(200)).await;
        run_tick(&mut s).await;
        run_tick(&mut s).await;

        assert!(s.is_active());
        assert_eq!(source.calls(), 2);
        assert_eq!(s.stats().capture_failures, 2);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_without_id_reuses_previous_session() {
        let transport = FakeTransport::new();
        let store = MemoryStore::new();
        let mut s = scheduler(&transport, &store, ScriptedCapture::ok());

        s.start(Some("session_abc"), None).await;
        s.stop().await;
        let status = s.start(None, None).await;
        assert_eq!(status.session_id.as_deref(), Some("session_abc"));
        assert_eq!(status.capture_interval, DEFAULT_INTERVAL_MS);
        assert_eq!(transport.opened(), vec!["session_abc", "session_abc"]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_interval_falls_back_to_default() {
        let mut s = scheduler(&FakeTransport::new(), &MemoryStore::new(), ScriptedCapture::ok());
        let status = s.start(Some("s1"), Some(0)).await;
        assert!(status.is_capturing);
        assert_eq!(status.capture_interval, DEFAULT_INTERVAL_MS);
    }

    #[tokio::test(start_paused = true)]
    async fn generated_session_when_nothing_known() {
        let store = MemoryStore::new();
        let mut s = scheduler(&FakeTransport::new(), &store, ScriptedCapture::ok());
        let status = s.start(None, None).await;
        let id = status.session_id.unwrap();
        assert!(id.starts_with("session_"));
        assert_eq!(store.load().session_id.as_deref(), Some(id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_session_only_while_idle() {
        let store = MemoryStore::new();
        let mut s = scheduler(&FakeTransport::new(), &store, ScriptedCapture::ok());

        s.start(Some("s1"), Some(1000)).await;
        assert!(s.reset_session().await.is_err());
        assert_eq!(store.load().session_id.as_deref(), Some("s1"));

        s.stop().await;
        let status = s.reset_session().await.unwrap();
        assert!(status.session_id.is_none());
        assert_eq!(status.capture_interval, DEFAULT_INTERVAL_MS);
        assert_eq!(store.load(), StoredSession::default());
    }

    #[tokio::test(start_paused = true)]
    async fn game_state_update_requires_open_link() {
        let transport = FakeTransport::new();
        let mut s = scheduler(&transport, &MemoryStore::new(), ScriptedCapture::ok());

        assert!(!s.submit_game_state_update(json!({"pot": 10}), None));

        s.start(Some("s1"), None).await;
        assert!(s.submit_game_state_update(json!({"pot": 10}), Some("hero".into())));
        assert_eq!(
            transport.sent(),
            vec![OutboundFrame::GameStateUpdate {
                data: json!({"pot": 10}),
                player_name: Some("hero".into()),
            }]
        );
    }

    /// Store whose writes hold the calling thread, like a slow disk.
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    impl SessionStore for SlowStore {
        fn load(&self) -> StoredSession {
            self.inner.load()
        }

        fn save(&self, session: &StoredSession) -> Result<(), PokeritError> {
            std::thread::sleep(self.delay);
            self.inner.save(session)
        }

        fn clear(&self) -> Result<(), PokeritError> {
            std::thread::sleep(self.delay);
            self.inner.clear()
        }
    }

    #[tokio::test]
    async fn slow_store_does_not_stall_other_tasks() {
        let inner = MemoryStore::new();
        let store = SlowStore {
            inner: inner.clone(),
            delay: Duration::from_millis(300),
        };
        let mut s = CaptureScheduler::new(
            FakeTransport::new(),
            Arc::new(store),
            ScriptedCapture::ok(),
            SchedulerConfig::default(),
        );

        let began = Instant::now();
        let other = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Instant::now()
        });

        s.start(Some("s1"), Some(1000)).await;
        assert!(began.elapsed() >= Duration::from_millis(300));
        assert_eq!(inner.load().session_id.as_deref(), Some("s1"));

        let other_done = other.await.unwrap();
        assert!(
            other_done - began < Duration::from_millis(250),
            "session write blocked the runtime thread"
        );
    }
}
