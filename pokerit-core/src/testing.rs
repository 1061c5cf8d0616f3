//! In-process doubles for scheduler and runtime tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Semaphore, broadcast};

use crate::capture::{CaptureOptions, CaptureSource, ImageData};
use crate::error::CaptureError;
use crate::protocol::{InboundMessage, OutboundFrame};
use crate::transport::{ConnectionState, Transport};

// ── FakeTransport ────────────────────────────────────────────────

/// Records everything; clones share state so a test can keep one.
#[derive(Clone)]
pub struct FakeTransport {
    inner: Arc<FakeInner>,
}

struct FakeInner {
    open: AtomicBool,
    open_on_connect: AtomicBool,
    closes: AtomicUsize,
    opened: Mutex<Vec<String>>,
    sent: Mutex<Vec<OutboundFrame>>,
    inbound: broadcast::Sender<InboundMessage>,
}

impl FakeTransport {
    /// `open` immediately reaches `Open`.
    pub fn new() -> Self {
        let (inbound, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(FakeInner {
                open: AtomicBool::new(false),
                open_on_connect: AtomicBool::new(true),
                closes: AtomicUsize::new(0),
                opened: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                inbound,
            }),
        }
    }

    /// `open` stays in a not-open state until `set_open(true)`.
    pub fn unreachable() -> Self {
        let fake = Self::new();
        fake.inner.open_on_connect.store(false, Ordering::SeqCst);
        fake
    }

    pub fn set_open(&self, open: bool) {
        self.inner.open.store(open, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundFrame> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.inner.opened.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn push_inbound(&self, message: InboundMessage) {
        let _ = self.inner.inbound.send(message);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&mut self, session_id: &str) {
        self.inner.opened.lock().unwrap().push(session_id.to_string());
        let open = self.inner.open_on_connect.load(Ordering::SeqCst);
        self.inner.open.store(open, Ordering::SeqCst);
    }

    async fn close(&mut self) {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.open.store(false, Ordering::SeqCst);
    }

    fn send(&self, frame: &OutboundFrame) -> bool {
        if !self.inner.open.load(Ordering::SeqCst) {
            return false;
        }
        self.inner.sent.lock().unwrap().push(frame.clone());
        true
    }

    fn state(&self) -> ConnectionState {
        if self.inner.open.load(Ordering::SeqCst) {
            ConnectionState::Open
        } else {
            ConnectionState::Disconnected
        }
    }

    fn inbound(&self) -> broadcast::Sender<InboundMessage> {
        self.inner.inbound.clone()
    }
}

// ── Capture doubles ──────────────────────────────────────────────

/// Returns `<data>` (or a fixed error) and counts calls.
pub struct ScriptedCapture {
    calls: AtomicUsize,
    fail: bool,
}

impl ScriptedCapture {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureSource for ScriptedCapture {
    async fn capture(&self, _options: &CaptureOptions) -> Result<ImageData, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(CaptureError::PermissionDenied("no active tab".into()))
        } else {
            Ok("<data>".into())
        }
    }
}

/// Blocks every capture until the test releases it.
pub struct GatedCapture {
    gate: Semaphore,
    started: AtomicUsize,
}

impl GatedCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
        })
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureSource for GatedCapture {
    async fn capture(&self, _options: &CaptureOptions) -> Result<ImageData, CaptureError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| CaptureError::Failed("gate closed".into()))?;
        permit.forget();
        Ok("<late>".into())
    }
}
