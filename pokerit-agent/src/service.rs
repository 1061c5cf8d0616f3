//! Agent service: one capture session driven over a line-oriented console.
//!
//! Each input line is a JSON command (see [`pokerit_core::control`]); each
//! output line is either the command's response or a server push:
//!
//! ```text
//! → {"type":"START_CAPTURE","interval":1500}
//! ← {"success":true}
//! ← {"event":"inbound","type":"ai_suggestion","data":{...}}
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use pokerit_core::protocol::InboundMessage;
use pokerit_core::session::JsonFileStore;
use pokerit_core::{ControlSurface, SessionRuntime};

use crate::config::AgentConfig;

/// What to do before the console starts reading.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Begin capturing immediately.
    pub start: bool,
    pub session_id: Option<String>,
    pub interval_ms: Option<i64>,
}

/// A server push as printed on the console.
#[derive(Debug, Serialize)]
struct InboundEvent<'a> {
    event: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a Value,
}

impl<'a> From<&'a InboundMessage> for InboundEvent<'a> {
    fn from(message: &'a InboundMessage) -> Self {
        Self {
            event: "inbound",
            kind: message.kind(),
            data: message.payload(),
        }
    }
}

// ── AgentService ─────────────────────────────────────────────────

pub struct AgentService {
    config: AgentConfig,
    running: Arc<AtomicBool>,
}

impl AgentService {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops [`run`](Self::run) when cleared from another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run until the stop handle is cleared.
    ///
    /// Without autostart the end of input also ends the run. With it, the
    /// session keeps capturing after the input closes.
    pub async fn run<R, W>(
        &self,
        options: StartOptions,
        input: R,
        mut output: W,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.running.store(true, Ordering::SeqCst);

        let store_path = self.config.store_path();
        info!("session file: {}", store_path.display());
        let runtime = SessionRuntime::connect(
            self.config.to_transport_config(),
            self.config.to_scheduler_config(),
            Arc::new(JsonFileStore::new(store_path)),
            self.config.to_capture_source()?,
        );
        let control = runtime.control();

        if options.start {
            let status = runtime.start(options.session_id, options.interval_ms).await?;
            info!(
                session = status.session_id.as_deref().unwrap_or(""),
                interval_ms = status.capture_interval,
                "capture started"
            );
        }

        let result = self
            .console(&runtime, &control, input, &mut output, options.start)
            .await;

        runtime.dispose().await?;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn console<R, W>(
        &self,
        runtime: &SessionRuntime,
        control: &ControlSurface,
        input: R,
        output: &mut W,
        autostarted: bool,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut input_open = true;
        let mut inbound = runtime.subscribe();

        loop {
            tokio::select! {
                line = lines.next_line(), if input_open => match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        debug!("command: {line}");
                        let response = control.handle_text(line).await;
                        write_line(output, &response).await?;
                    }
                    Ok(None) => {
                        if !autostarted {
                            info!("input closed");
                            break;
                        }
                        info!("input closed; capturing until stopped");
                        input_open = false;
                    }
                    Err(e) => {
                        warn!("input error: {e}");
                        if !autostarted {
                            break;
                        }
                        input_open = false;
                    }
                },
                message = inbound.recv() => match message {
                    Ok(message) => write_line(output, &InboundEvent::from(&message)).await?,
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "inbound printer fell behind"),
                    Err(RecvError::Closed) => break,
                },
                _ = Self::wait_for_stop(&self.running) => {
                    info!("stop requested");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

async fn write_line<W, T>(output: &mut W, value: &T) -> Result<(), Box<dyn std::error::Error>>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await?;
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
