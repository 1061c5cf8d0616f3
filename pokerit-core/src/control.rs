//! Command interface exposed to whatever drives capture (UI, CLI, tests).
//!
//! [`ControlSurface`] is a cheap, cloneable handle onto a running
//! [`SessionRuntime`](crate::runtime::SessionRuntime). Its operations map
//! one-to-one onto the scheduler and are safe to call repeatedly and in
//! any order.
//!
//! The JSON command format is one object per request, discriminated by
//! `type`:
//!
//! ```text
//! {"type":"START_CAPTURE","sessionId"?:string,"interval"?:number}  → {"success":true}
//! {"type":"STOP_CAPTURE"}                                          → {"success":true}
//! {"type":"GET_STATUS"}              → {"isCapturing","sessionId","captureInterval",...}
//! {"type":"RESET_SESSION"}                                         → {"success":true|false}
//! {"type":"UPDATE_GAME_STATE","data":{..},"playerName"?:string}    → {"success":sent}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::PokeritError;
use crate::runtime::Request;
use crate::scheduler::CaptureStatus;

// ── Command / Response ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    StartCapture {
        #[serde(default, rename = "sessionId")]
        session_id: Option<String>,
        /// Milliseconds; non-positive values fall back.
        #[serde(default)]
        interval: Option<i64>,
    },
    StopCapture {},
    GetStatus {},
    ResetSession {},
    UpdateGameState {
        data: Value,
        #[serde(default, rename = "playerName")]
        player_name: Option<String>,
    },
}

impl Command {
    pub fn parse(text: &str) -> Result<Self, PokeritError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Status(CaptureStatus),
    Failed { success: bool, error: String },
    Ack { success: bool },
}

impl Response {
    pub fn ok() -> Self {
        Self::Ack { success: true }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self::Failed {
            success: false,
            error: error.to_string(),
        }
    }
}

// ── ControlSurface ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ControlSurface {
    tx: mpsc::Sender<Request>,
}

impl ControlSurface {
    pub(crate) fn new(tx: mpsc::Sender<Request>) -> Self {
        Self { tx }
    }

    pub(crate) async fn send(&self, request: Request) -> Result<(), PokeritError> {
        self.tx.send(request).await?;
        Ok(())
    }

    async fn call<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> Request,
    ) -> Result<R, PokeritError> {
        let (reply, response) = oneshot::channel();
        self.send(make(reply)).await?;
        Ok(response.await?)
    }

    pub async fn request_start(
        &self,
        session_id: Option<String>,
        interval_ms: Option<i64>,
    ) -> Result<CaptureStatus, PokeritError> {
        self.call(|reply| Request::Start {
            session_id,
            interval_ms,
            reply,
        })
        .await
    }

    pub async fn request_stop(&self) -> Result<CaptureStatus, PokeritError> {
        self.call(|reply| Request::Stop { reply }).await
    }

    pub async fn request_status(&self) -> Result<CaptureStatus, PokeritError> {
        self.call(|reply| Request::Status { reply }).await
    }

    pub async fn request_reset(&self) -> Result<CaptureStatus, PokeritError> {
        self.call(|reply| Request::Reset { reply }).await?
    }

    /// Returns whether the update went out on an open link.
    pub async fn request_game_state_update(
        &self,
        data: Value,
        player_name: Option<String>,
    ) -> Result<bool, PokeritError> {
        self.call(|reply| Request::UpdateGameState {
            data,
            player_name,
            reply,
        })
        .await
    }

    /// Run one wire command and build its wire response.
    pub async fn handle(&self, command: Command) -> Response {
        let result = match command {
            Command::StartCapture {
                session_id,
                interval,
            } => self.request_start(session_id, interval).await.map(|_| Response::ok()),
            Command::StopCapture {} => self.request_stop().await.map(|_| Response::ok()),
            Command::GetStatus {} => self.request_status().await.map(Response::Status),
            Command::ResetSession {} => self.request_reset().await.map(|_| Response::ok()),
            Command::UpdateGameState { data, player_name } => self
                .request_game_state_update(data, player_name)
                .await
                .map(|success| Response::Ack { success }),
        };
        result.unwrap_or_else(Response::failed)
    }

    /// Parse and run one JSON command line.
    pub async fn handle_text(&self, text: &str) -> Response {
        match Command::parse(text) {
            Ok(command) => self.handle(command).await,
            Err(e) => Response::failed(e),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
