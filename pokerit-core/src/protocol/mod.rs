//! Wire message types.
//!
//! Messages are JSON text, one per WebSocket frame, discriminated by a
//! `type` field:
//!
//! ```text
//! client → server  {"type":"screen_capture","sessionId":..,"imageData":..,"timestamp":..}
//! client → server  {"type":"game_state_update","data":{..},"player_name"?:..}
//! server → client  {"type":"game_state","data":{..}}
//! server → client  {"type":"ai_suggestion","data":{..}}
//! ```
//!
//! Game state and suggestion bodies are opaque to the core.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque game-state body pushed by the analysis service.
pub type GameState = Value;

/// Opaque suggestion body pushed by the analysis service.
pub type Suggestion = Value;

// ── OutboundFrame ────────────────────────────────────────────────

/// A message the client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// One captured screen image.
    ScreenCapture {
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Encoded image, normally a `data:` URI.
        #[serde(rename = "imageData")]
        image_data: String,
        /// Milliseconds since the Unix epoch.
        timestamp: u64,
    },

    /// A manually entered game-state correction.
    GameStateUpdate {
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_name: Option<String>,
    },
}

impl OutboundFrame {
    pub fn screen_capture(
        session_id: impl Into<String>,
        image_data: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self::ScreenCapture {
            session_id: session_id.into(),
            image_data: image_data.into(),
            timestamp,
        }
    }

    /// The `type` discriminator as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ScreenCapture { .. } => "screen_capture",
            Self::GameStateUpdate { .. } => "game_state_update",
        }
    }
}

// ── InboundMessage ───────────────────────────────────────────────

/// A message pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InboundMessage {
    GameState(GameState),
    AiSuggestion(Suggestion),
}

impl InboundMessage {
    pub const GAME_STATE: &'static str = "game_state";
    pub const AI_SUGGESTION: &'static str = "ai_suggestion";

    pub fn kind(&self) -> &'static str {
        match self {
            Self::GameState(_) => Self::GAME_STATE,
            Self::AiSuggestion(_) => Self::AI_SUGGESTION,
        }
    }

    pub fn payload(&self) -> &Value {
        match self {
            Self::GameState(v) | Self::AiSuggestion(v) => v,
        }
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn screen_capture_wire_shape() {
        let frame = OutboundFrame::screen_capture("s1", "data:image/jpeg;base64,AAAA", 1_700_000_000_000);
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "screen_capture",
                "sessionId": "s1",
                "imageData": "data:image/jpeg;base64,AAAA",
                "timestamp": 1_700_000_000_000u64,
            })
        );
        assert_eq!(frame.kind(), "screen_capture");
    }

    #[test]
    fn game_state_update_omits_missing_player() {
        let frame = OutboundFrame::GameStateUpdate {
            data: json!({"pot": 120}),
            player_name: None,
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value, json!({"type": "game_state_update", "data": {"pot": 120}}));
    }

    #[test]
    fn inbound_serializes_adjacently_tagged() {
        let msg = InboundMessage::AiSuggestion(json!({"action": "fold"}));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"type": "ai_suggestion", "data": {"action": "fold"}}));
        assert_eq!(msg.payload()["action"], "fold");
    }

    #[test]
    fn now_millis_is_recent() {
        // 2020-01-01 in ms.
        assert!(now_millis() > 1_577_836_800_000);
    }
}
