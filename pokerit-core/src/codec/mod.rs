//! JSON text codec for the capture protocol.
//!
//! Encoding cannot fail in practice (all outbound fields are strings,
//! numbers or already-valid JSON values). Decoding validates the `type`
//! discriminator before anything is dispatched; payloads pass through
//! untouched.

use serde_json::Value;

use crate::error::{DecodeError, PokeritError};
use crate::protocol::{InboundMessage, OutboundFrame};

/// Serialise an outbound frame to its wire text.
pub fn encode(frame: &OutboundFrame) -> Result<String, PokeritError> {
    Ok(serde_json::to_string(frame)?)
}

/// Parse one inbound frame.
///
/// A missing `data` field decodes as a `null` payload; the server always
/// sends one, but the body is opaque here so its absence is not an error.
pub fn decode(bytes: &[u8]) -> Result<InboundMessage, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotText)?;
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let Value::Object(mut object) = value else {
        return Err(DecodeError::Malformed("expected a JSON object".into()));
    };

    let kind = match object.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(DecodeError::MissingType),
    };
    let data = object.remove("data").unwrap_or(Value::Null);

    match kind.as_str() {
        InboundMessage::GAME_STATE => Ok(InboundMessage::GameState(data)),
        InboundMessage::AI_SUGGESTION => Ok(InboundMessage::AiSuggestion(data)),
        _ => Err(DecodeError::UnknownType(kind)),
    }
}

// ── Tests ────────────────────────────────────────────────────────
