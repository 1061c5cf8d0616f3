//! Boundary to the host screen-capture capability.
//!
//! The core never acquires pixels itself. It asks a [`CaptureSource`] for
//! one still image per tick and gets back either an encoded image (a
//! `data:` URI, as a browser host would hand out) or a [`CaptureError`].
//!
//! Two host adapters ship with the crate:
//!
//! | Adapter          | Host capability                                   |
//! |------------------|---------------------------------------------------|
//! | [`CommandCapture`] | runs a screenshot program, image bytes on stdout |
//! | [`FileCapture`]    | reads an image file rewritten by another tool    |

pub mod command;
pub mod file;

pub use command::CommandCapture;
pub use file::FileCapture;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::CaptureError;

/// Encoded image handed to the protocol layer untouched.
pub type ImageData = String;

/// Default JPEG quality, matching what the browser host was asked for.
pub const DEFAULT_QUALITY: u8 = 70;

// ── ImageFormat ──────────────────────────────────────────────────

/// Encoding requested from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
}

impl ImageFormat {
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    /// Guess from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }
}

// ── CaptureOptions ───────────────────────────────────────────────

/// Per-capture parameters passed through to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    pub format: ImageFormat,
    /// Encoder quality, 1..=100. Ignored by lossless formats.
    pub quality: u8,
    /// Host-specific window/context handle (display name, window id, ...).
    pub target: Option<String>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            quality: DEFAULT_QUALITY,
            target: None,
        }
    }
}

impl CaptureOptions {
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }
}

// ── CaptureSource ────────────────────────────────────────────────

/// One-shot, request/response image capture.
///
/// Each call produces at most one image. Failures come back as values;
/// implementations must not panic across this boundary.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    async fn capture(&self, options: &CaptureOptions) -> Result<ImageData, CaptureError>;
}

/// Wrap raw encoded bytes as a base64 `data:` URI.
pub fn data_uri(format: ImageFormat, bytes: &[u8]) -> Result<ImageData, CaptureError> {
    if bytes.is_empty() {
        return Err(CaptureError::Empty);
    }
    Ok(format!("data:{};base64,{}", format.mime(), STANDARD.encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_prefix_and_payload() {
        let uri = data_uri(ImageFormat::Jpeg, &[0xff, 0xd8, 0xff]).unwrap();
        assert_eq!(uri, "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn data_uri_rejects_empty() {
        assert!(matches!(data_uri(ImageFormat::Png, &[]), Err(CaptureError::Empty)));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(ImageFormat::from_extension("JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_extension("gif"), None);
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(CaptureOptions::default().with_quality(0).quality, 1);
        assert_eq!(CaptureOptions::default().with_quality(250).quality, 100);
    }
}
