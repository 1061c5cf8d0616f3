//! Capture by reading an image file that some other tool keeps fresh.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::capture::{CaptureOptions, CaptureSource, ImageData, ImageFormat, data_uri};
use crate::error::CaptureError;

#[derive(Debug, Clone)]
pub struct FileCapture {
    path: PathBuf,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Format implied by the extension, else the requested one.
    fn format(&self, options: &CaptureOptions) -> ImageFormat {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageFormat::from_extension)
            .unwrap_or(options.format)
    }
}

#[async_trait]
impl CaptureSource for FileCapture {
    async fn capture(&self, options: &CaptureOptions) -> Result<ImageData, CaptureError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                CaptureError::Unavailable(format!("{} does not exist", self.path.display()))
            }
            std::io::ErrorKind::PermissionDenied => {
                CaptureError::PermissionDenied(self.path.display().to_string())
            }
            _ => CaptureError::Io(e),
        })?;
        data_uri(self.format(options), &bytes)
    }
}
