//! Capture by running an external screenshot program.
//!
//! The program must write one encoded image to stdout and exit 0, e.g.
//! `grim -t jpeg -q {quality} -` on Wayland or
//! `import -window root -quality {quality} jpeg:-` on X11.
//!
//! Argument placeholders expanded per capture:
//! `{quality}`, `{format}`, `{target}` (empty when no target is set).

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use crate::capture::{CaptureOptions, CaptureSource, ImageData, data_uri};
use crate::error::CaptureError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How much of stderr to keep in an error message.
const STDERR_SNIPPET: usize = 200;

#[derive(Debug, Clone)]
pub struct CommandCapture {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandCapture {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build from a full argv (`argv[0]` is the program).
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn expand(&self, options: &CaptureOptions) -> Vec<String> {
        let quality = options.quality.to_string();
        let target = options.target.as_deref().unwrap_or("");
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{quality}", &quality)
                    .replace("{format}", options.format.as_str())
                    .replace("{target}", target)
            })
            .collect()
    }
}

#[async_trait]
impl CaptureSource for CommandCapture {
    async fn capture(&self, options: &CaptureOptions) -> Result<ImageData, CaptureError> {
        let args = self.expand(options);
        trace!(program = %self.program, ?args, "running capture command");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    CaptureError::Unavailable(format!("{} not found", self.program))
                }
                std::io::ErrorKind::PermissionDenied => {
                    CaptureError::PermissionDenied(format!("cannot execute {}", self.program))
                }
                _ => CaptureError::Io(e),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CaptureError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let snippet: String = stderr.trim().chars().take(STDERR_SNIPPET).collect();
            return Err(CaptureError::Failed(format!(
                "{} exited with {}: {snippet}",
                self.program, output.status
            )));
        }

        data_uri(options.format, &output.stdout)
    }
}

// ── Tests ────────────────────────────────────────────────────────
