//! Configuration for the screen agent.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pokerit_core::capture::{CaptureOptions, CaptureSource, CommandCapture, FileCapture, ImageFormat};
use pokerit_core::error::ConfigError;
use pokerit_core::scheduler::SchedulerConfig;
use pokerit_core::session::DEFAULT_INTERVAL_MS;
use pokerit_core::transport::{DEFAULT_SERVER_URL, TransportConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Server connection settings.
    pub network: NetworkConfig,
    /// Screen capture settings.
    pub capture: CaptureConfig,
    /// Session persistence.
    pub session: SessionConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Analysis server base URL (`http://`, `ws://` or bare `host:port`).
    pub server_url: String,
    /// Fixed wait after a dropped connection before reconnecting.
    pub reconnect_delay_ms: u64,
    /// Upper bound on one WebSocket handshake.
    pub connect_timeout_ms: u64,
    /// Frames buffered for the socket writer before new ones are dropped.
    pub outbound_queue: usize,
}

/// Where screenshots come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Run `command`; the image is read from its stdout.
    Command,
    /// Read `file`, kept fresh by some other tool.
    File,
}

/// Screen capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: SourceKind,
    /// Screenshot program argv. `{quality}`, `{format}` and `{target}` are
    /// expanded on every capture.
    pub command: Vec<String>,
    /// Image file for the `file` source.
    pub file: String,
    /// "jpeg" or "png".
    pub format: ImageFormat,
    /// Encoder quality, 1..=100.
    pub quality: u8,
    /// Window or display handed to the capture program as `{target}`.
    pub target: String,
    /// Kill the screenshot program after this long.
    pub timeout_ms: u64,
}

/// Session persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session file. Empty means `<config dir>/pokerit/session.json`.
    pub store_path: String,
    /// Capture interval when none is requested or stored.
    pub default_interval_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.into(),
            reconnect_delay_ms: 5000,
            connect_timeout_ms: 10_000,
            outbound_queue: 8,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Command,
            command: default_command(),
            file: String::new(),
            format: ImageFormat::Jpeg,
            quality: pokerit_core::capture::DEFAULT_QUALITY,
            target: String::new(),
            timeout_ms: 5000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_path: String::new(),
            default_interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

fn default_command() -> Vec<String> {
    let argv: &[&str] = if cfg!(target_os = "macos") {
        &["screencapture", "-x", "-t", "{format}", "/dev/stdout"]
    } else {
        &["grim", "-t", "{format}", "-q", "{quality}", "-"]
    };
    argv.iter().map(|s| s.to_string()).collect()
}

// ── Loading ──────────────────────────────────────────────────────

impl AgentConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    // ── Conversions ──────────────────────────────────────────────

    pub fn to_transport_config(&self) -> TransportConfig {
        TransportConfig {
            server_url: self.network.server_url.clone(),
            reconnect_delay: Duration::from_millis(self.network.reconnect_delay_ms.max(1)),
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms.max(1)),
            outbound_capacity: self.network.outbound_queue.max(1),
            ..Default::default()
        }
    }

    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        let target = Some(self.capture.target.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        SchedulerConfig {
            default_interval_ms: self.session.default_interval_ms.max(1),
            capture: CaptureOptions {
                format: self.capture.format,
                target,
                ..Default::default()
            }
            .with_quality(self.capture.quality),
        }
    }

    /// Resolved session file location.
    pub fn store_path(&self) -> PathBuf {
        if !self.session.store_path.trim().is_empty() {
            return PathBuf::from(self.session.store_path.trim());
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pokerit")
            .join("session.json")
    }

    /// Build the configured capture adapter.
    pub fn to_capture_source(&self) -> Result<Arc<dyn CaptureSource>, ConfigError> {
        match self.capture.source {
            SourceKind::Command => {
                let capture = CommandCapture::from_argv(&self.capture.command).ok_or_else(|| {
                    ConfigError::Invalid("capture.command must name a program".into())
                })?;
                let timeout = Duration::from_millis(self.capture.timeout_ms.max(1));
                Ok(Arc::new(capture.with_timeout(timeout)))
            }
            SourceKind::File => {
                if self.capture.file.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "capture.file is required for the file source".into(),
                    ));
                }
                Ok(Arc::new(FileCapture::new(self.capture.file.trim())))
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
