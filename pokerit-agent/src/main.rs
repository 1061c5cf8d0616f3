//! Pokerit agent entry point.
//!
//! ```text
//! pokerit-agent                       Console mode, capture idle
//! pokerit-agent --start               Start capturing immediately
//! pokerit-agent --config <path>       Load a custom config TOML
//! pokerit-agent --server <url>        Override network.server_url
//! pokerit-agent --gen-config          Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pokerit_agent::config::AgentConfig;
use pokerit_agent::service::{AgentService, StartOptions};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pokerit-agent", about = "Pokerit screen capture agent")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "pokerit-agent.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Analysis server base URL.
    #[arg(long)]
    server: Option<String>,

    /// Start capturing right away.
    #[arg(long)]
    start: bool,

    /// Session to start (implies nothing without --start).
    #[arg(long)]
    session: Option<String>,

    /// Capture interval in milliseconds for --start.
    #[arg(long)]
    interval: Option<i64>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&AgentConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = AgentConfig::load(&cli.config);
    if let Some(server) = cli.server {
        config.network.server_url = server;
    }

    // Logs go to stderr; stdout carries the console protocol.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("pokerit-agent v{}", env!("CARGO_PKG_VERSION"));
    info!("server: {}", config.network.server_url);
    info!("capture source: {:?}", config.capture.source);

    let service = AgentService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received; shutting down");
        stop.store(false, Ordering::SeqCst);
    });

    let options = StartOptions {
        start: cli.start,
        session_id: cli.session,
        interval_ms: cli.interval,
    };
    service
        .run(options, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    // A pending blocking stdin read would keep the runtime alive.
    std::process::exit(0);
}
