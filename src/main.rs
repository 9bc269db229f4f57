//! Instrumented sample service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ───────────────▶ request id ──▶ telemetry middleware ──▶ handler
//!                                        │   │   │
//!                        access record ◀─┘   │   └─▶ span ──▶ bounded queue ──▶ export worker ──▶ OTLP
//!                             (stdout)       ▼
//!                                        registry ◀── GET /metrics (Prometheus scrape)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use sample_app::config::load_config;
use sample_app::lifecycle::{signals, startup, Shutdown};
use sample_app::observability::logging;

#[derive(Parser)]
#[command(name = "sample-app")]
#[command(about = "Sample HTTP service emitting metrics, logs and traces", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "SAMPLE_APP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.logging)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.listener.request_timeout_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    startup::run(config, listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
