//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize telemetry (registry, request instruments, tracer, export worker)
//! - Route library-level `metrics` macros into the registry
//! - Serve until shutdown, then flush buffered spans
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The export worker outlives the server so the last requests' spans ship
//! - Flushing has a deadline; a hung backend cannot block exit

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::http::HttpServer;
use crate::observability::metrics::Registry;
use crate::telemetry::{Telemetry, TelemetryError};

use super::shutdown::Shutdown;

/// Longest wait for the export worker after the server stops.
pub const EXPORT_DRAIN_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Make `registry` the target of the `metrics` facade.
///
/// Returns false if a global recorder was already installed.
pub fn install_global_recorder(registry: &Registry) -> bool {
    match ::metrics::set_global_recorder(registry.clone()) {
        Ok(()) => true,
        Err(_) => {
            tracing::debug!("Global metrics recorder already installed");
            false
        }
    }
}

/// Build telemetry, serve on `listener` until `shutdown` fires, then drain span export.
pub async fn run(config: AppConfig, listener: TcpListener, shutdown: &Shutdown) -> Result<(), StartupError> {
    let (telemetry, worker) = Telemetry::from_config(&config, shutdown.subscribe())?;
    install_global_recorder(telemetry.registry());

    tracing::info!(
        service = %config.tracing.service_name,
        exporter = ?config.tracing.exporter,
        failure_rate = config.app.failure_rate,
        "Telemetry initialized"
    );

    let server = HttpServer::new(config, telemetry);
    let result = server.run(listener, shutdown.subscribe()).await;

    // Server may have stopped on an I/O error; the worker still needs its signal.
    shutdown.trigger();
    if let Some(worker) = worker {
        drain_exporter(worker, EXPORT_DRAIN_DEADLINE).await;
    }

    result.map_err(StartupError::from)
}

/// Wait up to `deadline` for the export worker to flush and exit.
pub async fn drain_exporter(worker: JoinHandle<()>, deadline: Duration) {
    match tokio::time::timeout(deadline, worker).await {
        Ok(Ok(())) => tracing::info!("Span export drained"),
        Ok(Err(e)) => tracing::error!(error = %e, "Span export worker failed"),
        Err(_) => tracing::warn!(deadline = ?deadline, "Span export did not drain before deadline"),
    }
}
