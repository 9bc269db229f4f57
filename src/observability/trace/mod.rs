//! Distributed tracing support.
//!
//! # Responsibilities
//! - Extract trace context from incoming requests (W3C `traceparent`)
//! - Create server and handler spans
//! - Ship closed spans to a tracing backend off the request path
//!
//! # Design Decisions
//! - Spans and propagation come from `opentelemetry`; export batching is ours
//! - Spans close on drop, so error paths cannot leak them
//! - Export goes through a bounded queue; a full queue drops spans
//! - Unsampled parents produce non-recording spans that are never exported

pub mod export;
pub mod otlp;
pub mod propagation;
pub mod span;

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub use export::{BatchConfig, ExportStats, ExportWorker, LogExporter, QueueSpanProcessor, SpanQueue};
pub use opentelemetry::trace::{SpanKind, Status};
pub use opentelemetry_sdk::trace::{Span, SpanData};
pub use otlp::ExportError;
pub use propagation::TRACEPARENT;
pub use span::{service_resource, set_error, Tracer};

use crate::config::{ExporterKind, TracingConfig};

/// Build the tracer described by `config`, spawning the export worker if one is needed.
pub fn init_tracer(
    config: &TracingConfig,
    shutdown: broadcast::Receiver<()>,
) -> Result<(Tracer, Option<JoinHandle<()>>), ExportError> {
    let batch = BatchConfig::from(config);
    let worker = match config.exporter {
        ExporterKind::None => {
            tracing::info!("Span export disabled");
            return Ok((Tracer::disabled(&config.service_name), None));
        }
        ExporterKind::Log => ExportWorker::spawn(LogExporter, batch, shutdown),
        ExporterKind::Otlp => {
            let exporter = otlp::otlp_exporter(
                &config.otlp_endpoint,
                &service_resource(&config.service_name),
                Duration::from_millis(config.export_timeout_ms),
            )?;
            tracing::info!(url = %otlp::traces_url(&config.otlp_endpoint), "Exporting spans over OTLP/HTTP");
            ExportWorker::spawn(exporter, batch, shutdown)
        }
    };

    let (queue, handle) = worker.into_parts();
    Ok((Tracer::new(&config.service_name, queue), Some(handle)))
}
