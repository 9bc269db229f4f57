//! Process-scoped telemetry handle.
//!
//! Built once at startup and cloned into every request. Owns the instrument
//! registry, the request instruments and the tracer.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::observability::metrics::{exposition, Registry, RegistryError, RequestMetrics};
use crate::observability::trace::{self, ExportError, Tracer};

/// Error type for telemetry startup.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("metric registration failed: {0}")]
    Registry(#[from] RegistryError),
    #[error("span exporter setup failed: {0}")]
    Exporter(#[from] ExportError),
}

#[derive(Debug)]
struct Inner {
    registry: Registry,
    metrics: RequestMetrics,
    tracer: Tracer,
}

/// Cheap-clone handle to the registry, request instruments and tracer.
#[derive(Debug, Clone)]
pub struct Telemetry {
    inner: Arc<Inner>,
}

impl Telemetry {
    pub fn new(registry: Registry, metrics: RequestMetrics, tracer: Tracer) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                metrics,
                tracer,
            }),
        }
    }

    /// Wire registry, instruments and tracer from configuration.
    ///
    /// Returns the export worker's handle when an exporter is configured.
    pub fn from_config(
        config: &AppConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(Self, Option<JoinHandle<()>>), TelemetryError> {
        let registry = Registry::new(config.metrics.max_series_per_family);
        let metrics = RequestMetrics::register(&registry, &config.metrics)?;
        let (tracer, worker) = trace::init_tracer(&config.tracing, shutdown)?;
        Ok((Self::new(registry, metrics, tracer), worker))
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn metrics(&self) -> &RequestMetrics {
        &self.inner.metrics
    }

    pub fn tracer(&self) -> &Tracer {
        &self.inner.tracer
    }

    /// Render the registry in the exposition format.
    pub fn render_metrics(&self) -> String {
        exposition::render(&self.inner.registry.snapshot())
    }
}
