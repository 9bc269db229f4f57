//! The tracer handle requests use to open spans.
//!
//! Spans are `opentelemetry_sdk` spans: open from [`Tracer::start_span`]
//! until `end()` or drop, whichever comes first. The provider's only span
//! processor counts opens and closes and forwards sampled spans to the
//! export queue.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use opentelemetry::trace::{Span as _, SpanKind, Status, Tracer as _, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::{Sampler, SdkTracer, SdkTracerProvider, Span};
use opentelemetry_sdk::Resource;

use super::export::{ExportStats, QueueSpanProcessor, SpanQueue};

/// Instrumentation scope reported with every span.
const SCOPE_NAME: &str = env!("CARGO_PKG_NAME");

/// Open and closed span counts, maintained by the span processor.
#[derive(Debug, Default)]
pub struct SpanCounters {
    open: AtomicUsize,
    closed: AtomicU64,
}

impl SpanCounters {
    pub(crate) fn on_open(&self) {
        self.open.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn on_close(&self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
        self.closed.fetch_add(1, Ordering::AcqRel);
    }
}

/// Resource describing this service.
pub fn service_resource(service_name: &str) -> Resource {
    Resource::builder()
        .with_service_name(service_name.to_string())
        .build()
}

/// Cheap-clone handle that starts spans and forwards closed ones for export.
#[derive(Clone)]
pub struct Tracer {
    provider: SdkTracerProvider,
    tracer: SdkTracer,
    counters: Arc<SpanCounters>,
    stats: Option<Arc<ExportStats>>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("open_spans", &self.open_spans())
            .field("closed_spans", &self.closed_spans())
            .field("export_stats", &self.stats)
            .finish()
    }
}

impl Tracer {
    /// A tracer whose sampled spans are submitted to `queue`.
    pub fn new(service_name: &str, queue: SpanQueue) -> Self {
        Self::build(service_name, Some(queue))
    }

    /// A tracer that opens and closes spans but never exports them.
    pub fn disabled(service_name: &str) -> Self {
        Self::build(service_name, None)
    }

    fn build(service_name: &str, queue: Option<SpanQueue>) -> Self {
        let counters = Arc::new(SpanCounters::default());
        let stats = queue.as_ref().map(|q| q.stats().clone());
        let provider = SdkTracerProvider::builder()
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
            .with_resource(service_resource(service_name))
            .with_span_processor(QueueSpanProcessor::new(queue, counters.clone()))
            .build();
        let tracer = provider.tracer(SCOPE_NAME);

        Self {
            provider,
            tracer,
            counters,
            stats,
        }
    }

    /// Open a span under the span in `parent`. Starts a new trace when `parent` has none.
    pub fn start_span(&self, name: impl Into<Cow<'static, str>>, kind: SpanKind, parent: &Context) -> Span {
        self.tracer
            .span_builder(name)
            .with_kind(kind)
            .start_with_context(&self.tracer, parent)
    }

    /// Recording spans started and not yet closed.
    pub fn open_spans(&self) -> usize {
        self.counters.open.load(Ordering::Acquire)
    }

    /// Recording spans closed since the tracer was created.
    pub fn closed_spans(&self) -> u64 {
        self.counters.closed.load(Ordering::Acquire)
    }

    /// Queue and export counters, `None` when export is disabled.
    pub fn export_stats(&self) -> Option<&Arc<ExportStats>> {
        self.stats.as_ref()
    }

    pub fn provider(&self) -> &SdkTracerProvider {
        &self.provider
    }
}

/// Mark `span` failed: error status plus an `error=true` attribute.
pub fn set_error(span: &mut Span, message: impl Into<String>) {
    span.set_attribute(KeyValue::new("error", true));
    span.set_status(Status::error(message.into()));
}
