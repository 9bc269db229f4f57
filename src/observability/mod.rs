//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every instrumented request produces:
//!     → logging.rs (one access record on stdout)
//!     → metrics/ (counter, histogram, in-flight gauge)
//!     → trace/ (server span + handler spans)
//!
//! Consumers:
//!     → Log shipper tailing stdout (e.g. Promtail → Loki)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Distributed tracing backend (OTLP, e.g. Jaeger)
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Request ID and trace ID flow into every access record
//! - Metrics are cheap (atomic increments)
//! - Span export never runs on the request path

pub mod logging;
pub mod metrics;
pub mod trace;
