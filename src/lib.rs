//! Instrumented sample HTTP service.
//!
//! Serves a handful of routes and, for each one, emits the three telemetry
//! signals: Prometheus metrics, one structured log record and trace spans.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod telemetry;

pub use config::AppConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use telemetry::Telemetry;
