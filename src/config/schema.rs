//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the sample service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Behaviour of the sample routes.
    pub app: AppBehaviorConfig,

    /// Log output settings.
    pub logging: LoggingConfig,

    /// Instrument registry settings.
    pub metrics: MetricsConfig,

    /// Span export settings.
    pub tracing: TracingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Request timeout in seconds. Timed out requests answer 408.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Simulated work and failure injection for the sample routes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppBehaviorConfig {
    /// Probability (0.0 - 1.0) that `/` or `/hello/{name}` fails with a 500.
    pub failure_rate: f64,

    /// Simulated work for `/` in milliseconds.
    pub index_delay_ms: u64,

    /// Simulated work for `/hello/{name}` in milliseconds.
    pub hello_delay_ms: u64,
}

impl Default for AppBehaviorConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            index_delay_ms: 50,
            hello_delay_ms: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable `key=value` lines.
    Text,
    /// One JSON object per line.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Instrument registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Upper bounds of the request latency histogram, in seconds.
    pub latency_buckets: Vec<f64>,

    /// Maximum distinct label combinations per metric family.
    pub max_series_per_family: usize,
}

/// Prometheus client default buckets.
pub const DEFAULT_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            latency_buckets: DEFAULT_LATENCY_BUCKETS.to_vec(),
            max_series_per_family: 1000,
        }
    }
}

/// Which span exporter the background worker feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    /// OTLP over HTTP with JSON encoding.
    Otlp,
    /// Spans written as debug log events.
    Log,
    /// Spans are closed but never exported.
    None,
}

impl std::str::FromStr for ExporterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "otlp" => Ok(ExporterKind::Otlp),
            "log" | "logging" => Ok(ExporterKind::Log),
            "none" => Ok(ExporterKind::None),
            other => Err(format!("unknown traces exporter '{}'", other)),
        }
    }
}

/// Distributed tracing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// `service.name` resource attribute.
    pub service_name: String,

    /// Exporter fed by the batch worker.
    pub exporter: ExporterKind,

    /// OTLP/HTTP base endpoint; `/v1/traces` is appended.
    pub otlp_endpoint: String,

    /// Capacity of the bounded span queue. Spans are dropped when full.
    pub queue_capacity: usize,

    /// Maximum spans per export call.
    pub max_batch_size: usize,

    /// Flush interval for partial batches in milliseconds.
    pub scheduled_delay_ms: u64,

    /// Timeout of a single export attempt in milliseconds.
    pub export_timeout_ms: u64,

    /// Attempts per batch before it is dropped.
    pub max_export_attempts: u32,

    /// Base delay for exponential backoff between attempts in milliseconds.
    pub backoff_base_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub backoff_max_ms: u64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "sample-app".to_string(),
            exporter: ExporterKind::Otlp,
            otlp_endpoint: "http://jaeger:4318".to_string(),
            queue_capacity: 2048,
            max_batch_size: 512,
            scheduled_delay_ms: 5000,
            export_timeout_ms: 10_000,
            max_export_attempts: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 2000,
        }
    }
}
