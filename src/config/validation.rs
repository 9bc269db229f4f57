//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, rates within 0..=1)
//! - Check the latency buckets form a usable histogram layout
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{AppConfig, ExporterKind};

/// Longest retry delay accepted for span export, in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a deserialized configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }

    let rate = config.app.failure_rate;
    if !(0.0..=1.0).contains(&rate) {
        errors.push(ValidationError::new(
            "app.failure_rate",
            format!("{} is outside 0.0..=1.0", rate),
        ));
    }

    let buckets = &config.metrics.latency_buckets;
    if buckets.is_empty() {
        errors.push(ValidationError::new("metrics.latency_buckets", "must not be empty"));
    } else if buckets.iter().any(|b| !b.is_finite()) {
        errors.push(ValidationError::new("metrics.latency_buckets", "must be finite"));
    } else if buckets.windows(2).any(|w| w[0] >= w[1]) {
        errors.push(ValidationError::new(
            "metrics.latency_buckets",
            "must be strictly increasing",
        ));
    }
    if config.metrics.max_series_per_family == 0 {
        errors.push(ValidationError::new("metrics.max_series_per_family", "must be > 0"));
    }

    let tracing = &config.tracing;
    if tracing.service_name.trim().is_empty() {
        errors.push(ValidationError::new("tracing.service_name", "must not be empty"));
    }
    if tracing.exporter == ExporterKind::Otlp {
        match Url::parse(&tracing.otlp_endpoint) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::new(
                "tracing.otlp_endpoint",
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                "tracing.otlp_endpoint",
                format!("invalid url: {}", e),
            )),
        }
    }
    if tracing.queue_capacity == 0 {
        errors.push(ValidationError::new("tracing.queue_capacity", "must be > 0"));
    }
    if tracing.max_batch_size == 0 {
        errors.push(ValidationError::new("tracing.max_batch_size", "must be > 0"));
    } else if tracing.max_batch_size > tracing.queue_capacity {
        errors.push(ValidationError::new(
            "tracing.max_batch_size",
            "must not exceed tracing.queue_capacity",
        ));
    }
    if tracing.scheduled_delay_ms == 0 {
        errors.push(ValidationError::new("tracing.scheduled_delay_ms", "must be > 0"));
    }
    if tracing.export_timeout_ms == 0 {
        errors.push(ValidationError::new("tracing.export_timeout_ms", "must be > 0"));
    }
    if tracing.max_export_attempts == 0 {
        errors.push(ValidationError::new("tracing.max_export_attempts", "must be >= 1"));
    }
    if tracing.backoff_max_ms > MAX_BACKOFF_MS {
        errors.push(ValidationError::new(
            "tracing.backoff_max_ms",
            format!("must not exceed {}", MAX_BACKOFF_MS),
        ));
    }
    if tracing.backoff_base_ms > tracing.backoff_max_ms {
        errors.push(ValidationError::new(
            "tracing.backoff_base_ms",
            "must not exceed tracing.backoff_max_ms",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
