//! OTLP/HTTP span exporter.
//!
//! Builds the `opentelemetry-otlp` exporter in JSON mode, posting to
//! `{endpoint}/v1/traces`. Jaeger and the OpenTelemetry Collector both
//! accept this on port 4318.

use std::time::Duration;

use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::trace::SpanExporter as _;
use opentelemetry_sdk::Resource;
use url::Url;

/// Path appended to the configured collector endpoint.
pub const TRACES_PATH: &str = "/v1/traces";

/// Error type for exporter setup.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("invalid OTLP endpoint {0:?}")]
    InvalidEndpoint(String),
    #[error("failed to build OTLP exporter: {0}")]
    Build(String),
}

/// Full traces URL for a collector base endpoint.
pub fn traces_url(endpoint: &str) -> String {
    format!("{}{}", endpoint.trim_end_matches('/'), TRACES_PATH)
}

/// Build an OTLP/HTTP JSON exporter for `endpoint`, tagging batches with `resource`.
pub fn otlp_exporter(
    endpoint: &str,
    resource: &Resource,
    timeout: Duration,
) -> Result<opentelemetry_otlp::SpanExporter, ExportError> {
    let url = traces_url(endpoint);
    match Url::parse(&url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => return Err(ExportError::InvalidEndpoint(endpoint.to_string())),
    }

    let mut exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpJson)
        .with_endpoint(url)
        .with_timeout(timeout)
        .build()
        .map_err(|e| ExportError::Build(e.to_string()))?;
    exporter.set_resource(resource);
    Ok(exporter)
}
