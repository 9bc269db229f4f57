//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the request instruments
//! - Hold them in a process-scoped [`Registry`] shared by handle
//! - Render the registry for Prometheus scrapes
//!
//! # Metrics
//! - `app_requests_total` (counter): requests by route, method, status
//! - `app_request_latency_seconds` (histogram): latency by route, method
//! - `app_requests_in_flight` (gauge): requests currently being handled
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels are route templates, never raw paths, so cardinality stays bounded
//! - Histogram buckets tuned for typical web latencies

pub mod exposition;
pub mod recorder;
pub mod registry;

use std::time::Duration;

pub use registry::{
    Counter, CounterFamily, FamilySnapshot, Gauge, GaugeFamily, GaugeGuard, Histogram, HistogramFamily,
    HistogramSnapshot, MetricKey, MetricKind, Registry, RegistryError, SampleValue, SeriesSnapshot,
};

use crate::config::MetricsConfig;

pub const REQUESTS_TOTAL: &str = "app_requests_total";
pub const REQUEST_LATENCY: &str = "app_request_latency_seconds";
pub const REQUESTS_IN_FLIGHT: &str = "app_requests_in_flight";

/// The instruments updated on every request.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    requests: CounterFamily,
    latency: HistogramFamily,
    in_flight: Gauge,
}

impl RequestMetrics {
    /// Register the request instruments in `registry`.
    pub fn register(registry: &Registry, config: &MetricsConfig) -> Result<Self, RegistryError> {
        let requests = registry.counter(
            REQUESTS_TOTAL,
            "Total HTTP requests",
            &["path", "method", "status"],
        )?;
        let latency = registry.histogram(
            REQUEST_LATENCY,
            "Request latency in seconds",
            &["path", "method"],
            &config.latency_buckets,
        )?;
        let in_flight = registry
            .gauge(REQUESTS_IN_FLIGHT, "HTTP requests currently being handled", &[])?
            .with_labels(&[])?;

        Ok(Self {
            requests,
            latency,
            in_flight,
        })
    }

    /// Mark a request as in flight until the guard drops.
    pub fn track_in_flight(&self) -> GaugeGuard {
        self.in_flight.track()
    }

    /// Record one finished request.
    pub fn record_request(&self, path: &str, method: &str, status: u16, elapsed: Duration) {
        let status = status.to_string();
        match self.requests.with_labels(&[path, method, status.as_str()]) {
            Ok(counter) => counter.inc(),
            Err(e) => tracing::debug!(error = %e, "Request counter unavailable"),
        }
        match self.latency.with_labels(&[path, method]) {
            Ok(histogram) => histogram.observe(elapsed.as_secs_f64()),
            Err(e) => tracing::debug!(error = %e, "Latency histogram unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request() {
        let registry = Registry::new(100);
        let metrics = RequestMetrics::register(&registry, &MetricsConfig::default()).unwrap();

        metrics.record_request("/", "GET", 200, Duration::from_millis(30));
        metrics.record_request("/", "GET", 200, Duration::from_millis(60));
        metrics.record_request("/", "GET", 500, Duration::from_millis(10));

        let ok = [("path", "/"), ("method", "GET"), ("status", "200")];
        assert_eq!(registry.counter_value(REQUESTS_TOTAL, &ok), Some(2));
        let latency = registry
            .histogram_snapshot(REQUEST_LATENCY, &[("path", "/"), ("method", "GET")])
            .unwrap();
        assert_eq!(latency.count, 3);
    }

    #[test]
    fn test_register_twice_shares_state() {
        let registry = Registry::new(100);
        let a = RequestMetrics::register(&registry, &MetricsConfig::default()).unwrap();
        let b = RequestMetrics::register(&registry, &MetricsConfig::default()).unwrap();
        a.record_request("/healthz", "GET", 200, Duration::ZERO);
        b.record_request("/healthz", "GET", 200, Duration::ZERO);
        let labels = [("path", "/healthz"), ("method", "GET"), ("status", "200")];
        assert_eq!(registry.counter_value(REQUESTS_TOTAL, &labels), Some(2));
    }
}
