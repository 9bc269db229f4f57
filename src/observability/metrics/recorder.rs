//! Bridge from the `metrics` facade into the [`Registry`].
//!
//! Installing the registry with `metrics::set_global_recorder` lets code that
//! uses `metrics::counter!` and friends report into the same exposition as the
//! request instruments. Facade metrics are registered lazily with the label
//! names they are first seen with; a later call with a different label shape
//! gets a no-op handle.

use ::metrics::{
    Counter as FacadeCounter, CounterFn, Gauge as FacadeGauge, GaugeFn,
    Histogram as FacadeHistogram, HistogramFn, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};

use super::registry::{CounterCell, GaugeCell, HistogramCell, Registry};
use crate::config::schema::DEFAULT_LATENCY_BUCKETS;

impl CounterFn for CounterCell {
    fn increment(&self, value: u64) {
        self.add(value);
    }

    fn absolute(&self, value: u64) {
        self.raise_to(value);
    }
}

impl GaugeFn for GaugeCell {
    fn increment(&self, value: f64) {
        self.add(value);
    }

    fn decrement(&self, value: f64) {
        self.add(-value);
    }

    fn set(&self, value: f64) {
        GaugeCell::set(self, value);
    }
}

impl HistogramFn for HistogramCell {
    fn record(&self, value: f64) {
        self.observe(value);
    }
}

/// Split a facade key into label names and values, sorted by name.
fn split_labels(key: &Key) -> (Vec<&str>, Vec<&str>) {
    let mut labels: Vec<(&str, &str)> = key.labels().map(|l| (l.key(), l.value())).collect();
    labels.sort();
    labels.into_iter().unzip()
}

impl Recorder for Registry {
    fn describe_counter(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key.as_str(), &description);
    }

    fn describe_gauge(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key.as_str(), &description);
    }

    fn describe_histogram(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key.as_str(), &description);
    }

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> FacadeCounter {
        let (names, values) = split_labels(key);
        match self
            .counter(key.name(), "", &names)
            .and_then(|family| family.with_labels(&values))
        {
            Ok(counter) => FacadeCounter::from_arc(counter.cell()),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping facade counter");
                FacadeCounter::noop()
            }
        }
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> FacadeGauge {
        let (names, values) = split_labels(key);
        match self
            .gauge(key.name(), "", &names)
            .and_then(|family| family.with_labels(&values))
        {
            Ok(gauge) => FacadeGauge::from_arc(gauge.cell()),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping facade gauge");
                FacadeGauge::noop()
            }
        }
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> FacadeHistogram {
        let (names, values) = split_labels(key);
        match self
            .histogram(key.name(), "", &names, DEFAULT_LATENCY_BUCKETS)
            .and_then(|family| family.with_labels(&values))
        {
            Ok(histogram) => FacadeHistogram::from_arc(histogram.cell()),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping facade histogram");
                FacadeHistogram::noop()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::exposition::render;

    #[test]
    fn test_facade_macros_land_in_registry() {
        let registry = Registry::new(10);
        ::metrics::with_local_recorder(&registry, || {
            ::metrics::describe_counter!("spans_dropped_total", "Spans dropped");
            ::metrics::counter!("spans_dropped_total", "reason" => "queue_full").increment(2);
            ::metrics::counter!("spans_dropped_total", "reason" => "queue_full").increment(1);
            ::metrics::gauge!("queue_depth").set(4.0);
            ::metrics::histogram!("batch_seconds").record(0.2);
        });

        assert_eq!(
            registry.counter_value("spans_dropped_total", &[("reason", "queue_full")]),
            Some(3)
        );
        assert_eq!(registry.gauge_value("queue_depth", &[]), Some(4.0));
        assert_eq!(registry.histogram_snapshot("batch_seconds", &[]).unwrap().count, 1);

        let text = render(&registry.snapshot());
        assert!(text.contains("# HELP spans_dropped_total Spans dropped\n"));
    }

    #[test]
    fn test_shape_conflict_yields_noop() {
        let registry = Registry::new(10);
        ::metrics::with_local_recorder(&registry, || {
            ::metrics::counter!("c", "a" => "1").increment(1);
            ::metrics::counter!("c", "b" => "1").increment(1);
        });
        assert_eq!(registry.counter_value("c", &[("a", "1")]), Some(1));
        assert_eq!(registry.counter_value("c", &[("b", "1")]), None);
    }
}
