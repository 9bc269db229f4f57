//! Process-scoped instrument registry.
//!
//! Every series is identified by a [`MetricKey`]: the metric name plus its
//! label set sorted by label name. Families (name, help, kind, label names,
//! buckets) are registered up front; series are created on first use and
//! live until the registry is dropped.
//!
//! Writers only touch atomics once a series exists. Readers take a snapshot
//! by walking the map, which may interleave with in-flight writes.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Label value used for every label of the overflow series.
pub const OVERFLOW_LABEL_VALUE: &str = "other";

/// Errors raised while registering or resolving instruments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid metric name '{0}'")]
    InvalidMetricName(String),
    #[error("invalid label name '{label}' for metric '{metric}'")]
    InvalidLabelName { metric: String, label: String },
    #[error("metric '{0}' already registered with a different kind or shape")]
    Conflict(String),
    #[error("metric '{metric}' expects {expected} label values, got {got}")]
    LabelMismatch {
        metric: String,
        expected: usize,
        got: usize,
    },
}

/// Instrument kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// Composite identity of a single series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    /// Build a key; labels are sorted by name so insertion order never matters.
    pub fn new<K, V>(name: impl Into<String>, labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut labels: Vec<(String, String)> = labels
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        labels.sort();
        Self {
            name: name.into(),
            labels,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &[(String, String)] {
        &self.labels
    }
}

/// Registration-time description of a metric family.
#[derive(Debug)]
struct Descriptor {
    name: String,
    help: String,
    kind: MetricKind,
    label_names: Vec<String>,
    buckets: Arc<[f64]>,
    series: AtomicUsize,
    overflowed: AtomicBool,
}

impl Descriptor {
    fn same_shape(&self, kind: MetricKind, label_names: &[&str], buckets: &[f64]) -> bool {
        self.kind == kind
            && self.label_names.iter().map(String::as_str).eq(label_names.iter().copied())
            && &*self.buckets == buckets
    }
}

#[derive(Debug, Default)]
pub(crate) struct CounterCell(AtomicU64);

impl CounterCell {
    pub(crate) fn add(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    pub(crate) fn raise_to(&self, value: u64) {
        self.0.fetch_max(value, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// `f64` stored as raw bits.
#[derive(Debug, Default)]
pub(crate) struct GaugeCell(AtomicU64);

impl GaugeCell {
    pub(crate) fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn add(&self, delta: f64) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + delta).to_bits())
            });
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

#[derive(Debug)]
pub(crate) struct HistogramCell {
    bounds: Arc<[f64]>,
    /// One slot per bound plus a trailing `+Inf` slot. Not cumulative.
    counts: Box<[AtomicU64]>,
    sum: GaugeCell,
}

impl HistogramCell {
    fn new(bounds: Arc<[f64]>) -> Self {
        let counts = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            counts,
            sum: GaugeCell::default(),
        }
    }

    pub(crate) fn observe(&self, value: f64) {
        let idx = self.bounds.partition_point(|bound| *bound < value);
        self.counts[idx].fetch_add(1, Ordering::Relaxed);
        self.sum.add(value);
    }

    fn snapshot(&self) -> HistogramSnapshot {
        let mut cumulative = 0;
        let mut buckets = Vec::with_capacity(self.counts.len());
        for (i, count) in self.counts.iter().enumerate() {
            cumulative += count.load(Ordering::Relaxed);
            let bound = self.bounds.get(i).copied().unwrap_or(f64::INFINITY);
            buckets.push((bound, cumulative));
        }
        HistogramSnapshot {
            buckets,
            sum: self.sum.get(),
            count: cumulative,
        }
    }
}

#[derive(Debug, Clone)]
enum Series {
    Counter(Arc<CounterCell>),
    Gauge(Arc<GaugeCell>),
    Histogram(Arc<HistogramCell>),
}

impl Series {
    fn for_descriptor(desc: &Descriptor) -> Self {
        match desc.kind {
            MetricKind::Counter => Series::Counter(Arc::default()),
            MetricKind::Gauge => Series::Gauge(Arc::default()),
            MetricKind::Histogram => Series::Histogram(Arc::new(HistogramCell::new(desc.buckets.clone()))),
        }
    }

    fn sample(&self) -> SampleValue {
        match self {
            Series::Counter(c) => SampleValue::Counter(c.get()),
            Series::Gauge(g) => SampleValue::Gauge(g.get()),
            Series::Histogram(h) => SampleValue::Histogram(h.snapshot()),
        }
    }
}

/// Point-in-time histogram state. Buckets are cumulative and end with `+Inf`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub buckets: Vec<(f64, u64)>,
    pub sum: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Counter(u64),
    Gauge(f64),
    Histogram(HistogramSnapshot),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    pub labels: Vec<(String, String)>,
    pub value: SampleValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FamilySnapshot {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub series: Vec<SeriesSnapshot>,
}

#[derive(Debug)]
struct Inner {
    families: DashMap<String, Arc<Descriptor>>,
    series: DashMap<MetricKey, Series>,
    descriptions: DashMap<String, String>,
    max_series_per_family: usize,
}

/// Shared handle to the instrument registry. Clones point at the same state.
#[derive(Debug, Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Registry {
    /// Create an empty registry allowing `max_series_per_family` label combinations per family.
    pub fn new(max_series_per_family: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                families: DashMap::new(),
                series: DashMap::new(),
                descriptions: DashMap::new(),
                max_series_per_family: max_series_per_family.max(1),
            }),
        }
    }

    pub fn counter(&self, name: &str, help: &str, label_names: &[&str]) -> Result<CounterFamily, RegistryError> {
        let desc = self.register(name, help, MetricKind::Counter, label_names, &[])?;
        Ok(CounterFamily {
            registry: self.clone(),
            desc,
        })
    }

    pub fn gauge(&self, name: &str, help: &str, label_names: &[&str]) -> Result<GaugeFamily, RegistryError> {
        let desc = self.register(name, help, MetricKind::Gauge, label_names, &[])?;
        Ok(GaugeFamily {
            registry: self.clone(),
            desc,
        })
    }

    pub fn histogram(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
        buckets: &[f64],
    ) -> Result<HistogramFamily, RegistryError> {
        if label_names.contains(&"le") {
            return Err(RegistryError::InvalidLabelName {
                metric: name.to_string(),
                label: "le".to_string(),
            });
        }
        let desc = self.register(name, help, MetricKind::Histogram, label_names, buckets)?;
        Ok(HistogramFamily {
            registry: self.clone(),
            desc,
        })
    }

    /// Attach help text to a family registered without one.
    pub fn describe(&self, name: &str, help: &str) {
        self.inner.descriptions.insert(name.to_string(), help.to_string());
    }

    /// Number of registered families.
    pub fn family_count(&self) -> usize {
        self.inner.families.len()
    }

    /// Current value of a counter series, if it exists.
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        match self.inner.series.get(&MetricKey::new(name, labels.iter().copied()))?.value() {
            Series::Counter(c) => Some(c.get()),
            _ => None,
        }
    }

    /// Current value of a gauge series, if it exists.
    pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        match self.inner.series.get(&MetricKey::new(name, labels.iter().copied()))?.value() {
            Series::Gauge(g) => Some(g.get()),
            _ => None,
        }
    }

    /// Current state of a histogram series, if it exists.
    pub fn histogram_snapshot(&self, name: &str, labels: &[(&str, &str)]) -> Option<HistogramSnapshot> {
        match self.inner.series.get(&MetricKey::new(name, labels.iter().copied()))?.value() {
            Series::Histogram(h) => Some(h.snapshot()),
            _ => None,
        }
    }

    /// Read every family and series. Families are sorted by name, series by labels.
    pub fn snapshot(&self) -> Vec<FamilySnapshot> {
        let mut families: Vec<Arc<Descriptor>> =
            self.inner.families.iter().map(|e| e.value().clone()).collect();
        families.sort_by(|a, b| a.name.cmp(&b.name));

        let mut series: Vec<(MetricKey, Series)> = self
            .inner
            .series
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        series.sort_by(|a, b| a.0.cmp(&b.0));

        families
            .into_iter()
            .map(|desc| {
                let help = if desc.help.is_empty() {
                    self.inner
                        .descriptions
                        .get(&desc.name)
                        .map(|h| h.value().clone())
                        .unwrap_or_default()
                } else {
                    desc.help.clone()
                };
                let start = series.partition_point(|(k, _)| k.name() < desc.name.as_str());
                let samples = series[start..]
                    .iter()
                    .take_while(|(k, _)| k.name() == desc.name)
                    .map(|(k, s)| SeriesSnapshot {
                        labels: k.labels().to_vec(),
                        value: s.sample(),
                    })
                    .collect();
                FamilySnapshot {
                    name: desc.name.clone(),
                    help,
                    kind: desc.kind,
                    series: samples,
                }
            })
            .collect()
    }

    fn register(
        &self,
        name: &str,
        help: &str,
        kind: MetricKind,
        label_names: &[&str],
        buckets: &[f64],
    ) -> Result<Arc<Descriptor>, RegistryError> {
        if !is_valid_metric_name(name) {
            return Err(RegistryError::InvalidMetricName(name.to_string()));
        }
        if let Some(bad) = label_names.iter().find(|l| !is_valid_label_name(l)) {
            return Err(RegistryError::InvalidLabelName {
                metric: name.to_string(),
                label: bad.to_string(),
            });
        }

        match self.inner.families.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                if existing.get().same_shape(kind, label_names, buckets) {
                    Ok(existing.get().clone())
                } else {
                    Err(RegistryError::Conflict(name.to_string()))
                }
            }
            Entry::Vacant(slot) => {
                let desc = Arc::new(Descriptor {
                    name: name.to_string(),
                    help: help.to_string(),
                    kind,
                    label_names: label_names.iter().map(|l| l.to_string()).collect(),
                    buckets: buckets.into(),
                    series: AtomicUsize::new(0),
                    overflowed: AtomicBool::new(false),
                });
                slot.insert(desc.clone());
                Ok(desc)
            }
        }
    }

    fn resolve(&self, desc: &Descriptor, values: &[&str]) -> Result<Series, RegistryError> {
        if values.len() != desc.label_names.len() {
            return Err(RegistryError::LabelMismatch {
                metric: desc.name.clone(),
                expected: desc.label_names.len(),
                got: values.len(),
            });
        }

        let key = MetricKey::new(
            desc.name.as_str(),
            desc.label_names.iter().map(String::as_str).zip(values.iter().copied()),
        );
        if let Some(existing) = self.inner.series.get(&key) {
            return Ok(existing.value().clone());
        }

        let max = self.inner.max_series_per_family;
        let reserved = desc
            .series
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_ok();

        let key = if reserved {
            key
        } else {
            if !desc.overflowed.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    metric = %desc.name,
                    max_series = max,
                    "Series limit reached, collapsing new label sets into overflow series"
                );
            }
            MetricKey::new(
                desc.name.as_str(),
                desc.label_names.iter().map(|l| (l.as_str(), OVERFLOW_LABEL_VALUE)),
            )
        };

        let series = match self.inner.series.entry(key) {
            Entry::Occupied(existing) => {
                if reserved {
                    desc.series.fetch_sub(1, Ordering::AcqRel);
                }
                existing.get().clone()
            }
            Entry::Vacant(slot) => slot.insert(Series::for_descriptor(desc)).value().clone(),
        };
        Ok(series)
    }
}

fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    !name.starts_with("__")
        && matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A registered counter family.
#[derive(Debug, Clone)]
pub struct CounterFamily {
    registry: Registry,
    desc: Arc<Descriptor>,
}

impl CounterFamily {
    /// Resolve the series for `values`, given in registration label order.
    pub fn with_labels(&self, values: &[&str]) -> Result<Counter, RegistryError> {
        match self.registry.resolve(&self.desc, values)? {
            Series::Counter(cell) => Ok(Counter(cell)),
            _ => Err(RegistryError::Conflict(self.desc.name.clone())),
        }
    }
}

/// A registered gauge family.
#[derive(Debug, Clone)]
pub struct GaugeFamily {
    registry: Registry,
    desc: Arc<Descriptor>,
}

impl GaugeFamily {
    pub fn with_labels(&self, values: &[&str]) -> Result<Gauge, RegistryError> {
        match self.registry.resolve(&self.desc, values)? {
            Series::Gauge(cell) => Ok(Gauge(cell)),
            _ => Err(RegistryError::Conflict(self.desc.name.clone())),
        }
    }
}

/// A registered histogram family.
#[derive(Debug, Clone)]
pub struct HistogramFamily {
    registry: Registry,
    desc: Arc<Descriptor>,
}

impl HistogramFamily {
    pub fn with_labels(&self, values: &[&str]) -> Result<Histogram, RegistryError> {
        match self.registry.resolve(&self.desc, values)? {
            Series::Histogram(cell) => Ok(Histogram(cell)),
            _ => Err(RegistryError::Conflict(self.desc.name.clone())),
        }
    }
}

/// Monotonic counter series.
#[derive(Debug, Clone)]
pub struct Counter(Arc<CounterCell>);

impl Counter {
    pub fn inc(&self) {
        self.0.add(1);
    }

    pub fn inc_by(&self, value: u64) {
        self.0.add(value);
    }

    pub fn get(&self) -> u64 {
        self.0.get()
    }

    pub(crate) fn cell(&self) -> Arc<CounterCell> {
        self.0.clone()
    }
}

/// Gauge series.
#[derive(Debug, Clone)]
pub struct Gauge(Arc<GaugeCell>);

impl Gauge {
    pub fn set(&self, value: f64) {
        self.0.set(value);
    }

    pub fn add(&self, delta: f64) {
        self.0.add(delta);
    }

    pub fn get(&self) -> f64 {
        self.0.get()
    }

    /// Increment now, decrement when the guard drops.
    pub fn track(&self) -> GaugeGuard {
        self.add(1.0);
        GaugeGuard(self.clone())
    }

    pub(crate) fn cell(&self) -> Arc<GaugeCell> {
        self.0.clone()
    }
}

/// RAII guard returned by [`Gauge::track`].
#[derive(Debug)]
pub struct GaugeGuard(Gauge);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.add(-1.0);
    }
}

/// Histogram series.
#[derive(Debug, Clone)]
pub struct Histogram(Arc<HistogramCell>);

impl Histogram {
    pub fn observe(&self, value: f64) {
        self.0.observe(value);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        self.0.snapshot()
    }

    pub(crate) fn cell(&self) -> Arc<HistogramCell> {
        self.0.clone()
    }
}
