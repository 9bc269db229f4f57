//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use sample_app::config::AppConfig;
use sample_app::http::HttpServer;
use sample_app::lifecycle::Shutdown;
use sample_app::observability::logging::ACCESS_TARGET;
use sample_app::observability::metrics::{Registry, RequestMetrics};
use opentelemetry::trace::SpanKind;
use opentelemetry::Value;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{SpanData, SpanExporter};
use sample_app::observability::trace::{BatchConfig, ExportWorker, Tracer};
use sample_app::telemetry::Telemetry;

/// Config with short handler delays and a fast export loop.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.app.index_delay_ms = 5;
    config.app.hello_delay_ms = 5;
    config.tracing.scheduled_delay_ms = 20;
    config.tracing.export_timeout_ms = 500;
    config.tracing.backoff_base_ms = 5;
    config.tracing.backoff_max_ms = 20;
    config
}

/// Keeps every exported span in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl MemoryExporter {
    pub fn spans(&self) -> Vec<SpanData> {
        self.spans.lock().unwrap().clone()
    }

    pub fn server_spans(&self) -> Vec<SpanData> {
        self.spans()
            .into_iter()
            .filter(|s| s.span_kind == SpanKind::Server)
            .collect()
    }

    pub fn named(&self, name: &str) -> Option<SpanData> {
        self.spans().into_iter().find(|s| s.name == name)
    }
}

impl SpanExporter for MemoryExporter {
    async fn export(&self, batch: Vec<SpanData>) -> OTelSdkResult {
        self.spans.lock().unwrap().extend(batch);
        Ok(())
    }
}

/// Value of attribute `key` on `span`.
pub fn attribute(span: &SpanData, key: &str) -> Option<Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

/// One captured access record.
#[derive(Debug, Clone)]
pub struct AccessEvent {
    pub level: Level,
    pub fields: HashMap<String, String>,
}

impl AccessEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Layer that records events on the access log target.
///
/// Install with `tracing::subscriber::set_default` on a current-thread
/// runtime so server tasks log into the same subscriber.
#[derive(Debug, Clone, Default)]
pub struct AccessLogCapture {
    events: Arc<Mutex<Vec<AccessEvent>>>,
}

impl AccessLogCapture {
    pub fn events(&self) -> Vec<AccessEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn subscriber(&self) -> impl Subscriber + Send + Sync {
        use tracing_subscriber::layer::SubscriberExt;
        tracing_subscriber::registry().with(self.clone())
    }
}

impl<S: Subscriber> Layer<S> for AccessLogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != ACCESS_TARGET {
            return;
        }
        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(AccessEvent {
            level: *event.metadata().level(),
            fields: visitor.0,
        });
    }
}

#[derive(Default)]
struct FieldCollector(HashMap<String, String>);

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }
}

/// A running app on an ephemeral port.
pub struct TestApp {
    pub addr: SocketAddr,
    pub telemetry: Telemetry,
    pub client: reqwest::Client,
    shutdown: Shutdown,
    server: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    pub fn registry(&self) -> &Registry {
        self.telemetry.registry()
    }

    pub fn tracer(&self) -> &Tracer {
        self.telemetry.tracer()
    }

    /// Stop the server and wait for the export worker to flush.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.server)
            .await
            .expect("server did not stop")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(10), self.worker)
            .await
            .expect("export worker did not stop")
            .unwrap();
    }
}

/// Telemetry whose spans go to `exporter` through a running export worker.
pub fn test_telemetry<E>(config: &AppConfig, exporter: E, shutdown: &Shutdown) -> (Telemetry, JoinHandle<()>)
where
    E: SpanExporter + 'static,
{
    let registry = Registry::new(config.metrics.max_series_per_family);
    let metrics = RequestMetrics::register(&registry, &config.metrics).unwrap();
    let worker = ExportWorker::spawn(exporter, BatchConfig::from(&config.tracing), shutdown.subscribe());
    let (queue, handle) = worker.into_parts();
    let tracer = Tracer::new(&config.tracing.service_name, queue);
    (Telemetry::new(registry, metrics, tracer), handle)
}

/// Start the app with `exporter` receiving its spans.
pub async fn spawn_app<E>(config: AppConfig, exporter: E) -> TestApp
where
    E: SpanExporter + 'static,
{
    let shutdown = Shutdown::new();
    let (telemetry, worker) = test_telemetry(&config, exporter, &shutdown);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, telemetry.clone());
    let server_shutdown = shutdown.subscribe();
    let server = tokio::spawn(async move {
        server.run(listener, server_shutdown).await.unwrap();
    });

    TestApp {
        addr,
        telemetry,
        client: reqwest::Client::new(),
        shutdown,
        server,
        worker,
    }
}

/// Check a scrape body line by line against the text exposition format.
pub fn assert_well_formed(body: &str) {
    let mut types: HashMap<String, String> = HashMap::new();

    for line in body.lines() {
        assert!(!line.is_empty(), "blank line in exposition");

        if let Some(rest) = line.strip_prefix("# HELP ") {
            let name = rest.split(' ').next().unwrap_or_default();
            assert!(valid_metric_name(name), "bad HELP name in {:?}", line);
            continue;
        }
        if let Some(rest) = line.strip_prefix("# TYPE ") {
            let mut parts = rest.split(' ');
            let name = parts.next().unwrap_or_default();
            let kind = parts.next().unwrap_or_default();
            assert!(valid_metric_name(name), "bad TYPE name in {:?}", line);
            assert!(
                matches!(kind, "counter" | "gauge" | "histogram"),
                "bad TYPE kind in {:?}",
                line
            );
            assert!(parts.next().is_none(), "trailing tokens in {:?}", line);
            types.insert(name.to_string(), kind.to_string());
            continue;
        }
        assert!(!line.starts_with('#'), "unknown comment {:?}", line);

        let (series, value) = line.rsplit_once(' ').unwrap_or_else(|| panic!("no value in {:?}", line));
        assert!(
            matches!(value, "+Inf" | "-Inf" | "NaN") || value.parse::<f64>().is_ok(),
            "bad sample value in {:?}",
            line
        );

        let name = match series.split_once('{') {
            Some((name, labels)) => {
                let inner = labels
                    .strip_suffix('}')
                    .unwrap_or_else(|| panic!("unterminated labels in {:?}", line));
                parse_labels(inner).unwrap_or_else(|| panic!("bad labels in {:?}", line));
                name
            }
            None => series,
        };
        assert!(valid_metric_name(name), "bad sample name in {:?}", line);

        let family = ["_bucket", "_sum", "_count"]
            .iter()
            .filter_map(|suffix| name.strip_suffix(suffix))
            .find(|base| types.get(*base).map(String::as_str) == Some("histogram"))
            .unwrap_or(name);
        assert!(types.contains_key(family), "sample before TYPE in {:?}", line);
    }
}

fn valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Parse `a="x",b="y"` with escape handling.
fn parse_labels(inner: &str) -> Option<Vec<(String, String)>> {
    let mut labels = Vec::new();
    let mut chars = inner.chars().peekable();

    while chars.peek().is_some() {
        let name: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if !valid_metric_name(&name) || name.contains(':') {
            return None;
        }
        if chars.next() != Some('"') {
            return None;
        }
        let mut value = String::new();
        loop {
            match chars.next()? {
                '"' => break,
                '\\' => match chars.next()? {
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    'n' => value.push('\n'),
                    _ => return None,
                },
                '\n' => return None,
                c => value.push(c),
            }
        }
        labels.push((name, value));
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return None,
        }
    }
    Some(labels)
}

/// Value of the first sample line starting with `prefix`.
pub fn sample_value(body: &str, prefix: &str) -> Option<f64> {
    body.lines()
        .find(|l| l.starts_with(prefix))
        .and_then(|l| l.rsplit_once(' '))
        .and_then(|(_, v)| v.parse().ok())
}
