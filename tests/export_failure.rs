//! Failure injection for the span export path: a dead or stalled tracing
//! backend must never affect request handling.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tracing::Level;

use sample_app::observability::metrics::REQUESTS_TOTAL;
use sample_app::observability::trace::otlp::otlp_exporter;
use sample_app::observability::trace::service_resource;

mod common;

use common::{spawn_app, test_config, AccessLogCapture};

/// An address nothing listens on.
async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn test_unreachable_exporter_does_not_affect_requests() {
    let capture = AccessLogCapture::default();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let endpoint = format!("http://{}", unused_addr().await);
    let mut config = test_config();
    config.tracing.otlp_endpoint = endpoint.clone();
    config.tracing.max_export_attempts = 2;

    let exporter = otlp_exporter(
        &endpoint,
        &service_resource(&config.tracing.service_name),
        Duration::from_millis(config.tracing.export_timeout_ms),
    )
    .unwrap();
    let app = spawn_app(config, exporter).await;

    for _ in 0..5 {
        let res = app.get("/").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.text().await.unwrap(), "Hello from sample app!\n");
    }

    let events = capture.events();
    assert_eq!(events.len(), 5);
    assert!(events.iter().all(|e| e.level == Level::INFO));
    assert_eq!(
        app.registry()
            .counter_value(REQUESTS_TOTAL, &[("path", "/"), ("method", "GET"), ("status", "200")]),
        Some(5)
    );

    let stats = app.tracer().export_stats().unwrap().clone();
    app.stop().await;

    assert_eq!(stats.enqueued(), 10);
    assert_eq!(stats.exported(), 0);
    assert_eq!(stats.dropped_export_failed(), 10);
    assert!(stats.failed_batches() >= 1);
}

#[tokio::test]
async fn test_rejecting_collector_counts_failures() {
    let collector = Router::new().route(
        "/v1/traces",
        post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, collector).await.unwrap();
    });

    let mut config = test_config();
    config.tracing.max_export_attempts = 3;
    let exporter = otlp_exporter(&endpoint, &service_resource("sample-app"), Duration::from_millis(500)).unwrap();
    let app = spawn_app(config, exporter).await;

    let res = app.get("/healthz").await;
    assert_eq!(res.status(), StatusCode::OK);

    let stats = app.tracer().export_stats().unwrap().clone();
    app.stop().await;

    assert_eq!(stats.exported(), 0);
    assert_eq!(stats.failed_batches(), 1);
    assert_eq!(stats.dropped_export_failed(), 1);
}

#[tokio::test]
async fn test_accepting_collector_receives_spans() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<serde_json::Value>();
    let collector = Router::new().route(
        "/v1/traces",
        post(move |axum::Json(body): axum::Json<serde_json::Value>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(body);
                StatusCode::OK
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, collector).await.unwrap();
    });

    let exporter = otlp_exporter(&endpoint, &service_resource("sample-app"), Duration::from_millis(500)).unwrap();
    let app = spawn_app(test_config(), exporter).await;
    assert_eq!(app.get("/hello/dave").await.status(), StatusCode::OK);

    let stats = app.tracer().export_stats().unwrap().clone();
    app.stop().await;
    assert_eq!(stats.exported(), 2);

    let mut names = Vec::new();
    while let Ok(body) = rx.try_recv() {
        let spans = body["resourceSpans"][0]["scopeSpans"][0]["spans"].as_array().unwrap().clone();
        names.extend(spans.iter().map(|s| s["name"].as_str().unwrap().to_string()));
    }
    names.sort();
    assert_eq!(names, vec!["GET /hello/{name}".to_string(), "hello-handler".to_string()]);
}
