//! Sample application routes and the metrics endpoint.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Extension,
};
use opentelemetry::trace::Span as _;
use opentelemetry::KeyValue;

use crate::http::error::AppError;
use crate::http::request::RequestContext;
use crate::http::server::AppState;
use crate::observability::metrics::exposition;
use crate::observability::trace::set_error;

/// Longest name `/hello/{name}` accepts.
pub const MAX_NAME_CHARS: usize = 64;

/// `GET /`
pub async fn index(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<&'static str, AppError> {
    let mut span = ctx.child_span("index-handler");
    tokio::time::sleep(Duration::from_millis(state.behavior.index_delay_ms)).await;

    if state.should_fail() {
        let err = AppError::Injected("index-handler");
        set_error(&mut span, err.to_string());
        return Err(err);
    }

    span.end();
    Ok("Hello from sample app!\n")
}

/// `GET /hello/{name}`
pub async fn hello(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(name): Path<String>,
) -> Result<String, AppError> {
    let len = name.chars().count();
    if len > MAX_NAME_CHARS {
        return Err(AppError::InvalidName {
            len,
            max: MAX_NAME_CHARS,
        });
    }

    let mut span = ctx.child_span("hello-handler");
    span.set_attribute(KeyValue::new("app.user_name", name.clone()));
    tokio::time::sleep(Duration::from_millis(state.behavior.hello_delay_ms)).await;

    if state.should_fail() {
        let err = AppError::Injected("hello-handler");
        set_error(&mut span, err.to_string());
        return Err(err);
    }

    span.end();
    Ok(format!("Hello {}!\n", name))
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "ok\n"
}

/// `GET /fail`: always fails, exercising the error path end to end.
pub async fn fail(Extension(ctx): Extension<RequestContext>) -> Result<&'static str, AppError> {
    let mut span = ctx.child_span("fail-handler");
    let err = AppError::Injected("fail-handler");
    set_error(&mut span, err.to_string());
    Err(err)
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, exposition::CONTENT_TYPE)],
        state.telemetry.render_metrics(),
    )
}
