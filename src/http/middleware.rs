//! Per-request telemetry.
//!
//! # Data Flow
//! ```text
//! Request
//!     → read x-request-id and traceparent
//!     → open server span "{METHOD} {route}", track in-flight gauge
//!     → handler (behind panic catcher and timeout)
//!     → counter + latency histogram
//!     → one access record
//!     → close span, echo traceparent on the response
//! ```
//!
//! # Design Decisions
//! - Installed as a route layer, so the route template is always known
//!   and unmatched paths never mint new series
//! - All three signals are emitted exactly once, on every exit path,
//!   including a dropped request future (recorded as 499)

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{header::USER_AGENT, StatusCode},
    middleware::Next,
    response::Response,
};
use opentelemetry::trace::{Status, TraceContextExt};
use opentelemetry::{Context, KeyValue};

use crate::http::error::FailureDetail;
use crate::http::request::{self, RequestContext};
use crate::http::server::AppState;
use crate::observability::logging::AccessRecord;
use crate::observability::metrics::GaugeGuard;
use crate::observability::trace::{propagation, SpanKind};
use crate::telemetry::Telemetry;

/// Path label used when the router supplied no template.
const UNMATCHED_ROUTE: &str = "unmatched";

/// Status recorded when the client went away before the response was ready.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Emit metrics, an access record and a server span for one request.
pub async fn track_request(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let start = Instant::now();
    let telemetry = state.telemetry.clone();

    let method = req.method().as_str().to_owned();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_owned());
    let request_id = request::request_id(req.headers()).to_owned();
    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_owned();
    let client_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let parent = propagation::extract(req.headers());

    let tracer = telemetry.tracer().clone();
    let span = tracer.start_span(format!("{} {}", method, route), SpanKind::Server, &parent);
    let cx = parent.with_span(span);
    {
        let span = cx.span();
        span.set_attribute(KeyValue::new("http.request.method", method.clone()));
        span.set_attribute(KeyValue::new("http.route", route.clone()));
        span.set_attribute(KeyValue::new("request.id", request_id.clone()));
    }

    req.extensions_mut()
        .insert(RequestContext::new(cx.clone(), request_id.clone(), tracer));

    let outcome = RequestOutcome {
        in_flight: Some(telemetry.metrics().track_in_flight()),
        telemetry,
        route,
        method,
        request_id,
        user_agent,
        client_ip,
        start,
        cx,
        recorded: false,
    };

    let mut response = next.run(req).await;

    let failure = failure_message(&response);
    propagation::inject(&outcome.cx, response.headers_mut());
    outcome.finish(response.status().as_u16(), failure.as_deref());
    response
}

/// Everything needed to record how a request ended.
///
/// Recorded once: by [`RequestOutcome::finish`] when the handler returns, or
/// on drop when the request future is cancelled first (client disconnect).
struct RequestOutcome {
    telemetry: Telemetry,
    route: String,
    method: String,
    request_id: String,
    user_agent: String,
    client_ip: Option<IpAddr>,
    start: Instant,
    cx: Context,
    in_flight: Option<GaugeGuard>,
    recorded: bool,
}

impl RequestOutcome {
    fn finish(mut self, status: u16, failure: Option<&str>) {
        self.record(status, failure);
    }

    fn record(&mut self, status: u16, failure: Option<&str>) {
        if self.recorded {
            return;
        }
        self.recorded = true;
        drop(self.in_flight.take());

        let elapsed = self.start.elapsed();
        self.telemetry
            .metrics()
            .record_request(&self.route, &self.method, status, elapsed);

        let span = self.cx.span();
        AccessRecord {
            path: &self.route,
            method: &self.method,
            status,
            duration: elapsed,
            request_id: &self.request_id,
            trace_id: span.span_context().trace_id().to_string(),
            client_ip: self.client_ip,
            user_agent: &self.user_agent,
            error: failure,
        }
        .emit();

        span.set_attribute(KeyValue::new("http.response.status_code", i64::from(status)));
        match failure {
            Some(message) => {
                span.set_attribute(KeyValue::new("error", true));
                span.set_status(Status::error(message.to_string()));
            }
            None => span.set_status(Status::Ok),
        }
        span.end();
    }
}

impl Drop for RequestOutcome {
    fn drop(&mut self) {
        self.record(CLIENT_CLOSED_REQUEST, Some("client closed request"));
    }
}

/// Failure description for error responses, `None` for successes.
fn failure_message(response: &Response) -> Option<String> {
    if let Some(FailureDetail(message)) = response.extensions().get::<FailureDetail>() {
        return Some(message.clone());
    }

    let status = response.status();
    if status == StatusCode::REQUEST_TIMEOUT {
        return Some("request timed out".to_string());
    }
    if status.is_server_error() {
        return Some(
            status
                .canonical_reason()
                .unwrap_or("server error")
                .to_string(),
        );
    }
    None
}
