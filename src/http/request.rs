//! Request identification.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) when the caller sent none
//! - Expose the per-request context handlers use to open child spans
//!
//! # Design Decisions
//! - Request ID added as early as possible so every record carries it
//! - Inbound `x-request-id` values are kept, not replaced

use axum::http::{HeaderMap, HeaderValue, Request};
use opentelemetry::Context;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::observability::trace::{Span, SpanKind, Tracer};

/// Header carrying the correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Read the correlation id, or `"unknown"` if absent or not UTF-8.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Per-request data inserted by the telemetry middleware.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Context holding the server span wrapping this request.
    pub cx: Context,
    pub request_id: String,
    tracer: Tracer,
}

impl RequestContext {
    pub fn new(cx: Context, request_id: String, tracer: Tracer) -> Self {
        Self {
            cx,
            request_id,
            tracer,
        }
    }

    /// Open an internal span under the request's server span.
    pub fn child_span(&self, name: &'static str) -> Span {
        self.tracer.start_span(name, SpanKind::Internal, &self.cx)
    }
}
