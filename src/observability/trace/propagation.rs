//! W3C Trace Context carried in HTTP headers.
//!
//! Extraction and injection go through [`TraceContextPropagator`]; this
//! module only adapts axum's `HeaderMap` to the propagator's carrier traits.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;

/// Header carrying the W3C trace context.
pub const TRACEPARENT: &str = "traceparent";

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        let value = self.0.get(key)?.to_str().ok()?;
        if key.eq_ignore_ascii_case(TRACEPARENT) && !has_hex_fields(value) {
            return None;
        }
        Some(value)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(key.as_bytes()), HeaderValue::from_str(&value)) {
            self.0.insert(name, value);
        }
    }
}

/// Remote parent carried by `headers`. Empty when absent or malformed.
pub fn extract(headers: &HeaderMap) -> Context {
    TraceContextPropagator::new().extract_with_context(&Context::new(), &HeaderExtractor(headers))
}

/// Write the span in `cx` as a `traceparent` header.
pub fn inject(cx: &Context, headers: &mut HeaderMap) {
    TraceContextPropagator::new().inject_context(cx, &mut HeaderInjector(headers));
}

/// Version and flags fields must be exactly two lowercase hex digits.
fn has_hex_fields(value: &str) -> bool {
    let mut parts = value.trim().split('-');
    let version = parts.next();
    let flags = parts.nth(2);
    [version, flags].into_iter().all(|field| {
        field.is_some_and(|f| f.len() == 2 && f.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')))
    })
}
