//! Handler failures and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Failure message attached to error responses for the telemetry middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDetail(pub String);

/// Business-logic failures raised by the sample handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("simulated failure in {0}")]
    Injected(&'static str),
    #[error("name must be at most {max} characters, got {len}")]
    InvalidName { len: usize, max: usize },
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Injected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidName { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let mut response = (self.status(), format!("{}\n", message)).into_response();
        response.extensions_mut().insert(FailureDetail(message));
        response
    }
}

/// Response used when a handler panics.
pub fn panic_response(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, "internal server error\n").into_response();
    response
        .extensions_mut()
        .insert(FailureDetail(format!("handler panicked: {}", detail)));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_carries_detail() {
        let response = AppError::Injected("fail-handler").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.extensions().get::<FailureDetail>(),
            Some(&FailureDetail("simulated failure in fail-handler".into()))
        );
    }

    #[test]
    fn test_invalid_name_is_client_error() {
        let response = AppError::InvalidName { len: 80, max: 64 }.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_panic_payloads() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.extensions().get::<FailureDetail>().unwrap().0,
            "handler panicked: boom"
        );
    }
}
