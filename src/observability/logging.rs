//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Emit the per-request access record
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for log shippers, key=value text for humans
//! - Log level configurable via config and `RUST_LOG`

use std::net::IpAddr;
use std::time::Duration;

use tracing_subscriber::{fmt, prelude::*, util::TryInitError, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Target of access records, one per request.
pub const ACCESS_TARGET: &str = "access";

const MAX_USER_AGENT_CHARS: usize = 100;

/// Install the global subscriber writing to stdout.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.level)));

    let subscriber = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
                .with_span_list(false);
            subscriber.with(fmt_layer).try_init()
        }
        LogFormat::Text => {
            let fmt_layer = fmt::layer().with_target(true);
            subscriber.with(fmt_layer).try_init()
        }
    }
}

/// Summary of one handled request.
#[derive(Debug, Clone)]
pub struct AccessRecord<'a> {
    pub path: &'a str,
    pub method: &'a str,
    pub status: u16,
    pub duration: Duration,
    pub request_id: &'a str,
    pub trace_id: String,
    pub client_ip: Option<IpAddr>,
    pub user_agent: &'a str,
    pub error: Option<&'a str>,
}

impl AccessRecord<'_> {
    /// Milliseconds rounded to one decimal.
    pub fn duration_ms(&self) -> f64 {
        (self.duration.as_secs_f64() * 10_000.0).round() / 10.0
    }

    /// Write the record: info on success, error on failure.
    pub fn emit(&self) {
        let user_agent: String = self.user_agent.chars().take(MAX_USER_AGENT_CHARS).collect();
        let client_ip = self
            .client_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "-".to_string());

        match self.error {
            Some(error) => tracing::error!(
                target: ACCESS_TARGET,
                event = "request",
                path = self.path,
                method = self.method,
                status = self.status,
                duration_ms = self.duration_ms(),
                request_id = self.request_id,
                trace_id = %self.trace_id,
                client_ip = %client_ip,
                user_agent = %user_agent,
                error = error,
                "request failed"
            ),
            None => tracing::info!(
                target: ACCESS_TARGET,
                event = "request",
                path = self.path,
                method = self.method,
                status = self.status,
                duration_ms = self.duration_ms(),
                request_id = self.request_id,
                trace_id = %self.trace_id,
                client_ip = %client_ip,
                user_agent = %user_agent,
                "request completed"
            ),
        }
    }
}
