//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub const ENV_BIND: &str = "SAMPLE_APP_BIND";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
pub const ENV_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
pub const ENV_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const ENV_TRACES_EXPORTER: &str = "OTEL_TRACES_EXPORTER";

/// Load configuration: optional TOML file, then environment overrides, then validation.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&fs::read_to_string(path)?)?,
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML document. Missing sections fall back to defaults.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Apply environment overrides using `lookup` to resolve variables.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(bind) = lookup(ENV_BIND) {
        config.listener.bind_address = bind;
    }
    if let Some(format) = lookup(ENV_LOG_FORMAT) {
        config.logging.format = format.parse().map_err(|message| ConfigError::Env {
            var: ENV_LOG_FORMAT,
            message,
        })?;
    }
    if let Some(name) = lookup(ENV_SERVICE_NAME) {
        config.tracing.service_name = name;
    }
    if let Some(endpoint) = lookup(ENV_OTLP_ENDPOINT) {
        config.tracing.otlp_endpoint = endpoint;
    }
    if let Some(exporter) = lookup(ENV_TRACES_EXPORTER) {
        config.tracing.exporter = exporter.parse().map_err(|message| ConfigError::Env {
            var: ENV_TRACES_EXPORTER,
            message,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ExporterKind, LogFormat};
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            [app]
            failure_rate = 0.25

            [tracing]
            exporter = "log"
            "#,
        )
        .unwrap();

        assert_eq!(config.app.failure_rate, 0.25);
        assert_eq!(config.app.index_delay_ms, 50);
        assert_eq!(config.tracing.exporter, ExporterKind::Log);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8000");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_BIND, "127.0.0.1:9999"),
            (ENV_LOG_FORMAT, "JSON"),
            (ENV_OTLP_ENDPOINT, "http://collector:4318"),
            (ENV_TRACES_EXPORTER, "none"),
        ]);
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9999");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.tracing.otlp_endpoint, "http://collector:4318");
        assert_eq!(config.tracing.exporter, ExporterKind::None);
        assert_eq!(config.tracing.service_name, "sample-app");
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let mut config = AppConfig::default();
        let err = apply_env_overrides(&mut config, |k| {
            (k == ENV_LOG_FORMAT).then(|| "yaml".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENV_LOG_FORMAT, .. }));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            parse_config("[listener\nbind_address = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
