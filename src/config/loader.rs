//! Configuration loading from environment variables.
//!
//! Empty values are treated as unset. Values with a documented fallback
//! (`LOG_LEVEL`, `WORKER_INTERVAL`, `WORKER_FAILURE_RATE`) never fail the load;
//! unparseable ports do.

use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::schema::{
    SecretKey, ServiceConfig, ServiceDefaults, DEFAULT_WORKER_INTERVAL,
};
use crate::config::validation::{validate_config, ValidationError};
use crate::observability::logging::LogLevel;

pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const LOG_FORMAT: &str = "LOG_FORMAT";
pub const PORT: &str = "PORT";
pub const METRICS_PORT: &str = "METRICS_PORT";
pub const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
pub const OTEL_EXPORTER_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const OTEL_TRACING_ENABLED: &str = "OTEL_TRACING_ENABLED";
pub const WORKER_INTERVAL: &str = "WORKER_INTERVAL";
pub const WORKER_FAILURE_RATE: &str = "WORKER_FAILURE_RATE";
pub const SECRET_KEY: &str = "SECRET_KEY";
pub const FAIL_SIMULATE_ENABLED: &str = "FAIL_SIMULATE_ENABLED";
pub const ENVIRONMENT: &str = "ENVIRONMENT";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidPort { var: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort { var, value } => {
                write!(f, "{} is not a valid port: {:?}", var, value)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from the process environment.
pub fn load_from_env(defaults: &ServiceDefaults) -> Result<ServiceConfig, ConfigError> {
    load_from_lookup(defaults, |key| std::env::var(key).ok())
}

/// Load and validate configuration from an arbitrary key lookup.
pub fn load_from_lookup<F>(defaults: &ServiceDefaults, lookup: F) -> Result<ServiceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
    let mut config = ServiceConfig::defaults(defaults);

    if let Some(level) = get(LOG_LEVEL) {
        config.logging.level = LogLevel::parse_or_default(&level);
    }
    if let Some(format) = get(LOG_FORMAT) {
        config.logging.json = !format.eq_ignore_ascii_case("text");
    }

    if let Some(port) = get(PORT) {
        config.listener.port = parse_port(PORT, &port)?;
    }
    if let Some(port) = get(METRICS_PORT) {
        config.listener.metrics_port = parse_port(METRICS_PORT, &port)?;
    }

    if let Some(name) = get(OTEL_SERVICE_NAME) {
        config.tracing.service_name = name;
    }
    if let Some(endpoint) = get(OTEL_EXPORTER_OTLP_ENDPOINT) {
        config.tracing.otlp_endpoint = endpoint;
    }
    if let Some(enabled) = get(OTEL_TRACING_ENABLED) {
        config.tracing.enabled = !enabled.eq_ignore_ascii_case("false");
    }
    if let Some(environment) = get(ENVIRONMENT) {
        config.tracing.environment = environment;
    }

    config.worker.interval = worker_interval(get(WORKER_INTERVAL).as_deref());
    if let Some(rate) = get(WORKER_FAILURE_RATE) {
        config.worker.failure_rate = rate.trim().parse().unwrap_or(0.0);
    }
    config.worker.fail_simulate_enabled = get(FAIL_SIMULATE_ENABLED).as_deref() == Some("true");

    if let Some(secret) = get(SECRET_KEY) {
        config.secret_key = SecretKey::new(secret);
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse `WORKER_INTERVAL`, falling back to 10 seconds when missing or malformed.
pub fn worker_interval(raw: Option<&str>) -> Duration {
    raw.and_then(|value| parse_duration(value).ok())
        .filter(|interval| !interval.is_zero())
        .unwrap_or(DEFAULT_WORKER_INTERVAL)
}

fn parse_port(var: &'static str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidPort {
        var,
        value: value.to_string(),
    })
}
