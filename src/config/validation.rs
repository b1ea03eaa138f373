//! Configuration validation.
//!
//! Semantic checks run after the environment has been read. Every problem is
//! reported, not just the first one.

use thiserror::Error;

use crate::config::schema::{ServiceConfig, ServiceKind};

/// A single semantic problem with a loaded configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must not be 0")]
    ZeroPort { field: &'static str },

    #[error("PORT and METRICS_PORT must differ (both {0})")]
    PortConflict(u16),

    #[error("WORKER_INTERVAL must be greater than zero")]
    ZeroInterval,

    #[error("WORKER_FAILURE_RATE must be within 0.0..=1.0, got {0}")]
    FailureRateOutOfRange(f64),

    #[error("OTEL_SERVICE_NAME must not be empty")]
    EmptyServiceName,
}

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.metrics_port == 0 {
        errors.push(ValidationError::ZeroPort {
            field: "METRICS_PORT",
        });
    }

    match config.kind {
        ServiceKind::Api => {
            if config.listener.port == 0 {
                errors.push(ValidationError::ZeroPort { field: "PORT" });
            } else if config.listener.port == config.listener.metrics_port {
                errors.push(ValidationError::PortConflict(config.listener.port));
            }
        }
        ServiceKind::EmailWorker | ServiceKind::TaskWorker => {
            if config.worker.interval.is_zero() {
                errors.push(ValidationError::ZeroInterval);
            }
            let rate = config.worker.failure_rate;
            if !(0.0..=1.0).contains(&rate) {
                errors.push(ValidationError::FailureRateOutOfRange(rate));
            }
        }
    }

    if config.tracing.service_name.trim().is_empty() {
        errors.push(ValidationError::EmptyServiceName);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServiceDefaults;
    use std::time::Duration;

    #[test]
    fn test_defaults_are_valid() {
        for defaults in [
            ServiceDefaults::api(),
            ServiceDefaults::email_worker(),
            ServiceDefaults::task_worker(),
        ] {
            let config = ServiceConfig::defaults(&defaults);
            assert_eq!(validate_config(&config), Ok(()), "{:?}", defaults.kind);
        }
    }

    #[test]
    fn test_reports_all_errors() {
        let mut config = ServiceConfig::defaults(&ServiceDefaults::email_worker());
        config.worker.interval = Duration::ZERO;
        config.worker.failure_rate = 1.5;
        config.tracing.service_name = "  ".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::ZeroInterval));
        assert!(errors.contains(&ValidationError::EmptyServiceName));
    }

    #[test]
    fn test_api_port_conflict() {
        let mut config = ServiceConfig::defaults(&ServiceDefaults::api());
        config.listener.port = 9090;
        config.listener.metrics_port = 9090;

        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::PortConflict(9090)])
        );
    }

    #[test]
    fn test_worker_ignores_api_port() {
        let mut config = ServiceConfig::defaults(&ServiceDefaults::task_worker());
        config.listener.port = 0;
        assert!(validate_config(&config).is_ok());
    }
}
