//! Configuration schema definitions.
//!
//! This module defines the configuration structure shared by the API and the
//! workers. Every field has a default so an empty environment yields a
//! runnable service.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::config::duration::serialize_duration;

use crate::observability::logging::LogLevel;

/// Which service a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Api,
    EmailWorker,
    TaskWorker,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Api => "api",
            ServiceKind::EmailWorker => "email_worker",
            ServiceKind::TaskWorker => "task_worker",
        }
    }
}

/// Per-service defaults for values that differ between the API and workers.
#[derive(Debug, Clone)]
pub struct ServiceDefaults {
    pub kind: ServiceKind,
    pub service_name: &'static str,
    pub metrics_port: u16,
}

impl ServiceDefaults {
    pub fn api() -> Self {
        Self {
            kind: ServiceKind::Api,
            service_name: "sampleapi",
            metrics_port: 9090,
        }
    }

    pub fn email_worker() -> Self {
        Self {
            kind: ServiceKind::EmailWorker,
            service_name: "sampleworker",
            metrics_port: 9091,
        }
    }

    pub fn task_worker() -> Self {
        Self {
            kind: ServiceKind::TaskWorker,
            service_name: "taskworker",
            metrics_port: 9091,
        }
    }
}

/// Root configuration for a service process.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceConfig {
    pub kind: ServiceKind,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Trace export settings.
    pub tracing: TracingConfig,

    /// Listener ports.
    pub listener: ListenerConfig,

    /// Background loop settings (unused by the API).
    pub worker: WorkerConfig,

    /// Demo secret. Not a real credential.
    #[serde(skip)]
    pub secret_key: SecretKey,
}

impl ServiceConfig {
    /// JSON rendering for the startup log. The secret is never included.
    pub fn summary(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Configuration with every value at its default for the given service.
    pub fn defaults(defaults: &ServiceDefaults) -> Self {
        Self {
            kind: defaults.kind,
            logging: LoggingConfig::default(),
            tracing: TracingConfig {
                service_name: defaults.service_name.to_string(),
                ..TracingConfig::default()
            },
            listener: ListenerConfig {
                metrics_port: defaults.metrics_port,
                ..ListenerConfig::default()
            },
            worker: WorkerConfig::default(),
            secret_key: SecretKey::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize)]
pub struct LoggingConfig {
    /// Severity threshold.
    pub level: LogLevel,

    /// JSON lines (true) or compact human-readable text (false).
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: true,
        }
    }
}

/// Trace export configuration.
#[derive(Debug, Clone, Serialize)]
pub struct TracingConfig {
    /// Enable OTLP export. When false, spans are no-ops.
    pub enabled: bool,

    /// `service.name` resource attribute.
    pub service_name: String,

    /// `service.version` resource attribute.
    pub service_version: String,

    /// `environment` resource attribute.
    pub environment: String,

    /// OTLP gRPC collector endpoint (`host:port` or URL).
    pub otlp_endpoint: String,

    /// How often buffered spans are flushed to the collector.
    #[serde(serialize_with = "serialize_duration")]
    pub batch_interval: Duration,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "sampleservice".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            otlp_endpoint: "localhost:4317".to_string(),
            batch_interval: Duration::from_secs(5),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ListenerConfig {
    /// Interface both listeners bind to.
    pub bind_host: String,

    /// Application port (API only).
    pub port: u16,

    /// Port serving `/metrics`.
    pub metrics_port: u16,
}

impl ListenerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    pub fn metrics_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.metrics_port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
            metrics_port: 9090,
        }
    }
}

/// Worker loop configuration.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerConfig {
    /// Pause between two invocations.
    #[serde(serialize_with = "serialize_duration")]
    pub interval: Duration,

    /// Force the final step of every invocation to fail.
    pub fail_simulate_enabled: bool,

    /// Probability (0.0 to 1.0) that the final step fails on its own.
    pub failure_rate: f64,
}

pub const DEFAULT_WORKER_INTERVAL: Duration = Duration::from_secs(10);

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_WORKER_INTERVAL,
            fail_simulate_enabled: false,
            failure_rate: 0.0,
        }
    }
}

/// The `SECRET_KEY` value. Debug output never shows it.
#[derive(Clone)]
pub struct SecretKey {
    value: String,
    defaulted: bool,
}

pub const DEFAULT_SECRET_KEY: &str = "default-secret";

impl SecretKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            defaulted: false,
        }
    }

    pub fn expose(&self) -> &str {
        &self.value
    }

    /// True when no secret was configured and the placeholder is in use.
    pub fn is_default(&self) -> bool {
        self.defaulted
    }
}

impl Default for SecretKey {
    fn default() -> Self {
        Self {
            value: DEFAULT_SECRET_KEY.to_string(),
            defaulted: true,
        }
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("value", &"***")
            .field("defaulted", &self.defaulted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_omits_secret() {
        let mut config = ServiceConfig::defaults(&ServiceDefaults::email_worker());
        config.secret_key = SecretKey::new("hunter2");

        let summary: serde_json::Value = serde_json::from_str(&config.summary()).unwrap();
        assert_eq!(summary["kind"], "email_worker");
        assert_eq!(summary["logging"]["level"], "info");
        assert_eq!(summary["worker"]["interval"], "10s");
        assert_eq!(summary["tracing"]["batch_interval"], "5s");
        assert!(summary.get("secret_key").is_none());
        assert!(!config.summary().contains("hunter2"));
    }

    #[test]
    fn test_secret_debug_is_masked() {
        let rendered = format!("{:?}", SecretKey::new("hunter2"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }
}
