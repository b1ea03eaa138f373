//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Own a Prometheus recorder per process (not installed globally)
//! - Define worker and HTTP request metrics
//! - Serve the text exposition format on `/metrics`
//!
//! # Metrics
//! - `worker_emails_sent_total` / `worker_tasks_completed_total` (counter)
//! - `worker_emails_failed_total` / `worker_tasks_failed_total` (counter)
//! - `worker_email_duration_seconds` / `worker_task_duration_seconds` (histogram)
//! - `worker_info{interval}` (gauge): always 1
//! - `http_requests_total{method,path,status}` (counter)
//! - `http_request_duration_seconds{method,path}` (histogram)
//!
//! # Design Decisions
//! - Recording goes through `metrics::with_local_recorder`, so tests can
//!   build isolated registries
//! - Histogram buckets are the Prometheus client defaults

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::duration::format_duration;
use crate::lifecycle::Shutdown;

/// Default Prometheus client buckets, in seconds.
pub const DEFAULT_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const WORKER_INFO: &str = "worker_info";

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to build Prometheus recorder: {0}")]
    Build(#[from] BuildError),
}

/// A Prometheus recorder and the handle used to render it.
pub struct MetricsRegistry {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, MetricsError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets(DEFAULT_BUCKETS)?
            .build_recorder();
        let handle = recorder.handle();
        Ok(Self { recorder, handle })
    }

    /// Run `f` with this registry as the active recorder.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        metrics::with_local_recorder(&self.recorder, f)
    }

    /// Current values in the Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metric names for one kind of worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerMetricNames {
    pub completed: &'static str,
    pub completed_help: &'static str,
    pub failed: &'static str,
    pub failed_help: &'static str,
    pub duration: &'static str,
    pub duration_help: &'static str,
}

impl WorkerMetricNames {
    pub const EMAIL: WorkerMetricNames = WorkerMetricNames {
        completed: "worker_emails_sent_total",
        completed_help: "Total number of emails sent",
        failed: "worker_emails_failed_total",
        failed_help: "Total number of emails that failed to send",
        duration: "worker_email_duration_seconds",
        duration_help: "Time spent sending an email",
    };

    pub const TASK: WorkerMetricNames = WorkerMetricNames {
        completed: "worker_tasks_completed_total",
        completed_help: "Total number of tasks completed",
        failed: "worker_tasks_failed_total",
        failed_help: "Total number of tasks that failed",
        duration: "worker_task_duration_seconds",
        duration_help: "Time spent processing a task",
    };
}

/// Success/failure counters and duration histogram for a worker.
#[derive(Debug, Clone)]
pub struct WorkerMetrics {
    registry: Arc<MetricsRegistry>,
    names: WorkerMetricNames,
}

impl WorkerMetrics {
    /// Register the worker's metrics and set `worker_info{interval}` to 1.
    pub fn new(registry: Arc<MetricsRegistry>, names: WorkerMetricNames, interval: Duration) -> Self {
        registry.scope(|| {
            describe_counter!(names.completed, names.completed_help);
            describe_counter!(names.failed, names.failed_help);
            describe_histogram!(names.duration, Unit::Seconds, names.duration_help);
            describe_gauge!(WORKER_INFO, "Worker configuration");

            // Touch the counters so they render as 0 before the first invocation.
            counter!(names.completed).absolute(0);
            counter!(names.failed).absolute(0);
            gauge!(WORKER_INFO, "interval" => format_duration(interval)).set(1.0);
        });
        Self { registry, names }
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.registry.scope(|| {
            counter!(self.names.completed).increment(1);
            histogram!(self.names.duration).record(elapsed.as_secs_f64());
        });
    }

    pub fn record_failure(&self) {
        self.registry.scope(|| {
            counter!(self.names.failed).increment(1);
        });
    }
}

/// Request counter and latency histogram for the API.
#[derive(Debug, Clone)]
pub struct HttpMetrics {
    registry: Arc<MetricsRegistry>,
}

impl HttpMetrics {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        registry.scope(|| {
            describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests");
            describe_histogram!(
                HTTP_REQUEST_DURATION_SECONDS,
                Unit::Seconds,
                "HTTP request latency"
            );
        });
        Self { registry }
    }

    pub fn record(&self, method: &str, path: &str, status: u16, elapsed: Duration) {
        self.registry.scope(|| {
            counter!(
                HTTP_REQUESTS_TOTAL,
                "method" => method.to_string(),
                "path" => path.to_string(),
                "status" => status.to_string()
            )
            .increment(1);
            histogram!(
                HTTP_REQUEST_DURATION_SECONDS,
                "method" => method.to_string(),
                "path" => path.to_string()
            )
            .record(elapsed.as_secs_f64());
        });
    }
}

async fn render_metrics(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], registry.render())
}

/// Router exposing `GET /metrics`.
pub fn metrics_router(registry: Arc<MetricsRegistry>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(registry)
}

/// Serve `/metrics` on `listener` until shutdown is triggered.
pub async fn serve_metrics(
    listener: TcpListener,
    registry: Arc<MetricsRegistry>,
    shutdown: Shutdown,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Metrics server listening");
    }

    axum::serve(listener, metrics_router(registry))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_metrics_render() {
        let registry = Arc::new(MetricsRegistry::new().unwrap());
        let metrics = WorkerMetrics::new(
            registry.clone(),
            WorkerMetricNames::EMAIL,
            Duration::from_secs(10),
        );

        metrics.record_success(Duration::from_millis(120));
        metrics.record_failure();
        metrics.record_failure();

        let rendered = registry.render();
        assert!(rendered.contains("worker_emails_sent_total 1"));
        assert!(rendered.contains("worker_emails_failed_total 2"));
        assert!(rendered.contains("worker_email_duration_seconds_count 1"));
        assert!(rendered.contains("worker_info{interval=\"10s\"} 1"));
    }

    #[test]
    fn test_counters_start_at_zero() {
        let registry = Arc::new(MetricsRegistry::new().unwrap());
        let _metrics = WorkerMetrics::new(
            registry.clone(),
            WorkerMetricNames::TASK,
            Duration::from_secs(5),
        );

        let rendered = registry.render();
        assert!(rendered.contains("worker_tasks_completed_total 0"));
        assert!(rendered.contains("worker_tasks_failed_total 0"));
    }

    #[test]
    fn test_registries_are_isolated() {
        let first = Arc::new(MetricsRegistry::new().unwrap());
        let second = Arc::new(MetricsRegistry::new().unwrap());

        HttpMetrics::new(first.clone()).record("GET", "/healthz", 200, Duration::from_millis(3));

        assert!(first.render().contains("http_requests_total{"));
        assert!(!second.render().contains("http_requests_total{"));
    }
}
