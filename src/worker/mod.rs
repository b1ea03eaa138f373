//! Background worker loop.
//!
//! # Responsibilities
//! - Run one pipeline invocation per tick, ids counting up from 1
//! - Sleep the configured interval between invocations
//! - Stop between invocations once shutdown is triggered
//!
//! # Design Decisions
//! - An in-flight invocation always runs to completion
//! - Each invocation gets a fresh root span (no parent)

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::Context;

use crate::config::duration::format_duration;
use crate::lifecycle::Shutdown;
use crate::observability::metrics::{MetricsRegistry, WorkerMetrics};
use crate::observability::tracing::Telemetry;
use crate::pipeline::{run_invocation, Outcome, Pipeline};

/// Totals for a finished worker loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub invocations: u64,
    pub completed: u64,
    pub failed: u64,
}

pub struct Worker<P> {
    pipeline: P,
    telemetry: Arc<Telemetry>,
    metrics: WorkerMetrics,
    interval: Duration,
}

impl<P: Pipeline> Worker<P> {
    /// Build a worker and register its metrics on `registry`.
    pub fn new(
        pipeline: P,
        telemetry: Arc<Telemetry>,
        registry: Arc<MetricsRegistry>,
        interval: Duration,
    ) -> Self {
        let metrics = WorkerMetrics::new(registry, P::METRICS, interval);
        Self {
            pipeline,
            telemetry,
            metrics,
            interval,
        }
    }

    /// Run one invocation with the given id.
    pub async fn run_once(&self, id: u64) -> Outcome {
        run_invocation(
            &self.pipeline,
            &self.telemetry,
            &self.metrics,
            &Context::new(),
            id,
        )
        .await
    }

    /// Loop until `shutdown` is triggered.
    pub async fn run(self, shutdown: Shutdown) -> WorkerReport {
        let mut shutdown_rx = shutdown.subscribe();
        let mut report = WorkerReport::default();

        tracing::info!(
            pipeline = P::ROOT_SPAN,
            interval = %format_duration(self.interval),
            "Worker started"
        );

        loop {
            if shutdown.is_triggered() {
                break;
            }

            report.invocations += 1;
            match self.run_once(report.invocations).await {
                Outcome::Completed => report.completed += 1,
                Outcome::Failed { .. } => report.failed += 1,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown_rx.recv() => break,
            }
        }

        tracing::info!(
            pipeline = P::ROOT_SPAN,
            invocations = report.invocations,
            completed = report.completed,
            failed = report.failed,
            "Worker shutting down"
        );
        report
    }
}
