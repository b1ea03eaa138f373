//! Traced operation pipelines.
//!
//! # Data Flow
//! ```text
//! worker tick (id)
//!     → run_invocation: root span, "started" log, timer
//!     → Pipeline::execute: step 1 → step 2 → ... (each in a child span)
//!         first Err short-circuits with StepFailure { step, error }
//!     → success: completed counter, duration histogram, root attributes, Ok status
//!     → failure: failed counter, root error status
//!     → root span ends, Outcome returned
//! ```
//!
//! # Design Decisions
//! - Steps are `Result`-returning and composed with `?`
//! - A step span ends before the next step starts
//! - Metrics are touched once, at the terminal point of an invocation
//! - Errors never escape an invocation

pub mod delay;
pub mod email;
pub mod task;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::trace::SpanKind;
use opentelemetry::{Context, KeyValue};
use rand::Rng;
use thiserror::Error;

use crate::config::schema::WorkerConfig;
use crate::observability::correlation::{logger_with_trace, TraceLogger};
use crate::observability::metrics::{WorkerMetricNames, WorkerMetrics};
use crate::observability::tracing::{SpanScope, Telemetry};

pub use delay::{Delay, LatencyProfile};
pub use email::EmailPipeline;
pub use task::TaskPipeline;

/// Why a simulated step failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("{0} unavailable")]
    Unavailable(&'static str),
}

/// A failure tagged with the step that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{step}: {error}")]
pub struct StepFailure {
    pub step: &'static str,
    pub error: PipelineError,
}

/// Terminal result of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed { step: &'static str },
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

/// Latency and failure injection shared by the pipelines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub latency: LatencyProfile,

    /// Fail the final step of every invocation, before its delay.
    pub fail_simulate: bool,

    /// Probability that the final step fails after its delay.
    pub failure_rate: f64,
}

impl PipelineSettings {
    pub fn new(latency: LatencyProfile) -> Self {
        Self {
            latency,
            fail_simulate: false,
            failure_rate: 0.0,
        }
    }

    pub fn from_worker_config(config: &WorkerConfig, latency: LatencyProfile) -> Self {
        Self {
            latency,
            fail_simulate: config.fail_simulate_enabled,
            failure_rate: config.failure_rate,
        }
    }

    pub fn with_fail_simulate(mut self, enabled: bool) -> Self {
        self.fail_simulate = enabled;
        self
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate;
        self
    }

    /// Roll for a random final-step failure.
    pub fn random_failure(&self) -> bool {
        if self.failure_rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_bool(self.failure_rate.min(1.0))
    }
}

/// State shared by the steps of one invocation.
pub struct Invocation {
    telemetry: Arc<Telemetry>,
    cx: Context,
    id: u64,
}

impl Invocation {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Logger correlated with the root span.
    pub fn logger(&self) -> TraceLogger {
        logger_with_trace(&self.cx)
    }

    /// Open the child span for a step.
    pub fn begin_step(&self, name: &'static str, attributes: Vec<KeyValue>) -> StepSpan {
        StepSpan {
            name,
            scope: self
                .telemetry
                .start_span(name, SpanKind::Internal, attributes, &self.cx),
        }
    }
}

/// An open step span. Closed by [`StepSpan::finish`], or on drop.
pub struct StepSpan {
    name: &'static str,
    scope: SpanScope,
}

impl StepSpan {
    pub fn span(&self) -> &SpanScope {
        &self.scope
    }

    /// Close the span, recording the error on failure.
    pub fn finish<T>(mut self, result: Result<T, PipelineError>) -> Result<T, StepFailure> {
        let result = result.map_err(|error| {
            self.scope.record_error(&error);
            StepFailure {
                step: self.name,
                error,
            }
        });
        self.scope.end();
        result
    }
}

/// A sequence of simulated steps run under one root span.
pub trait Pipeline: Send + Sync {
    type Output: Send;

    /// Name of the root span.
    const ROOT_SPAN: &'static str;

    /// Counter and histogram names for this pipeline.
    const METRICS: WorkerMetricNames;

    fn root_attributes(&self, id: u64) -> Vec<KeyValue>;

    fn execute<'a>(
        &'a self,
        invocation: &'a Invocation,
    ) -> impl Future<Output = Result<Self::Output, StepFailure>> + Send + 'a;

    /// Attributes set on the root span after success.
    fn completion_attributes(&self, output: &Self::Output, elapsed: Duration) -> Vec<KeyValue>;

    fn log_started(&self, logger: &TraceLogger, id: u64);

    fn log_completed(&self, logger: &TraceLogger, id: u64, output: &Self::Output, elapsed: Duration);

    fn log_failed(&self, logger: &TraceLogger, id: u64, failure: &StepFailure);
}

/// Run one invocation of `pipeline` under a new root span parented on `parent`.
pub async fn run_invocation<P: Pipeline>(
    pipeline: &P,
    telemetry: &Arc<Telemetry>,
    metrics: &WorkerMetrics,
    parent: &Context,
    id: u64,
) -> Outcome {
    let mut root = telemetry.start_span(
        P::ROOT_SPAN,
        SpanKind::Internal,
        pipeline.root_attributes(id),
        parent,
    );
    let invocation = Invocation {
        telemetry: Arc::clone(telemetry),
        cx: root.context().clone(),
        id,
    };
    let logger = invocation.logger();
    pipeline.log_started(&logger, id);

    let start = Instant::now();
    let outcome = match pipeline.execute(&invocation).await {
        Ok(output) => {
            let elapsed = start.elapsed();
            metrics.record_success(elapsed);
            root.set_attributes(pipeline.completion_attributes(&output, elapsed));
            root.set_ok();
            pipeline.log_completed(&logger, id, &output, elapsed);
            Outcome::Completed
        }
        Err(failure) => {
            metrics.record_failure();
            root.record_error(&failure.error);
            pipeline.log_failed(&logger, id, &failure);
            Outcome::Failed { step: failure.step }
        }
    };

    root.end();
    outcome
}

pub(crate) fn millis(duration: Duration) -> f64 {
    duration.as_millis() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::Status;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};

    fn recording() -> (Arc<Telemetry>, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (Arc::new(Telemetry::from_provider(provider, "test")), exporter)
    }

    #[test]
    fn test_finish_ok_leaves_status_unset() {
        let (telemetry, exporter) = recording();
        let invocation = Invocation {
            telemetry: telemetry.clone(),
            cx: Context::new(),
            id: 1,
        };

        let value = invocation.begin_step("step", vec![]).finish(Ok(5)).unwrap();
        assert_eq!(value, 5);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, Status::Unset);
    }

    #[test]
    fn test_finish_err_tags_step_and_records_error() {
        let (telemetry, exporter) = recording();
        let invocation = Invocation {
            telemetry,
            cx: Context::new(),
            id: 1,
        };

        let failure = invocation
            .begin_step("send_email_smtp", vec![])
            .finish::<()>(Err(PipelineError::Unavailable("SMTP server")))
            .unwrap_err();
        assert_eq!(failure.step, "send_email_smtp");
        assert_eq!(failure.error.to_string(), "SMTP server unavailable");

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].status, Status::error("SMTP server unavailable"));
        assert!(spans[0].events.iter().any(|e| e.name == "exception"));
    }

    #[test]
    fn test_failure_rate_bounds() {
        let never = PipelineSettings::new(LatencyProfile::instant());
        assert!((0..100).all(|_| !never.random_failure()));

        let always = never.with_failure_rate(1.0);
        assert!((0..100).all(|_| always.random_failure()));
    }
}
