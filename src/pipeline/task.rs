//! Simulated task processing: validate, fetch input, process, save.

use std::future::Future;
use std::time::Duration;

use opentelemetry::KeyValue;
use rand::Rng;
use uuid::Uuid;

use super::{millis, Invocation, Pipeline, PipelineError, PipelineSettings, StepFailure};
use crate::observability::correlation::TraceLogger;
use crate::observability::metrics::WorkerMetricNames;
use crate::{trace_debug, trace_error, trace_info};

const TASK_TYPES: [&str; 3] = ["report", "export", "cleanup"];
const STORAGE_BACKEND: &str = "object_store";

/// Kind of task for an id. Rotates through the known types.
pub fn task_type(id: u64) -> &'static str {
    TASK_TYPES[(id % TASK_TYPES.len() as u64) as usize]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInput {
    pub task_type: &'static str,
    pub size_bytes: u64,
}

/// What a completed task produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub task_type: &'static str,
    pub records_processed: u64,
}

#[derive(Debug, Clone)]
pub struct TaskPipeline {
    settings: PipelineSettings,
}

impl TaskPipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    async fn validate(&self, invocation: &Invocation) -> Result<(), StepFailure> {
        let id = invocation.id();
        let step = invocation.begin_step("validate_task", vec![KeyValue::new("task.id", id as i64)]);
        self.settings.latency.validate.wait().await;

        let valid = id > 0;
        step.span()
            .add_event("validation_complete", vec![KeyValue::new("valid", valid)]);

        let result = if valid {
            Ok(())
        } else {
            Err(PipelineError::Invalid("task id must be positive".to_string()))
        };
        step.finish(result)
    }

    async fn fetch_input(&self, invocation: &Invocation) -> Result<TaskInput, StepFailure> {
        let id = invocation.id();
        let step = invocation.begin_step(
            "fetch_task_input",
            vec![
                KeyValue::new("task.id", id as i64),
                KeyValue::new("input.source", STORAGE_BACKEND),
            ],
        );
        let latency = self.settings.latency.fetch.wait().await;

        let size_bytes = rand::thread_rng().gen_range(1_024..=65_536);
        let input = TaskInput {
            task_type: task_type(id),
            size_bytes,
        };

        step.span().set_attributes([
            KeyValue::new("task.input_size", size_bytes as i64),
            KeyValue::new("fetch.latency_ms", millis(latency)),
        ]);
        step.span().add_event(
            "task_input_fetched",
            vec![KeyValue::new("task.input_size", size_bytes as i64)],
        );
        step.finish(Ok(input))
    }

    async fn process(&self, invocation: &Invocation, input: TaskInput) -> Result<TaskResult, StepFailure> {
        let step = invocation.begin_step(
            "process_task_payload",
            vec![
                KeyValue::new("task.type", input.task_type),
                KeyValue::new("task.input_size", input.size_bytes as i64),
            ],
        );
        let elapsed = self.settings.latency.process.wait().await;

        // One record per 256 bytes of input.
        let records_processed = (input.size_bytes / 256).max(1);

        step.span().set_attributes([
            KeyValue::new("task.records_processed", records_processed as i64),
            KeyValue::new("processing.duration_ms", millis(elapsed)),
        ]);
        step.span().add_event(
            "task_payload_processed",
            vec![KeyValue::new("task.records_processed", records_processed as i64)],
        );
        step.finish(Ok(TaskResult {
            task_type: input.task_type,
            records_processed,
        }))
    }

    async fn save(&self, invocation: &Invocation, result: &TaskResult) -> Result<(), StepFailure> {
        let step = invocation.begin_step(
            "save_task_result",
            vec![
                KeyValue::new("task.type", result.task_type),
                KeyValue::new("storage.backend", STORAGE_BACKEND),
            ],
        );
        if self.settings.fail_simulate {
            return step.finish(Err(PipelineError::Unavailable("storage backend")));
        }

        let elapsed = self.settings.latency.persist.wait().await;
        if self.settings.random_failure() {
            return step.finish(Err(PipelineError::Unavailable("storage backend")));
        }

        step.span().set_attributes([
            KeyValue::new("storage.duration_ms", millis(elapsed)),
            KeyValue::new("storage.status", "success"),
        ]);
        step.span().add_event(
            "task_result_saved",
            vec![KeyValue::new("storage.backend", STORAGE_BACKEND)],
        );
        step.finish(Ok(()))
    }
}

impl Pipeline for TaskPipeline {
    type Output = TaskResult;

    const ROOT_SPAN: &'static str = "process_task";
    const METRICS: WorkerMetricNames = WorkerMetricNames::TASK;

    fn root_attributes(&self, id: u64) -> Vec<KeyValue> {
        vec![
            KeyValue::new("task.id", id as i64),
            KeyValue::new("task.type", task_type(id)),
            KeyValue::new("task.uuid", Uuid::new_v4().to_string()),
        ]
    }

    fn execute<'a>(
        &'a self,
        invocation: &'a Invocation,
    ) -> impl Future<Output = Result<TaskResult, StepFailure>> + Send + 'a {
        async move {
            let logger = invocation.logger();

            self.validate(invocation).await?;
            trace_debug!(logger, "Task validation passed");

            let input = self.fetch_input(invocation).await?;
            trace_debug!(logger, input_size = input.size_bytes, "Task input fetched");

            let result = self.process(invocation, input).await?;
            trace_debug!(logger, records = result.records_processed, "Task payload processed");

            self.save(invocation, &result).await?;
            Ok(result)
        }
    }

    fn completion_attributes(&self, output: &TaskResult, elapsed: Duration) -> Vec<KeyValue> {
        vec![
            KeyValue::new("task.duration_ms", millis(elapsed)),
            KeyValue::new("task.status", "completed"),
            KeyValue::new("task.records_processed", output.records_processed as i64),
        ]
    }

    fn log_started(&self, logger: &TraceLogger, id: u64) {
        trace_info!(logger, task_id = id, task_type = task_type(id), "Starting task");
    }

    fn log_completed(&self, logger: &TraceLogger, id: u64, output: &TaskResult, elapsed: Duration) {
        trace_info!(
            logger,
            task_id = id,
            task_type = output.task_type,
            records = output.records_processed,
            duration_ms = elapsed.as_millis() as u64,
            "Task completed"
        );
    }

    fn log_failed(&self, logger: &TraceLogger, id: u64, failure: &StepFailure) {
        trace_error!(
            logger,
            task_id = id,
            step = failure.step,
            error = %failure.error,
            "Task failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_rotates() {
        assert_eq!(task_type(1), "export");
        assert_eq!(task_type(2), "cleanup");
        assert_eq!(task_type(3), "report");
        assert_eq!(task_type(4), "export");
    }
}
