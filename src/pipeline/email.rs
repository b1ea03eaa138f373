//! Simulated email delivery: validate, fetch recipient data, render, send.

use std::future::Future;
use std::time::Duration;

use opentelemetry::KeyValue;
use rand::Rng;

use super::{millis, Invocation, Pipeline, PipelineError, PipelineSettings, StepFailure};
use crate::observability::correlation::TraceLogger;
use crate::observability::metrics::WorkerMetricNames;
use crate::{trace_debug, trace_error, trace_info};

const SMTP_SERVER: &str = "smtp.example.com";

/// Recipient and template looked up for an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailData {
    pub recipient: String,
    pub template: String,
}

/// Rendered email ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct EmailPipeline {
    settings: PipelineSettings,
}

impl EmailPipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    async fn validate(&self, invocation: &Invocation) -> Result<(), StepFailure> {
        let id = invocation.id();
        let step = invocation.begin_step(
            "validate_email_request",
            vec![KeyValue::new("email.id", id as i64)],
        );
        self.settings.latency.validate.wait().await;

        let valid = id > 0;
        step.span()
            .add_event("validation_complete", vec![KeyValue::new("valid", valid)]);

        let result = if valid {
            Ok(())
        } else {
            Err(PipelineError::Invalid("email id must be positive".to_string()))
        };
        step.finish(result)
    }

    async fn fetch(&self, invocation: &Invocation) -> Result<EmailData, StepFailure> {
        let id = invocation.id();
        let step = invocation.begin_step(
            "fetch_email_data",
            vec![
                KeyValue::new("email.id", id as i64),
                KeyValue::new("data.source", "email_service"),
            ],
        );
        let latency = self.settings.latency.fetch.wait().await;

        let user = rand::thread_rng().gen_range(0..1000);
        let data = EmailData {
            recipient: format!("user{}@example.com", user),
            template: format!("template_{}", id % 5),
        };

        step.span().set_attributes([
            KeyValue::new("email.recipient", data.recipient.clone()),
            KeyValue::new("email.template", data.template.clone()),
            KeyValue::new("fetch.latency_ms", millis(latency)),
        ]);
        step.span().add_event(
            "email_data_fetched",
            vec![
                KeyValue::new("email.recipient", data.recipient.clone()),
                KeyValue::new("email.template", data.template.clone()),
            ],
        );
        step.finish(Ok(data))
    }

    async fn prepare(&self, invocation: &Invocation, data: EmailData) -> Result<EmailContent, StepFailure> {
        let step = invocation.begin_step(
            "prepare_email_content",
            vec![
                KeyValue::new("email.template", data.template.clone()),
                KeyValue::new("email.recipient", data.recipient.clone()),
            ],
        );
        let elapsed = self.settings.latency.process.wait().await;

        let number = rand::thread_rng().gen_range(0..1000);
        let subject = format!("Welcome! Email #{}", number);
        let body = format!(
            "Hello {},\n\nThis is a dummy email sent using template: {}\n\nThank you for using our service!",
            data.recipient, data.template
        );

        step.span().set_attributes([
            KeyValue::new("email.subject", subject.clone()),
            KeyValue::new("email.body_size", body.len() as i64),
            KeyValue::new("preparation.duration_ms", millis(elapsed)),
        ]);
        step.span().add_event(
            "email_content_prepared",
            vec![KeyValue::new("email.subject", subject.clone())],
        );
        step.finish(Ok(EmailContent {
            recipient: data.recipient,
            subject,
            body,
        }))
    }

    async fn send(&self, invocation: &Invocation, content: &EmailContent) -> Result<(), StepFailure> {
        let step = invocation.begin_step(
            "send_email_smtp",
            vec![
                KeyValue::new("email.recipient", content.recipient.clone()),
                KeyValue::new("email.subject", content.subject.clone()),
            ],
        );
        if self.settings.fail_simulate {
            return step.finish(Err(PipelineError::Unavailable("SMTP server")));
        }

        let elapsed = self.settings.latency.persist.wait().await;
        if self.settings.random_failure() {
            return step.finish(Err(PipelineError::Unavailable("SMTP server")));
        }

        step.span().set_attributes([
            KeyValue::new("smtp.duration_ms", millis(elapsed)),
            KeyValue::new("smtp.status", "success"),
        ]);
        step.span().add_event(
            "email_sent_via_smtp",
            vec![
                KeyValue::new("email.recipient", content.recipient.clone()),
                KeyValue::new("smtp.server", SMTP_SERVER),
            ],
        );
        step.finish(Ok(()))
    }
}

impl Pipeline for EmailPipeline {
    type Output = EmailContent;

    const ROOT_SPAN: &'static str = "send_mail";
    const METRICS: WorkerMetricNames = WorkerMetricNames::EMAIL;

    fn root_attributes(&self, id: u64) -> Vec<KeyValue> {
        vec![
            KeyValue::new("email.id", id as i64),
            KeyValue::new("email.type", "transactional"),
        ]
    }

    fn execute<'a>(
        &'a self,
        invocation: &'a Invocation,
    ) -> impl Future<Output = Result<EmailContent, StepFailure>> + Send + 'a {
        async move {
            let logger = invocation.logger();

            self.validate(invocation).await?;
            trace_debug!(logger, "Email validation passed");

            let data = self.fetch(invocation).await?;
            trace_debug!(logger, recipient = %data.recipient, "Email data fetched");

            let content = self.prepare(invocation, data).await?;
            trace_debug!(logger, subject = %content.subject, "Email content prepared");

            self.send(invocation, &content).await?;
            Ok(content)
        }
    }

    fn completion_attributes(&self, output: &EmailContent, elapsed: Duration) -> Vec<KeyValue> {
        vec![
            KeyValue::new("email.duration_ms", millis(elapsed)),
            KeyValue::new("email.status", "sent"),
            KeyValue::new("email.recipient", output.recipient.clone()),
            KeyValue::new("email.subject", output.subject.clone()),
        ]
    }

    fn log_started(&self, logger: &TraceLogger, id: u64) {
        trace_info!(logger, email_id = id, "Starting email send process");
    }

    fn log_completed(&self, logger: &TraceLogger, id: u64, output: &EmailContent, elapsed: Duration) {
        trace_info!(
            logger,
            email_id = id,
            recipient = %output.recipient,
            subject = %output.subject,
            duration_ms = elapsed.as_millis() as u64,
            "Email sent successfully"
        );
    }

    fn log_failed(&self, logger: &TraceLogger, id: u64, failure: &StepFailure) {
        let message = match failure.step {
            "validate_email_request" => "Email validation failed",
            "fetch_email_data" => "Email data fetch failed",
            "prepare_email_content" => "Email content preparation failed",
            _ => "SMTP send failed",
        };
        trace_error!(
            logger,
            email_id = id,
            step = failure.step,
            error = %failure.error,
            "{}",
            message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::LatencyProfile;

    #[test]
    fn test_root_attributes() {
        let pipeline = EmailPipeline::new(PipelineSettings::new(LatencyProfile::instant()));
        let attributes = pipeline.root_attributes(3);
        assert!(attributes.contains(&KeyValue::new("email.id", 3_i64)));
        assert!(attributes.contains(&KeyValue::new("email.type", "transactional")));
    }
}
