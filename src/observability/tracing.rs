//! Distributed tracing support.
//!
//! # Responsibilities
//! - Build the OTLP span pipeline (gRPC exporter, batch processor, resource)
//! - Extract W3C trace context from incoming request headers
//! - Start spans under an explicit parent `Context`
//! - Flush buffered spans on shutdown
//!
//! # Design Decisions
//! - Contexts are passed explicitly; nothing is installed globally
//! - When tracing is disabled every span is a no-op with invalid ids, so
//!   call sites never branch on whether export is on
//! - An exporter that cannot be built degrades to disabled tracing

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

use axum::http::HeaderMap;
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::noop::NoopTracer;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, Sampler, SdkTracer, SdkTracerProvider,
};
use opentelemetry_sdk::Resource;
use thiserror::Error;

use crate::config::schema::TracingConfig;

/// Errors raised while building or shutting down the span pipeline.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to build OTLP exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),

    #[error("failed to flush spans: {0}")]
    Shutdown(String),
}

enum Backend {
    Exporting {
        provider: SdkTracerProvider,
        tracer: SdkTracer,
    },
    Disabled(NoopTracer),
}

/// Process-wide tracing handle. Cheap to share behind an `Arc`.
pub struct Telemetry {
    backend: Backend,
    propagator: TraceContextPropagator,
    service_name: String,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("service_name", &self.service_name)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Telemetry {
    /// Build the OTLP pipeline described by `config`.
    ///
    /// The gRPC channel connects lazily, so an unreachable collector is not
    /// an error here. Must be called from within a Tokio runtime.
    pub fn init(config: &TracingConfig) -> Result<Self, TracingError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint_url(&config.otlp_endpoint))
            .build()?;

        let processor = BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                BatchConfigBuilder::default()
                    .with_scheduled_delay(config.batch_interval)
                    .build(),
            )
            .build();

        let provider = SdkTracerProvider::builder()
            .with_span_processor(processor)
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(build_resource(config))
            .build();

        Ok(Self::from_provider(provider, config.service_name.clone()))
    }

    /// Build the pipeline, or fall back to no-op spans if that fails or
    /// tracing is switched off.
    pub fn init_or_disabled(config: &TracingConfig) -> Self {
        if !config.enabled {
            return Self::disabled(config.service_name.clone());
        }
        match Self::init(config) {
            Ok(telemetry) => {
                tracing::info!(
                    endpoint = %config.otlp_endpoint,
                    service = %config.service_name,
                    "Tracing initialized"
                );
                telemetry
            }
            Err(e) => {
                tracing::warn!(error = %e, "Tracing unavailable, continuing without export");
                Self::disabled(config.service_name.clone())
            }
        }
    }

    /// Wrap an existing provider. Tests pass one backed by an in-memory exporter.
    pub fn from_provider(provider: SdkTracerProvider, service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        let tracer = provider.tracer(service_name.clone());
        Self {
            backend: Backend::Exporting { provider, tracer },
            propagator: TraceContextPropagator::new(),
            service_name,
        }
    }

    /// Tracing that records nothing.
    pub fn disabled(service_name: impl Into<String>) -> Self {
        Self {
            backend: Backend::Disabled(NoopTracer::new()),
            propagator: TraceContextPropagator::new(),
            service_name: service_name.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.backend, Backend::Exporting { .. })
    }

    /// Start a span under `parent`.
    pub fn start_span(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
        parent: &Context,
    ) -> SpanScope {
        let builder = opentelemetry::trace::SpanBuilder::from_name(name)
            .with_kind(kind)
            .with_attributes(attributes);

        let cx = match &self.backend {
            Backend::Exporting { tracer, .. } => {
                parent.with_span(tracer.build_with_context(builder, parent))
            }
            Backend::Disabled(tracer) => {
                parent.with_span(tracer.build_with_context(builder, parent))
            }
        };
        SpanScope::new(cx)
    }

    /// Context carried by W3C `traceparent`/`tracestate` headers.
    ///
    /// Returns an empty context when the headers are absent or malformed,
    /// or when tracing is disabled.
    pub fn extract_remote(&self, headers: &HeaderMap) -> Context {
        if !self.is_enabled() {
            return Context::new();
        }
        let cx = self.propagator.extract(&HeaderMapExtractor(headers));
        if cx.span().span_context().is_valid() {
            cx
        } else {
            Context::new()
        }
    }

    /// Flush buffered spans and stop the exporter.
    pub async fn shutdown(&self) -> Result<(), TracingError> {
        let Backend::Exporting { provider, .. } = &self.backend else {
            return Ok(());
        };
        let provider = provider.clone();
        tokio::task::spawn_blocking(move || provider.shutdown())
            .await
            .map_err(|e| TracingError::Shutdown(e.to_string()))?
            .map_err(|e| TracingError::Shutdown(e.to_string()))
    }
}

fn endpoint_url(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

fn build_resource(config: &TracingConfig) -> Resource {
    let mut attributes = vec![
        KeyValue::new("service.version", config.service_version.clone()),
        KeyValue::new("environment", config.environment.clone()),
        KeyValue::new("process.pid", std::process::id() as i64),
    ];
    if let Ok(host) = std::env::var("HOSTNAME") {
        if !host.is_empty() {
            attributes.push(KeyValue::new("host.name", host));
        }
    }

    Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attributes(attributes)
        .build()
}

struct HeaderMapExtractor<'a>(&'a HeaderMap);

impl<'a> Extractor for HeaderMapExtractor<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// An open span, ended exactly once: by `end()` or on drop.
pub struct SpanScope {
    cx: Context,
    ended: bool,
}

impl SpanScope {
    fn new(cx: Context) -> Self {
        Self { cx, ended: false }
    }

    /// Context with this span active, for starting children.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn add_event(&self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        self.cx.span().add_event(name, attributes);
    }

    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }

    pub fn set_attributes(&self, attributes: impl IntoIterator<Item = KeyValue>) {
        self.cx.span().set_attributes(attributes);
    }

    /// Record `err` as an exception event and mark the span failed.
    pub fn record_error(&self, err: &dyn StdError) {
        let span = self.cx.span();
        span.record_error(err);
        span.set_status(Status::error(err.to_string()));
    }

    pub fn set_ok(&self) {
        self.cx.span().set_status(Status::Ok);
    }

    pub fn set_error(&self, message: impl Into<Cow<'static, str>>) {
        self.cx.span().set_status(Status::error(message));
    }

    pub fn is_recording(&self) -> bool {
        self.cx.span().span_context().is_valid()
    }

    pub fn end(&mut self) {
        if !self.ended {
            self.ended = true;
            self.cx.span().end();
        }
    }
}

impl Drop for SpanScope {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use opentelemetry_sdk::trace::InMemorySpanExporter;

    fn recording() -> (Telemetry, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (Telemetry::from_provider(provider, "test"), exporter)
    }

    #[test]
    fn test_endpoint_gets_scheme() {
        assert_eq!(endpoint_url("localhost:4317"), "http://localhost:4317");
        assert_eq!(endpoint_url("https://collector:4317"), "https://collector:4317");
    }

    #[test]
    fn test_child_span_shares_trace() {
        let (telemetry, exporter) = recording();

        let mut root = telemetry.start_span("root", SpanKind::Internal, vec![], &Context::new());
        let mut child = telemetry.start_span("child", SpanKind::Internal, vec![], root.context());
        child.end();
        root.end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 2);
        let child = spans.iter().find(|s| s.name == "child").unwrap();
        let root = spans.iter().find(|s| s.name == "root").unwrap();
        assert_eq!(child.span_context.trace_id(), root.span_context.trace_id());
        assert_eq!(child.parent_span_id, root.span_context.span_id());
    }

    #[test]
    fn test_span_ends_once() {
        let (telemetry, exporter) = recording();

        let mut span = telemetry.start_span("once", SpanKind::Internal, vec![], &Context::new());
        span.end();
        span.end();
        drop(span);

        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn test_dropped_span_is_ended() {
        let (telemetry, exporter) = recording();
        {
            let _span = telemetry.start_span("scoped", SpanKind::Internal, vec![], &Context::new());
        }
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn test_disabled_spans_do_not_record() {
        let telemetry = Telemetry::disabled("test");
        let span = telemetry.start_span("noop", SpanKind::Server, vec![], &Context::new());
        assert!(!span.is_recording());
        assert!(!telemetry.is_enabled());
    }

    #[test]
    fn test_switched_off_tracing_yields_noop_spans() {
        let config = TracingConfig {
            enabled: false,
            ..TracingConfig::default()
        };
        let telemetry = Telemetry::init_or_disabled(&config);
        assert!(!telemetry.is_enabled());

        let span = telemetry.start_span("noop", SpanKind::Internal, vec![], &Context::new());
        assert!(!span.is_recording());

        let logger = crate::observability::correlation::logger_with_trace(span.context());
        assert_eq!(logger.trace_id(), None);
        assert_eq!(logger.span_id(), None);

        let mut headers = HeaderMap::new();
        headers.insert(
            "traceparent",
            HeaderValue::from_static("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
        );
        assert!(!telemetry.extract_remote(&headers).span().span_context().is_valid());
    }

    #[test]
    fn test_extract_remote_parent() {
        let (telemetry, _exporter) = recording();
        let mut headers = HeaderMap::new();
        headers.insert(
            "traceparent",
            HeaderValue::from_static("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
        );

        let cx = telemetry.extract_remote(&headers);
        assert_eq!(
            cx.span().span_context().trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }

    #[test]
    fn test_extract_ignores_malformed_header() {
        let (telemetry, _exporter) = recording();
        let mut headers = HeaderMap::new();
        headers.insert("traceparent", HeaderValue::from_static("not-a-trace"));

        let cx = telemetry.extract_remote(&headers);
        assert!(!cx.span().span_context().is_valid());
    }
}
