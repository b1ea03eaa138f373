//! Log/trace correlation.
//!
//! A [`TraceLogger`] captures the trace and span ids of a context so log
//! events can carry them as `trace_id` and `span_id` fields. Both fields are
//! omitted when the context has no valid span.

use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;

/// Trace ids to stamp on log events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceLogger {
    trace_id: Option<String>,
    span_id: Option<String>,
}

impl TraceLogger {
    /// Ids of the span active in `cx`, as lowercase hex (32 and 16 chars).
    pub fn from_context(cx: &Context) -> Self {
        let span = cx.span();
        let span_context = span.span_context();
        if !span_context.is_valid() {
            return Self::default();
        }
        Self {
            trace_id: Some(span_context.trace_id().to_string()),
            span_id: Some(span_context.span_id().to_string()),
        }
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn span_id(&self) -> Option<&str> {
        self.span_id.as_deref()
    }
}

/// Logger carrying the ids of the span active in `cx`.
pub fn logger_with_trace(cx: &Context) -> TraceLogger {
    TraceLogger::from_context(cx)
}

/// Emit an event with `trace_id`/`span_id` taken from a [`TraceLogger`].
///
/// ```ignore
/// trace_event!(tracing::Level::INFO, logger, email.id = 7, "Email sent");
/// ```
#[macro_export]
macro_rules! trace_event {
    ($level:expr, $logger:expr, $($arg:tt)+) => {
        ::tracing::event!(
            $level,
            trace_id = $logger.trace_id(),
            span_id = $logger.span_id(),
            $($arg)+
        )
    };
}

#[macro_export]
macro_rules! trace_debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::trace_event!(::tracing::Level::DEBUG, $logger, $($arg)+)
    };
}

#[macro_export]
macro_rules! trace_info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::trace_event!(::tracing::Level::INFO, $logger, $($arg)+)
    };
}

#[macro_export]
macro_rules! trace_warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::trace_event!(::tracing::Level::WARN, $logger, $($arg)+)
    };
}

#[macro_export]
macro_rules! trace_error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::trace_event!(::tracing::Level::ERROR, $logger, $($arg)+)
    };
}
