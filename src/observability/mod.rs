//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! API requests and worker invocations produce:
//!     → tracing.rs (spans under an explicit Context, OTLP export)
//!     → correlation.rs (trace_id/span_id on log events)
//!     → logging.rs (JSON lines on stdout)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → OTLP collector
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Trace ids flow into logs, never the other way round
//! - Tracing can be switched off without touching call sites

pub mod correlation;
pub mod logging;
pub mod metrics;
pub mod tracing;
