//! Demo API and background workers with trace-correlated logs and metrics.

pub mod config;
pub mod http;
pub mod net;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod worker;

pub use config::schema::ServiceConfig;
pub use http::ApiServer;
pub use lifecycle::Shutdown;
pub use observability::tracing::Telemetry;
