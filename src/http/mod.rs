//! HTTP layer subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (axum::serve)
//!     → SetRequestId / PropagateRequestId (x-request-id)
//!     → TraceLayer, TimeoutLayer
//!     → observe_request (root span, correlated log, metrics)
//!     → handlers.rs (/healthz, /, 404 fallback)
//! ```

pub mod handlers;
pub mod server;

pub use server::{ApiServer, AppState};
