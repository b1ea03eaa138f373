//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! process environment
//!     → loader.rs (read variables, apply fallbacks)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → handed to startup, then to the server or worker
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; there is no reload
//! - All fields have defaults so an empty environment is runnable
//! - Malformed interval, level and failure rate fall back instead of failing

pub mod duration;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_from_env, load_from_lookup, ConfigError};
pub use schema::ServiceConfig;
pub use schema::ServiceDefaults;
pub use schema::ServiceKind;
pub use schema::ListenerConfig;
pub use schema::WorkerConfig;
