//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! configured host:port
//!     → listener.rs (bind, report failures)
//!     → handed to axum::serve (API or metrics router)
//! ```
//!
//! # Design Decisions
//! - A bind failure is fatal to the process that needs the port

pub mod listener;

pub use listener::{bind_listener, ListenerError};
