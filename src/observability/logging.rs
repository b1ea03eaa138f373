//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the process-wide `tracing` subscriber
//! - Map the configured level name to a filter
//! - Keep transport crates (h2, hyper, tonic, tower) quiet
//!
//! # Design Decisions
//! - JSON lines by default, one object per event, fields flattened
//! - `fatal` and `panic` are accepted and log at error severity
//! - Unknown level names fall back to `info`

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as fmt_layer, EnvFilter};

use crate::config::schema::LoggingConfig;

/// Targets whose chatter is capped at `warn`.
const NOISY_TARGETS: &[&str] = &["h2", "hyper", "hyper_util", "tonic", "tower"];

/// Log severity threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log level: {0:?}")]
pub struct UnknownLogLevel(pub String);

impl LogLevel {
    /// Parse a level name, using `info` for anything unrecognised.
    pub fn parse_or_default(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
            LogLevel::Panic => "panic",
        }
    }

    /// The `tracing` directive this level filters at.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal | LogLevel::Panic => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            "panic" => Ok(LogLevel::Panic),
            _ => Err(UnknownLogLevel(s.to_string())),
        }
    }
}

/// Build the filter for a level, with noisy transport targets capped at `warn`.
pub fn level_filter(level: LogLevel) -> EnvFilter {
    let base = level.as_filter();
    let noisy = if base == "error" { "error" } else { "warn" };

    let mut directives = base.to_string();
    for target in NOISY_TARGETS {
        directives.push_str(&format!(",{}={}", target, noisy));
    }
    EnvFilter::new(directives)
}

/// A JSON subscriber writing to `writer`. Used directly by tests.
pub fn json_subscriber<W>(level: LogLevel, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(level_filter(level))
        .with(
            fmt_layer::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(writer),
        )
}

/// Install the global subscriber. Returns false if one was already set.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let json = config.json.then(|| {
        fmt_layer::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
    });
    let text = (!config.json).then(|| fmt_layer::layer().compact());

    tracing_subscriber::registry()
        .with(level_filter(config.level))
        .with(json)
        .with(text)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!(" Warning ".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("fatal".parse::<LogLevel>(), Ok(LogLevel::Fatal));
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_unknown_level_defaults_to_info() {
        assert_eq!(LogLevel::parse_or_default("nonsense"), LogLevel::Info);
        assert_eq!(LogLevel::parse_or_default(""), LogLevel::Info);
    }

    #[test]
    fn test_fatal_and_panic_filter_at_error() {
        assert_eq!(LogLevel::Fatal.as_filter(), "error");
        assert_eq!(LogLevel::Panic.as_filter(), "error");
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&LogLevel::Warn).unwrap();
        assert_eq!(json, "\"warn\"");
    }

    #[test]
    fn test_filter_caps_noisy_targets() {
        let rendered = level_filter(LogLevel::Debug).to_string();
        assert!(rendered.contains("hyper=warn"));
        assert!(rendered.contains("tonic=warn"));

        let rendered = level_filter(LogLevel::Error).to_string();
        assert!(rendered.contains("h2=error"));
    }
}
