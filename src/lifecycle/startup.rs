//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize logging, tracing and metrics in dependency order
//! - Bind the metrics listener and start serving it
//! - Install signal handling
//! - Run the configured service until shutdown, then tear down
//!
//! # Design Decisions
//! - Fail fast: a listener that cannot bind is fatal
//! - Tracing degrades to no-op spans instead of failing startup
//! - Teardown order: stop servers, then flush spans

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::duration::format_duration;
use crate::config::{ConfigError, ServiceConfig, ServiceKind};
use crate::http::ApiServer;
use crate::lifecycle::signals::spawn_signal_listener;
use crate::lifecycle::Shutdown;
use crate::net::{bind_listener, ListenerError};
use crate::observability::logging::init_logging;
use crate::observability::metrics::{serve_metrics, MetricsError, MetricsRegistry};
use crate::observability::tracing::Telemetry;
use crate::pipeline::{EmailPipeline, LatencyProfile, PipelineSettings, TaskPipeline};
use crate::worker::{Worker, WorkerReport};

/// Error type for startup and service runs.
#[derive(Debug)]
pub enum StartupError {
    Config(ConfigError),
    Metrics(MetricsError),
    Listener(ListenerError),
    Serve(std::io::Error),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::Config(e) => write!(f, "Configuration error: {}", e),
            StartupError::Metrics(e) => write!(f, "Metrics error: {}", e),
            StartupError::Listener(e) => write!(f, "{}", e),
            StartupError::Serve(e) => write!(f, "Server error: {}", e),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<ConfigError> for StartupError {
    fn from(e: ConfigError) -> Self {
        StartupError::Config(e)
    }
}

impl From<MetricsError> for StartupError {
    fn from(e: MetricsError) -> Self {
        StartupError::Metrics(e)
    }
}

impl From<ListenerError> for StartupError {
    fn from(e: ListenerError) -> Self {
        StartupError::Listener(e)
    }
}

impl From<std::io::Error> for StartupError {
    fn from(e: std::io::Error) -> Self {
        StartupError::Serve(e)
    }
}

/// Shared subsystems of a running service.
pub struct Services {
    pub config: ServiceConfig,
    pub telemetry: Arc<Telemetry>,
    pub registry: Arc<MetricsRegistry>,
    pub shutdown: Shutdown,
    metrics_server: JoinHandle<std::io::Result<()>>,
    signal_listener: JoinHandle<()>,
}

/// Bring up logging, tracing, metrics and signal handling for `config`.
pub async fn start(config: ServiceConfig) -> Result<Services, StartupError> {
    init_logging(&config.logging);

    tracing::info!(
        service = config.kind.as_str(),
        service_name = %config.tracing.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting"
    );

    tracing::debug!(config = %config.summary(), "Effective configuration");

    if config.secret_key.is_default() {
        tracing::warn!("SECRET_KEY not set, using default value");
    }
    if config.kind != ServiceKind::Api {
        tracing::info!(
            fail_simulate = config.worker.fail_simulate_enabled,
            "Fail simulate is {}",
            config.worker.fail_simulate_enabled
        );
    }

    let telemetry = Arc::new(Telemetry::init_or_disabled(&config.tracing));
    let registry = Arc::new(MetricsRegistry::new()?);

    let metrics_listener = match bind_listener(&config.listener.metrics_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start metrics server");
            let _ = telemetry.shutdown().await;
            return Err(e.into());
        }
    };

    let shutdown = Shutdown::new();
    let metrics_server = tokio::spawn(serve_metrics(
        metrics_listener,
        registry.clone(),
        shutdown.clone(),
    ));
    let signal_listener = spawn_signal_listener(shutdown.clone());

    Ok(Services {
        config,
        telemetry,
        registry,
        shutdown,
        metrics_server,
        signal_listener,
    })
}

impl Services {
    /// Run the configured service until shutdown, then tear everything down.
    pub async fn run(self) -> Result<(), StartupError> {
        let result = match self.config.kind {
            ServiceKind::Api => self.run_api().await,
            ServiceKind::EmailWorker | ServiceKind::TaskWorker => {
                self.run_worker().await;
                Ok(())
            }
        };
        if let Err(e) = &result {
            tracing::error!(error = %e, "Service failed");
        }
        self.finish().await;
        result
    }

    async fn run_api(&self) -> Result<(), StartupError> {
        let listener = bind_listener(&self.config.listener.bind_address()).await?;
        let server = ApiServer::new(self.telemetry.clone(), self.registry.clone());
        server.run(listener, self.shutdown.clone()).await?;
        Ok(())
    }

    async fn run_worker(&self) -> WorkerReport {
        let interval = self.config.worker.interval;
        tracing::info!(
            interval = %format_duration(interval),
            "Starting {} with interval {}",
            self.config.kind.as_str(),
            format_duration(interval)
        );

        match self.config.kind {
            ServiceKind::TaskWorker => {
                let settings = PipelineSettings::from_worker_config(&self.config.worker, LatencyProfile::task());
                Worker::new(
                    TaskPipeline::new(settings),
                    self.telemetry.clone(),
                    self.registry.clone(),
                    interval,
                )
                .run(self.shutdown.clone())
                .await
            }
            _ => {
                let settings = PipelineSettings::from_worker_config(&self.config.worker, LatencyProfile::email());
                Worker::new(
                    EmailPipeline::new(settings),
                    self.telemetry.clone(),
                    self.registry.clone(),
                    interval,
                )
                .run(self.shutdown.clone())
                .await
            }
        }
    }

    /// Stop the metrics server and flush spans.
    pub async fn finish(self) {
        self.shutdown.trigger();

        match self.metrics_server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Metrics server failed"),
            Err(e) => tracing::error!(error = %e, "Metrics server task panicked"),
        }
        let _ = self.signal_listener.await;

        if let Err(e) = self.telemetry.shutdown().await {
            tracing::warn!(error = %e, "Failed to flush spans");
        }
        tracing::info!("Shutdown complete");
    }
}
