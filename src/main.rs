//! Trace-correlated demo services.
//!
//! ```text
//!   sample-services api                 sample-services worker --kind email|task
//!   ┌──────────────────────────┐        ┌──────────────────────────────────────┐
//!   │ GET /healthz, GET /      │        │ every WORKER_INTERVAL:               │
//!   │  → http_request span     │        │  root span → step spans (4)          │
//!   │  → correlated log line   │        │  → correlated logs                   │
//!   │  → http_requests_total   │        │  → sent/failed counters, histogram   │
//!   └────────────┬─────────────┘        └──────────────────┬───────────────────┘
//!                │        OTLP/gRPC spans, :METRICS_PORT/metrics               │
//!                └──────────────────────────┬──────────────────────────────────┘
//!                                           ▼
//!                                collector / Prometheus
//! ```

use clap::{Parser, Subcommand, ValueEnum};

use sample_services::config::schema::LoggingConfig;
use sample_services::config::{load_from_env, ServiceDefaults};
use sample_services::lifecycle::start;
use sample_services::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "sample-services")]
#[command(about = "Demo API and workers with correlated traces, logs and metrics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Api,
    /// Run a background worker
    Worker {
        #[arg(long, value_enum, default_value_t = WorkerKind::Email)]
        kind: WorkerKind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum WorkerKind {
    Email,
    Task,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let defaults = match cli.command {
        Commands::Api => ServiceDefaults::api(),
        Commands::Worker { kind: WorkerKind::Email } => ServiceDefaults::email_worker(),
        Commands::Worker { kind: WorkerKind::Task } => ServiceDefaults::task_worker(),
    };

    let config = match load_from_env(&defaults) {
        Ok(config) => config,
        Err(e) => {
            init_logging(&LoggingConfig::default());
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    let services = match start(config).await {
        Ok(services) => services,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };

    services.run().await?;
    Ok(())
}
