//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for the demo API
//! - Wire up middleware (request id, timeout, trace span, metrics)
//! - Serve on a bound listener until shutdown

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use opentelemetry::trace::SpanKind;
use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::trace::{
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, HTTP_ROUTE, URL_PATH,
};
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::lifecycle::Shutdown;
use crate::observability::correlation::logger_with_trace;
use crate::observability::metrics::{HttpMetrics, MetricsRegistry};
use crate::observability::tracing::Telemetry;
use crate::trace_info;

/// Route label for requests served by the catch-all.
pub const CATCH_ALL_ROUTE: &str = "/";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state injected into middleware.
#[derive(Clone)]
pub struct AppState {
    pub telemetry: Arc<Telemetry>,
    pub metrics: HttpMetrics,
}

/// HTTP server for the demo API.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    pub fn new(telemetry: Arc<Telemetry>, registry: Arc<MetricsRegistry>) -> Self {
        let state = AppState {
            telemetry,
            metrics: HttpMetrics::new(registry),
        };
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/healthz", any(handlers::healthz))
            .route("/", any(handlers::welcome))
            .fallback(handlers::welcome)
            .layer(middleware::from_fn_with_state(state.clone(), observe_request))
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .with_state(state)
    }

    /// The router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "API server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

/// Root span, correlated log line and request metrics for every request.
async fn observe_request(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| CATCH_ALL_ROUTE.to_string());
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let parent = state.telemetry.extract_remote(request.headers());
    let mut span = state.telemetry.start_span(
        "http_request",
        SpanKind::Server,
        vec![
            KeyValue::new(HTTP_REQUEST_METHOD, method.clone()),
            KeyValue::new(HTTP_ROUTE, route.clone()),
            KeyValue::new(URL_PATH, path),
        ],
        &parent,
    );

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    span.set_attribute(KeyValue::new(HTTP_RESPONSE_STATUS_CODE, status as i64));
    if response.status().is_server_error() {
        span.set_error(format!("HTTP {}", status));
    } else {
        span.set_ok();
    }

    let logger = logger_with_trace(span.context());
    trace_info!(
        logger,
        method = %method,
        path = %route,
        status,
        duration_ms = elapsed.as_millis() as u64,
        request_id = %request_id,
        "Request handled"
    );
    span.end();

    state.metrics.record(&method, &route, status, elapsed);
    response
}
