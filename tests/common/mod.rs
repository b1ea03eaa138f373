//! Shared utilities for integration tests.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use sample_services::http::ApiServer;
use sample_services::lifecycle::Shutdown;
use sample_services::observability::metrics::MetricsRegistry;
use sample_services::Telemetry;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::fmt::MakeWriter;

/// Telemetry that exports finished spans to memory.
pub fn recording_telemetry() -> (Arc<Telemetry>, InMemorySpanExporter) {
    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    (Arc::new(Telemetry::from_provider(provider, "test")), exporter)
}

pub fn fresh_registry() -> Arc<MetricsRegistry> {
    Arc::new(MetricsRegistry::new().unwrap())
}

#[allow(dead_code)]
pub fn finished_spans(exporter: &InMemorySpanExporter) -> Vec<SpanData> {
    exporter.get_finished_spans().unwrap()
}

#[allow(dead_code)]
pub fn span_named<'a>(spans: &'a [SpanData], name: &str) -> &'a SpanData {
    spans
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("no span named {}", name))
}

/// Value of the sample whose series (name plus labels) is exactly `series`.
#[allow(dead_code)]
pub fn metric_value(rendered: &str, series: &str) -> Option<f64> {
    rendered.lines().find_map(|line| {
        let (key, value) = line.rsplit_once(' ')?;
        if key == series {
            value.parse().ok()
        } else {
            None
        }
    })
}

/// In-memory log sink for a JSON subscriber.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

#[allow(dead_code)]
impl CapturedLogs {
    /// Every captured line, parsed as JSON.
    pub fn lines(&self) -> Vec<serde_json::Value> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    pub fn with_message(&self, message: &str) -> Vec<serde_json::Value> {
        self.lines()
            .into_iter()
            .filter(|line| line["message"] == message)
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Start the API on an ephemeral port.
#[allow(dead_code)]
pub async fn start_api(
    telemetry: Arc<Telemetry>,
    registry: Arc<MetricsRegistry>,
) -> (SocketAddr, Shutdown, JoinHandle<Result<(), io::Error>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = ApiServer::new(telemetry, registry);
    let handle = tokio::spawn(server.run(listener, shutdown.clone()));
    (addr, shutdown, handle)
}
