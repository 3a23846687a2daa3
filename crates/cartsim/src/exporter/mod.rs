//! Span exporters
//!
//! Concrete [`SpanSink`]s. Each exporter owns its delivery failures: the
//! engine only ever calls `export` and moves on.
//!
//! | Exporter  | Transport                    | Encoding              |
//! |-----------|------------------------------|-----------------------|
//! | `console` | stdout                       | JSON / JSON lines / text |
//! | `otlp`    | HTTP POST, background worker | OTLP/JSON             |
//! | `zipkin`  | HTTP POST, background worker | Zipkin v2 JSON        |

pub mod console;
pub mod http;
pub mod zipkin;

pub use console::ConsoleExporter;
pub use http::{ExportStats, HttpExporter, OtlpJsonEncoder, SpanEncoder};
pub use zipkin::ZipkinJsonEncoder;

use crate::config::GeneratorConfig;
use crate::resource::ResourceInfo;
use cartsim_core::SpanSink;
use clap::ValueEnum;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    Console,
    Otlp,
    Zipkin,
}

impl ExporterKind {
    pub fn is_http(&self) -> bool {
        matches!(self, ExporterKind::Otlp | ExporterKind::Zipkin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ConsoleFormat {
    /// Pretty-printed JSON document per span
    #[default]
    Json,
    /// One compact JSON document per line
    JsonLines,
    /// One human-readable line per span
    Pretty,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to encode spans: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write spans: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("collector returned status {status}")]
    Status { status: u16 },
}

/// Every configured sink plus the background workers behind them.
pub struct Exporters {
    sinks: Vec<Arc<dyn SpanSink>>,
    workers: Vec<(String, JoinHandle<()>)>,
    stats: Vec<(String, Arc<ExportStats>)>,
}

impl Exporters {
    /// Build the exporters named in the config. Each exporter spawns its
    /// worker, so this must run inside a tokio runtime.
    pub fn from_config(config: &GeneratorConfig, resource: &ResourceInfo) -> Self {
        let mut exporters = Self {
            sinks: Vec::new(),
            workers: Vec::new(),
            stats: Vec::new(),
        };

        for kind in &config.exporters {
            match kind {
                ExporterKind::Console => {
                    let (console, worker) =
                        ConsoleExporter::stdout(config.console_format, resource.clone());
                    let stats = console.stats();
                    exporters.push(Arc::new(console), stats, worker);
                }
                ExporterKind::Otlp => {
                    let (otlp, worker) = HttpExporter::spawn(
                        "otlp",
                        &config.otlp_endpoint,
                        Arc::new(OtlpJsonEncoder),
                        config.http.clone(),
                        resource.clone(),
                    );
                    let stats = otlp.stats();
                    exporters.push(Arc::new(otlp), stats, worker);
                }
                ExporterKind::Zipkin => {
                    let (zipkin, worker) = HttpExporter::spawn(
                        "zipkin",
                        &config.zipkin_endpoint,
                        Arc::new(ZipkinJsonEncoder),
                        config.http.clone(),
                        resource.clone(),
                    );
                    let stats = zipkin.stats();
                    exporters.push(Arc::new(zipkin), stats, worker);
                }
            }
        }

        info!(exporters = ?config.exporters, "Exporters configured");
        exporters
    }

    fn push(&mut self, sink: Arc<dyn SpanSink>, stats: Arc<ExportStats>, worker: JoinHandle<()>) {
        let name = sink.name().to_string();
        self.workers.push((name.clone(), worker));
        self.stats.push((name, stats));
        self.sinks.push(sink);
    }

    pub fn sinks(&self) -> Vec<Arc<dyn SpanSink>> {
        self.sinks.clone()
    }

    /// Delivery counters of every exporter, keyed by name.
    pub fn stats(&self) -> Vec<(String, Arc<ExportStats>)> {
        self.stats.clone()
    }

    /// Drop the sinks and wait for the workers to flush what they hold.
    ///
    /// Workers exit once every clone of their sink is gone, so the engine
    /// must be dropped first.
    pub async fn shutdown(self, timeout: Duration) {
        let Self { sinks, workers, .. } = self;
        drop(sinks);

        for (name, worker) in workers {
            match tokio::time::timeout(timeout, worker).await {
                Ok(Ok(())) => info!(exporter = %name, "Exporter flushed"),
                Ok(Err(err)) => warn!(exporter = %name, error = %err, "Exporter worker panicked"),
                Err(_) => warn!(exporter = %name, "Exporter did not flush before timeout"),
            }
        }
    }
}
