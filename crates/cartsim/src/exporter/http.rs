//! HTTP span exporter
//!
//! `export` only enqueues into a bounded channel; a background worker
//! batches spans and POSTs them with retry and exponential backoff. A full
//! queue drops the span and counts it, it never blocks the engine.

use super::ExportError;
use crate::config::HttpExportConfig;
use crate::otlp::TracesData;
use crate::resource::ResourceInfo;
use cartsim_core::{FinishedSpan, SpanSink};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Wire encoding of a batch of spans.
pub trait SpanEncoder: Send + Sync {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(
        &self,
        resource: &ResourceInfo,
        spans: &[Arc<FinishedSpan>],
    ) -> Result<Vec<u8>, ExportError>;
}

/// OTLP/HTTP with JSON payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtlpJsonEncoder;

impl SpanEncoder for OtlpJsonEncoder {
    fn encode(
        &self,
        resource: &ResourceInfo,
        spans: &[Arc<FinishedSpan>],
    ) -> Result<Vec<u8>, ExportError> {
        Ok(serde_json::to_vec(&TracesData::from_spans(resource, spans))?)
    }
}

#[derive(Debug, Default)]
pub struct ExportStats {
    pub sent: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
    pub dropped: AtomicU64,
    pub batches: AtomicU64,
}

pub struct HttpExporter {
    name: String,
    tx: mpsc::Sender<Arc<FinishedSpan>>,
    stats: Arc<ExportStats>,
}

impl HttpExporter {
    /// Create the exporter and spawn its worker. The worker exits after
    /// flushing once the exporter is dropped.
    pub fn spawn(
        name: &str,
        endpoint: &str,
        encoder: Arc<dyn SpanEncoder>,
        config: HttpExportConfig,
        resource: ResourceInfo,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let stats = Arc::new(ExportStats::default());

        let worker = Worker {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            encoder,
            config,
            resource,
            stats: stats.clone(),
        };
        let handle = tokio::spawn(worker.run(rx));

        (
            Self {
                name: name.to_string(),
                tx,
                stats,
            },
            handle,
        )
    }

    pub fn stats(&self) -> Arc<ExportStats> {
        self.stats.clone()
    }
}

impl SpanSink for HttpExporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn export(&self, span: Arc<FinishedSpan>) {
        match self.tx.try_send(span) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(span)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    exporter = %self.name,
                    span_id = %span.span_id,
                    "Export queue full, dropping span"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

struct Worker {
    name: String,
    endpoint: String,
    encoder: Arc<dyn SpanEncoder>,
    config: HttpExportConfig,
    resource: ResourceInfo,
    stats: Arc<ExportStats>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<Arc<FinishedSpan>>) {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                error!(
                    exporter = %self.name,
                    error = %err,
                    "Failed to build HTTP client, exporter disabled"
                );
                while rx.recv().await.is_some() {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                }
                return;
            }
        };

        let mut batch: Vec<Arc<FinishedSpan>> = Vec::with_capacity(self.config.batch_size);
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.flush_interval_ms.max(1)));

        info!(exporter = %self.name, endpoint = %self.endpoint, "HTTP exporter started");

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(span) => {
                        batch.push(span);
                        if batch.len() >= self.config.batch_size {
                            self.flush(&client, &mut batch).await;
                        }
                    }
                    None => break,
                },
                _ = interval.tick() => {
                    if !batch.is_empty() {
                        self.flush(&client, &mut batch).await;
                    }
                }
            }
        }

        if !batch.is_empty() {
            self.flush(&client, &mut batch).await;
        }

        info!(
            exporter = %self.name,
            sent = self.stats.sent.load(Ordering::Relaxed),
            failed = self.stats.failed.load(Ordering::Relaxed),
            dropped = self.stats.dropped.load(Ordering::Relaxed),
            "HTTP exporter stopped"
        );
    }

    async fn flush(&self, client: &reqwest::Client, batch: &mut Vec<Arc<FinishedSpan>>) {
        let spans = std::mem::take(batch);
        let count = spans.len() as u64;

        let body = match self.encoder.encode(&self.resource, &spans) {
            Ok(body) => body,
            Err(err) => {
                self.stats.failed.fetch_add(count, Ordering::Relaxed);
                error!(exporter = %self.name, count, error = %err, "Failed to encode batch");
                return;
            }
        };

        for attempt in 0..=self.config.max_retries {
            match self.post(client, body.clone()).await {
                Ok(()) => {
                    self.stats.sent.fetch_add(count, Ordering::Relaxed);
                    self.stats.batches.fetch_add(1, Ordering::Relaxed);
                    debug!(exporter = %self.name, count, "Exported batch");
                    return;
                }
                Err(err) => {
                    warn!(exporter = %self.name, attempt, error = %err, "Export attempt failed");
                }
            }

            if attempt < self.config.max_retries {
                self.stats.retried.fetch_add(1, Ordering::Relaxed);
                let delay = self.config.retry_base_delay_ms.saturating_mul(1 << attempt.min(16));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        self.stats.failed.fetch_add(count, Ordering::Relaxed);
        error!(exporter = %self.name, count, "Dropped batch after max retries");
    }

    async fn post(&self, client: &reqwest::Client, body: Vec<u8>) -> Result<(), ExportError> {
        let response = client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, self.encoder.content_type())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            if status == StatusCode::TOO_MANY_REQUESTS {
                debug!(exporter = %self.name, "Collector rate limited");
            }
            Err(ExportError::Status {
                status: status.as_u16(),
            })
        }
    }
}
