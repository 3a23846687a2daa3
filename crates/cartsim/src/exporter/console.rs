//! Console span exporter
//!
//! Writes one record per finished span, shaped like the console exporters of
//! the OpenTelemetry SDKs (microsecond timestamp and duration, attribute map,
//! status, events).

use super::{ConsoleFormat, ExportError, ExportStats};
use crate::resource::ResourceInfo;
use cartsim_core::{AttributeValue, FinishedSpan, SpanSink};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleSpanRecord<'a> {
    pub service_name: &'a str,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub name: &'a str,
    pub id: String,
    pub kind: &'static str,
    /// Unix microseconds
    pub timestamp: u64,
    /// Microseconds
    pub duration: u64,
    pub attributes: BTreeMap<&'a str, &'a AttributeValue>,
    pub status: ConsoleStatus,
    pub events: Vec<ConsoleEvent<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ConsoleStatus {
    pub code: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ConsoleEvent<'a> {
    pub name: &'a str,
    /// Unix microseconds
    pub time: u64,
}

impl<'a> ConsoleSpanRecord<'a> {
    pub fn new(resource: &'a ResourceInfo, span: &'a FinishedSpan) -> Self {
        Self {
            service_name: &resource.service_name,
            trace_id: span.trace_id.to_string(),
            parent_id: span.parent_span_id.map(|id| id.to_string()),
            name: &span.name,
            id: span.span_id.to_string(),
            kind: span.kind.as_str(),
            timestamp: span.start_time.unix_micros(),
            duration: span.duration().as_micros() as u64,
            attributes: span
                .attributes
                .iter()
                .map(|kv| (kv.key.as_str(), &kv.value))
                .collect(),
            status: ConsoleStatus {
                code: span.status.as_str(),
            },
            events: span
                .events
                .iter()
                .map(|e| ConsoleEvent {
                    name: &e.message,
                    time: e.timestamp.unix_micros(),
                })
                .collect(),
        }
    }
}

/// Spans buffered for the console writer before dropping.
pub const CONSOLE_QUEUE_CAPACITY: usize = 10_000;

/// Span sink writing to stdout or any other writer.
///
/// Writes happen on a blocking worker; `export` only enqueues, so a stalled
/// writer drops spans instead of stalling the engine.
pub struct ConsoleExporter {
    format: ConsoleFormat,
    resource: ResourceInfo,
    tx: mpsc::Sender<Arc<FinishedSpan>>,
    stats: Arc<ExportStats>,
}

impl ConsoleExporter {
    pub fn stdout(format: ConsoleFormat, resource: ResourceInfo) -> (Self, JoinHandle<()>) {
        Self::with_writer(
            format,
            resource,
            Box::new(std::io::stdout()),
            CONSOLE_QUEUE_CAPACITY,
        )
    }

    /// Create the exporter and spawn its writer. The writer exits once the
    /// exporter is dropped and the queue is drained.
    pub fn with_writer(
        format: ConsoleFormat,
        resource: ResourceInfo,
        writer: Box<dyn Write + Send>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(ExportStats::default());

        let handle = tokio::task::spawn_blocking({
            let resource = resource.clone();
            let stats = stats.clone();
            move || write_loop(rx, format, resource, writer, stats)
        });

        (
            Self {
                format,
                resource,
                tx,
                stats,
            },
            handle,
        )
    }

    /// Render one span in the configured format, without trailing newline.
    pub fn render(&self, span: &FinishedSpan) -> Result<String, ExportError> {
        render(self.format, &self.resource, span)
    }

    pub fn stats(&self) -> Arc<ExportStats> {
        self.stats.clone()
    }
}

fn render(
    format: ConsoleFormat,
    resource: &ResourceInfo,
    span: &FinishedSpan,
) -> Result<String, ExportError> {
    let rendered = match format {
        ConsoleFormat::Json => {
            serde_json::to_string_pretty(&ConsoleSpanRecord::new(resource, span))?
        }
        ConsoleFormat::JsonLines => serde_json::to_string(&ConsoleSpanRecord::new(resource, span))?,
        ConsoleFormat::Pretty => render_pretty(span),
    };
    Ok(rendered)
}

fn write_loop(
    mut rx: mpsc::Receiver<Arc<FinishedSpan>>,
    format: ConsoleFormat,
    resource: ResourceInfo,
    mut writer: Box<dyn Write + Send>,
    stats: Arc<ExportStats>,
) {
    while let Some(span) = rx.blocking_recv() {
        let written = render(format, &resource, &span).and_then(|rendered| {
            writeln!(writer, "{rendered}")?;
            writer.flush()?;
            Ok(())
        });
        match written {
            Ok(()) => {
                stats.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(span_id = %span.span_id, error = %err, "Console export failed");
            }
        }
    }
}

fn render_pretty(span: &FinishedSpan) -> String {
    let started: DateTime<Utc> =
        DateTime::from_timestamp_nanos(span.start_time.unix_nanos() as i64);
    let parent = span
        .parent_span_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{} [{:5}] {:8} {} trace={} span={} parent={} {:.1}ms",
        started.to_rfc3339_opts(SecondsFormat::Millis, true),
        span.status.as_str(),
        span.kind.as_str(),
        span.name,
        span.trace_id,
        span.span_id,
        parent,
        span.duration().as_secs_f64() * 1000.0
    )
}

impl SpanSink for ConsoleExporter {
    fn name(&self) -> &str {
        "console"
    }

    fn export(&self, span: Arc<FinishedSpan>) {
        match self.tx.try_send(span) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(span)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(span_id = %span.span_id, "Console queue full, dropping span");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartsim_core::{FixedPolicy, KeyValue, Outcome, SimulationEngine, SinkSet, Span, SpanKind};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Blocks its first write until the gate sender is dropped, like a
    /// stdout pipe nobody reads.
    struct StalledWriter {
        gate: std::sync::mpsc::Receiver<()>,
        opened: bool,
    }

    impl Write for StalledWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.opened {
                let _ = self.gate.recv();
                self.opened = true;
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn span() -> Arc<FinishedSpan> {
        let mut span = Span::start(
            "MYSQL INSERT INTO ORDERS",
            SpanKind::Client,
            vec![KeyValue::new("db.sql.table", "orders")],
            None,
        );
        span.add_event("Starting work on MYSQL INSERT INTO ORDERS").unwrap();
        span.end(Outcome::Error).unwrap();
        Arc::new(span.finish().unwrap())
    }

    #[tokio::test]
    async fn test_json_lines_output() {
        let buffer = SharedBuffer::default();
        let (exporter, worker) = ConsoleExporter::with_writer(
            ConsoleFormat::JsonLines,
            ResourceInfo::default(),
            Box::new(buffer.clone()),
            16,
        );
        let stats = exporter.stats();

        exporter.export(span());
        exporter.export(span());
        drop(exporter);
        worker.await.unwrap();

        assert_eq!(stats.sent.load(Ordering::Relaxed), 2);
        let contents = buffer.contents();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record["name"], "MYSQL INSERT INTO ORDERS");
        assert_eq!(record["kind"], "CLIENT");
        assert_eq!(record["status"]["code"], "ERROR");
        assert_eq!(record["attributes"]["db.sql.table"], "orders");
        assert_eq!(record["serviceName"], "cartsim");
        assert!(record.get("parentId").is_none());
    }

    #[tokio::test]
    async fn test_pretty_output() {
        let (exporter, _worker) = ConsoleExporter::with_writer(
            ConsoleFormat::Pretty,
            ResourceInfo::default(),
            Box::new(std::io::sink()),
            1,
        );
        let line = exporter.render(&span()).unwrap();
        assert!(line.contains("[ERROR]"));
        assert!(line.contains("parent=-"));
        assert!(!line.contains('\n'));
    }

    #[tokio::test]
    async fn test_write_failure_is_counted() {
        let (exporter, worker) = ConsoleExporter::with_writer(
            ConsoleFormat::Json,
            ResourceInfo::default(),
            Box::new(FailingWriter),
            4,
        );
        let stats = exporter.stats();

        exporter.export(span());
        drop(exporter);
        worker.await.unwrap();

        assert_eq!(stats.failed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.sent.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_stalled_writer_does_not_block_cycles() {
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let (exporter, worker) = ConsoleExporter::with_writer(
            ConsoleFormat::JsonLines,
            ResourceInfo::default(),
            Box::new(StalledWriter {
                gate,
                opened: false,
            }),
            2,
        );
        let stats = exporter.stats();
        let sinks = SinkSet::new(vec![Arc::new(exporter) as Arc<dyn SpanSink>]);
        let engine =
            SimulationEngine::new(sinks).with_policy(Arc::new(FixedPolicy::instant_ok()));

        // Both cycles start and finish while the writer is stuck on its first span
        let first = engine.run_cycle();
        let second = engine.run_cycle();
        assert_eq!(first.join().await.completed, 6);
        assert_eq!(second.join().await.completed, 6);

        // 14 spans against one in the writer and two queued
        assert!(stats.dropped.load(Ordering::Relaxed) >= 11);
        assert_eq!(stats.sent.load(Ordering::Relaxed), 0);

        drop(release);
        drop(engine);
        worker.await.unwrap();
        assert!(stats.sent.load(Ordering::Relaxed) <= 3);
    }
}
