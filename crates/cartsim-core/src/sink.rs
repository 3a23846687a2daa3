//! Emission Sink
//!
//! Sinks receive every finished span exactly once. `export` has no error
//! channel back to the engine: delivery problems stay inside the sink.

use crate::span::FinishedSpan;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

/// Receiver of finished spans. Must tolerate concurrent delivery.
pub trait SpanSink: Send + Sync {
    fn name(&self) -> &str;

    fn export(&self, span: Arc<FinishedSpan>);
}

/// Fan-out over a fixed set of sinks.
#[derive(Clone, Default)]
pub struct SinkSet {
    sinks: Arc<[Arc<dyn SpanSink>]>,
}

impl SinkSet {
    pub fn new(sinks: Vec<Arc<dyn SpanSink>>) -> Self {
        Self {
            sinks: sinks.into(),
        }
    }

    pub fn deliver(&self, span: FinishedSpan) {
        let span = Arc::new(span);
        for sink in self.sinks.iter() {
            sink.export(Arc::clone(&span));
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }
}

impl std::fmt::Debug for SinkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Collects spans in memory.
#[derive(Default)]
pub struct MemorySink {
    name: String,
    spans: Mutex<Vec<Arc<FinishedSpan>>>,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spans: Mutex::new(Vec::new()),
        }
    }

    pub fn spans(&self) -> Vec<Arc<FinishedSpan>> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn take(&self) -> Vec<Arc<FinishedSpan>> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<FinishedSpan>>> {
        self.spans.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SpanSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn export(&self, span: Arc<FinishedSpan>) {
        self.lock().push(span);
    }
}

/// Forwards spans into an unbounded channel.
pub struct ChannelSink {
    name: String,
    tx: mpsc::UnboundedSender<Arc<FinishedSpan>>,
}

impl ChannelSink {
    pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Arc<FinishedSpan>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }
}

impl SpanSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn export(&self, span: Arc<FinishedSpan>) {
        if self.tx.send(span).is_err() {
            warn!(sink = %self.name, "Span receiver dropped, discarding span");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{Outcome, Span, SpanKind};

    fn finished(name: &str) -> FinishedSpan {
        let mut span = Span::start(name, SpanKind::Internal, Vec::new(), None);
        span.end(Outcome::Ok).unwrap();
        span.finish().unwrap()
    }

    #[test]
    fn test_fan_out_reaches_every_sink() {
        let a = Arc::new(MemorySink::new("a"));
        let b = Arc::new(MemorySink::new("b"));
        let sinks = SinkSet::new(vec![
            a.clone() as Arc<dyn SpanSink>,
            b.clone() as Arc<dyn SpanSink>,
        ]);

        sinks.deliver(finished("one"));
        sinks.deliver(finished("two"));

        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert!(Arc::ptr_eq(&a.spans()[0], &b.spans()[0]));
        assert_eq!(sinks.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_take_drains() {
        let sink = MemorySink::new("mem");
        sink.export(Arc::new(finished("span")));

        assert_eq!(sink.take().len(), 1);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new("chan");
        sink.export(Arc::new(finished("span")));

        let span = rx.recv().await.unwrap();
        assert_eq!(span.name, "span");

        // Dropped receiver is swallowed
        drop(rx);
        sink.export(Arc::new(finished("late")));
    }
}
