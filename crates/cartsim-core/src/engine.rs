//! Simulation Engine
//!
//! One cycle models one checkout request:
//!
//! ```text
//!   run_cycle()
//!     │
//!     ├── root span "Shopping Cart" (SERVER) ─────────── end(OK) ──▶ sinks
//!     │
//!     ├── launch(op 0) ── "Starting work" ── sleep ── "Finishing work" ── end ──▶ sinks
//!     ├── launch(op 1) ── ...                      (independent tokio task)
//!     └── launch(op 5) ── ...
//! ```
//!
//! The root span ends as soon as every child is launched, before the
//! children complete. Children are fire-and-forget tasks; each owns its span
//! exclusively and hands the finished record to the sinks itself.

use crate::catalog::{self, Catalog};
use crate::error::{Result, SimError};
use crate::outcome::{OutcomePolicy, RandomPolicy};
use crate::sink::SinkSet;
use crate::span::{FinishedSpan, Outcome, Span, SpanContext, SpanId, SpanKind, SpanStatus, TraceId};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub const DEFAULT_ROOT_SPAN_NAME: &str = "Shopping Cart";

/// Engine counters, shared with every child task.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub cycles: AtomicU64,
    pub spans_started: AtomicU64,
    pub spans_exported: AtomicU64,
    pub spans_ok: AtomicU64,
    pub spans_error: AtomicU64,
    pub operations_skipped: AtomicU64,
    pub tasks_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub spans_started: u64,
    pub spans_exported: u64,
    pub spans_ok: u64,
    pub spans_error: u64,
    pub operations_skipped: u64,
    pub tasks_failed: u64,
}

impl StatsSnapshot {
    /// Spans started but not yet exported.
    pub fn in_flight(&self) -> u64 {
        self.spans_started
            .saturating_sub(self.spans_exported + self.tasks_failed)
    }
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            spans_started: self.spans_started.load(Ordering::Relaxed),
            spans_exported: self.spans_exported.load(Ordering::Relaxed),
            spans_ok: self.spans_ok.load(Ordering::Relaxed),
            spans_error: self.spans_error.load(Ordering::Relaxed),
            operations_skipped: self.operations_skipped.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
        }
    }

    fn record_export(&self, status: SpanStatus) {
        self.spans_exported.fetch_add(1, Ordering::Relaxed);
        match status {
            SpanStatus::Ok => self.spans_ok.fetch_add(1, Ordering::Relaxed),
            SpanStatus::Error => self.spans_error.fetch_add(1, Ordering::Relaxed),
            SpanStatus::Unset => 0,
        };
    }
}

/// Handle on the children of one cycle.
///
/// Dropping it detaches the children; they still complete and export.
#[derive(Debug)]
pub struct CycleHandle {
    pub trace_id: TraceId,
    pub root_span_id: SpanId,
    /// Requested ids that were not in the catalog.
    pub skipped: Vec<usize>,
    tasks: Vec<JoinHandle<Result<()>>>,
}

/// Result of awaiting every child of a cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub completed: usize,
    pub failed: Vec<SimError>,
    pub panicked: usize,
}

impl CycleHandle {
    /// Number of child simulations running or finished.
    pub fn launched(&self) -> usize {
        self.tasks.len()
    }

    pub async fn join(self) -> CycleReport {
        let mut report = CycleReport::default();
        for task in self.tasks {
            match task.await {
                Ok(Ok(())) => report.completed += 1,
                Ok(Err(err)) => report.failed.push(err),
                Err(_) => report.panicked += 1,
            }
        }
        report
    }
}

/// Trace simulation engine.
///
/// Catalog and policy are read-only and shared with every child task, so
/// overlapping cycles are safe. `run_cycle` spawns tokio tasks and must be
/// called from within a runtime.
#[derive(Clone)]
pub struct SimulationEngine {
    catalog: Arc<Catalog>,
    policy: Arc<dyn OutcomePolicy>,
    sinks: SinkSet,
    stats: Arc<EngineStats>,
    root_span_name: Arc<str>,
}

impl SimulationEngine {
    /// Engine over the canonical catalog with a random policy.
    pub fn new(sinks: SinkSet) -> Self {
        Self {
            catalog: catalog::global(),
            policy: Arc::new(RandomPolicy::new()),
            sinks,
            stats: Arc::new(EngineStats::default()),
            root_span_name: Arc::from(DEFAULT_ROOT_SPAN_NAME),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn OutcomePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_root_span_name(mut self, name: &str) -> Self {
        self.root_span_name = Arc::from(name);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn sinks(&self) -> &SinkSet {
        &self.sinks
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run one cycle over every catalog entry.
    pub fn run_cycle(&self) -> CycleHandle {
        let ids: Vec<usize> = self.catalog.ids().collect();
        self.run_cycle_for(&ids)
    }

    /// Run one cycle over an explicit list of operation ids. Unknown ids are
    /// skipped without affecting their siblings.
    pub fn run_cycle_for(&self, ids: &[usize]) -> CycleHandle {
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        let root = Span::start(self.root_span_name.as_ref(), SpanKind::Server, Vec::new(), None);
        self.stats.spans_started.fetch_add(1, Ordering::Relaxed);
        let parent = root.context();

        let mut tasks = Vec::with_capacity(ids.len());
        let mut skipped = Vec::new();

        for &id in ids {
            match self.launch(parent, id) {
                Ok(task) => tasks.push(task),
                Err(err) => {
                    warn!(
                        trace_id = %parent.trace_id,
                        operation_id = id,
                        error = %err,
                        "Skipping operation"
                    );
                    self.stats.operations_skipped.fetch_add(1, Ordering::Relaxed);
                    skipped.push(id);
                }
            }
        }

        // Root closes before its children complete.
        match complete(root, Outcome::Ok) {
            Ok(finished) => self.deliver(finished),
            Err(err) => {
                error!(trace_id = %parent.trace_id, error = %err, "Root span failed to end");
                self.stats.tasks_failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        debug!(
            trace_id = %parent.trace_id,
            launched = tasks.len(),
            skipped = skipped.len(),
            "Cycle launched"
        );

        CycleHandle {
            trace_id: parent.trace_id,
            root_span_id: parent.span_id,
            skipped,
            tasks,
        }
    }

    /// Start one simulated call under `parent` and return its task.
    pub fn launch(&self, parent: SpanContext, id: usize) -> Result<JoinHandle<Result<()>>> {
        let op = self.catalog.lookup(id)?;

        let attributes = op.render_attributes(&mut rand::rng());
        let mut span = Span::start(op.name, op.kind, attributes, Some(parent));
        span.add_event(format!("Starting work on {}", op.name))?;
        self.stats.spans_started.fetch_add(1, Ordering::Relaxed);

        let delay = self.policy.decide_duration(op.typical_duration_ms);
        let name = op.name;
        let reliability = op.reliability;
        let policy = Arc::clone(&self.policy);
        let sinks = self.sinks.clone();
        let stats = Arc::clone(&self.stats);

        debug!(
            span_id = %span.span_id(),
            operation = name,
            delay_us = delay.as_micros() as u64,
            "Operation launched"
        );

        Ok(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let finished = span
                .add_event(format!("Finishing work on {name}"))
                .and_then(|()| complete(span, policy.decide_outcome(reliability)));

            match finished {
                Ok(finished) => {
                    debug!(
                        span_id = %finished.span_id,
                        operation = name,
                        status = finished.status.as_str(),
                        "Operation finished"
                    );
                    stats.record_export(finished.status);
                    sinks.deliver(finished);
                    Ok(())
                }
                Err(err) => {
                    error!(operation = name, error = %err, "Simulation task failed");
                    stats.tasks_failed.fetch_add(1, Ordering::Relaxed);
                    Err(err)
                }
            }
        }))
    }

    fn deliver(&self, finished: FinishedSpan) {
        self.stats.record_export(finished.status);
        self.sinks.deliver(finished);
    }
}

fn complete(mut span: Span, outcome: Outcome) -> Result<FinishedSpan> {
    span.end(outcome)?;
    span.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FixedPolicy;
    use crate::sink::{MemorySink, SpanSink};

    fn engine_with_sink() -> (SimulationEngine, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new("memory"));
        let engine = SimulationEngine::new(SinkSet::new(vec![sink.clone() as Arc<dyn SpanSink>]))
            .with_policy(Arc::new(FixedPolicy::instant_ok()));
        (engine, sink)
    }

    #[tokio::test]
    async fn test_cycle_exports_root_then_children() {
        let (engine, sink) = engine_with_sink();

        let handle = engine.run_cycle();
        assert_eq!(handle.launched(), 6);

        // Root is exported before run_cycle returns
        let spans = sink.spans();
        assert!(spans.iter().any(|s| s.is_root() && s.span_id == handle.root_span_id));

        let report = handle.join().await;
        assert_eq!(report.completed, 6);
        assert_eq!(sink.len(), 7);
    }

    #[tokio::test]
    async fn test_unknown_operation_is_skipped() {
        let (engine, sink) = engine_with_sink();

        let handle = engine.run_cycle_for(&[0, 99, 1]);
        assert_eq!(handle.skipped, vec![99]);
        assert_eq!(handle.launched(), 2);

        handle.join().await;
        assert_eq!(sink.len(), 3);
        assert_eq!(engine.stats().operations_skipped, 1);
    }

    #[tokio::test]
    async fn test_launch_rejects_unknown_id() {
        let (engine, _sink) = engine_with_sink();
        let root = Span::start("root", SpanKind::Server, Vec::new(), None);

        let err = engine.launch(root.context(), 42).unwrap_err();
        assert_eq!(err, SimError::UnknownOperation(42));
    }

    #[tokio::test]
    async fn test_stats_track_outcomes() {
        let sink = Arc::new(MemorySink::new("memory"));
        let engine = SimulationEngine::new(SinkSet::new(vec![sink.clone() as Arc<dyn SpanSink>]))
            .with_policy(Arc::new(FixedPolicy {
                outcome: Some(Outcome::Error),
                duration_fraction: 0.0,
            }));

        engine.run_cycle().join().await;
        let stats = engine.stats();

        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.spans_started, 7);
        assert_eq!(stats.spans_exported, 7);
        // Root is always OK
        assert_eq!(stats.spans_ok, 1);
        assert_eq!(stats.spans_error, 6);
        assert_eq!(stats.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_custom_root_name() {
        let (engine, sink) = engine_with_sink();
        let engine = engine.with_root_span_name("Checkout");

        engine.run_cycle_for(&[]).join().await;
        let spans = sink.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "Checkout");
        assert_eq!(spans[0].kind, SpanKind::Server);
        assert!(spans[0].attributes.is_empty());
    }
}
