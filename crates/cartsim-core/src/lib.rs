//! # cartsim-core - Checkout Trace Simulation
//!
//! Models a checkout request as a tree of spans and drives their lifecycle
//! through pluggable sinks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      SimulationEngine                        │
//! │                                                              │
//! │  ┌─────────────┐   ┌───────────────┐   ┌─────────────────┐   │
//! │  │   Catalog   │──▶│ OutcomePolicy │──▶│   Span Model    │   │
//! │  │ (6 ops)     │   │ (status/time) │   │ (start/event/   │   │
//! │  └─────────────┘   └───────────────┘   │  end/finish)    │   │
//! │                                        └────────┬────────┘   │
//! │                                                 ▼            │
//! │                                    ┌──────────────────────┐  │
//! │                                    │  SinkSet (fan-out)   │  │
//! │                                    └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cartsim_core::{MemorySink, SimulationEngine, SinkSet, SpanSink};
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let sink = Arc::new(MemorySink::new("memory"));
//! let engine = SimulationEngine::new(SinkSet::new(vec![sink.clone() as Arc<dyn SpanSink>]));
//!
//! // Root span is exported immediately, children as their timers fire
//! let report = engine.run_cycle().join().await;
//! assert_eq!(report.completed, 6);
//! assert_eq!(sink.len(), 7);
//! # }
//! ```

pub mod catalog;
pub mod engine;
pub mod error;
pub mod fake;
pub mod outcome;
pub mod sink;
pub mod span;
pub mod time;

pub use catalog::{AttributeTemplate, Catalog, OperationDefinition, TemplateValue};
pub use engine::{
    CycleHandle, CycleReport, DEFAULT_ROOT_SPAN_NAME, EngineStats, SimulationEngine, StatsSnapshot,
};
pub use error::{Result, SimError};
pub use outcome::{DurationModel, FixedPolicy, OutcomePolicy, RandomPolicy};
pub use sink::{ChannelSink, MemorySink, SinkSet, SpanSink};
pub use span::{
    AttributeValue, FinishedSpan, KeyValue, Outcome, Span, SpanContext, SpanEvent, SpanId,
    SpanKind, SpanStatus, TraceId,
};
pub use time::Timestamp;
