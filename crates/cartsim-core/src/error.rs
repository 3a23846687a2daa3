//! Error types for the trace simulation core.
//!
//! A simulated `ERROR` span status is domain data and never shows up here.

use thiserror::Error;

use crate::span::SpanId;

/// Result type alias for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors raised by the catalog, the span model and the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// An operation id outside the catalog was requested.
    #[error("unknown operation id: {0}")]
    UnknownOperation(usize),

    /// `add_event` or `end` was called on a span that already ended.
    #[error("span {span_id} already ended")]
    SpanAlreadyEnded { span_id: SpanId },

    /// A span was frozen before `end` was called.
    #[error("span {span_id} has not ended yet")]
    SpanNotEnded { span_id: SpanId },

    /// A catalog entry carries a reliability outside `[0, 1]`.
    #[error("operation {id} has invalid reliability {reliability}")]
    InvalidReliability { id: usize, reliability: f64 },
}
