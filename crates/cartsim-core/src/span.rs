//! Span Model
//!
//! A [`Span`] is the mutable record of one simulated unit of work. It is
//! owned by exactly one task for its whole life, so none of its operations
//! take locks. Once ended it is frozen into a [`FinishedSpan`] and shared
//! with the sinks.

use crate::error::{Result, SimError};
use crate::time::Timestamp;
use serde::{Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// 64-bit span identifier, rendered as 16 lowercase hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    pub fn generate() -> Self {
        loop {
            let (high, low) = Uuid::new_v4().as_u64_pair();
            let id = high ^ low;
            if id != 0 {
                return Self(id);
            }
        }
    }

    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// 128-bit trace identifier, rendered as 32 lowercase hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

impl TraceId {
    pub fn generate() -> Self {
        // v4 uuids carry fixed version bits, so never zero
        Self(Uuid::new_v4().as_u128())
    }

    pub fn from_u128(id: u128) -> Self {
        Self(id)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

macro_rules! serialize_as_hex {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }
    };
}

serialize_as_hex!(SpanId);
serialize_as_hex!(TraceId);

/// Identity a child span needs from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
}

// ============================================================================
// Kind, status, attributes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanKind {
    Internal,
    Client,
    Producer,
    Server,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Internal => "INTERNAL",
            SpanKind::Client => "CLIENT",
            SpanKind::Producer => "PRODUCER",
            SpanKind::Server => "SERVER",
        }
    }
}

/// Terminal result of a simulated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Unset => "UNSET",
            SpanStatus::Ok => "OK",
            SpanStatus::Error => "ERROR",
        }
    }
}

impl From<Outcome> for SpanStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Ok => SpanStatus::Ok,
            Outcome::Error => SpanStatus::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            AttributeValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            AttributeValue::String(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AttributeValue,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanEvent {
    pub timestamp: Timestamp,
    pub message: String,
}

// ============================================================================
// Span
// ============================================================================

/// A live span. Status stays `Unset` and `end_time` stays `None` until
/// [`Span::end`] is called, which can happen once.
#[derive(Debug)]
pub struct Span {
    context: SpanContext,
    parent_span_id: Option<SpanId>,
    name: String,
    kind: SpanKind,
    attributes: Vec<KeyValue>,
    start_time: Timestamp,
    end_time: Option<Timestamp>,
    events: Vec<SpanEvent>,
    status: SpanStatus,
}

impl Span {
    /// Start a span. Without a parent it becomes the root of a new trace.
    pub fn start(
        name: impl Into<String>,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
        parent: Option<SpanContext>,
    ) -> Self {
        let trace_id = parent
            .map(|p| p.trace_id)
            .unwrap_or_else(TraceId::generate);

        Self {
            context: SpanContext {
                trace_id,
                span_id: SpanId::generate(),
            },
            parent_span_id: parent.map(|p| p.span_id),
            name: name.into(),
            kind,
            attributes,
            start_time: Timestamp::now(),
            end_time: None,
            events: Vec::new(),
            status: SpanStatus::Unset,
        }
    }

    pub fn context(&self) -> SpanContext {
        self.context
    }

    pub fn span_id(&self) -> SpanId {
        self.context.span_id
    }

    pub fn trace_id(&self) -> TraceId {
        self.context.trace_id
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SpanKind {
        self.kind
    }

    pub fn attributes(&self) -> &[KeyValue] {
        &self.attributes
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    pub fn end_time(&self) -> Option<Timestamp> {
        self.end_time
    }

    pub fn events(&self) -> &[SpanEvent] {
        &self.events
    }

    pub fn status(&self) -> SpanStatus {
        self.status
    }

    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    /// Append a timestamped event.
    pub fn add_event(&mut self, message: impl Into<String>) -> Result<()> {
        self.ensure_live()?;
        self.events.push(SpanEvent {
            timestamp: Timestamp::now(),
            message: message.into(),
        });
        Ok(())
    }

    /// Set the terminal status and end time.
    pub fn end(&mut self, outcome: Outcome) -> Result<()> {
        self.ensure_live()?;
        self.status = outcome.into();
        self.end_time = Some(Timestamp::now());
        Ok(())
    }

    /// Freeze an ended span into the record handed to sinks.
    pub fn finish(self) -> Result<FinishedSpan> {
        let Some(end_time) = self.end_time else {
            return Err(SimError::SpanNotEnded {
                span_id: self.context.span_id,
            });
        };

        Ok(FinishedSpan {
            trace_id: self.context.trace_id,
            span_id: self.context.span_id,
            parent_span_id: self.parent_span_id,
            name: self.name,
            kind: self.kind,
            attributes: self.attributes,
            start_time: self.start_time,
            end_time,
            events: self.events,
            status: self.status,
        })
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_ended() {
            return Err(SimError::SpanAlreadyEnded {
                span_id: self.context.span_id,
            });
        }
        Ok(())
    }
}

/// Immutable record of an ended span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishedSpan {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub kind: SpanKind,
    pub attributes: Vec<KeyValue>,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub events: Vec<SpanEvent>,
    pub status: SpanStatus,
}

impl FinishedSpan {
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.end_time.saturating_duration_since(self.start_time)
    }

    pub fn context(&self) -> SpanContext {
        SpanContext {
            trace_id: self.trace_id,
            span_id: self.span_id,
        }
    }

    pub fn get_attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| &kv.value)
    }
}
