//! OTLP JSON types
//!
//! Minimal OTLP/JSON shapes for spans and log records (camelCase, ids as hex
//! strings, timestamps as decimal strings).

use crate::resource::ResourceInfo;
use cartsim_core::{AttributeValue, FinishedSpan, SpanKind, SpanStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Common
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
#[allow(non_snake_case)]
pub enum AnyValue {
    String { stringValue: String },
    Bool { boolValue: bool },
}

impl AnyValue {
    pub fn string(s: impl Into<String>) -> Self {
        AnyValue::String {
            stringValue: s.into(),
        }
    }

    pub fn bool(b: bool) -> Self {
        AnyValue::Bool { boolValue: b }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnyValue::String { stringValue } => Some(stringValue),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AnyValue::Bool { boolValue } => Some(*boolValue),
            _ => None,
        }
    }
}

impl From<&AttributeValue> for AnyValue {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::String(s) => AnyValue::string(s.clone()),
            AttributeValue::Bool(b) => AnyValue::bool(*b),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: AnyValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, AnyValue::string(value))
    }
}

impl From<&cartsim_core::KeyValue> for KeyValue {
    fn from(kv: &cartsim_core::KeyValue) -> Self {
        Self::new(kv.key.clone(), AnyValue::from(&kv.value))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

impl From<&ResourceInfo> for Resource {
    fn from(info: &ResourceInfo) -> Self {
        Self {
            attributes: info.attributes(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct InstrumentationScope {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl InstrumentationScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: crate::resource::SDK_VERSION.to_string(),
        }
    }
}

// ============================================================================
// Traces
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TracesData {
    pub resource_spans: Vec<ResourceSpans>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    pub resource: Resource,
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ScopeSpans {
    pub scope: InstrumentationScope,
    pub spans: Vec<OtlpSpan>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OtlpSpan {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_span_id: String,
    pub name: String,
    pub kind: u8,
    pub start_time_unix_nano: String,
    pub end_time_unix_nano: String,
    pub attributes: Vec<KeyValue>,
    pub events: Vec<OtlpEvent>,
    pub status: OtlpStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OtlpEvent {
    pub time_unix_nano: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct OtlpStatus {
    pub code: u8,
}

/// OTLP `Span.SpanKind` value.
pub fn span_kind_code(kind: SpanKind) -> u8 {
    match kind {
        SpanKind::Internal => 1,
        SpanKind::Server => 2,
        SpanKind::Client => 3,
        SpanKind::Producer => 4,
    }
}

/// OTLP `Status.StatusCode` value.
pub fn status_code(status: SpanStatus) -> u8 {
    match status {
        SpanStatus::Unset => 0,
        SpanStatus::Ok => 1,
        SpanStatus::Error => 2,
    }
}

impl From<&FinishedSpan> for OtlpSpan {
    fn from(span: &FinishedSpan) -> Self {
        Self {
            trace_id: span.trace_id.to_string(),
            span_id: span.span_id.to_string(),
            parent_span_id: span
                .parent_span_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            name: span.name.clone(),
            kind: span_kind_code(span.kind),
            start_time_unix_nano: span.start_time.unix_nanos().to_string(),
            end_time_unix_nano: span.end_time.unix_nanos().to_string(),
            attributes: span.attributes.iter().map(KeyValue::from).collect(),
            events: span
                .events
                .iter()
                .map(|e| OtlpEvent {
                    time_unix_nano: e.timestamp.unix_nanos().to_string(),
                    name: e.message.clone(),
                })
                .collect(),
            status: OtlpStatus {
                code: status_code(span.status),
            },
        }
    }
}

impl TracesData {
    pub fn from_spans(resource: &ResourceInfo, spans: &[Arc<FinishedSpan>]) -> Self {
        Self {
            resource_spans: vec![ResourceSpans {
                resource: Resource::from(resource),
                scope_spans: vec![ScopeSpans {
                    scope: InstrumentationScope::new(crate::resource::TRACES_SCOPE),
                    spans: spans.iter().map(|s| OtlpSpan::from(s.as_ref())).collect(),
                }],
            }],
        }
    }

    pub fn span_count(&self) -> usize {
        self.resource_spans
            .iter()
            .flat_map(|r| &r.scope_spans)
            .map(|s| s.spans.len())
            .sum()
    }
}

// ============================================================================
// Logs
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogsData {
    pub resource_logs: Vec<ResourceLogs>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLogs {
    pub resource: Resource,
    pub scope_logs: Vec<ScopeLogs>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScopeLogs {
    pub scope: InstrumentationScope,
    pub log_records: Vec<LogRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub time_unix_nano: String,
    pub observed_time_unix_nano: String,
    pub severity_number: u32,
    pub severity_text: String,
    pub body: AnyValue,
    pub attributes: Vec<KeyValue>,
}

impl LogRecord {
    pub fn get_attribute(&self, key: &str) -> Option<&AnyValue> {
        self.attributes
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| &kv.value)
    }
}

impl LogsData {
    pub fn from_records(resource: &ResourceInfo, records: Vec<LogRecord>) -> Self {
        Self {
            resource_logs: vec![ResourceLogs {
                resource: Resource::from(resource),
                scope_logs: vec![ScopeLogs {
                    scope: InstrumentationScope::new(crate::resource::LOGS_SCOPE),
                    log_records: records,
                }],
            }],
        }
    }
}
