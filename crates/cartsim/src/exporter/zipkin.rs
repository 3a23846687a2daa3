//! Zipkin v2 JSON encoding (`POST /api/v2/spans`).

use super::ExportError;
use super::http::SpanEncoder;
use crate::resource::ResourceInfo;
use cartsim_core::{FinishedSpan, SpanKind, SpanStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipkinSpan<'a> {
    pub trace_id: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub name: &'a str,
    /// Zipkin has no INTERNAL kind; such spans omit the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    /// Unix microseconds
    pub timestamp: u64,
    /// Microseconds
    pub duration: u64,
    pub local_endpoint: Endpoint<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation<'a>>,
    pub tags: BTreeMap<&'a str, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint<'a> {
    pub service_name: &'a str,
}

#[derive(Debug, Serialize)]
pub struct Annotation<'a> {
    pub timestamp: u64,
    pub value: &'a str,
}

fn zipkin_kind(kind: SpanKind) -> Option<&'static str> {
    match kind {
        SpanKind::Internal => None,
        SpanKind::Client => Some("CLIENT"),
        SpanKind::Server => Some("SERVER"),
        SpanKind::Producer => Some("PRODUCER"),
    }
}

impl<'a> ZipkinSpan<'a> {
    pub fn new(resource: &'a ResourceInfo, span: &'a FinishedSpan) -> Self {
        let mut tags: BTreeMap<&str, String> = span
            .attributes
            .iter()
            .map(|kv| (kv.key.as_str(), kv.value.to_string()))
            .collect();
        match span.status {
            SpanStatus::Unset => {}
            SpanStatus::Ok => {
                tags.insert("otel.status_code", "OK".to_string());
            }
            SpanStatus::Error => {
                tags.insert("otel.status_code", "ERROR".to_string());
                tags.insert("error", String::new());
            }
        }

        Self {
            trace_id: span.trace_id.to_string(),
            id: span.span_id.to_string(),
            parent_id: span.parent_span_id.map(|id| id.to_string()),
            name: &span.name,
            kind: zipkin_kind(span.kind),
            timestamp: span.start_time.unix_micros(),
            duration: span.duration().as_micros() as u64,
            local_endpoint: Endpoint {
                service_name: &resource.service_name,
            },
            annotations: span
                .events
                .iter()
                .map(|e| Annotation {
                    timestamp: e.timestamp.unix_micros(),
                    value: &e.message,
                })
                .collect(),
            tags,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZipkinJsonEncoder;

impl SpanEncoder for ZipkinJsonEncoder {
    fn encode(
        &self,
        resource: &ResourceInfo,
        spans: &[Arc<FinishedSpan>],
    ) -> Result<Vec<u8>, ExportError> {
        let spans: Vec<_> = spans
            .iter()
            .map(|span| ZipkinSpan::new(resource, span))
            .collect();
        Ok(serde_json::to_vec(&spans)?)
    }
}
