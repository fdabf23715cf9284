//! OTLP JSON trace model
//!
//! Serde types for the OTLP-JSON subset this tool consumes
//! (`resourceSpans → scopeSpans → spans`) plus the decoding rules that
//! collapse the wire representation into the internal [`Span`] model:
//! 64-bit timestamps arrive as decimal strings, enums arrive as either
//! integers or their canonical proto names, and attribute values may be
//! wrapped in OTLP typed-value envelopes (`stringValue`, `intValue`, ...).

use crate::span::{Span, SpanEvent, SpanStatus, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Span decoding failure
///
/// Any decode error aborts the ingest of the whole document; partial trace
/// data is never returned.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("span {span_id:?}: empty {field} timestamp")]
    EmptyTimestamp { span_id: String, field: &'static str },

    #[error("span {span_id:?}: invalid {field} timestamp {raw:?}")]
    InvalidTimestamp {
        span_id: String,
        field: &'static str,
        raw: String,
    },

    #[error("span {span_id:?}: end time {end} precedes start time {start}")]
    NegativeDuration {
        span_id: String,
        start: i64,
        end: i64,
    },

    #[error("span with empty spanId")]
    MissingSpanId,
}

/// Top-level OTLP-JSON trace document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OtlpDocument {
    #[serde(default, rename = "resourceSpans")]
    pub resource_spans: Vec<OtlpResourceSpans>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OtlpResourceSpans {
    #[serde(default)]
    pub resource: Option<OtlpResource>,
    #[serde(default, rename = "scopeSpans")]
    pub scope_spans: Vec<OtlpScopeSpans>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OtlpResource {
    #[serde(default)]
    pub attributes: Vec<OtlpKeyValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OtlpScopeSpans {
    #[serde(default)]
    pub scope: Option<OtlpScope>,
    #[serde(default)]
    pub spans: Vec<OtlpSpan>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OtlpScope {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OtlpKeyValue {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OtlpSpan {
    #[serde(default, rename = "traceId")]
    pub trace_id: String,
    #[serde(default, rename = "spanId")]
    pub span_id: String,
    #[serde(default, rename = "parentSpanId")]
    pub parent_span_id: String,
    #[serde(default)]
    pub name: String,
    /// Integer or `SPAN_KIND_*` name; unknown values coerce to unspecified
    #[serde(default)]
    pub kind: Value,
    #[serde(default, rename = "startTimeUnixNano")]
    pub start_time_unix_nano: Value,
    #[serde(default, rename = "endTimeUnixNano")]
    pub end_time_unix_nano: Value,
    #[serde(default)]
    pub attributes: Vec<OtlpKeyValue>,
    #[serde(default)]
    pub status: Option<OtlpStatus>,
    #[serde(default)]
    pub events: Vec<OtlpEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OtlpStatus {
    /// Integer or `STATUS_CODE_*` name
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OtlpEvent {
    #[serde(default, rename = "timeUnixNano")]
    pub time_unix_nano: Value,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<OtlpKeyValue>,
}

impl OtlpDocument {
    /// Total number of spans across all resource/scope groups
    pub fn span_count(&self) -> usize {
        self.resource_spans
            .iter()
            .flat_map(|rs| rs.scope_spans.iter())
            .map(|ss| ss.spans.len())
            .sum()
    }
}

/// Parse a `...UnixNano` field into signed 64-bit nanoseconds
///
/// The OTLP JSON encoding carries 64-bit values as decimal strings; plain
/// JSON numbers are accepted as well. The whole string must parse — empty
/// or partially numeric input is rejected.
pub fn parse_unix_nano(
    raw: &Value,
    span_id: &str,
    field: &'static str,
) -> Result<i64, DecodeError> {
    match raw {
        Value::String(s) => {
            if s.is_empty() {
                return Err(DecodeError::EmptyTimestamp {
                    span_id: span_id.to_string(),
                    field,
                });
            }
            s.parse::<i64>().map_err(|_| DecodeError::InvalidTimestamp {
                span_id: span_id.to_string(),
                field,
                raw: s.clone(),
            })
        }
        Value::Number(n) => n.as_i64().ok_or_else(|| DecodeError::InvalidTimestamp {
            span_id: span_id.to_string(),
            field,
            raw: n.to_string(),
        }),
        Value::Null => Err(DecodeError::EmptyTimestamp {
            span_id: span_id.to_string(),
            field,
        }),
        other => Err(DecodeError::InvalidTimestamp {
            span_id: span_id.to_string(),
            field,
            raw: other.to_string(),
        }),
    }
}

/// Decode an OTLP status into the internal form
///
/// Code accepts both the integer mapping (0→UNSET, 1→OK, 2→ERROR,
/// other→UNKNOWN) and the canonical `STATUS_CODE_*` names.
pub fn decode_status(status: Option<&OtlpStatus>) -> SpanStatus {
    let Some(status) = status else {
        return SpanStatus::default();
    };
    let code = match &status.code {
        Value::Number(n) => n.as_i64().map(StatusCode::from_i64).unwrap_or(StatusCode::Unknown),
        Value::String(s) => StatusCode::from_name(s),
        _ => StatusCode::Unset,
    };
    SpanStatus {
        code,
        message: status.message.clone(),
    }
}

/// Unwrap an OTLP typed attribute value to its underlying scalar
///
/// Primitive scalars pass through. A single-key object shaped like an OTLP
/// `AnyValue` (`stringValue`/`intValue`/`doubleValue`/`boolValue`/
/// `bytesValue`) is unwrapped; `intValue` carries int64 as a decimal string
/// on the wire, so it is re-parsed into a number when possible. Anything
/// else is preserved as-is.
pub fn unwrap_attribute_value(value: Value) -> Value {
    let unwrapped = match &value {
        Value::Object(map) if map.len() == 1 => match map.iter().next() {
            Some((key, inner)) => match key.as_str() {
                "stringValue" | "doubleValue" | "boolValue" | "bytesValue" => Some(inner.clone()),
                "intValue" => Some(match inner {
                    Value::String(s) => s
                        .parse::<i64>()
                        .map(|n| Value::Number(n.into()))
                        .unwrap_or_else(|_| inner.clone()),
                    other => other.clone(),
                }),
                _ => None,
            },
            None => None,
        },
        _ => None,
    };
    unwrapped.unwrap_or(value)
}

/// Convert a list of OTLP key/values into an attribute map
pub fn decode_attributes(attrs: &[OtlpKeyValue]) -> HashMap<String, Value> {
    attrs
        .iter()
        .map(|kv| (kv.key.clone(), unwrap_attribute_value(kv.value.clone())))
        .collect()
}

/// Decode span events, dropping any whose timestamp fails to parse
pub fn decode_events(events: &[OtlpEvent], span_id: &str) -> Vec<SpanEvent> {
    events
        .iter()
        .filter_map(|event| {
            let timestamp = parse_unix_nano(&event.time_unix_nano, span_id, "event").ok()?;
            Some(SpanEvent {
                name: event.name.clone(),
                timestamp,
                attributes: decode_attributes(&event.attributes),
            })
        })
        .collect()
}

/// Convert a wire span to the internal model
///
/// Rejects spans without an id, with unparseable timestamps, or with an end
/// time before the start time.
pub fn decode_span(otlp: &OtlpSpan) -> Result<Span, DecodeError> {
    if otlp.span_id.is_empty() {
        return Err(DecodeError::MissingSpanId);
    }
    let start_time = parse_unix_nano(&otlp.start_time_unix_nano, &otlp.span_id, "start")?;
    let end_time = parse_unix_nano(&otlp.end_time_unix_nano, &otlp.span_id, "end")?;
    if end_time < start_time {
        return Err(DecodeError::NegativeDuration {
            span_id: otlp.span_id.clone(),
            start: start_time,
            end: end_time,
        });
    }

    Ok(Span {
        span_id: otlp.span_id.clone(),
        trace_id: otlp.trace_id.clone(),
        parent_id: otlp.parent_span_id.clone(),
        name: otlp.name.clone(),
        start_time,
        end_time,
        status: decode_status(otlp.status.as_ref()),
        attributes: decode_attributes(&otlp.attributes),
        events: decode_events(&otlp.events, &otlp.span_id),
    })
}
