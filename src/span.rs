//! Shared span model
//!
//! A [`Span`] is the unit of work extracted from an OTLP trace document.
//! Attribute values stay as `serde_json::Value` so the evaluator and the
//! failure diagnostics can inspect runtime type tags without committing to
//! a fixed schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Span attribute key that carries the operation identifier
pub const OPERATION_ID_ATTR: &str = "operation.id";

/// Span status code, collapsed from the OTLP wire representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusCode {
    Unset,
    Ok,
    Error,
    Unknown,
}

impl StatusCode {
    /// Map the OTLP integer code: 0→UNSET, 1→OK, 2→ERROR, other→UNKNOWN
    pub fn from_i64(code: i64) -> Self {
        match code {
            0 => StatusCode::Unset,
            1 => StatusCode::Ok,
            2 => StatusCode::Error,
            _ => StatusCode::Unknown,
        }
    }

    /// Map the canonical OTLP enum name (`STATUS_CODE_*`)
    ///
    /// Unrecognized names coerce to [`StatusCode::Unset`], matching the
    /// proto3 "unspecified" convention.
    pub fn from_name(name: &str) -> Self {
        match name {
            "STATUS_CODE_UNSET" => StatusCode::Unset,
            "STATUS_CODE_OK" => StatusCode::Ok,
            "STATUS_CODE_ERROR" => StatusCode::Error,
            _ => StatusCode::Unset,
        }
    }

    /// Canonical string form used in evaluation contexts and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Unset => "UNSET",
            StatusCode::Ok => "OK",
            StatusCode::Error => "ERROR",
            StatusCode::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Unset
    }
}

/// Span status: code plus optional human message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SpanStatus {
    pub code: StatusCode,
    #[serde(default)]
    pub message: String,
}

/// A timestamped event attached to a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    /// Nanoseconds since epoch
    pub timestamp: i64,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

/// A unit of work in a trace
///
/// Invariants: `end_time >= start_time`; `span_id` unique within a trace.
/// An empty `parent_id` marks a root span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub span_id: String,
    pub trace_id: String,
    #[serde(default)]
    pub parent_id: String,
    pub name: String,
    /// Nanoseconds since epoch
    pub start_time: i64,
    /// Nanoseconds since epoch
    pub end_time: i64,
    #[serde(default)]
    pub status: SpanStatus,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
    #[serde(default)]
    pub events: Vec<SpanEvent>,
}

impl Span {
    /// Wall-clock duration in nanoseconds
    pub fn duration(&self) -> i64 {
        self.end_time - self.start_time
    }

    /// A span with no parent is a root span
    pub fn is_root(&self) -> bool {
        self.parent_id.is_empty()
    }

    /// True when the span finished with an ERROR status
    pub fn has_error(&self) -> bool {
        self.status.code == StatusCode::Error
    }

    /// Look up an attribute by its exact key
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// The `operation.id` attribute, when present as a string
    pub fn operation_id(&self) -> Option<&str> {
        self.attributes.get(OPERATION_ID_ATTR).and_then(Value::as_str)
    }
}
