//! JSON output format for alignment reports
//!
//! Stable machine-readable rendering of an [`AlignmentReport`] plus any
//! annotation parse errors, under a versioned `format` marker.

use crate::alignment::AlignmentReport;
use crate::service_spec::ParseError;
use serde::Serialize;

/// Format marker emitted in every document
pub const REPORT_FORMAT: &str = "tracealign-report-v1";

/// Top-level JSON document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonReport<'a> {
    /// Tool version that produced the document
    pub version: &'a str,
    /// Document format marker
    pub format: &'a str,
    /// Annotation parse errors, in arrival order
    pub parse_errors: &'a [ParseError],
    /// The full alignment report
    #[serde(flatten)]
    pub report: &'a AlignmentReport,
}

/// Render the report document as pretty-printed JSON
pub fn render_report(
    report: &AlignmentReport,
    parse_errors: &[ParseError],
) -> serde_json::Result<String> {
    let document = JsonReport {
        version: env!("CARGO_PKG_VERSION"),
        format: REPORT_FORMAT,
        parse_errors,
        report,
    };
    serde_json::to_string_pretty(&document)
}

/// Render a parse-only run as JSON
pub fn render_parse_result(
    result: &crate::service_spec::ParseResult,
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "format": REPORT_FORMAT,
        "specs": result.specs,
        "errors": result.errors,
    }))
}

/// Render an ingested trace as JSON (the `trace` subcommand)
pub fn render_trace(store: &crate::trace_store::TraceStore) -> serde_json::Result<String> {
    let spans = store.all_spans();
    serde_json::to_string_pretty(&serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "format": REPORT_FORMAT,
        "traceId": store.trace_id(),
        "spanCount": store.span_count(),
        "rootSpanId": store.root_span().map(|root| root.span_id.clone()),
        "spans": spans.iter().map(|span| span.as_ref()).collect::<Vec<_>>(),
    }))
}
