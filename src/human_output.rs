//! Human-readable report rendering
//!
//! Formats an [`AlignmentReport`] (and any annotation parse errors) as
//! terminal text: one line per spec with a status glyph, indented failure
//! details, and a closing summary block. Renderers only read the report.

use crate::alignment::{AlignmentReport, AlignmentResult, AlignmentStatus, DetailType};
use crate::service_spec::ParseError;
use crate::trace_store::{SpanNode, TraceStore};
use std::fmt::Write;

/// Render the full report as terminal text
pub fn render_report(report: &AlignmentReport, parse_errors: &[ParseError]) -> String {
    let mut out = String::new();

    if !parse_errors.is_empty() {
        let _ = writeln!(out, "annotation errors ({}):", parse_errors.len());
        for error in parse_errors {
            let _ = writeln!(out, "  {error}");
        }
        let _ = writeln!(out);
    }

    for result in &report.results {
        render_result(&mut out, result);
    }
    if !report.results.is_empty() {
        let _ = writeln!(out);
    }
    render_summary(&mut out, report);
    out
}

fn status_glyph(status: AlignmentStatus) -> &'static str {
    match status {
        AlignmentStatus::Success => "✔",
        AlignmentStatus::Failed => "✘",
        AlignmentStatus::Skipped => "-",
    }
}

fn render_result(out: &mut String, result: &AlignmentResult) {
    let millis = result.elapsed_nanos as f64 / 1_000_000.0;
    let _ = writeln!(
        out,
        "{} {} {} ({} span{}, {}/{} assertions, {:.2}ms)",
        status_glyph(result.status),
        result.spec_operation_id,
        result.status,
        result.matched_span_ids.len(),
        if result.matched_span_ids.len() == 1 { "" } else { "s" },
        result.assertions.passed,
        result.assertions.total,
        millis,
    );

    for detail in &result.details {
        let failed = detail.is_mismatch();
        if !failed && result.status != AlignmentStatus::Skipped {
            continue;
        }
        let kind = match detail.detail_type {
            DetailType::Precondition => "precondition",
            DetailType::Postcondition => "postcondition",
            DetailType::Matching => "matching",
        };
        let _ = writeln!(out, "    {kind}: {}", detail.message);
        if failed {
            let _ = writeln!(out, "      expression: {}", detail.expression);
            if let Some(reason) = &detail.failure_reason {
                let _ = writeln!(out, "      reason: {reason}");
            }
            if let Some(span_context) = &detail.span_context {
                let _ = writeln!(
                    out,
                    "      span: {} ({}, status {})",
                    span_context.span_id, span_context.span_name, span_context.status
                );
            }
            for suggestion in detail.suggestions.iter().flatten() {
                let _ = writeln!(out, "      hint: {suggestion}");
            }
        }
    }
}

fn render_summary(out: &mut String, report: &AlignmentReport) {
    let summary = report.summary;
    let _ = writeln!(
        out,
        "{} spec{} aligned: {} succeeded, {} failed, {} skipped ({:.1}% success)",
        summary.total,
        if summary.total == 1 { "" } else { "s" },
        summary.success,
        summary.failed,
        summary.skipped,
        summary.success_rate * 100.0,
    );
    let _ = writeln!(
        out,
        "assertions: {} evaluated, {} passed, {} failed",
        report.assertions.total, report.assertions.passed, report.assertions.failed,
    );
    let total_millis = report.total_execution_nanos as f64 / 1_000_000.0;
    let average_millis = report.average_execution_nanos as f64 / 1_000_000.0;
    let _ = writeln!(
        out,
        "time: {total_millis:.2}ms total, {average_millis:.2}ms per spec",
    );

    if let Some(perf) = &report.performance {
        let _ = writeln!(
            out,
            "performance: {} spans matched, {} workers, {:.1} specs/s, {:.1} MiB resident",
            perf.spans_matched,
            perf.concurrent_workers,
            perf.processing_rate,
            perf.memory_usage_mb,
        );
    }
}

/// Render a parse-only run (the `parse` subcommand)
pub fn render_parse_summary(
    specs: &[crate::service_spec::ServiceSpec],
    errors: &[ParseError],
) -> String {
    let mut out = String::new();
    for spec in specs {
        let _ = writeln!(
            out,
            "{} ({}:{}) — {}",
            spec.operation_id,
            spec.source_file.display(),
            spec.line,
            spec.description,
        );
        if spec.has_preconditions() {
            let _ = writeln!(out, "    pre:  {}", crate::evaluator::canonical_json(&spec.preconditions));
        }
        if spec.has_postconditions() {
            let _ = writeln!(out, "    post: {}", crate::evaluator::canonical_json(&spec.postconditions));
        }
    }
    if !errors.is_empty() {
        let _ = writeln!(out, "errors:");
        for error in errors {
            let _ = writeln!(out, "  {error}");
        }
    }
    let _ = writeln!(
        out,
        "{} spec{}, {} error{}",
        specs.len(),
        if specs.len() == 1 { "" } else { "s" },
        errors.len(),
        if errors.len() == 1 { "" } else { "s" },
    );
    out
}

/// Render a trace as an indented span tree with timings and statuses
///
/// Spans outside the rooted tree (extra roots, orphaned subtrees) are
/// listed separately so nothing in the document goes unreported.
pub fn render_trace_summary(store: &TraceStore) -> String {
    let mut out = String::new();
    let span_count = store.span_count();
    let trace_id = store.trace_id();

    if span_count == 0 {
        let _ = writeln!(out, "empty trace: no spans");
        return out;
    }
    let _ = writeln!(
        out,
        "trace {}: {} span{}",
        if trace_id.is_empty() { "<unknown>" } else { trace_id.as_str() },
        span_count,
        if span_count == 1 { "" } else { "s" },
    );

    let mut in_tree = std::collections::HashSet::new();
    if let Some(tree) = store.span_tree() {
        render_span_node(&mut out, &tree, "", true, &mut in_tree);
    }

    let detached: Vec<_> = store
        .all_spans()
        .into_iter()
        .filter(|span| !in_tree.contains(&span.span_id))
        .collect();
    if !detached.is_empty() {
        let _ = writeln!(out, "detached spans ({}):", detached.len());
        for span in &detached {
            let _ = writeln!(
                out,
                "  {} ({}, {:.2}ms, {})",
                span.name,
                span.span_id,
                span.duration() as f64 / 1_000_000.0,
                span.status.code,
            );
        }
    }

    let errors = store
        .all_spans()
        .iter()
        .filter(|span| span.has_error())
        .count();
    if errors > 0 {
        let _ = writeln!(
            out,
            "{errors} span{} with ERROR status",
            if errors == 1 { "" } else { "s" }
        );
    }
    out
}

fn render_span_node(
    out: &mut String,
    node: &SpanNode,
    prefix: &str,
    is_last: bool,
    seen: &mut std::collections::HashSet<String>,
) {
    seen.insert(node.span.span_id.clone());
    let connector = if prefix.is_empty() {
        ""
    } else if is_last {
        "└─ "
    } else {
        "├─ "
    };
    let status_note = if node.span.has_error() {
        if node.span.status.message.is_empty() {
            ", ERROR".to_string()
        } else {
            format!(", ERROR: {}", node.span.status.message)
        }
    } else {
        format!(", {}", node.span.status.code)
    };
    let _ = writeln!(
        out,
        "{prefix}{connector}{} ({:.2}ms{status_note})",
        node.span.name,
        node.span.duration() as f64 / 1_000_000.0,
    );

    let child_prefix = if prefix.is_empty() {
        "   ".to_string()
    } else if is_last {
        format!("{prefix}   ")
    } else {
        format!("{prefix}│  ")
    };
    let last_index = node.children.len().saturating_sub(1);
    for (index, child) in node.children.iter().enumerate() {
        render_span_node(out, child, &child_prefix, index == last_index, seen);
    }
}
