//! Failure diagnostics
//!
//! When an assertion fails, the engine attaches an analysis of expected
//! versus actual (runtime type tags, null-ness, numeric deltas, string
//! differences, unresolved variables) plus remediation suggestions keyed
//! to the kind of mismatch and to whether the detail is a precondition or
//! a postcondition.

use crate::alignment::report::DetailType;
use crate::evaluator::logic::variables_referenced;
use crate::evaluator::EvaluationContext;
use crate::span::Span;
use serde_json::{json, Map, Value};

/// Runtime type tag of a JSON value
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Human-readable explanation of why expected and actual diverge
pub fn analyze_failure(
    expected: &Value,
    actual: &Value,
    expression: &Value,
    context: &EvaluationContext,
) -> String {
    let mut notes: Vec<String> = Vec::new();

    match (expected.is_null(), actual.is_null()) {
        (false, true) => notes.push("actual value is null but a value was expected".to_string()),
        (true, false) => notes.push(format!(
            "expected null but got {} value {}",
            type_name(actual),
            compact(actual)
        )),
        _ => {}
    }

    if !expected.is_null() && !actual.is_null() && type_name(expected) != type_name(actual) {
        notes.push(format!(
            "type mismatch: expected {}, got {}",
            type_name(expected),
            type_name(actual)
        ));
    }

    if let (Some(expected_n), Some(actual_n)) = (expected.as_f64(), actual.as_f64()) {
        let delta = actual_n - expected_n;
        if delta > 0.0 {
            notes.push(format!("actual is {delta} greater than expected"));
        } else if delta < 0.0 {
            notes.push(format!("actual is {} less than expected", -delta));
        }
    }

    if let (Value::String(expected_s), Value::String(actual_s)) = (expected, actual) {
        if expected_s.len() != actual_s.len() {
            notes.push(format!(
                "string length mismatch: expected {}, actual {}",
                expected_s.len(),
                actual_s.len()
            ));
        }
        if let Some(index) = first_difference(expected_s, actual_s) {
            notes.push(format!("strings first differ at character {index}"));
        }
    }

    for issue in variable_issues(expression, context) {
        notes.push(issue);
    }

    if notes.is_empty() {
        notes.push(format!(
            "expected {} but got {}",
            compact(expected),
            compact(actual)
        ));
    }
    notes.join("; ")
}

/// Missing-or-null diagnostics for every variable the expression reads
pub fn variable_issues(expression: &Value, context: &EvaluationContext) -> Vec<String> {
    let mut paths = Vec::new();
    variables_referenced(expression, &mut paths);
    paths.sort();
    paths.dedup();

    let mut issues = Vec::new();
    for path in paths {
        match context.resolve(&path) {
            None => issues.push(format!(
                "variable {path:?} is not present in the evaluation context"
            )),
            Some(Value::Null) => issues.push(format!("variable {path:?} resolves to null")),
            Some(_) => {}
        }
    }
    issues
}

/// Remediation hints for a failed detail
pub fn build_suggestions(
    expected: &Value,
    actual: &Value,
    span: &Span,
    detail_type: DetailType,
) -> Vec<String> {
    let mut suggestions = Vec::new();

    if actual.is_null() {
        suggestions.push(
            "check that the attribute exists on the matched span; a missing variable resolves to null"
                .to_string(),
        );
    } else if !expected.is_null() && type_name(expected) != type_name(actual) {
        suggestions.push(format!(
            "convert the compared values to a common type (expected {}, got {})",
            type_name(expected),
            type_name(actual)
        ));
    }

    if let (Value::String(expected_s), Value::String(actual_s)) = (expected, actual) {
        if expected_s.eq_ignore_ascii_case(actual_s) {
            suggestions.push("values differ only by letter case".to_string());
        } else if expected_s.trim() == actual_s.trim() {
            suggestions
                .push("values differ only in leading or trailing whitespace".to_string());
        } else if expected_s.len() == actual_s.len() {
            suggestions.push(
                "strings have equal length but different characters; check encoding or invisible characters"
                    .to_string(),
            );
        }
    }

    if span.has_error() {
        let note = if span.status.message.is_empty() {
            "the matched span finished with ERROR status; the operation likely failed upstream"
                .to_string()
        } else {
            format!(
                "the matched span finished with ERROR status ({}); the operation likely failed upstream",
                span.status.message
            )
        };
        suggestions.push(note);
    }

    match detail_type {
        DetailType::Precondition => suggestions.push(
            "verify the caller establishes this input before invoking the operation".to_string(),
        ),
        DetailType::Postcondition => suggestions.push(
            "verify the operation guarantees this outcome on completion".to_string(),
        ),
        DetailType::Matching => {}
    }
    suggestions
}

/// Values of every referenced variable plus a span summary
pub fn context_snapshot(expression: &Value, context: &EvaluationContext, span: &Span) -> Value {
    let mut paths = Vec::new();
    variables_referenced(expression, &mut paths);
    paths.sort();
    paths.dedup();

    let mut variables = Map::new();
    for path in paths {
        let value = context.resolve(&path).cloned().unwrap_or(Value::Null);
        variables.insert(path, value);
    }

    json!({
        "variables": variables,
        "span": {
            "id": span.span_id,
            "name": span.name,
            "status": span.status.code.as_str(),
        },
    })
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

/// Byte index of the first differing character
fn first_difference(a: &str, b: &str) -> Option<usize> {
    if a == b {
        return None;
    }
    let index = a
        .chars()
        .zip(b.chars())
        .position(|(x, y)| x != y)
        .unwrap_or_else(|| a.chars().count().min(b.chars().count()));
    Some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{SpanStatus, StatusCode};
    use crate::trace_store::{TraceData, TraceStore};
    use std::collections::HashMap;

    fn span(status: StatusCode) -> Span {
        let mut attributes = HashMap::new();
        attributes.insert("http.method".to_string(), json!("DELETE"));
        Span {
            span_id: "s1".to_string(),
            trace_id: "t1".to_string(),
            parent_id: String::new(),
            name: "deleteUser".to_string(),
            start_time: 0,
            end_time: 10,
            status: SpanStatus {
                code: status,
                message: "boom".to_string(),
            },
            attributes,
            events: vec![],
        }
    }

    fn context() -> EvaluationContext {
        let s = span(StatusCode::Ok);
        let store = TraceStore::with_data(TraceData::from_spans(vec![s.clone()]).unwrap());
        EvaluationContext::for_span(&s, &store)
    }

    #[test]
    fn test_type_names() {
        assert_eq!(type_name(&Value::Null), "null");
        assert_eq!(type_name(&json!(true)), "boolean");
        assert_eq!(type_name(&json!(1)), "number");
        assert_eq!(type_name(&json!("s")), "string");
        assert_eq!(type_name(&json!([])), "array");
        assert_eq!(type_name(&json!({})), "object");
    }

    #[test]
    fn test_type_mismatch_note() {
        let reason = analyze_failure(&json!("200"), &json!(200), &Value::Null, &context());
        assert!(reason.contains("type mismatch: expected string, got number"));
    }

    #[test]
    fn test_null_note() {
        let reason = analyze_failure(&json!("x"), &Value::Null, &Value::Null, &context());
        assert!(reason.contains("null"));
    }

    #[test]
    fn test_numeric_delta() {
        let reason = analyze_failure(&json!(200), &json!(503), &Value::Null, &context());
        assert!(reason.contains("303 greater than expected"));

        let reason = analyze_failure(&json!(200), &json!(100), &Value::Null, &context());
        assert!(reason.contains("100 less than expected"));
    }

    #[test]
    fn test_string_differences() {
        let reason = analyze_failure(&json!("OK"), &json!("ERROR"), &Value::Null, &context());
        assert!(reason.contains("string length mismatch: expected 2, actual 5"));
        assert!(reason.contains("first differ at character 0"));

        let reason = analyze_failure(&json!("POST"), &json!("POSt"), &Value::Null, &context());
        assert!(reason.contains("first differ at character 3"));
    }

    #[test]
    fn test_variable_issues() {
        let expr = json!({"==": [{"var": "no.such.var"}, 1]});
        let reason = analyze_failure(&json!(1), &Value::Null, &expr, &context());
        assert!(reason.contains("no.such.var"));
        assert!(reason.contains("not present"));
    }

    #[test]
    fn test_suggestions_for_null_actual() {
        let hints = build_suggestions(
            &json!("x"),
            &Value::Null,
            &span(StatusCode::Ok),
            DetailType::Precondition,
        );
        assert!(hints.iter().any(|h| h.contains("missing variable")));
        assert!(hints.iter().any(|h| h.contains("caller establishes")));
    }

    #[test]
    fn test_suggestions_for_error_span() {
        let hints = build_suggestions(
            &json!("OK"),
            &json!("ERROR"),
            &span(StatusCode::Error),
            DetailType::Postcondition,
        );
        assert!(hints.iter().any(|h| h.contains("ERROR status (boom)")));
        assert!(hints.iter().any(|h| h.contains("operation guarantees")));
    }

    #[test]
    fn test_case_hint() {
        let hints = build_suggestions(
            &json!("post"),
            &json!("POST"),
            &span(StatusCode::Ok),
            DetailType::Precondition,
        );
        assert!(hints.iter().any(|h| h.contains("letter case")));
    }

    #[test]
    fn test_whitespace_hint() {
        let hints = build_suggestions(
            &json!("POST"),
            &json!("POST "),
            &span(StatusCode::Ok),
            DetailType::Precondition,
        );
        assert!(hints.iter().any(|h| h.contains("whitespace")));
    }

    #[test]
    fn test_type_conversion_hint() {
        let hints = build_suggestions(
            &json!("201"),
            &json!(201),
            &span(StatusCode::Ok),
            DetailType::Postcondition,
        );
        assert!(hints.iter().any(|h| h.contains("common type")));
    }

    #[test]
    fn test_context_snapshot() {
        let expr = json!({"==": [{"var": "http.method"}, "DELETE"]});
        let snapshot = context_snapshot(&expr, &context(), &span(StatusCode::Ok));
        assert_eq!(snapshot["variables"]["http.method"], json!("DELETE"));
        assert_eq!(snapshot["span"]["id"], json!("s1"));
        assert_eq!(snapshot["span"]["status"], json!("OK"));
    }
}
