//! Source-embedded service contracts
//!
//! A [`ServiceSpec`] is a behavioral contract extracted from a `@ServiceSpec`
//! comment annotation: an operation identifier, a description, and optional
//! precondition/postcondition logic trees. Specs are created by the
//! annotation parser and immutable thereafter.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// A single behavioral contract tied to a named operation
///
/// Invariants: `operation_id` and `description` are non-empty;
/// `line` is 1-based (≥ 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Unique-within-run operation identifier
    pub operation_id: String,
    /// Human-readable description of the operation
    pub description: String,
    /// Logic expression tree expected to hold on span entry (empty = none)
    #[serde(default)]
    pub preconditions: Value,
    /// Logic expression tree expected to hold on span completion (empty = none)
    #[serde(default)]
    pub postconditions: Value,
    /// Source file the annotation was found in
    pub source_file: PathBuf,
    /// 1-based line of the `@ServiceSpec` marker
    pub line: usize,
}

impl ServiceSpec {
    /// True when a non-trivial precondition tree is present
    pub fn has_preconditions(&self) -> bool {
        !is_trivial(&self.preconditions)
    }

    /// True when a non-trivial postcondition tree is present
    pub fn has_postconditions(&self) -> bool {
        !is_trivial(&self.postconditions)
    }
}

/// Null and `{}` both count as "no assertion"
fn is_trivial(expr: &Value) -> bool {
    match expr {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// A single annotation or file-level parse failure
///
/// `line` is the 1-based line of the offending `@ServiceSpec` marker, or 0
/// for a file-level failure (unreadable file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseError {
    pub file: PathBuf,
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.file.display(), self.line, self.message)
    }
}

/// Aggregated output of an annotation-parsing run
///
/// Specs and errors are collected independently; a broken annotation never
/// suppresses valid ones from the same file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub specs: Vec<ServiceSpec>,
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold another result into this one, preserving arrival order
    pub fn merge(&mut self, other: ParseResult) {
        self.specs.extend(other.specs);
        self.errors.extend(other.errors);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(op: &str) -> ServiceSpec {
        ServiceSpec {
            operation_id: op.to_string(),
            description: format!("{op} operation"),
            preconditions: Value::Null,
            postconditions: Value::Null,
            source_file: PathBuf::from("src/orders.java"),
            line: 12,
        }
    }

    #[test]
    fn test_empty_assertions_are_trivial() {
        let mut s = spec("createOrder");
        assert!(!s.has_preconditions());
        assert!(!s.has_postconditions());

        s.preconditions = json!({});
        assert!(!s.has_preconditions());

        s.preconditions = json!({"==": [1, 1]});
        assert!(s.has_preconditions());
    }

    #[test]
    fn test_merge_preserves_order() {
        let mut a = ParseResult::new();
        a.specs.push(spec("one"));
        let mut b = ParseResult::new();
        b.specs.push(spec("two"));
        b.errors.push(ParseError {
            file: PathBuf::from("bad.go"),
            line: 3,
            message: "boom".to_string(),
        });

        a.merge(b);
        assert_eq!(a.specs.len(), 2);
        assert_eq!(a.specs[0].operation_id, "one");
        assert_eq!(a.specs[1].operation_id, "two");
        assert!(a.has_errors());
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError {
            file: PathBuf::from("src/users.ts"),
            line: 40,
            message: "missing operationId".to_string(),
        };
        assert_eq!(err.to_string(), "src/users.ts:40: missing operationId");
    }
}
