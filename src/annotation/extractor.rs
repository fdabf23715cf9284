//! `@ServiceSpec` annotation extraction
//!
//! The extractor walks a source file line by line, groups recognized
//! comment constructs into logical blocks (a `/* ... */` region or a run
//! of consecutive `// ...` lines), strips delimiters and per-line prefixes
//! while preserving inner indentation, and parses everything after each
//! `@ServiceSpec` marker as YAML (with a JSON retry) into a
//! [`ServiceSpec`].
//!
//! A malformed annotation yields a [`ParseError`] anchored at the marker
//! line and extraction continues with the next annotation in the file.

use crate::annotation::languages::LanguageAdapter;
use crate::service_spec::{ParseError, ParseResult, ServiceSpec};
use serde_json::Value;
use std::path::Path;

/// Marker token that opens an annotation inside a comment block
pub const MARKER: &str = "@ServiceSpec";

/// One comment-block line: 1-based source line plus prefix-stripped text
#[derive(Debug, Clone)]
struct BlockLine {
    line_no: usize,
    text: String,
}

/// A logical comment region after delimiter stripping
#[derive(Debug, Clone, Default)]
struct CommentBlock {
    lines: Vec<BlockLine>,
}

/// Extract every annotation from one source file's contents
pub fn extract_from_source(
    path: &Path,
    source: &str,
    adapter: &LanguageAdapter,
) -> ParseResult {
    let mut result = ParseResult::new();
    for block in collect_comment_blocks(source, adapter) {
        parse_block(path, &block, &mut result);
    }
    result
}

/// Group comment constructs into logical blocks
///
/// Block comments span from `/*` (or `/**`) to `*/`; consecutive
/// whole-line `//` comments form one block. Code lines interrupt a `//`
/// run.
fn collect_comment_blocks(source: &str, adapter: &LanguageAdapter) -> Vec<CommentBlock> {
    let mut blocks = Vec::new();
    let mut block = CommentBlock::default();
    let mut in_block_comment = false;
    let mut line_run = CommentBlock::default();

    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;

        if in_block_comment {
            if let Some(end) = raw.find("*/") {
                push_block_line(&mut block, line_no, &raw[..end]);
                blocks.push(std::mem::take(&mut block));
                in_block_comment = false;
            } else {
                push_block_line(&mut block, line_no, raw);
            }
            continue;
        }

        let trimmed = raw.trim_start();
        if adapter.line_comments && trimmed.starts_with("//") {
            line_run.lines.push(BlockLine {
                line_no,
                text: strip_line_comment(trimmed).to_string(),
            });
            continue;
        }
        if !line_run.lines.is_empty() {
            blocks.push(std::mem::take(&mut line_run));
        }

        if !adapter.block_comments {
            continue;
        }
        if let Some(start) = raw.find("/*") {
            // `/**` and `/*` open the same construct
            let after = &raw[start + 2..];
            let after = after.strip_prefix('*').unwrap_or(after);
            if let Some(end) = after.find("*/") {
                blocks.push(CommentBlock {
                    lines: vec![BlockLine {
                        line_no,
                        text: after[..end].trim().to_string(),
                    }],
                });
            } else {
                in_block_comment = true;
                let opener = after.trim();
                if !opener.is_empty() {
                    block.lines.push(BlockLine {
                        line_no,
                        text: opener.to_string(),
                    });
                }
            }
        }
    }

    // Flush a trailing `//` run or an unterminated block comment
    if !line_run.lines.is_empty() {
        blocks.push(line_run);
    }
    if !block.lines.is_empty() {
        blocks.push(block);
    }
    blocks
}

/// Strip the decorative `* ` prefix used inside `/** ... */` bodies
///
/// Lines without the star keep their original indentation; the payload
/// dedent pass normalizes them later.
fn push_block_line(block: &mut CommentBlock, line_no: usize, raw: &str) {
    let trimmed = raw.trim_start();
    let text = match trimmed.strip_prefix('*') {
        Some(rest) if !rest.starts_with('/') => rest.strip_prefix(' ').unwrap_or(rest),
        _ => raw,
    };
    block.lines.push(BlockLine {
        line_no,
        text: text.to_string(),
    });
}

/// Strip `//` plus at most one following space
fn strip_line_comment(trimmed: &str) -> &str {
    let rest = trimmed.strip_prefix("//").unwrap_or(trimmed);
    rest.strip_prefix(' ').unwrap_or(rest)
}

/// Parse every annotation found inside one comment block
fn parse_block(path: &Path, block: &CommentBlock, result: &mut ParseResult) {
    let marker_positions: Vec<usize> = block
        .lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.text.contains(MARKER))
        .map(|(idx, _)| idx)
        .collect();

    for (which, &start) in marker_positions.iter().enumerate() {
        let end = marker_positions
            .get(which + 1)
            .copied()
            .unwrap_or(block.lines.len());
        let marker_line = block.lines[start].line_no;

        let mut payload_lines: Vec<&str> = Vec::new();
        if let Some(tail) = block.lines[start].text.split_once(MARKER) {
            if !tail.1.trim().is_empty() {
                payload_lines.push(tail.1);
            }
        }
        payload_lines.extend(block.lines[start + 1..end].iter().map(|l| l.text.as_str()));

        let payload = dedent(&payload_lines);
        match parse_payload(&payload) {
            Ok(value) => match validate_spec(value, path, marker_line) {
                Ok(spec) => result.specs.push(spec),
                Err(error) => result.errors.push(error),
            },
            Err(message) => result.errors.push(ParseError {
                file: path.to_path_buf(),
                line: marker_line,
                message,
            }),
        }
    }
}

/// Remove the common leading whitespace so nested YAML stays well-formed
fn dedent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|line| {
            if line.len() >= indent {
                &line[indent..]
            } else {
                line.trim_start_matches([' ', '\t'])
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// YAML first, JSON retry
fn parse_payload(payload: &str) -> Result<Value, String> {
    match serde_yaml::from_str::<Value>(payload) {
        Ok(value) => Ok(value),
        Err(yaml_error) => serde_json::from_str::<Value>(payload)
            .map_err(|_| format!("annotation payload is not valid YAML or JSON: {yaml_error}")),
    }
}

/// Enforce the annotation schema
///
/// `operationId` and `description` are required non-empty strings;
/// `preconditions`/`postconditions` are optional objects. Unknown keys are
/// ignored.
fn validate_spec(value: Value, path: &Path, marker_line: usize) -> Result<ServiceSpec, ParseError> {
    let error = |message: String| ParseError {
        file: path.to_path_buf(),
        line: marker_line,
        message,
    };

    let Value::Object(mut map) = value else {
        return Err(error("annotation payload must be a mapping".to_string()));
    };

    let operation_id = match map.get("operationId") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::String(_)) => {
            return Err(error("field operationId must be a non-empty string".to_string()))
        }
        Some(_) => return Err(error("field operationId must be a string".to_string())),
        None => return Err(error("missing required field operationId".to_string())),
    };
    let description = match map.get("description") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::String(_)) => {
            return Err(error("field description must be a non-empty string".to_string()))
        }
        Some(_) => return Err(error("field description must be a string".to_string())),
        None => return Err(error("missing required field description".to_string())),
    };

    let preconditions = take_condition(&mut map, "preconditions").map_err(&error)?;
    let postconditions = take_condition(&mut map, "postconditions").map_err(&error)?;

    Ok(ServiceSpec {
        operation_id,
        description,
        preconditions,
        postconditions,
        source_file: path.to_path_buf(),
        line: marker_line,
    })
}

fn take_condition(
    map: &mut serde_json::Map<String, Value>,
    field: &str,
) -> Result<Value, String> {
    match map.remove(field) {
        None | Some(Value::Null) => Ok(Value::Null),
        Some(value @ Value::Object(_)) => Ok(value),
        Some(_) => Err(format!("field {field} must be an object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::languages::{GO, JAVA, TYPESCRIPT};
    use std::path::PathBuf;

    fn java_path() -> PathBuf {
        PathBuf::from("src/OrderService.java")
    }

    #[test]
    fn test_javadoc_annotation() {
        let source = r#"
package com.example;

/**
 * @ServiceSpec
 * operationId: "createOrder"
 * description: "Creates an order"
 * preconditions:
 *   "request.body.userId":
 *     "!=": null
 * postconditions:
 *   "span.status.code":
 *     "==": "OK"
 */
public Order createOrder(Request request) {}
"#;
        let result = extract_from_source(&java_path(), source, &JAVA);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.specs.len(), 1);

        let spec = &result.specs[0];
        assert_eq!(spec.operation_id, "createOrder");
        assert_eq!(spec.description, "Creates an order");
        assert_eq!(spec.line, 5);
        assert!(spec.has_preconditions());
        assert_eq!(
            spec.preconditions["request.body.userId"]["!="],
            Value::Null
        );
        assert_eq!(spec.postconditions["span.status.code"]["=="], "OK");
    }

    #[test]
    fn test_go_line_comment_annotation() {
        let source = r#"
package orders

// @ServiceSpec
// operationId: "deleteOrder"
// description: "Deletes an order"
func DeleteOrder() {}
"#;
        let result = extract_from_source(&PathBuf::from("orders.go"), source, &GO);
        assert!(result.errors.is_empty());
        assert_eq!(result.specs.len(), 1);
        assert_eq!(result.specs[0].operation_id, "deleteOrder");
        assert_eq!(result.specs[0].line, 4);
    }

    #[test]
    fn test_plain_block_comment_without_stars() {
        let source = r#"
/*
@ServiceSpec
operationId: "listOrders"
description: "Lists orders"
*/
func ListOrders() {}
"#;
        let result = extract_from_source(&PathBuf::from("list.go"), source, &GO);
        assert!(result.errors.is_empty());
        assert_eq!(result.specs.len(), 1);
        assert_eq!(result.specs[0].operation_id, "listOrders");
    }

    #[test]
    fn test_inline_json_payload_after_marker() {
        let source = "/* @ServiceSpec {\"operationId\": \"ping\", \"description\": \"health\"} */";
        let result = extract_from_source(&java_path(), source, &JAVA);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.specs.len(), 1);
        assert_eq!(result.specs[0].operation_id, "ping");
        assert_eq!(result.specs[0].line, 1);
    }

    #[test]
    fn test_marker_outside_comment_is_ignored() {
        let source = r#"
String marker = "@ServiceSpec";
"#;
        let result = extract_from_source(&java_path(), source, &JAVA);
        assert!(result.specs.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_java_ignores_line_comments() {
        let source = r#"
// @ServiceSpec
// operationId: "notPickedUp"
// description: "java has no line-comment annotations"
"#;
        let result = extract_from_source(&java_path(), source, &JAVA);
        assert!(result.specs.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_broken_and_valid_in_same_file() {
        let source = r#"
/**
 * @ServiceSpec
 * operationId: "good"
 * description: "well-formed"
 */

/**
 * @ServiceSpec
 * operationId: [this is not
 * a string
 */
"#;
        let result = extract_from_source(&java_path(), source, &JAVA);
        assert_eq!(result.specs.len(), 1);
        assert_eq!(result.specs[0].operation_id, "good");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, 9);
    }

    #[test]
    fn test_missing_operation_id() {
        let source = r#"
/**
 * @ServiceSpec
 * description: "no id"
 */
"#;
        let result = extract_from_source(&java_path(), source, &JAVA);
        assert!(result.specs.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("operationId"));
    }

    #[test]
    fn test_empty_description_rejected() {
        let source = r#"
/**
 * @ServiceSpec
 * operationId: "op"
 * description: ""
 */
"#;
        let result = extract_from_source(&java_path(), source, &JAVA);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("description"));
    }

    #[test]
    fn test_non_object_preconditions_rejected() {
        let source = r#"
/**
 * @ServiceSpec
 * operationId: "op"
 * description: "desc"
 * preconditions: true
 */
"#;
        let result = extract_from_source(&java_path(), source, &JAVA);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("preconditions"));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let source = r#"
/**
 * @ServiceSpec
 * operationId: "op"
 * description: "desc"
 * owner: "team-payments"
 * sla: 99.9
 */
"#;
        let result = extract_from_source(&java_path(), source, &JAVA);
        assert!(result.errors.is_empty());
        assert_eq!(result.specs.len(), 1);
    }

    #[test]
    fn test_multiple_annotations_in_one_block() {
        let source = r#"
/**
 * @ServiceSpec
 * operationId: "first"
 * description: "one"
 * @ServiceSpec
 * operationId: "second"
 * description: "two"
 */
"#;
        let result = extract_from_source(&java_path(), source, &JAVA);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.specs.len(), 2);
        assert_eq!(result.specs[0].operation_id, "first");
        assert_eq!(result.specs[1].operation_id, "second");
        assert_eq!(result.specs[0].line, 3);
        assert_eq!(result.specs[1].line, 6);
    }

    #[test]
    fn test_typescript_mixed_comment_styles() {
        let source = r#"
/** @ServiceSpec
 * operationId: "fromBlock"
 * description: "block style"
 */

// @ServiceSpec
// operationId: "fromLines"
// description: "line style"
export function handler() {}
"#;
        let result = extract_from_source(&PathBuf::from("api.ts"), source, &TYPESCRIPT);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let ids: Vec<&str> = result.specs.iter().map(|s| s.operation_id.as_str()).collect();
        assert_eq!(ids, vec!["fromBlock", "fromLines"]);
    }

    #[test]
    fn test_code_interrupts_line_comment_run() {
        let source = r#"
// @ServiceSpec
// operationId: "op"
let x = 1;
// description: "detached"
"#;
        let result = extract_from_source(&PathBuf::from("api.ts"), source, &TYPESCRIPT);
        // The run is split by the code line, so the payload lacks description
        assert!(result.specs.is_empty());
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_nested_yaml_indentation_preserved() {
        let source = r#"
/**
 * @ServiceSpec
 * operationId: "createUser"
 * description: "nested conditions"
 * preconditions:
 *   and:
 *     - "==": [{"var": "http.method"}, "POST"]
 *     - ">=": [{"var": "http.status"}, 200]
 */
"#;
        let result = extract_from_source(&java_path(), source, &JAVA);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let pre = &result.specs[0].preconditions;
        assert!(pre["and"].is_array());
        assert_eq!(pre["and"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_dedent_keeps_relative_indentation() {
        let lines = vec!["  a:", "    b: 1", "", "    c: 2"];
        assert_eq!(dedent(&lines), "a:\n  b: 1\n\n  c: 2");
    }

    #[test]
    fn test_line_numbers_are_one_based() {
        let source = "/** @ServiceSpec\n * operationId: \"op\"\n * description: \"d\"\n */";
        let result = extract_from_source(&java_path(), source, &JAVA);
        assert_eq!(result.specs[0].line, 1);
    }
}
