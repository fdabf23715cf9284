//! Annotation parser integration tests
//!
//! Scan real temp directories: mixed languages, broken annotations next
//! to valid ones, and the directory skip policy.

use std::fs;
use std::path::Path;
use tracealign::annotation::{AnnotationParser, ParserOptions};

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

#[test]
fn one_broken_annotation_does_not_suppress_the_valid_one() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "src/Orders.java",
        r#"
/**
 * @ServiceSpec
 * operationId: "goodOp"
 * description: "well formed"
 */
class A {}

/**
 * @ServiceSpec
 * operationId: [unterminated
 */
class B {}
"#,
    );
    write(
        dir.path(),
        "src/Users.java",
        r#"
/**
 * @ServiceSpec
 * operationId: "otherFileOp"
 * description: "unaffected by the broken neighbor"
 */
"#,
    );

    let result = AnnotationParser::new().parse_directory(dir.path()).unwrap();

    let mut ids: Vec<&str> = result.specs.iter().map(|s| s.operation_id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["goodOp", "otherFileOp"]);

    assert_eq!(result.errors.len(), 1);
    let error = &result.errors[0];
    assert!(error.file.ends_with("src/Orders.java"));
    assert_eq!(error.line, 10);
}

#[test]
fn walk_policy_skips_excluded_hidden_and_oversized() {
    let dir = tempfile::tempdir().unwrap();
    let annotated = r#"
// @ServiceSpec
// operationId: "visibleOp"
// description: "should be found"
"#;
    write(dir.path(), "pkg/handler.go", annotated);
    write(dir.path(), "vendor/dep/dep.go", annotated);
    write(dir.path(), "node_modules/mod/index.ts", annotated);
    write(dir.path(), ".hidden/h.go", annotated);
    write(dir.path(), "notes/readme.txt", annotated);

    let result = AnnotationParser::new().parse_directory(dir.path()).unwrap();
    assert_eq!(result.specs.len(), 1);
    assert_eq!(result.specs[0].operation_id, "visibleOp");
}

#[test]
fn specs_within_a_file_keep_file_order() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "seq.ts",
        r#"
// @ServiceSpec
// operationId: "first"
// description: "a"
export function first() {}

// @ServiceSpec
// operationId: "second"
// description: "b"
export function second() {}

// @ServiceSpec
// operationId: "third"
// description: "c"
export function third() {}
"#,
    );

    let result = AnnotationParser::new().parse_directory(dir.path()).unwrap();
    let ids: Vec<&str> = result.specs.iter().map(|s| s.operation_id.as_str()).collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
    assert!(result.specs[0].line < result.specs[1].line);
    assert!(result.specs[1].line < result.specs[2].line);
}

#[test]
fn cache_skips_unchanged_files_and_revalidates_on_touch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svc.go");
    fs::write(
        &path,
        "// @ServiceSpec\n// operationId: \"op1\"\n// description: \"v1\"\n",
    )
    .unwrap();

    let parser = AnnotationParser::new();
    parser.parse_directory(dir.path()).unwrap();
    parser.parse_directory(dir.path()).unwrap();
    assert_eq!(parser.metrics().cache_hits, 1);

    // Rewrite with a different mtime; the entry must be revalidated
    fs::write(
        &path,
        "// @ServiceSpec\n// operationId: \"op2\"\n// description: \"v2\"\n",
    )
    .unwrap();
    let new_mtime = std::time::SystemTime::now() + std::time::Duration::from_secs(2);
    let file = fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(new_mtime).unwrap();

    let result = parser.parse_directory(dir.path()).unwrap();
    assert_eq!(result.specs[0].operation_id, "op2");
}

#[test]
fn metrics_report_throughput() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..10 {
        write(
            dir.path(),
            &format!("f{i}.go"),
            &format!("// @ServiceSpec\n// operationId: \"op{i}\"\n// description: \"d\"\n"),
        );
    }

    let parser = AnnotationParser::with_options(ParserOptions {
        max_workers: 2,
        ..ParserOptions::default()
    });
    let result = parser.parse_directory(dir.path()).unwrap();
    assert_eq!(result.specs.len(), 10);

    let metrics = parser.metrics();
    assert_eq!(metrics.files_processed, 10);
    assert_eq!(metrics.specs_extracted, 10);
    assert_eq!(metrics.parse_errors, 0);
    assert!(metrics.duration.as_nanos() > 0);
}
