//! Annotation parsing pipeline
//!
//! Walks a source tree, fans candidate files out to a bounded worker
//! pool, extracts `@ServiceSpec` annotations per file, and merges
//! everything into one [`ParseResult`]. Per-file failures become
//! [`crate::service_spec::ParseError`] entries; they never abort the scan.
//! An optional LRU cache keyed on `(path, mtime)` skips re-parsing
//! unchanged files across runs.

pub mod cache;
pub mod extractor;
pub mod languages;

use crate::annotation::cache::{ParseCache, DEFAULT_CACHE_CAPACITY};
use crate::annotation::languages::{
    adapter_for_path, is_excluded_dir, is_hidden, MAX_SOURCE_FILE_SIZE,
};
use crate::service_spec::{ParseError, ParseResult};
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Default parser worker-pool size
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Parser tunables
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub max_workers: usize,
    pub use_cache: bool,
    pub cache_capacity: usize,
    pub max_file_size: u64,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            use_cache: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_file_size: MAX_SOURCE_FILE_SIZE,
        }
    }
}

/// Counters for one parsing run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParserMetrics {
    pub files_considered: u64,
    pub files_processed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub specs_extracted: u64,
    pub parse_errors: u64,
    pub duration: Duration,
    pub files_per_second: f64,
}

struct FileOutcome {
    result: ParseResult,
    cache_hit: bool,
}

/// Concurrent, cache-aware `@ServiceSpec` scanner
pub struct AnnotationParser {
    options: ParserOptions,
    cache: Option<Arc<ParseCache>>,
    last_metrics: Mutex<ParserMetrics>,
}

impl AnnotationParser {
    pub fn new() -> Self {
        Self::with_options(ParserOptions::default())
    }

    pub fn with_options(options: ParserOptions) -> Self {
        let cache = options
            .use_cache
            .then(|| Arc::new(ParseCache::new(options.cache_capacity)));
        Self {
            options,
            cache,
            last_metrics: Mutex::new(ParserMetrics::default()),
        }
    }

    /// Metrics from the most recent [`AnnotationParser::parse_directory`]
    pub fn metrics(&self) -> ParserMetrics {
        self.last_metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Scan a source tree and extract every annotation
    ///
    /// Candidate files are distributed over a bounded worker pool; results
    /// merge in completion order, so spec order across files is
    /// unspecified while order within a file follows file position.
    pub fn parse_directory(&self, root: &Path) -> Result<ParseResult> {
        if !root.is_dir() {
            bail!("source path {} is not a readable directory", root.display());
        }
        let started = Instant::now();
        let (candidates, considered) = self.collect_candidates(root);
        debug!(
            candidates = candidates.len(),
            considered, "source tree scanned"
        );

        let worker_count = self
            .options
            .max_workers
            .max(1)
            .min(candidates.len().max(1));

        let (file_tx, file_rx) = crossbeam_channel::bounded::<PathBuf>(worker_count * 2);
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded::<FileOutcome>();

        let mut merged = ParseResult::new();
        let mut cache_hits = 0u64;
        let mut processed = 0u64;

        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                let file_rx = file_rx.clone();
                let outcome_tx = outcome_tx.clone();
                scope.spawn(move || {
                    for path in file_rx.iter() {
                        let outcome = self.parse_file(&path);
                        if outcome_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(file_rx);
            drop(outcome_tx);

            scope.spawn(move || {
                for path in candidates {
                    if file_tx.send(path).is_err() {
                        break;
                    }
                }
            });

            for outcome in outcome_rx.iter() {
                processed += 1;
                if outcome.cache_hit {
                    cache_hits += 1;
                }
                merged.merge(outcome.result);
            }
        });

        let duration = started.elapsed();
        let metrics = ParserMetrics {
            files_considered: considered,
            files_processed: processed,
            cache_hits,
            cache_misses: processed - cache_hits,
            specs_extracted: merged.specs.len() as u64,
            parse_errors: merged.errors.len() as u64,
            duration,
            files_per_second: if duration.as_secs_f64() > 0.0 {
                processed as f64 / duration.as_secs_f64()
            } else {
                0.0
            },
        };
        info!(
            files = metrics.files_processed,
            specs = metrics.specs_extracted,
            errors = metrics.parse_errors,
            cache_hits = metrics.cache_hits,
            "annotation scan finished"
        );
        *self.last_metrics.lock().unwrap_or_else(|e| e.into_inner()) = metrics;

        Ok(merged)
    }

    /// Walk the tree applying the skip policy
    ///
    /// Returns candidate files plus the count of supported-extension files
    /// considered (including those later skipped for size).
    fn collect_candidates(&self, root: &Path) -> (Vec<PathBuf>, u64) {
        let mut candidates = Vec::new();
        let mut considered = 0u64;

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                !is_hidden(&name) && !is_excluded_dir(&name)
            });

        for entry in walker.flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            if adapter_for_path(entry.path()).is_none() {
                continue;
            }
            considered += 1;
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if size > self.options.max_file_size {
                debug!(path = %entry.path().display(), size, "skipping oversized file");
                continue;
            }
            candidates.push(entry.into_path());
        }
        (candidates, considered)
    }

    /// Parse one candidate file, consulting the cache first
    fn parse_file(&self, path: &Path) -> FileOutcome {
        let file_error = |message: String| FileOutcome {
            result: ParseResult {
                specs: vec![],
                errors: vec![ParseError {
                    file: path.to_path_buf(),
                    line: 0,
                    message,
                }],
            },
            cache_hit: false,
        };

        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(error) => return file_error(format!("cannot stat file: {error}")),
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let cache_key = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        if let Some(cache) = &self.cache {
            if let Some((specs, errors)) = cache.get(&cache_key, modified) {
                return FileOutcome {
                    result: ParseResult { specs, errors },
                    cache_hit: true,
                };
            }
        }

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) => return file_error(format!("cannot read file: {error}")),
        };
        let Some(adapter) = adapter_for_path(path) else {
            return file_error("unsupported file extension".to_string());
        };

        let result = extractor::extract_from_source(path, &contents, adapter);
        if let Some(cache) = &self.cache {
            cache.insert(
                cache_key,
                modified,
                &contents,
                result.specs.clone(),
                result.errors.clone(),
            );
        }
        FileOutcome {
            result,
            cache_hit: false,
        }
    }
}

impl Default for AnnotationParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    const JAVA_SPEC: &str = r#"
/**
 * @ServiceSpec
 * operationId: "createOrder"
 * description: "Creates an order"
 */
class OrderService {}
"#;

    const GO_SPEC: &str = r#"
// @ServiceSpec
// operationId: "deleteOrder"
// description: "Deletes an order"
func DeleteOrder() {}
"#;

    #[test]
    fn test_scan_mixed_tree() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/OrderService.java", JAVA_SPEC);
        write(dir.path(), "pkg/orders/handler.go", GO_SPEC);
        write(dir.path(), "README.md", "# not source");

        let parser = AnnotationParser::new();
        let result = parser.parse_directory(dir.path()).unwrap();

        assert_eq!(result.specs.len(), 2);
        assert!(result.errors.is_empty());
        let metrics = parser.metrics();
        assert_eq!(metrics.files_considered, 2);
        assert_eq!(metrics.files_processed, 2);
        assert_eq!(metrics.specs_extracted, 2);
    }

    #[test]
    fn test_excluded_and_hidden_dirs_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "node_modules/lib/index.ts", GO_SPEC);
        write(dir.path(), "target/gen/Gen.java", JAVA_SPEC);
        write(dir.path(), ".cache/tmp.go", GO_SPEC);
        write(dir.path(), "src/real.go", GO_SPEC);

        let result = AnnotationParser::new()
            .parse_directory(dir.path())
            .unwrap();
        assert_eq!(result.specs.len(), 1);
        assert_eq!(result.specs[0].operation_id, "deleteOrder");
    }

    #[test]
    fn test_oversized_file_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "big.go", GO_SPEC);
        write(dir.path(), "small.go", GO_SPEC);

        let mut options = ParserOptions::default();
        options.max_file_size = 10;
        let parser = AnnotationParser::with_options(options);
        let result = parser.parse_directory(dir.path()).unwrap();

        assert_eq!(result.specs.len(), 0);
        assert_eq!(parser.metrics().files_considered, 2);
        assert_eq!(parser.metrics().files_processed, 0);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let result = AnnotationParser::new().parse_directory(Path::new("/no/such/dir"));
        assert!(result.is_err());
    }

    #[test]
    fn test_unreadable_file_yields_line_zero_error() {
        let dir = tempfile::tempdir().unwrap();
        // Invalid UTF-8 in a supported extension
        fs::write(dir.path().join("broken.go"), [0xff, 0xfe, 0x00]).unwrap();
        write(dir.path(), "good.go", GO_SPEC);

        let result = AnnotationParser::new()
            .parse_directory(dir.path())
            .unwrap();
        assert_eq!(result.specs.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, 0);
        assert!(result.errors[0].message.contains("cannot read file"));
    }

    #[test]
    fn test_cache_hit_on_second_run() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "svc.java", JAVA_SPEC);

        let parser = AnnotationParser::new();
        parser.parse_directory(dir.path()).unwrap();
        assert_eq!(parser.metrics().cache_hits, 0);

        let result = parser.parse_directory(dir.path()).unwrap();
        assert_eq!(result.specs.len(), 1);
        assert_eq!(parser.metrics().cache_hits, 1);
        assert_eq!(parser.metrics().cache_misses, 0);
    }

    #[test]
    fn test_cache_disabled() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "svc.java", JAVA_SPEC);

        let mut options = ParserOptions::default();
        options.use_cache = false;
        let parser = AnnotationParser::with_options(options);
        parser.parse_directory(dir.path()).unwrap();
        parser.parse_directory(dir.path()).unwrap();
        assert_eq!(parser.metrics().cache_hits, 0);
    }

    #[test]
    fn test_many_files_across_workers() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..40 {
            let body = GO_SPEC.replace("deleteOrder", &format!("op{i}"));
            write(dir.path(), &format!("pkg/f{i}.go"), &body);
        }

        let result = AnnotationParser::new()
            .parse_directory(dir.path())
            .unwrap();
        assert_eq!(result.specs.len(), 40);

        // Every operation id arrived exactly once, in some order
        let mut ids: Vec<String> = result
            .specs
            .iter()
            .map(|s| s.operation_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 40);
    }

    #[test]
    fn test_spec_invariants_hold() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.java", JAVA_SPEC);
        write(dir.path(), "b.go", GO_SPEC);

        let result = AnnotationParser::new()
            .parse_directory(dir.path())
            .unwrap();
        for spec in &result.specs {
            assert!(!spec.operation_id.is_empty());
            assert!(!spec.description.is_empty());
            assert!(spec.line >= 1);
        }
    }
}
