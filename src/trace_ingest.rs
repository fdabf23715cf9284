//! OTLP trace ingestion
//!
//! Loads an OTLP-JSON document from a file, reader, or string and produces
//! [`TraceData`] ready for the [`crate::trace_store::TraceStore`]. Two paths:
//!
//! - *Direct:* decode the whole document, convert every span, build the tree.
//! - *Memory-optimized:* for inputs larger than ~2× the chunk size, walk
//!   resource-spans sequentially and convert spans in fixed-size batches,
//!   releasing wire-format buffers at batch boundaries and re-checking the
//!   resident-memory budget between batches.
//!
//! Ingestion is all-or-nothing: any malformed span, bad timestamp, or
//! budget overflow aborts with a descriptive error and no partial trace.

use crate::memory_monitor::{MemoryBudgetExceeded, MemoryMonitor, DEFAULT_MEMORY_LIMIT};
use crate::otlp::{decode_span, DecodeError, OtlpDocument};
use crate::span::Span;
use crate::trace_store::{TraceData, TraceDataError};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// File-backed ingestion rejects inputs over 100 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Chunk size that decides when the memory-optimized path kicks in
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Spans converted per batch on the memory-optimized path
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("trace file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("trace file {path} is {size} bytes, over the {limit} byte limit")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("malformed OTLP JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Tree(#[from] TraceDataError),

    #[error(transparent)]
    Memory(#[from] MemoryBudgetExceeded),
}

/// Callback invoked with `(processed_bytes, total_bytes)` as batches finish
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Tunables for trace ingestion
pub struct IngestOptions {
    pub max_file_size: u64,
    pub memory_limit: u64,
    pub chunk_size: u64,
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// OTLP-JSON loader with size and memory budgets
pub struct TraceIngestor {
    options: IngestOptions,
    progress: Option<ProgressFn>,
}

impl TraceIngestor {
    pub fn new() -> Self {
        Self::with_options(IngestOptions::default())
    }

    pub fn with_options(options: IngestOptions) -> Self {
        Self {
            options,
            progress: None,
        }
    }

    /// Register a progress callback for the memory-optimized path
    pub fn on_progress(mut self, callback: ProgressFn) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Ingest a trace file, choosing the path by file size
    pub fn ingest_file(&self, path: &Path) -> Result<TraceData, IngestError> {
        let metadata = std::fs::metadata(path).map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let size = metadata.len();
        if size > self.options.max_file_size {
            return Err(IngestError::FileTooLarge {
                path: path.to_path_buf(),
                size,
                limit: self.options.max_file_size,
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if size > self.options.chunk_size * 2 {
            debug!(size, "large trace input, using memory-optimized ingest");
            self.ingest_memory_optimized(&contents)
        } else {
            self.ingest_str(&contents)
        }
    }

    /// Ingest from any reader via the direct path
    pub fn ingest_reader<R: Read>(&self, mut reader: R) -> Result<TraceData, IngestError> {
        let mut contents = String::new();
        reader
            .read_to_string(&mut contents)
            .map_err(|source| IngestError::Io {
                path: PathBuf::from("<reader>"),
                source,
            })?;
        self.ingest_str(&contents)
    }

    /// Direct path: decode everything, then build the tree
    pub fn ingest_str(&self, contents: &str) -> Result<TraceData, IngestError> {
        let document: OtlpDocument = serde_json::from_str(contents)?;
        let mut spans = Vec::with_capacity(document.span_count());
        for resource_spans in &document.resource_spans {
            for scope_spans in &resource_spans.scope_spans {
                for otlp_span in &scope_spans.spans {
                    spans.push(decode_span(otlp_span)?);
                }
            }
        }
        self.finish(spans)
    }

    /// Memory-optimized path: sequential resource-spans, batched conversion
    ///
    /// Wire-format structures are moved out and dropped as each batch
    /// completes, and the resident budget is re-checked at every batch
    /// boundary.
    pub fn ingest_memory_optimized(&self, contents: &str) -> Result<TraceData, IngestError> {
        let total_bytes = contents.len() as u64;
        let document: OtlpDocument = serde_json::from_str(contents)?;
        let total_spans = document.span_count();
        let monitor = MemoryMonitor::new(self.options.memory_limit);
        monitor.check_budget()?;

        let mut spans: Vec<Span> = Vec::with_capacity(total_spans);
        let mut converted = 0usize;

        for resource_spans in document.resource_spans {
            for scope_spans in resource_spans.scope_spans {
                let mut pending = scope_spans.spans;
                while !pending.is_empty() {
                    let take = pending.len().min(self.options.batch_size);
                    let batch: Vec<_> = pending.drain(..take).collect();
                    for otlp_span in &batch {
                        spans.push(decode_span(otlp_span)?);
                    }
                    converted += batch.len();
                    drop(batch);

                    if monitor.under_pressure() {
                        warn!(
                            used = monitor.current_usage(),
                            limit = monitor.limit(),
                            "memory pressure during trace ingest"
                        );
                        pending.shrink_to_fit();
                    }
                    monitor.check_budget()?;

                    if let Some(progress) = &self.progress {
                        let processed = if total_spans == 0 {
                            total_bytes
                        } else {
                            total_bytes * converted as u64 / total_spans as u64
                        };
                        progress(processed.min(total_bytes), total_bytes);
                    }
                }
            }
        }

        if let Some(progress) = &self.progress {
            progress(total_bytes, total_bytes);
        }
        self.finish(spans)
    }

    fn finish(&self, spans: Vec<Span>) -> Result<TraceData, IngestError> {
        let count = spans.len();
        let data = TraceData::from_spans(spans)?;
        info!(
            spans = count,
            trace_id = %data.trace_id,
            "trace ingested"
        );
        Ok(data)
    }
}

impl Default for TraceIngestor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn otlp_doc(spans: Vec<serde_json::Value>) -> String {
        json!({
            "resourceSpans": [{
                "resource": {"attributes": []},
                "scopeSpans": [{"scope": {"name": "test"}, "spans": spans}]
            }]
        })
        .to_string()
    }

    fn wire_span(id: &str, parent: &str, name: &str, start: &str, end: &str) -> serde_json::Value {
        json!({
            "traceId": "t1",
            "spanId": id,
            "parentSpanId": parent,
            "name": name,
            "kind": 2,
            "startTimeUnixNano": start,
            "endTimeUnixNano": end,
            "status": {"code": 1},
            "attributes": []
        })
    }

    #[test]
    fn test_empty_resource_spans_is_valid() {
        let data = TraceIngestor::new()
            .ingest_str(r#"{"resourceSpans":[]}"#)
            .unwrap();
        assert!(data.is_empty());
        assert!(data.root_span.is_none());
        assert!(data.span_tree.is_none());
    }

    #[test]
    fn test_direct_ingest_builds_tree() {
        let doc = otlp_doc(vec![
            wire_span("root", "", "entry", "1000", "9000"),
            wire_span("child", "root", "work", "2000", "3000"),
        ]);
        let data = TraceIngestor::new().ingest_str(&doc).unwrap();
        assert_eq!(data.span_count(), 2);
        assert_eq!(data.root_span.as_ref().unwrap().span_id, "root");
        assert_eq!(data.span_tree.as_ref().unwrap().children.len(), 1);
    }

    #[test]
    fn test_duration_round_trip() {
        let doc = otlp_doc(vec![wire_span("s", "", "op", "1500", "4250")]);
        let data = TraceIngestor::new().ingest_str(&doc).unwrap();
        assert_eq!(data.spans["s"].duration(), 2750);
    }

    #[test]
    fn test_malformed_json_aborts() {
        let result = TraceIngestor::new().ingest_str("{not json");
        assert!(matches!(result, Err(IngestError::Json(_))));
    }

    #[test]
    fn test_bad_timestamp_aborts() {
        let doc = otlp_doc(vec![wire_span("s", "", "op", "oops", "2")]);
        let result = TraceIngestor::new().ingest_str(&doc);
        assert!(matches!(result, Err(IngestError::Decode(_))));
    }

    #[test]
    fn test_file_size_limit() {
        let mut options = IngestOptions::default();
        options.max_file_size = 8;
        let ingestor = TraceIngestor::with_options(options);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"resourceSpans":[]}"#).unwrap();
        let result = ingestor.ingest_file(file.path());
        assert!(matches!(result, Err(IngestError::FileTooLarge { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = TraceIngestor::new().ingest_file(Path::new("/nonexistent/trace.json"));
        assert!(matches!(result, Err(IngestError::Io { .. })));
    }

    #[test]
    fn test_memory_optimized_matches_direct() {
        let spans: Vec<_> = (0..250)
            .map(|i| {
                let id = format!("s{i}");
                let parent = if i == 0 { String::new() } else { "s0".to_string() };
                wire_span(&id, &parent, "op", "1000", "2000")
            })
            .collect();
        let doc = otlp_doc(spans);

        let ingestor = TraceIngestor::new();
        let direct = ingestor.ingest_str(&doc).unwrap();
        let optimized = ingestor.ingest_memory_optimized(&doc).unwrap();

        assert_eq!(direct.span_count(), optimized.span_count());
        assert_eq!(
            direct.root_span.as_ref().unwrap().span_id,
            optimized.root_span.as_ref().unwrap().span_id
        );
        assert_eq!(
            direct.span_tree.as_ref().unwrap().size(),
            optimized.span_tree.as_ref().unwrap().size()
        );
    }

    #[test]
    fn test_progress_callback_reports_totals() {
        let doc = otlp_doc(vec![
            wire_span("root", "", "entry", "1", "2"),
            wire_span("c1", "root", "w", "1", "2"),
        ]);
        let seen = Arc::new(AtomicU64::new(0));
        let seen_in_cb = Arc::clone(&seen);
        let total = doc.len() as u64;

        let ingestor = TraceIngestor::new().on_progress(Box::new(move |processed, total_bytes| {
            assert!(processed <= total_bytes);
            seen_in_cb.store(processed, Ordering::SeqCst);
        }));
        ingestor.ingest_memory_optimized(&doc).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), total);
    }

    #[test]
    fn test_small_file_uses_direct_path() {
        let doc = otlp_doc(vec![wire_span("s", "", "op", "1", "2")]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(doc.as_bytes()).unwrap();
        let data = TraceIngestor::new().ingest_file(file.path()).unwrap();
        assert_eq!(data.span_count(), 1);
    }

    #[test]
    fn test_ingest_reader() {
        let doc = otlp_doc(vec![wire_span("s", "", "op", "1", "2")]);
        let data = TraceIngestor::new()
            .ingest_reader(doc.as_bytes())
            .unwrap();
        assert_eq!(data.span_count(), 1);
    }

    #[test]
    fn test_no_root_error_propagates() {
        let doc = otlp_doc(vec![wire_span("a", "b", "x", "1", "2")]);
        let result = TraceIngestor::new().ingest_str(&doc);
        assert!(matches!(result, Err(IngestError::Tree(_))));
    }
}
