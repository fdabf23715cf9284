//! Tracealign - validates source-embedded service contracts against traces
//!
//! This library scans source trees for `@ServiceSpec` comment annotations,
//! ingests OpenTelemetry JSON traces into an indexed store, and aligns the
//! two: every spec is matched to spans, its pre/postconditions are
//! evaluated against the recorded execution, and the outcomes aggregate
//! into a report of per-spec SUCCESS/FAILED/SKIPPED verdicts.

pub mod alignment; // spec-to-span matching, orchestration, report model
pub mod annotation; // multi-language @ServiceSpec scanner with LRU cache
pub mod cli;
pub mod evaluator; // sandboxed logic-expression interpreter
pub mod human_output;
pub mod json_output;
pub mod memory_monitor;
pub mod otlp; // OTLP-JSON wire model and decoding rules
pub mod service_spec;
pub mod span;
pub mod trace_ingest; // direct + memory-optimized ingest paths
pub mod trace_store;
