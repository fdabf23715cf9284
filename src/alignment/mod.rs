//! Alignment engine
//!
//! Joins parsed [`ServiceSpec`]s to trace spans through a
//! [`SpanMatcher`], drives the [`AssertionEvaluator`] over every matched
//! span (preconditions before postconditions), and aggregates the
//! per-spec outcomes into an [`AlignmentReport`]. Specs fan out over a
//! bounded worker pool; the collector serializes report appends and sorts
//! results back into submission order so output is deterministic.

pub mod diagnostics;
pub mod matcher;
pub mod report;

pub use matcher::{MatchStrategy, SpanMatcher};
pub use report::{
    AlignmentReport, AlignmentResult, AlignmentStatus, AssertionCounts, DetailType,
    PerformanceInfo, SpanContext, ValidationDetail,
};

use crate::evaluator::{canonical_json, AssertionEvaluator, EvaluationContext};
use crate::memory_monitor::MemoryMonitor;
use crate::service_spec::ServiceSpec;
use crate::span::Span;
use crate::trace_store::TraceStore;
use anyhow::{bail, Result};
use serde_json::{json, Map, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Default alignment worker-pool size
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub max_concurrency: usize,
    /// Specs with no matching span are SKIPPED (true) or FAILED (false)
    pub skip_missing_spans: bool,
    pub collect_metrics: bool,
    /// Variables seeded into every evaluation context
    pub seed_vars: Map<String, Value>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            skip_missing_spans: true,
            collect_metrics: false,
            seed_vars: Map::new(),
        }
    }
}

/// Concurrent spec-to-trace alignment
pub struct AlignmentEngine {
    options: EngineOptions,
    evaluator: AssertionEvaluator,
    matcher: SpanMatcher,
}

impl AlignmentEngine {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            options,
            evaluator: AssertionEvaluator::new(),
            matcher: SpanMatcher::with_default_strategies(),
        }
    }

    /// Swap in a differently configured evaluator
    pub fn with_evaluator(mut self, evaluator: AssertionEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Swap in a custom matcher (extra strategies, different priorities)
    pub fn with_matcher(mut self, matcher: SpanMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Align every spec against the trace and build the report
    ///
    /// Evaluator failures become failed details and never abort the run;
    /// the call errors only when no spec produced a result at all.
    pub fn align(&self, specs: &[ServiceSpec], store: &TraceStore) -> Result<AlignmentReport> {
        let run_started = Instant::now();
        let mut alignment_report = AlignmentReport::new();

        if specs.is_empty() {
            debug!("no specs to align");
            alignment_report.recompute();
            return Ok(alignment_report);
        }

        let workers = self.options.max_concurrency.max(1).min(specs.len());
        let (task_tx, task_rx) = crossbeam_channel::bounded::<(usize, &ServiceSpec)>(workers * 2);
        let (result_tx, result_rx) =
            crossbeam_channel::unbounded::<(usize, AlignmentResult)>();
        let (error_tx, error_rx) = crossbeam_channel::unbounded::<String>();

        let mut collected: Vec<(usize, AlignmentResult)> = Vec::with_capacity(specs.len());
        std::thread::scope(|scope| {
            for _ in 0..workers {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let error_tx = error_tx.clone();
                scope.spawn(move || {
                    for (index, spec) in task_rx.iter() {
                        let processed =
                            catch_unwind(AssertUnwindSafe(|| self.process_spec(spec, store)));
                        match processed {
                            Ok(result) => {
                                if result_tx.send((index, result)).is_err() {
                                    break;
                                }
                            }
                            Err(_) => {
                                let _ = error_tx.send(format!(
                                    "worker panicked while aligning operation {:?}",
                                    spec.operation_id
                                ));
                            }
                        }
                    }
                });
            }
            drop(task_rx);
            drop(result_tx);
            drop(error_tx);

            scope.spawn(move || {
                for task in specs.iter().enumerate() {
                    if task_tx.send(task).is_err() {
                        break;
                    }
                }
            });

            for item in result_rx.iter() {
                collected.push(item);
            }
        });

        let worker_errors: Vec<String> = error_rx.try_iter().collect();
        for error in &worker_errors {
            warn!(error = %error, "alignment worker error");
        }
        if collected.is_empty() && !specs.is_empty() {
            bail!(
                "alignment produced no results ({} worker errors)",
                worker_errors.len()
            );
        }

        // Deterministic output: restore submission order before appending
        collected.sort_by_key(|(index, _)| *index);
        for (_, result) in collected {
            alignment_report.append(result);
        }
        alignment_report.total_execution_nanos = run_started.elapsed().as_nanos() as u64;

        if self.options.collect_metrics {
            let elapsed = run_started.elapsed().as_secs_f64();
            let spans_matched: u64 = alignment_report
                .results
                .iter()
                .map(|r| r.matched_span_ids.len() as u64)
                .sum();
            alignment_report.performance = Some(PerformanceInfo {
                specs_processed: alignment_report.summary.total,
                spans_matched,
                assertions_evaluated: alignment_report.assertions.total,
                concurrent_workers: workers,
                memory_usage_mb: MemoryMonitor::default().current_usage() as f64
                    / (1024.0 * 1024.0),
                processing_rate: if elapsed > 0.0 {
                    alignment_report.summary.total as f64 / elapsed
                } else {
                    0.0
                },
            });
        }

        info!(
            total = alignment_report.summary.total,
            success = alignment_report.summary.success,
            failed = alignment_report.summary.failed,
            skipped = alignment_report.summary.skipped,
            "alignment finished"
        );
        Ok(alignment_report)
    }

    /// Align one spec: match, evaluate, derive status
    fn process_spec(&self, spec: &ServiceSpec, store: &TraceStore) -> AlignmentResult {
        let started_at_nanos = wall_clock_nanos();
        let started = Instant::now();

        let (matches, strategy) = self.matcher.find_matching_spans(spec, store);
        let matched_span_ids: Vec<String> =
            matches.iter().map(|span| span.span_id.clone()).collect();
        debug!(
            operation = %spec.operation_id,
            matches = matches.len(),
            strategy = strategy.unwrap_or("none"),
            "spec matched"
        );

        if matches.is_empty() {
            return self.unmatched_result(spec, started_at_nanos, started);
        }

        let mut details = Vec::new();
        let mut assertions = AssertionCounts::default();
        for span in &matches {
            let mut context = EvaluationContext::for_span(span, store);
            if !self.options.seed_vars.is_empty() {
                context.seed_vars(&self.options.seed_vars);
            }

            if spec.has_preconditions() {
                let (detail, passed) =
                    self.check(DetailType::Precondition, &spec.preconditions, span, &context);
                assertions.record(passed);
                details.push(detail);
            }
            if spec.has_postconditions() {
                let (detail, passed) = self.check(
                    DetailType::Postcondition,
                    &spec.postconditions,
                    span,
                    &context,
                );
                assertions.record(passed);
                details.push(detail);
            }
        }

        let any_mismatch = details
            .iter()
            .any(|d| d.detail_type != DetailType::Matching && d.is_mismatch());
        let status = if any_mismatch {
            AlignmentStatus::Failed
        } else if assertions.total > 0 {
            AlignmentStatus::Success
        } else {
            AlignmentStatus::Skipped
        };

        AlignmentResult {
            spec_operation_id: spec.operation_id.clone(),
            status,
            matched_span_ids,
            assertions,
            started_at_nanos,
            ended_at_nanos: wall_clock_nanos(),
            elapsed_nanos: started.elapsed().as_nanos() as u64,
            details,
        }
    }

    /// Result for a spec no strategy could match
    fn unmatched_result(
        &self,
        spec: &ServiceSpec,
        started_at_nanos: i64,
        started: Instant,
    ) -> AlignmentResult {
        let expression = canonical_json(&json!({ "operationId": spec.operation_id }));
        let (status, actual, message, failure_reason, suggestions) =
            if self.options.skip_missing_spans {
                (
                    AlignmentStatus::Skipped,
                    json!("found"),
                    format!(
                        "no spans found for operation {:?}; validation skipped",
                        spec.operation_id
                    ),
                    None,
                    None,
                )
            } else {
                (
                    AlignmentStatus::Failed,
                    json!("not found"),
                    format!("no spans found for operation {:?}", spec.operation_id),
                    Some(format!(
                        "no strategy matched (tried: {})",
                        self.matcher.strategy_names().join(", ")
                    )),
                    Some(vec![
                        "check that instrumentation sets the operation.id span attribute"
                            .to_string(),
                        "check that the span name matches the annotated operation id".to_string(),
                    ]),
                )
            };

        AlignmentResult {
            spec_operation_id: spec.operation_id.clone(),
            status,
            matched_span_ids: vec![],
            assertions: AssertionCounts::default(),
            started_at_nanos,
            ended_at_nanos: wall_clock_nanos(),
            elapsed_nanos: started.elapsed().as_nanos() as u64,
            details: vec![ValidationDetail {
                detail_type: DetailType::Matching,
                expression,
                expected: json!("found"),
                actual,
                message,
                span_context: None,
                failure_reason,
                context_info: None,
                suggestions,
            }],
        }
    }

    /// Evaluate one assertion tree against one span
    fn check(
        &self,
        detail_type: DetailType,
        expression: &Value,
        span: &Span,
        context: &EvaluationContext,
    ) -> (ValidationDetail, bool) {
        let outcome = self.evaluator.evaluate(expression, context);
        let mut detail = ValidationDetail {
            detail_type,
            expression: outcome.expression,
            expected: outcome.expected,
            actual: outcome.actual,
            message: outcome.message,
            span_context: Some(SpanContext {
                span_id: span.span_id.clone(),
                span_name: span.name.clone(),
                status: span.status.code.as_str().to_string(),
            }),
            failure_reason: None,
            context_info: None,
            suggestions: None,
        };

        if !outcome.passed {
            detail.failure_reason = Some(match &outcome.error {
                Some(error) => format!("evaluation error: {error}"),
                None => diagnostics::analyze_failure(
                    &detail.expected,
                    &detail.actual,
                    expression,
                    context,
                ),
            });
            detail.context_info =
                Some(diagnostics::context_snapshot(expression, context, span));
            detail.suggestions = Some(diagnostics::build_suggestions(
                &detail.expected,
                &detail.actual,
                span,
                detail_type,
            ));
        }
        (detail, outcome.passed)
    }
}

impl Default for AlignmentEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn wall_clock_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
