//! Alignment report model
//!
//! The append-only output of an alignment run: one [`AlignmentResult`] per
//! spec with its validation details, plus a summary block that is
//! recomputed on every append. Serialization uses camelCase field names,
//! which is what the JSON renderer emits.

use crate::evaluator::logic::compare_values;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Verdict for one spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlignmentStatus {
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for AlignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AlignmentStatus::Success => "SUCCESS",
            AlignmentStatus::Failed => "FAILED",
            AlignmentStatus::Skipped => "SKIPPED",
        };
        f.write_str(label)
    }
}

/// What a validation detail refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailType {
    Precondition,
    Postcondition,
    Matching,
}

/// Identifying slice of the span a detail was evaluated against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanContext {
    pub span_id: String,
    pub span_name: String,
    pub status: String,
}

/// One evaluated assertion or matching check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationDetail {
    #[serde(rename = "type")]
    pub detail_type: DetailType,
    /// Canonical JSON of the assertion expression
    pub expression: String,
    pub expected: Value,
    pub actual: Value,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_context: Option<SpanContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

impl ValidationDetail {
    /// A detail counts as mismatched when expected and actual differ
    ///
    /// Comparison is loose: 1 and 1.0 are equal.
    pub fn is_mismatch(&self) -> bool {
        match compare_values(&self.expected, &self.actual) {
            Some(ordering) => ordering != std::cmp::Ordering::Equal,
            None => self.expected != self.actual,
        }
    }
}

/// Pass/fail tallies over evaluated assertions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionCounts {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
}

impl AssertionCounts {
    pub fn record(&mut self, passed: bool) {
        self.total += 1;
        if passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn absorb(&mut self, other: AssertionCounts) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
    }
}

/// Outcome for one spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentResult {
    pub spec_operation_id: String,
    pub status: AlignmentStatus,
    pub matched_span_ids: Vec<String>,
    pub assertions: AssertionCounts,
    /// Wall-clock start, nanoseconds since epoch
    pub started_at_nanos: i64,
    /// Wall-clock end, nanoseconds since epoch
    pub ended_at_nanos: i64,
    /// Monotonic elapsed nanoseconds
    pub elapsed_nanos: u64,
    pub details: Vec<ValidationDetail>,
}

/// Counter block recomputed after every append
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub skip_rate: f64,
}

/// Optional run-level performance counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceInfo {
    pub specs_processed: u64,
    pub spans_matched: u64,
    pub assertions_evaluated: u64,
    pub concurrent_workers: usize,
    pub memory_usage_mb: f64,
    /// Specs per second
    pub processing_rate: f64,
}

/// Aggregated outcome of a full alignment run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentReport {
    pub summary: Summary,
    pub assertions: AssertionCounts,
    pub total_execution_nanos: u64,
    pub average_execution_nanos: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceInfo>,
    pub results: Vec<AlignmentResult>,
}

impl AlignmentReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one result and recompute the summary block
    pub fn append(&mut self, result: AlignmentResult) {
        self.results.push(result);
        self.recompute();
    }

    /// Recompute counters, rates, and aggregate timings from `results`
    pub fn recompute(&mut self) {
        let total = self.results.len() as u64;
        let success = self.count(AlignmentStatus::Success);
        let failed = self.count(AlignmentStatus::Failed);
        let skipped = self.count(AlignmentStatus::Skipped);
        let rate = |part: u64| {
            if total == 0 {
                0.0
            } else {
                part as f64 / total as f64
            }
        };
        self.summary = Summary {
            total,
            success,
            failed,
            skipped,
            success_rate: rate(success),
            failure_rate: rate(failed),
            skip_rate: rate(skipped),
        };

        self.assertions = AssertionCounts::default();
        for result in &self.results {
            self.assertions.absorb(result.assertions);
        }
        self.average_execution_nanos = if total == 0 {
            0
        } else {
            self.results.iter().map(|r| r.elapsed_nanos).sum::<u64>() / total
        };
    }

    fn count(&self, status: AlignmentStatus) -> u64 {
        self.results.iter().filter(|r| r.status == status).count() as u64
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}
