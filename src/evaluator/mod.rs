//! Assertion evaluation
//!
//! [`AssertionEvaluator`] runs one logic expression against an
//! [`EvaluationContext`] and produces a uniform [`EvaluationOutcome`].
//! Evaluation is sandboxed three ways: a static depth ceiling, a
//! per-evaluation deadline checked at every interpreter step, and an
//! optional operator allowlist applied before anything runs. Interpreter
//! panics are caught and surfaced as failed outcomes.
//!
//! Outcomes keep the invariant that `expected` and `actual` are
//! loosely equal exactly when the assertion passed; the alignment engine
//! relies on that when recomputing result status.

pub mod context;
pub mod logic;

pub use context::EvaluationContext;

use crate::evaluator::logic::{
    expression_depth, normalize, operators_used, truthy, EvalError, Interpreter,
};
use serde_json::Value;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default maximum expression nesting depth
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Default per-evaluation deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Evaluator sandbox settings
#[derive(Debug, Clone)]
pub struct EvaluatorOptions {
    pub max_depth: usize,
    pub timeout: Duration,
    /// When set, any operator outside this set fails validation
    pub allowed_operators: Option<HashSet<String>>,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            timeout: DEFAULT_TIMEOUT,
            allowed_operators: None,
        }
    }
}

/// Result of evaluating one assertion
///
/// `expression` is the canonical JSON rendering of the assertion as
/// written. `error` carries sandbox or interpreter failures; those always
/// come with `passed == false`.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub passed: bool,
    pub expected: Value,
    pub actual: Value,
    pub expression: String,
    pub message: String,
    pub error: Option<String>,
}

impl EvaluationOutcome {
    fn trivial_pass(expression: String) -> Self {
        Self {
            passed: true,
            expected: Value::Bool(true),
            actual: Value::Bool(true),
            expression,
            message: "empty assertion passes trivially".to_string(),
            error: None,
        }
    }

    fn failure(expression: String, message: String, error: Option<String>) -> Self {
        Self {
            passed: false,
            expected: Value::Bool(true),
            actual: Value::Bool(false),
            expression,
            message,
            error,
        }
    }
}

/// Sandboxed logic-expression evaluator
#[derive(Debug, Clone, Default)]
pub struct AssertionEvaluator {
    options: EvaluatorOptions,
}

impl AssertionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: EvaluatorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EvaluatorOptions {
        &self.options
    }

    /// Evaluate one assertion against a context
    pub fn evaluate(&self, expression: &Value, context: &EvaluationContext) -> EvaluationOutcome {
        let canonical = canonical_json(expression);

        if is_empty_assertion(expression) {
            return EvaluationOutcome::trivial_pass(canonical);
        }

        let normalized = normalize(expression);

        let depth = expression_depth(&normalized);
        if depth > self.options.max_depth {
            return EvaluationOutcome::failure(
                canonical,
                format!(
                    "expression depth {depth} exceeds the maximum of {}",
                    self.options.max_depth
                ),
                Some("max depth exceeded".to_string()),
            );
        }

        if let Some(allowed) = &self.options.allowed_operators {
            let mut used = Vec::new();
            operators_used(&normalized, &mut used);
            if let Some(rejected) = used.iter().find(|op| !allowed.contains(*op)) {
                return EvaluationOutcome::failure(
                    canonical,
                    format!("operator {rejected:?} is not in the allowlist"),
                    Some(format!("operator {rejected:?} not allowed")),
                );
            }
        }

        let deadline = Instant::now() + self.options.timeout;
        let evaluated = catch_unwind(AssertUnwindSafe(|| {
            Interpreter::new(context, deadline).eval(&normalized)
        }));

        match evaluated {
            Ok(Ok(result)) => self.build_outcome(canonical, &normalized, result, context, deadline),
            Ok(Err(EvalError::Timeout)) => EvaluationOutcome::failure(
                canonical,
                format!(
                    "evaluation timed out after {:?}",
                    self.options.timeout
                ),
                Some("timeout".to_string()),
            ),
            Ok(Err(error)) => EvaluationOutcome::failure(
                canonical,
                format!("evaluation error: {error}"),
                Some(error.to_string()),
            ),
            Err(panic) => {
                let detail = panic_message(&panic);
                debug!(panic = %detail, "interpreter panicked");
                EvaluationOutcome::failure(
                    canonical,
                    format!("evaluation aborted: {detail}"),
                    Some(detail),
                )
            }
        }
    }

    /// Shape the outcome, pulling comparison operands out where possible
    ///
    /// For a top-level equality the compared values become
    /// expected/actual, which is what failure diagnostics key off. Every
    /// other expression reports the coerced boolean.
    fn build_outcome(
        &self,
        canonical: String,
        normalized: &Value,
        result: Value,
        context: &EvaluationContext,
        deadline: Instant,
    ) -> EvaluationOutcome {
        let passed = truthy(&result);

        if let Some((left, right)) = equality_operands(normalized) {
            let interpreter = Interpreter::new(context, deadline);
            let actual = interpreter.eval(left).unwrap_or(Value::Bool(passed));
            let expected = interpreter.eval(right).unwrap_or(Value::Bool(true));
            let message = if passed {
                "assertion passed".to_string()
            } else {
                format!(
                    "expected {}, got {}",
                    compact(&expected),
                    compact(&actual)
                )
            };
            return EvaluationOutcome {
                passed,
                expected,
                actual,
                expression: canonical,
                message,
                error: None,
            };
        }

        EvaluationOutcome {
            passed,
            expected: Value::Bool(true),
            actual: Value::Bool(passed),
            expression: canonical,
            message: if passed {
                "assertion passed".to_string()
            } else {
                "expression evaluated to false".to_string()
            },
            error: None,
        }
    }
}

/// Null and `{}` are trivially passing assertions
pub fn is_empty_assertion(expression: &Value) -> bool {
    match expression {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Canonical JSON rendering (stable key order)
pub fn canonical_json(expression: &Value) -> String {
    serde_json::to_string(expression).unwrap_or_else(|_| "null".to_string())
}

/// Operands of a top-level `{"==": [left, right]}`
fn equality_operands(normalized: &Value) -> Option<(&Value, &Value)> {
    let map = normalized.as_object()?;
    if map.len() != 1 {
        return None;
    }
    let args = map.get("==")?.as_array()?;
    if args.len() != 2 {
        return None;
    }
    Some((&args[0], &args[1]))
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

/// Best-effort extraction of a panic payload
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
