//! Logic expression interpreter
//!
//! A small JSONLogic-inspired interpreter over `serde_json::Value` trees.
//! An object with a single recognized operator key is an application;
//! arrays evaluate element-wise; everything else is a literal. The
//! annotation-friendly sugar shape (a map of variable names to condition
//! objects) is normalized into operator form before evaluation.
//!
//! Every recursive step checks the caller's deadline, so a pathological
//! expression times out instead of wedging an alignment worker.

use crate::evaluator::context::EvaluationContext;
use regex::Regex;
use serde_json::{json, Value};
use std::time::Instant;
use thiserror::Error;

/// Operators the interpreter understands
pub const OPERATORS: &[&str] = &[
    "==", "!=", ">", "<", ">=", "<=", "and", "or", "not", "if", "in", "var", "missing",
    "missing_some", "match",
];

#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("evaluation timed out")]
    Timeout,

    #[error("unknown operator {0:?}")]
    UnknownOperator(String),

    #[error("operator {op:?}: {detail}")]
    InvalidOperands { op: String, detail: String },
}

/// True when `key` is a recognized operator name
pub fn is_operator(key: &str) -> bool {
    OPERATORS.contains(&key)
}

/// Truthiness coercion
///
/// Booleans pass through; numeric zero, empty string, empty collection,
/// and null are false; everything else is true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Rewrite the annotation sugar shape into operator form
///
/// A multi-key map whose keys are not operators becomes an `and` over
/// per-key conditions, each condition binding its variable to the key
/// name. A single-key map with an operator key passes through unchanged.
/// Mixed maps keep operator entries as standalone expressions so no
/// condition is lost.
pub fn normalize(expression: &Value) -> Value {
    let Value::Object(map) = expression else {
        return expression.clone();
    };
    if map.is_empty() {
        return expression.clone();
    }
    if map.len() == 1 {
        if let Some((key, _)) = map.iter().next() {
            if is_operator(key) {
                return expression.clone();
            }
        }
    }

    let mut conditions: Vec<Value> = Vec::with_capacity(map.len());
    for (key, operand) in map {
        if is_operator(key) {
            conditions.push(json!({ key.clone(): operand.clone() }));
        } else {
            conditions.extend(bind_variable(key, operand));
        }
    }
    if conditions.len() == 1 {
        conditions.remove(0)
    } else {
        json!({ "and": conditions })
    }
}

/// Turn `{"http.status": {">=": 200, "<": 300}}` entries into operator form
fn bind_variable(variable: &str, operand: &Value) -> Vec<Value> {
    match operand {
        Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| is_operator(k)) => ops
            .iter()
            .map(|(op, rhs)| json!({ op.clone(): [{"var": variable}, rhs.clone()] }))
            .collect(),
        // A bare scalar condition is an implicit equality
        other => vec![json!({ "==": [{"var": variable}, other.clone()] })],
    }
}

/// Static nesting depth of an expression tree
pub fn expression_depth(expression: &Value) -> usize {
    match expression {
        Value::Object(map) => {
            1 + map
                .values()
                .map(expression_depth)
                .max()
                .unwrap_or(0)
        }
        Value::Array(items) => {
            1 + items
                .iter()
                .map(expression_depth)
                .max()
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Collect every operator key used anywhere in an expression
pub fn operators_used(expression: &Value, out: &mut Vec<String>) {
    match expression {
        Value::Object(map) => {
            for (key, value) in map {
                if is_operator(key) {
                    out.push(key.clone());
                }
                operators_used(value, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                operators_used(item, out);
            }
        }
        _ => {}
    }
}

/// Collect every `{"var": path}` reference in an expression
pub fn variables_referenced(expression: &Value, out: &mut Vec<String>) {
    match expression {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(path)) = map.get("var") {
                    out.push(path.clone());
                    return;
                }
                if let Some(Value::Array(args)) = map.get("var") {
                    if let Some(Value::String(path)) = args.first() {
                        out.push(path.clone());
                        return;
                    }
                }
            }
            for value in map.values() {
                variables_referenced(value, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                variables_referenced(item, out);
            }
        }
        _ => {}
    }
}

/// One evaluation run against a fixed context and deadline
pub struct Interpreter<'a> {
    context: &'a EvaluationContext,
    deadline: Instant,
}

impl<'a> Interpreter<'a> {
    pub fn new(context: &'a EvaluationContext, deadline: Instant) -> Self {
        Self { context, deadline }
    }

    /// Evaluate a normalized expression to a value
    pub fn eval(&self, expression: &Value) -> Result<Value, EvalError> {
        if Instant::now() >= self.deadline {
            return Err(EvalError::Timeout);
        }
        match expression {
            Value::Object(map) if map.len() == 1 => match map.iter().next() {
                Some((op, operand)) if is_operator(op) => self.apply(op, operand),
                // Unknown single-key object: a literal
                _ => Ok(expression.clone()),
            },
            Value::Array(items) => {
                let mut evaluated = Vec::with_capacity(items.len());
                for item in items {
                    evaluated.push(self.eval(item)?);
                }
                Ok(Value::Array(evaluated))
            }
            other => Ok(other.clone()),
        }
    }

    fn apply(&self, op: &str, operand: &Value) -> Result<Value, EvalError> {
        match op {
            "var" => self.op_var(operand),
            "missing" => self.op_missing(operand),
            "missing_some" => self.op_missing_some(operand),
            "==" => self.op_compare(op, operand, |ord| ord == std::cmp::Ordering::Equal),
            "!=" => self.op_compare(op, operand, |ord| ord != std::cmp::Ordering::Equal),
            ">" => self.op_compare(op, operand, |ord| ord == std::cmp::Ordering::Greater),
            "<" => self.op_compare(op, operand, |ord| ord == std::cmp::Ordering::Less),
            ">=" => self.op_compare(op, operand, |ord| ord != std::cmp::Ordering::Less),
            "<=" => self.op_compare(op, operand, |ord| ord != std::cmp::Ordering::Greater),
            "and" => self.op_and(operand),
            "or" => self.op_or(operand),
            "not" => self.op_not(operand),
            "if" => self.op_if(operand),
            "in" => self.op_in(operand),
            "match" => self.op_match(operand),
            other => Err(EvalError::UnknownOperator(other.to_string())),
        }
    }

    fn operand_list<'v>(&self, operand: &'v Value) -> Vec<&'v Value> {
        match operand {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        }
    }

    fn op_var(&self, operand: &Value) -> Result<Value, EvalError> {
        let (path, default) = match operand {
            Value::String(path) => (path.clone(), None),
            Value::Array(args) => {
                let path = match args.first() {
                    Some(Value::String(path)) => path.clone(),
                    Some(other) => match self.eval(other)? {
                        Value::String(path) => path,
                        bad => {
                            return Err(EvalError::InvalidOperands {
                                op: "var".to_string(),
                                detail: format!("path must be a string, got {bad}"),
                            })
                        }
                    },
                    None => {
                        return Err(EvalError::InvalidOperands {
                            op: "var".to_string(),
                            detail: "missing path".to_string(),
                        })
                    }
                };
                (path, args.get(1).cloned())
            }
            other => {
                return Err(EvalError::InvalidOperands {
                    op: "var".to_string(),
                    detail: format!("path must be a string, got {other}"),
                })
            }
        };

        match self.context.resolve(&path) {
            Some(value) => Ok(value.clone()),
            None => match default {
                Some(default) => self.eval(&default),
                None => Ok(Value::Null),
            },
        }
    }

    fn op_missing(&self, operand: &Value) -> Result<Value, EvalError> {
        let paths = self.eval(operand)?;
        let paths = match paths {
            Value::Array(items) => items,
            single => vec![single],
        };
        let mut missing = Vec::new();
        for path in paths {
            if let Value::String(path) = path {
                if self.context.resolve(&path).is_none() {
                    missing.push(Value::String(path));
                }
            }
        }
        Ok(Value::Array(missing))
    }

    fn op_missing_some(&self, operand: &Value) -> Result<Value, EvalError> {
        let Value::Array(args) = operand else {
            return Err(EvalError::InvalidOperands {
                op: "missing_some".to_string(),
                detail: "expected [minimum, [paths]]".to_string(),
            });
        };
        let minimum = args
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| EvalError::InvalidOperands {
                op: "missing_some".to_string(),
                detail: "minimum must be a non-negative integer".to_string(),
            })?;
        let paths = args.get(1).cloned().unwrap_or(Value::Array(vec![]));
        let missing = self.op_missing(&paths)?;
        let missing_list = missing.as_array().cloned().unwrap_or_default();
        let total = paths.as_array().map(Vec::len).unwrap_or(0);
        let present = total.saturating_sub(missing_list.len());
        if present as u64 >= minimum {
            Ok(Value::Array(vec![]))
        } else {
            Ok(Value::Array(missing_list))
        }
    }

    fn op_compare<F>(&self, op: &str, operand: &Value, accept: F) -> Result<Value, EvalError>
    where
        F: Fn(std::cmp::Ordering) -> bool,
    {
        let args = self.operand_list(operand);
        if args.len() != 2 {
            return Err(EvalError::InvalidOperands {
                op: op.to_string(),
                detail: format!("expected 2 operands, got {}", args.len()),
            });
        }
        let left = self.eval(args[0])?;
        let right = self.eval(args[1])?;

        let result = match compare_values(&left, &right) {
            Some(ordering) => accept(ordering),
            // Incomparable values: equal-family operators fall back to
            // strict structural (in)equality, ordering operators to false
            None => match op {
                "==" => left == right,
                "!=" => left != right,
                _ => false,
            },
        };
        Ok(Value::Bool(result))
    }

    fn op_and(&self, operand: &Value) -> Result<Value, EvalError> {
        let args = self.operand_list(operand);
        let mut last = Value::Bool(true);
        for arg in args {
            last = self.eval(arg)?;
            if !truthy(&last) {
                return Ok(last);
            }
        }
        Ok(last)
    }

    fn op_or(&self, operand: &Value) -> Result<Value, EvalError> {
        let args = self.operand_list(operand);
        let mut last = Value::Bool(false);
        for arg in args {
            last = self.eval(arg)?;
            if truthy(&last) {
                return Ok(last);
            }
        }
        Ok(last)
    }

    fn op_not(&self, operand: &Value) -> Result<Value, EvalError> {
        let args = self.operand_list(operand);
        let Some(first) = args.first() else {
            return Err(EvalError::InvalidOperands {
                op: "not".to_string(),
                detail: "missing operand".to_string(),
            });
        };
        let value = self.eval(first)?;
        Ok(Value::Bool(!truthy(&value)))
    }

    /// `[cond, then, cond2, then2, ..., else?]` chain
    fn op_if(&self, operand: &Value) -> Result<Value, EvalError> {
        let Value::Array(args) = operand else {
            return Err(EvalError::InvalidOperands {
                op: "if".to_string(),
                detail: "expected an argument list".to_string(),
            });
        };
        let mut index = 0;
        while index + 1 < args.len() {
            let condition = self.eval(&args[index])?;
            if truthy(&condition) {
                return self.eval(&args[index + 1]);
            }
            index += 2;
        }
        match args.get(index) {
            Some(fallback) => self.eval(fallback),
            None => Ok(Value::Null),
        }
    }

    fn op_in(&self, operand: &Value) -> Result<Value, EvalError> {
        let args = self.operand_list(operand);
        if args.len() != 2 {
            return Err(EvalError::InvalidOperands {
                op: "in".to_string(),
                detail: format!("expected 2 operands, got {}", args.len()),
            });
        }
        let needle = self.eval(args[0])?;
        let haystack = self.eval(args[1])?;
        let found = match &haystack {
            Value::Array(items) => items.iter().any(|item| item == &needle),
            Value::String(s) => match &needle {
                Value::String(sub) => s.contains(sub.as_str()),
                other => s.contains(&value_to_string(other)),
            },
            Value::Object(map) => match &needle {
                Value::String(key) => map.contains_key(key),
                _ => false,
            },
            _ => false,
        };
        Ok(Value::Bool(found))
    }

    /// `match: [value, pattern]` with the pattern taken literally
    ///
    /// A pattern that fails to compile degrades to a non-null presence
    /// check on the value.
    fn op_match(&self, operand: &Value) -> Result<Value, EvalError> {
        let args = self.operand_list(operand);
        if args.len() != 2 {
            return Err(EvalError::InvalidOperands {
                op: "match".to_string(),
                detail: format!("expected [value, pattern], got {} operands", args.len()),
            });
        }
        let value = self.eval(args[0])?;
        let pattern = match self.eval(args[1])? {
            Value::String(pattern) => pattern,
            other => {
                return Err(EvalError::InvalidOperands {
                    op: "match".to_string(),
                    detail: format!("pattern must be a string, got {other}"),
                })
            }
        };

        match Regex::new(&pattern) {
            Ok(regex) => {
                let text = match &value {
                    Value::Null => return Ok(Value::Bool(false)),
                    Value::String(s) => s.clone(),
                    other => value_to_string(other),
                };
                Ok(Value::Bool(regex.is_match(&text)))
            }
            Err(_) => Ok(Value::Bool(!value.is_null())),
        }
    }
}

/// Ordering between two values, when one exists
///
/// Numbers compare numerically (integer and float interchange), strings
/// lexicographically, booleans as false < true. Cross-type pairs are
/// incomparable.
pub fn compare_values(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        (Value::Null, Value::Null) => Some(std::cmp::Ordering::Equal),
        _ => None,
    }
}

/// Render a scalar for substring/regex matching
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
