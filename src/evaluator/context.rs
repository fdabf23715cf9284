//! Evaluation context
//!
//! The uniformly shaped variable environment an assertion is evaluated
//! against. Built per (spec, span) pair: span fields under `span.*`, every
//! span attribute flattened to the root in both its dotted and
//! underscore-aliased forms, dotted keys additionally expanded into nested
//! maps where that creates no conflict, the ordered event list, trace
//! summary fields, caller-seeded variables, and a `_meta` block.

use crate::span::Span;
use crate::trace_store::TraceStore;
use serde_json::{json, Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Identity string recorded under `_meta.evaluator`
pub const EVALUATOR_IDENTITY: &str = concat!("tracealign/", env!("CARGO_PKG_VERSION"));

/// Variable environment for one assertion evaluation
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    root: Map<String, Value>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the full context for a span within its trace
    pub fn for_span(span: &Span, store: &TraceStore) -> Self {
        let mut ctx = Self::new();
        ctx.populate_span(span);
        ctx.populate_trace(store);
        ctx.populate_meta();
        ctx
    }

    fn populate_span(&mut self, span: &Span) {
        let attributes: Map<String, Value> = span
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        self.root.insert(
            "span".to_string(),
            json!({
                "id": span.span_id,
                "name": span.name,
                "trace_id": span.trace_id,
                "parent_id": span.parent_id,
                "start_time": span.start_time,
                "end_time": span.end_time,
                "duration": span.duration(),
                "status": {
                    "code": span.status.code.as_str(),
                    "message": span.status.message,
                },
                "has_error": span.has_error(),
                "is_root": span.is_root(),
                "attributes": attributes,
            }),
        );

        // Flatten each attribute to the root, dotted and underscore-aliased.
        // Root bindings land first so a scalar attribute always wins over a
        // nested expansion of a longer key, regardless of map order.
        for (key, value) in &span.attributes {
            self.insert_if_absent(key, value.clone());
            let alias = key.replace('.', "_");
            if alias != *key {
                self.insert_if_absent(&alias, value.clone());
            }
        }
        for (key, value) in &span.attributes {
            if key.contains('.') {
                let parts: Vec<&str> = key.split('.').collect();
                insert_nested(&mut self.root, &parts, value.clone());
            }
        }

        let events: Vec<Value> = span
            .events
            .iter()
            .map(|event| {
                json!({
                    "name": event.name,
                    "timestamp": event.timestamp,
                    "attributes": event.attributes,
                })
            })
            .collect();
        self.root.insert("events".to_string(), Value::Array(events));
    }

    fn populate_trace(&mut self, store: &TraceStore) {
        let root_span = store
            .root_summary()
            .map(|(id, name)| json!({"id": id, "name": name}))
            .unwrap_or(Value::Null);
        self.root.insert(
            "trace".to_string(),
            json!({
                "id": store.trace_id(),
                "span_count": store.span_count(),
                "root_span": root_span,
            }),
        );
    }

    fn populate_meta(&mut self) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        self.root.insert(
            "_meta".to_string(),
            json!({
                "evaluator": EVALUATOR_IDENTITY,
                "timestamp": timestamp,
            }),
        );
    }

    /// Seed caller-supplied variables under `vars` and at the root
    ///
    /// Root insertion never overwrites keys that already exist.
    pub fn seed_vars(&mut self, vars: &Map<String, Value>) {
        self.root
            .insert("vars".to_string(), Value::Object(vars.clone()));
        for (key, value) in vars {
            self.insert_if_absent(key, value.clone());
        }
    }

    /// Insert a root binding unless the key is already taken
    pub fn insert_if_absent(&mut self, key: &str, value: Value) {
        if !self.root.contains_key(key) {
            self.root.insert(key.to_string(), value);
        }
    }

    /// Resolve a variable path
    ///
    /// Tries, in order: the exact root key (dotted attribute keys live at
    /// the root verbatim), a dotted walk through nested maps, and the
    /// underscore alias of the whole path.
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.root.get(path) {
            return Some(value);
        }
        if path.contains('.') {
            if let Some(value) = self.walk(path) {
                return Some(value);
            }
        }
        let alias = path.replace('.', "_");
        if alias != path {
            if let Some(value) = self.root.get(&alias) {
                return Some(value);
            }
        }
        let dotted = path.replace('_', ".");
        if dotted != path {
            if let Some(value) = self.root.get(&dotted) {
                return Some(value);
            }
            return self.walk(&dotted);
        }
        None
    }

    fn walk(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.root.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Snapshot the whole environment (used for failure context dumps)
    pub fn as_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Direct root access for tests and diagnostics
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }
}

/// Expand a dotted key into nested maps, backing off on any conflict
fn insert_nested(root: &mut Map<String, Value>, parts: &[&str], value: Value) {
    let Some((first, rest)) = parts.split_first() else {
        return;
    };
    if rest.is_empty() {
        if !root.contains_key(*first) {
            root.insert((*first).to_string(), value);
        }
        return;
    }
    let slot = root
        .entry((*first).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(map) = slot {
        insert_nested(map, rest, value);
    }
    // Non-object already present under this segment: conflict, leave it be
}
