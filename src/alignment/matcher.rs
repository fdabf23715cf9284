//! Spec-to-span matching strategies
//!
//! A [`SpanMatcher`] tries registered strategies in descending priority
//! until one yields a non-empty match set. Ties within a strategy keep
//! trace insertion order. Strategies are trait objects so callers can
//! register custom ones next to the defaults.

use crate::service_spec::ServiceSpec;
use crate::span::Span;
use crate::trace_store::TraceStore;
use serde_json::Value;
use std::sync::Arc;

/// One way of locating the spans a spec refers to
pub trait MatchStrategy: Send + Sync {
    /// Stable identifier, used in matching diagnostics
    fn name(&self) -> &str;

    /// Higher priority strategies are tried first
    fn priority(&self) -> i32;

    /// Spans matching the spec, in trace insertion order
    fn find_matches(&self, spec: &ServiceSpec, store: &TraceStore) -> Vec<Arc<Span>>;
}

/// Priority 100: `operation.id` attribute equals the spec's operation id
pub struct OperationIdStrategy;

impl MatchStrategy for OperationIdStrategy {
    fn name(&self) -> &str {
        "operation-id"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn find_matches(&self, spec: &ServiceSpec, store: &TraceStore) -> Vec<Arc<Span>> {
        store.find_spans_by_operation_id(&spec.operation_id)
    }
}

/// Priority 80: span name equals the spec's operation id
pub struct SpanNameStrategy;

impl MatchStrategy for SpanNameStrategy {
    fn name(&self) -> &str {
        "span-name"
    }

    fn priority(&self) -> i32 {
        80
    }

    fn find_matches(&self, spec: &ServiceSpec, store: &TraceStore) -> Vec<Arc<Span>> {
        store.find_spans_by_name(&spec.operation_id)
    }
}

/// Match on an arbitrary string attribute equaling the operation id
///
/// The default registration covers `operation.name` at priority 60.
pub struct AttributeStrategy {
    attribute: String,
    priority: i32,
    name: String,
}

impl AttributeStrategy {
    pub fn new(attribute: impl Into<String>, priority: i32) -> Self {
        let attribute = attribute.into();
        let name = format!("attribute({attribute})");
        Self {
            attribute,
            priority,
            name,
        }
    }
}

impl MatchStrategy for AttributeStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn find_matches(&self, spec: &ServiceSpec, store: &TraceStore) -> Vec<Arc<Span>> {
        store
            .all_spans()
            .into_iter()
            .filter(|span| {
                matches!(
                    span.attribute(&self.attribute),
                    Some(Value::String(value)) if value == &spec.operation_id
                )
            })
            .collect()
    }
}

/// Priority-ordered strategy list
pub struct SpanMatcher {
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl SpanMatcher {
    /// Matcher with no strategies; every lookup misses
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// The default strategy set: operation id, span name, `operation.name`
    pub fn with_default_strategies() -> Self {
        let mut matcher = Self::empty();
        matcher.register(Box::new(OperationIdStrategy));
        matcher.register(Box::new(SpanNameStrategy));
        matcher.register(Box::new(AttributeStrategy::new("operation.name", 60)));
        matcher
    }

    /// Register a strategy, keeping the list sorted by priority
    pub fn register(&mut self, strategy: Box<dyn MatchStrategy>) {
        self.strategies.push(strategy);
        self.strategies
            .sort_by_key(|strategy| std::cmp::Reverse(strategy.priority()));
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// First non-empty match set, with the winning strategy's name
    pub fn find_matching_spans(
        &self,
        spec: &ServiceSpec,
        store: &TraceStore,
    ) -> (Vec<Arc<Span>>, Option<&str>) {
        for strategy in &self.strategies {
            let matches = strategy.find_matches(spec, store);
            if !matches.is_empty() {
                return (matches, Some(strategy.name()));
            }
        }
        (Vec::new(), None)
    }
}

impl Default for SpanMatcher {
    fn default() -> Self {
        Self::with_default_strategies()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{SpanStatus, OPERATION_ID_ATTR};
    use crate::trace_store::TraceData;
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn spec(op: &str) -> ServiceSpec {
        ServiceSpec {
            operation_id: op.to_string(),
            description: "test".to_string(),
            preconditions: Value::Null,
            postconditions: Value::Null,
            source_file: PathBuf::from("t.java"),
            line: 1,
        }
    }

    fn span(id: &str, name: &str, attrs: &[(&str, &str)]) -> Span {
        let mut attributes = HashMap::new();
        for (k, v) in attrs {
            attributes.insert(k.to_string(), json!(v));
        }
        Span {
            span_id: id.to_string(),
            trace_id: "t".to_string(),
            parent_id: if id == "root" { String::new() } else { "root".to_string() },
            name: name.to_string(),
            start_time: 0,
            end_time: 1,
            status: SpanStatus::default(),
            attributes,
            events: vec![],
        }
    }

    fn store(spans: Vec<Span>) -> TraceStore {
        TraceStore::with_data(TraceData::from_spans(spans).unwrap())
    }

    #[test]
    fn test_operation_id_strategy_wins() {
        let store = store(vec![
            span("root", "createOrder", &[]),
            span("s2", "other", &[(OPERATION_ID_ATTR, "createOrder")]),
        ]);
        let matcher = SpanMatcher::with_default_strategies();
        let (matches, strategy) = matcher.find_matching_spans(&spec("createOrder"), &store);
        // operation.id has higher priority than the name match on root
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].span_id, "s2");
        assert_eq!(strategy, Some("operation-id"));
    }

    #[test]
    fn test_span_name_fallback() {
        let store = store(vec![
            span("root", "other", &[]),
            span("s2", "createOrder", &[]),
        ]);
        let matcher = SpanMatcher::with_default_strategies();
        let (matches, strategy) = matcher.find_matching_spans(&spec("createOrder"), &store);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].span_id, "s2");
        assert_eq!(strategy, Some("span-name"));
    }

    #[test]
    fn test_operation_name_attribute_fallback() {
        let store = store(vec![
            span("root", "other", &[]),
            span("s2", "also-other", &[("operation.name", "createOrder")]),
        ]);
        let matcher = SpanMatcher::with_default_strategies();
        let (matches, strategy) = matcher.find_matching_spans(&spec("createOrder"), &store);
        assert_eq!(matches.len(), 1);
        assert_eq!(strategy, Some("attribute(operation.name)"));
    }

    #[test]
    fn test_no_match() {
        let store = store(vec![span("root", "other", &[])]);
        let matcher = SpanMatcher::with_default_strategies();
        let (matches, strategy) = matcher.find_matching_spans(&spec("nonExistent"), &store);
        assert!(matches.is_empty());
        assert!(strategy.is_none());
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let store = store(vec![
            span("root", "entry", &[]),
            span("b", "work", &[(OPERATION_ID_ATTR, "work")]),
            span("a", "work", &[(OPERATION_ID_ATTR, "work")]),
        ]);
        let matcher = SpanMatcher::with_default_strategies();
        let (matches, _) = matcher.find_matching_spans(&spec("work"), &store);
        let ids: Vec<&str> = matches.iter().map(|s| s.span_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_custom_strategy_priority() {
        struct EverythingStrategy;
        impl MatchStrategy for EverythingStrategy {
            fn name(&self) -> &str {
                "everything"
            }
            fn priority(&self) -> i32 {
                200
            }
            fn find_matches(&self, _spec: &ServiceSpec, store: &TraceStore) -> Vec<Arc<Span>> {
                store.all_spans()
            }
        }

        let store = store(vec![span("root", "x", &[])]);
        let mut matcher = SpanMatcher::with_default_strategies();
        matcher.register(Box::new(EverythingStrategy));
        assert_eq!(matcher.strategy_names()[0], "everything");

        let (matches, strategy) = matcher.find_matching_spans(&spec("anything"), &store);
        assert_eq!(matches.len(), 1);
        assert_eq!(strategy, Some("everything"));
    }

    #[test]
    fn test_non_string_operation_attribute_ignored() {
        let mut s = span("root", "x", &[]);
        s.attributes.insert("operation.name".to_string(), json!(42));
        let store = store(vec![s]);
        let matcher = SpanMatcher::with_default_strategies();
        let (matches, _) = matcher.find_matching_spans(&spec("42"), &store);
        assert!(matches.is_empty());
    }
}
