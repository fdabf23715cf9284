//! Indexed trace storage
//!
//! [`TraceData`] owns the decoded spans of one trace plus the parent/child
//! tree; [`TraceStore`] wraps it behind a reader/writer lock with three
//! derived indexes (span id, span name, `operation.id` attribute) that are
//! rebuilt atomically whenever new trace data is installed.

use crate::span::{Span, OPERATION_ID_ATTR};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceDataError {
    #[error("no root span found (all spans have parents)")]
    NoRootSpan,

    #[error("duplicate span id {0:?}")]
    DuplicateSpanId(String),
}

/// A node in the parent/child span tree
///
/// Children are ordered by discovery order in the input document.
#[derive(Debug, Clone)]
pub struct SpanNode {
    pub span: Arc<Span>,
    pub children: Vec<SpanNode>,
}

impl SpanNode {
    /// Number of nodes in this subtree, including self
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(SpanNode::size).sum::<usize>()
    }

    /// Depth-first search for a span id within this subtree
    pub fn find(&self, span_id: &str) -> Option<&SpanNode> {
        if self.span.span_id == span_id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(span_id))
    }
}

/// One decoded trace: span map, discovery order, root, and tree
///
/// An empty span set is valid and carries no root and no tree. A non-empty
/// set with no parentless span is an error. With multiple candidate roots
/// the first encountered wins; spans under other roots stay queryable
/// through the flat map but do not appear under `span_tree`.
#[derive(Debug, Clone, Default)]
pub struct TraceData {
    pub trace_id: String,
    pub spans: HashMap<String, Arc<Span>>,
    /// Span ids in input-document discovery order
    pub span_order: Vec<String>,
    pub root_span: Option<Arc<Span>>,
    pub span_tree: Option<SpanNode>,
}

impl TraceData {
    /// Empty trace: no spans, no root, no tree, no error
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// Build trace data from spans in discovery order
    ///
    /// Two passes: collect candidate roots (empty parent id), then attach
    /// every span with a known parent to that parent's child list. Edges to
    /// parents absent from the map are ignored silently.
    pub fn from_spans(spans: Vec<Span>) -> Result<Self, TraceDataError> {
        if spans.is_empty() {
            return Ok(Self::empty());
        }

        let trace_id = spans[0].trace_id.clone();
        let mut map: HashMap<String, Arc<Span>> = HashMap::with_capacity(spans.len());
        let mut span_order = Vec::with_capacity(spans.len());
        let mut root_id: Option<String> = None;

        for span in spans {
            if map.contains_key(&span.span_id) {
                return Err(TraceDataError::DuplicateSpanId(span.span_id));
            }
            if span.is_root() && root_id.is_none() {
                root_id = Some(span.span_id.clone());
            }
            span_order.push(span.span_id.clone());
            map.insert(span.span_id.clone(), Arc::new(span));
        }

        let Some(root_id) = root_id else {
            return Err(TraceDataError::NoRootSpan);
        };

        // Child lists keyed by parent id, kept in discovery order.
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for span_id in &span_order {
            let span = &map[span_id.as_str()];
            if !span.is_root() && map.contains_key(span.parent_id.as_str()) {
                children
                    .entry(span.parent_id.as_str())
                    .or_default()
                    .push(span_id.as_str());
            }
        }

        let span_tree = build_node(&root_id, &map, &children);
        let root_span = map.get(&root_id).cloned();

        Ok(Self {
            trace_id,
            spans: map,
            span_order,
            root_span,
            span_tree: Some(span_tree),
        })
    }
}

fn build_node(
    span_id: &str,
    map: &HashMap<String, Arc<Span>>,
    children: &HashMap<&str, Vec<&str>>,
) -> SpanNode {
    let child_nodes = children
        .get(span_id)
        .map(|ids| {
            ids.iter()
                .map(|child_id| build_node(child_id, map, children))
                .collect()
        })
        .unwrap_or_default();
    SpanNode {
        span: Arc::clone(&map[span_id]),
        children: child_nodes,
    }
}

#[derive(Debug, Default)]
struct StoreIndexes {
    name_index: HashMap<String, Vec<Arc<Span>>>,
    operation_index: HashMap<String, Vec<Arc<Span>>>,
}

impl StoreIndexes {
    fn build(data: &TraceData) -> Self {
        let mut indexes = Self::default();
        for span_id in &data.span_order {
            let Some(span) = data.spans.get(span_id) else {
                continue;
            };
            indexes
                .name_index
                .entry(span.name.clone())
                .or_default()
                .push(Arc::clone(span));
            if let Some(Value::String(op)) = span.attribute(OPERATION_ID_ATTR) {
                indexes
                    .operation_index
                    .entry(op.clone())
                    .or_default()
                    .push(Arc::clone(span));
            }
        }
        indexes
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    data: TraceData,
    indexes: StoreIndexes,
}

/// Concurrency-safe query facade over one trace
///
/// All query methods take the read lock; `set_trace_data` swaps the data
/// and rebuilds every index under the write lock so readers never observe
/// a half-built state.
#[derive(Debug, Default)]
pub struct TraceStore {
    inner: RwLock<StoreInner>,
}

impl TraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store directly from trace data
    pub fn with_data(data: TraceData) -> Self {
        let store = Self::new();
        store.set_trace_data(data);
        store
    }

    /// Install new trace data, rebuilding all indexes atomically
    pub fn set_trace_data(&self, data: TraceData) {
        let indexes = StoreIndexes::build(&data);
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.data = data;
        inner.indexes = indexes;
    }

    pub fn find_span_by_id(&self, span_id: &str) -> Option<Arc<Span>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.data.spans.get(span_id).cloned()
    }

    /// Spans with the given name, in input discovery order
    pub fn find_spans_by_name(&self, name: &str) -> Vec<Arc<Span>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .indexes
            .name_index
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Spans whose `operation.id` attribute equals the given id
    pub fn find_spans_by_operation_id(&self, operation_id: &str) -> Vec<Arc<Span>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .indexes
            .operation_index
            .get(operation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn root_span(&self) -> Option<Arc<Span>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.data.root_span.clone()
    }

    /// All spans in input discovery order
    pub fn all_spans(&self) -> Vec<Arc<Span>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .data
            .span_order
            .iter()
            .filter_map(|id| inner.data.spans.get(id).cloned())
            .collect()
    }

    pub fn span_count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.data.span_count()
    }

    pub fn trace_id(&self) -> String {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.data.trace_id.clone()
    }

    /// Root span id and name, for evaluation contexts
    pub fn root_summary(&self) -> Option<(String, String)> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .data
            .root_span
            .as_ref()
            .map(|root| (root.span_id.clone(), root.name.clone()))
    }

    /// A clone of the parent/child tree, for renderers
    pub fn span_tree(&self) -> Option<SpanNode> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.data.span_tree.clone()
    }
}
