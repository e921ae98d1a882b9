//! Unified Graph Composer.
//!
//! Merges compiled sequence graphs into one arena with a shared entry point,
//! per-pattern completion nodes and CONSTRUCTION_REF cross edges. A completed
//! pattern X then behaves like one consumed element inside every pattern that
//! references X, which is what makes grammars compositional and recursive.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::constants::{GLOBAL_START, KEY_SEPARATOR, PATTERN_NODE_PREFIX};
use crate::error::{Error, Result};
use crate::graph::{Closure, SeqNodeKind, SequenceGraph, epsilon_closure};
use crate::spec::PatternSet;

/// Dense index of a node in a [`UnifiedGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeIdx(pub u32);

impl NodeIdx {
    fn at(i: usize) -> Self {
        NodeIdx(i as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnifiedNodeKind {
    GlobalStart,
    Start,
    End,
    Element,
    Routing,
    /// Fires when the owning pattern's END fires.
    Pattern,
}

impl UnifiedNodeKind {
    fn closure_kind(self) -> SeqNodeKind {
        match self {
            UnifiedNodeKind::GlobalStart | UnifiedNodeKind::Start => SeqNodeKind::Start,
            UnifiedNodeKind::End | UnifiedNodeKind::Pattern => SeqNodeKind::End,
            UnifiedNodeKind::Element => SeqNodeKind::Element,
            UnifiedNodeKind::Routing => SeqNodeKind::Routing,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedNode {
    /// Pattern-qualified key, unique across the graph.
    pub key: String,
    pub kind: UnifiedNodeKind,
    /// Owning pattern's index in registration order; `None` for GLOBAL_START.
    pub pattern: Option<usize>,
    /// Node id inside the owning sequence graph.
    pub local_id: String,
    pub element_type: Option<String>,
    pub element_value: Option<String>,
    /// Referenced pattern for CONSTRUCTION_REF elements.
    pub reference: Option<String>,
}

impl UnifiedNode {
    /// Token type consumed by this node, with references matching the
    /// referenced pattern's name.
    pub fn match_type(&self) -> Option<&str> {
        if self.kind != UnifiedNodeKind::Element {
            return None;
        }
        self.reference.as_deref().or(self.element_type.as_deref())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Sequence,
    Bypass,
    /// GLOBAL_START -> pattern START.
    Entry,
    /// Pattern END -> PATTERN node.
    Completion,
    /// PATTERN(X) -> element referencing X.
    ConstructionRef,
}

impl EdgeKind {
    fn is_internal(self) -> bool {
        matches!(self, EdgeKind::Sequence | EdgeKind::Bypass)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct UnifiedEdge {
    pub from: NodeIdx,
    pub to: NodeIdx,
    pub kind: EdgeKind,
}

/// Per-pattern bookkeeping, in registration order.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternInfo {
    pub name: String,
    pub start: NodeIdx,
    pub end: NodeIdx,
    pub pattern_node: NodeIdx,
    /// ELEMENT nodes awaiting a token at the pattern's first position.
    pub entry_nodes: Vec<NodeIdx>,
    /// START reaches END without consuming anything.
    pub accepts_empty: bool,
}

/// Single namespace of nodes and edges across all registered patterns.
#[derive(Clone, Debug, Default)]
pub struct UnifiedGraph {
    nodes: Vec<UnifiedNode>,
    edges: Vec<UnifiedEdge>,
    outgoing: Vec<Vec<usize>>,
    patterns: Vec<PatternInfo>,
    by_key: HashMap<String, NodeIdx>,
    /// Per pattern, local node id -> index. PATTERN nodes are not listed.
    locals: Vec<HashMap<String, NodeIdx>>,
    by_pattern: HashMap<String, usize>,
    global_start: Option<NodeIdx>,
}

impl UnifiedGraph {
    pub fn node(&self, idx: NodeIdx) -> &UnifiedNode {
        &self.nodes[idx.index()]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[UnifiedEdge] {
        &self.edges
    }

    pub fn patterns(&self) -> &[PatternInfo] {
        &self.patterns
    }

    pub fn pattern_index(&self, name: &str) -> Option<usize> {
        self.by_pattern.get(name).copied()
    }

    pub fn pattern(&self, name: &str) -> Option<&PatternInfo> {
        self.pattern_index(name).map(|i| &self.patterns[i])
    }

    /// GLOBAL_START, present only on composed graphs.
    pub fn global_start(&self) -> Option<NodeIdx> {
        self.global_start
    }

    pub fn is_composed(&self) -> bool {
        self.global_start.is_some()
    }

    /// Look up a sequence node or GLOBAL_START by its qualified key.
    pub fn find_key(&self, key: &str) -> Option<NodeIdx> {
        self.by_key.get(key).copied()
    }

    /// Look up a node by pattern name and local node id.
    pub fn find(&self, pattern: &str, local_id: &str) -> Option<NodeIdx> {
        let pattern = self.pattern_index(pattern)?;
        self.locals[pattern].get(local_id).copied()
    }

    /// Pattern name -> PATTERN node key.
    pub fn pattern_node_ids(&self) -> BTreeMap<&str, &str> {
        self.patterns
            .iter()
            .map(|p| (p.name.as_str(), self.node(p.pattern_node).key.as_str()))
            .collect()
    }

    /// Pattern name -> keys of its entry ELEMENT nodes.
    pub fn pattern_entry_nodes(&self) -> BTreeMap<&str, Vec<&str>> {
        self.patterns
            .iter()
            .map(|p| {
                let keys = p
                    .entry_nodes
                    .iter()
                    .map(|&n| self.node(n).key.as_str())
                    .collect();
                (p.name.as_str(), keys)
            })
            .collect()
    }

    /// Outgoing edges of `idx` in insertion order.
    pub fn outgoing(&self, idx: NodeIdx) -> impl Iterator<Item = &UnifiedEdge> {
        self.outgoing[idx.index()].iter().map(|&e| &self.edges[e])
    }

    /// Epsilon-closure over pattern-internal edges.
    pub fn closure_from(&self, seeds: &[NodeIdx]) -> Closure<NodeIdx> {
        epsilon_closure(
            seeds.iter().copied(),
            |n| self.node(n).kind.closure_kind(),
            |n| {
                self.outgoing(n)
                    .filter(|e| e.kind.is_internal())
                    .map(|e| (e.to, e.kind == EdgeKind::Bypass))
                    .collect()
            },
        )
    }

    /// Closure reached after `idx` has fired.
    pub fn closure_after_fire(&self, idx: NodeIdx) -> Closure<NodeIdx> {
        let mut next: Vec<NodeIdx> = Vec::new();
        for edge in self.outgoing(idx).filter(|e| e.kind.is_internal()) {
            if !next.contains(&edge.to) {
                next.push(edge.to);
            }
        }
        self.closure_from(&next)
    }

    /// Elements fed by completions of the pattern at `pattern` index.
    pub fn ref_targets(&self, pattern: usize) -> Vec<NodeIdx> {
        let pattern_node = self.patterns[pattern].pattern_node;
        self.outgoing(pattern_node)
            .filter(|e| e.kind == EdgeKind::ConstructionRef)
            .map(|e| e.to)
            .collect()
    }

    pub fn edge_count(&self, kind: EdgeKind) -> usize {
        self.edges.iter().filter(|e| e.kind == kind).count()
    }

    /// Embed a compiled graph under its pattern-qualified namespace and
    /// return its pattern index.
    fn embed(&mut self, graph: &SequenceGraph) -> Result<usize> {
        if self.by_pattern.contains_key(&graph.id) {
            return Err(Error::DuplicatePattern(graph.id.clone()));
        }
        let pattern = self.patterns.len();

        let mut local: HashMap<String, NodeIdx> = HashMap::new();
        for node in graph.nodes.values() {
            let kind = match node.kind {
                SeqNodeKind::Start => UnifiedNodeKind::Start,
                SeqNodeKind::End => UnifiedNodeKind::End,
                SeqNodeKind::Element => UnifiedNodeKind::Element,
                SeqNodeKind::Routing => UnifiedNodeKind::Routing,
            };
            let idx = self.add_keyed_node(UnifiedNode {
                key: qualified(&graph.id, &node.id),
                kind,
                pattern: Some(pattern),
                local_id: node.id.clone(),
                element_type: node.element_type.clone(),
                element_value: node.element_value.clone(),
                reference: node.construction_ref().map(str::to_string),
            });
            local.insert(node.id.clone(), idx);
        }

        for edge in &graph.edges {
            let kind = if edge.bypass {
                EdgeKind::Bypass
            } else {
                EdgeKind::Sequence
            };
            self.add_edge(local[edge.from.as_str()], local[edge.to.as_str()], kind);
        }

        let start = local[&graph.start_id];
        let end = local[&graph.end_id];
        let pattern_node = self.add_node(UnifiedNode {
            key: qualified(PATTERN_NODE_PREFIX, &graph.id),
            kind: UnifiedNodeKind::Pattern,
            pattern: Some(pattern),
            local_id: graph.id.clone(),
            element_type: None,
            element_value: None,
            reference: None,
        });
        self.add_edge(end, pattern_node, EdgeKind::Completion);

        let entry = self.closure_from(&[start]);
        if entry.reaches_end {
            tracing::warn!(
                "pattern '{}' can complete without consuming a token; empty matches are ignored",
                graph.id
            );
        }

        self.by_pattern.insert(graph.id.clone(), pattern);
        self.locals.push(local);
        self.patterns.push(PatternInfo {
            name: graph.id.clone(),
            start,
            end,
            pattern_node,
            entry_nodes: entry.elements,
            accepts_empty: entry.reaches_end,
        });
        Ok(pattern)
    }

    /// Add one pattern to a live graph. With `compose` set, the pattern gets
    /// an entry edge and its references are wired to patterns already
    /// present or to itself. Nothing is added if a reference is unknown.
    pub(crate) fn attach(&mut self, graph: &SequenceGraph, compose: bool) -> Result<usize> {
        if self.by_pattern.contains_key(&graph.id) {
            return Err(Error::DuplicatePattern(graph.id.clone()));
        }
        if !compose {
            return self.embed(graph);
        }
        for (node_id, reference) in graph.construction_refs() {
            if reference != graph.id && !self.by_pattern.contains_key(reference) {
                return Err(unknown_reference(graph, node_id, reference));
            }
        }
        let global = self.ensure_global_start();
        let pattern = self.embed(graph)?;
        let start = self.patterns[pattern].start;
        self.add_edge(global, start, EdgeKind::Entry);
        self.link_references(graph)?;
        Ok(pattern)
    }

    fn ensure_global_start(&mut self) -> NodeIdx {
        if let Some(global) = self.global_start {
            return global;
        }
        let global = self.add_keyed_node(UnifiedNode {
            key: GLOBAL_START.to_string(),
            kind: UnifiedNodeKind::GlobalStart,
            pattern: None,
            local_id: GLOBAL_START.to_string(),
            element_type: None,
            element_value: None,
            reference: None,
        });
        self.global_start = Some(global);
        global
    }

    /// Add `PATTERN(X) -> element` for every reference to X in `graph`.
    fn link_references(&mut self, graph: &SequenceGraph) -> Result<()> {
        for (node_id, reference) in graph.construction_refs() {
            let Some(target) = self.pattern_index(reference) else {
                return Err(unknown_reference(graph, node_id, reference));
            };
            let from = self.patterns[target].pattern_node;
            if let Some(to) = self.find(&graph.id, node_id) {
                self.add_edge(from, to, EdgeKind::ConstructionRef);
            }
        }
        Ok(())
    }

    fn add_keyed_node(&mut self, node: UnifiedNode) -> NodeIdx {
        let idx = self.add_node(node);
        self.by_key.insert(self.nodes[idx.index()].key.clone(), idx);
        idx
    }

    fn add_node(&mut self, node: UnifiedNode) -> NodeIdx {
        let idx = NodeIdx::at(self.nodes.len());
        self.nodes.push(node);
        self.outgoing.push(Vec::new());
        idx
    }

    fn add_edge(&mut self, from: NodeIdx, to: NodeIdx, kind: EdgeKind) {
        self.outgoing[from.index()].push(self.edges.len());
        self.edges.push(UnifiedEdge { from, to, kind });
    }
}

fn qualified(pattern: &str, local_id: &str) -> String {
    format!("{pattern}{KEY_SEPARATOR}{local_id}")
}

fn unknown_reference(graph: &SequenceGraph, node: &str, reference: &str) -> Error {
    Error::UnknownPatternReference {
        pattern: graph.id.clone(),
        node: node.to_string(),
        reference: reference.to_string(),
    }
}

/// Builds [`UnifiedGraph`]s from pattern specs or compiled graphs.
pub struct UnifiedGraphComposer;

impl UnifiedGraphComposer {
    /// Compile every pattern and compose them with cross-pattern edges.
    ///
    /// Fails on the first malformed spec, or with `UnknownPatternReference`
    /// when a CONSTRUCTION_REF names a pattern missing from `patterns`.
    pub fn build(patterns: &PatternSet) -> Result<UnifiedGraph> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for (name, spec) in patterns {
            compiled.push(SequenceGraph::build(name, spec)?);
        }
        Self::compose(&compiled)
    }

    /// Compose already compiled graphs, in the given registration order.
    pub fn compose(graphs: &[SequenceGraph]) -> Result<UnifiedGraph> {
        let mut unified = UnifiedGraph::default();
        let global = unified.ensure_global_start();

        for graph in graphs {
            let pattern = unified.embed(graph)?;
            let start = unified.patterns[pattern].start;
            unified.add_edge(global, start, EdgeKind::Entry);
        }
        for graph in graphs {
            unified.link_references(graph)?;
        }

        tracing::debug!(
            patterns = unified.patterns.len(),
            nodes = unified.nodes.len(),
            cross_edges = unified.edge_count(EdgeKind::ConstructionRef),
            "composed unified graph"
        );
        Ok(unified)
    }

    /// Embed graphs side by side with no shared entry and no cross edges.
    /// Fails only when two graphs share a name.
    pub fn isolated(graphs: &[SequenceGraph]) -> Result<UnifiedGraph> {
        let mut unified = UnifiedGraph::default();
        for graph in graphs {
            unified.embed(graph)?;
        }
        Ok(unified)
    }
}
