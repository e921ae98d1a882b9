//! Sequence Graph Compiler.
//!
//! Turns one [`PatternSpec`] into an executable automaton: every spec node is
//! classified (START, END, ELEMENT, ROUTING), edges are copied verbatim with
//! their bypass flag, and the result is validated so that structural problems
//! surface here rather than while tokens are flowing.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use crate::constants::CONSTRUCTION_REF;
use crate::error::{Error, Result, ValidationIssue};
use crate::spec::{PatternSpec, SpecNodeKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeqNodeKind {
    Start,
    End,
    Element,
    Routing,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeqNode {
    pub id: String,
    pub kind: SeqNodeKind,
    pub element_type: Option<String>,
    pub element_value: Option<String>,
}

impl SeqNode {
    /// Referenced pattern name, if this element stands for a sub-pattern.
    pub fn construction_ref(&self) -> Option<&str> {
        if self.kind == SeqNodeKind::Element
            && self.element_type.as_deref() == Some(CONSTRUCTION_REF)
        {
            self.element_value.as_deref()
        } else {
            None
        }
    }

    /// Token type this node consumes. For a construction reference this is
    /// the referenced pattern's name.
    pub fn match_type(&self) -> Option<&str> {
        if self.kind != SeqNodeKind::Element {
            return None;
        }
        self.construction_ref().or(self.element_type.as_deref())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeqEdge {
    pub from: String,
    pub to: String,
    pub bypass: bool,
}

/// Listener positions reachable without consuming a token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Closure<N> {
    /// ELEMENT nodes in discovery order.
    pub elements: Vec<N>,
    /// Whether END was reached.
    pub reaches_end: bool,
}

/// Breadth-first epsilon-closure shared by sequence and unified graphs.
///
/// START and ROUTING nodes pass through on every outgoing edge. An ELEMENT is
/// collected and only its bypass edges are followed. END stops traversal.
pub(crate) fn epsilon_closure<N, I, K, E>(seeds: I, kind: K, edges: E) -> Closure<N>
where
    N: Copy + Ord,
    I: IntoIterator<Item = N>,
    K: Fn(N) -> SeqNodeKind,
    E: Fn(N) -> Vec<(N, bool)>,
{
    let mut closure = Closure {
        elements: Vec::new(),
        reaches_end: false,
    };
    let mut visited = BTreeSet::new();
    let mut queue: VecDeque<N> = seeds.into_iter().collect();

    while let Some(node) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }
        match kind(node) {
            SeqNodeKind::End => closure.reaches_end = true,
            SeqNodeKind::Element => {
                closure.elements.push(node);
                queue.extend(edges(node).into_iter().filter(|(_, b)| *b).map(|(n, _)| n));
            }
            SeqNodeKind::Start | SeqNodeKind::Routing => {
                queue.extend(edges(node).into_iter().map(|(n, _)| n));
            }
        }
    }

    closure
}

/// Compiled, validated automaton for one pattern.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceGraph {
    pub id: String,
    pub nodes: BTreeMap<String, SeqNode>,
    pub edges: Vec<SeqEdge>,
    pub start_id: String,
    pub end_id: String,
    #[serde(skip)]
    outgoing: BTreeMap<String, Vec<usize>>,
}

impl SequenceGraph {
    /// Compile and validate `spec` under the pattern name `name`.
    pub fn build(name: &str, spec: &PatternSpec) -> Result<Self> {
        let invalid = |issue| Error::GraphValidation {
            pattern: name.to_string(),
            issue,
        };

        let starts: Vec<String> = keys_of_kind(spec, SpecNodeKind::Start);
        let ends: Vec<String> = keys_of_kind(spec, SpecNodeKind::End);
        let start_id = match starts.as_slice() {
            [] => return Err(invalid(ValidationIssue::MissingStart)),
            [only] => only.clone(),
            _ => return Err(invalid(ValidationIssue::DuplicateStart(starts.clone()))),
        };
        let end_id = match ends.as_slice() {
            [] => return Err(invalid(ValidationIssue::MissingEnd)),
            [only] => only.clone(),
            _ => return Err(invalid(ValidationIssue::DuplicateEnd(ends.clone()))),
        };

        let mut nodes = BTreeMap::new();
        for (key, node) in &spec.nodes {
            let kind = match node.kind {
                SpecNodeKind::Start => SeqNodeKind::Start,
                SpecNodeKind::End => SeqNodeKind::End,
                SpecNodeKind::Element if node.element_type.is_some() => SeqNodeKind::Element,
                SpecNodeKind::Element | SpecNodeKind::Routing => SeqNodeKind::Routing,
            };
            let seq = SeqNode {
                id: key.clone(),
                kind,
                element_type: node.element_type.clone(),
                element_value: node.element_value.clone(),
            };
            if kind == SeqNodeKind::Element
                && seq.element_type.as_deref() == Some(CONSTRUCTION_REF)
                && seq.element_value.is_none()
            {
                return Err(invalid(ValidationIssue::MissingReference(key.clone())));
            }
            nodes.insert(key.clone(), seq);
        }

        let mut edges = Vec::with_capacity(spec.edges.len());
        let mut outgoing: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for edge in &spec.edges {
            if !nodes.contains_key(&edge.from) || !nodes.contains_key(&edge.to) {
                return Err(invalid(ValidationIssue::DanglingEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                }));
            }
            outgoing.entry(edge.from.clone()).or_default().push(edges.len());
            edges.push(SeqEdge {
                from: edge.from.clone(),
                to: edge.to.clone(),
                bypass: edge.bypass,
            });
        }

        let graph = Self {
            id: name.to_string(),
            nodes,
            edges,
            start_id,
            end_id,
            outgoing,
        };

        let reachable = graph.reachable_from(&graph.start_id);
        if let Some(orphan) = graph.nodes.keys().find(|k| !reachable.contains(k.as_str())) {
            return Err(invalid(ValidationIssue::Unreachable(orphan.clone())));
        }
        if let Some(dead) = graph
            .nodes
            .keys()
            .find(|k| !graph.reachable_from(k).contains(graph.end_id.as_str()))
        {
            return Err(invalid(ValidationIssue::DeadEnd(dead.clone())));
        }

        Ok(graph)
    }

    pub fn node(&self, id: &str) -> Option<&SeqNode> {
        self.nodes.get(id)
    }

    /// Outgoing edges of `id` in declaration order.
    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &SeqEdge> {
        self.outgoing
            .get(id)
            .into_iter()
            .flat_map(|idxs| idxs.iter().map(|&i| &self.edges[i]))
    }

    /// Successor node ids of `id`, deduplicated, in edge order.
    pub fn successors(&self, id: &str) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.outgoing(id)
            .map(|e| e.to.as_str())
            .filter(|to| seen.insert(*to))
            .collect()
    }

    /// Epsilon-closure starting at the given nodes.
    pub fn epsilon_closure<'a>(&'a self, from: &[&'a str]) -> Closure<&'a str> {
        epsilon_closure(
            from.iter().copied(),
            |id| self.nodes.get(id).map_or(SeqNodeKind::Routing, |n| n.kind),
            |id| self.outgoing(id).map(|e| (e.to.as_str(), e.bypass)).collect(),
        )
    }

    /// Elements awaiting a token at position 0.
    pub fn entry_closure(&self) -> Closure<&str> {
        self.epsilon_closure(&[self.start_id.as_str()])
    }

    /// Closure reached after `id` consumes its token.
    pub fn closure_after(&self, id: &str) -> Closure<&str> {
        let next = self.successors(id);
        self.epsilon_closure(&next)
    }

    pub fn element_nodes(&self) -> impl Iterator<Item = &SeqNode> {
        self.nodes.values().filter(|n| n.kind == SeqNodeKind::Element)
    }

    /// `(node id, referenced pattern)` for every construction reference.
    pub fn construction_refs(&self) -> Vec<(&str, &str)> {
        self.element_nodes()
            .filter_map(|n| n.construction_ref().map(|r| (n.id.as_str(), r)))
            .collect()
    }

    fn reachable_from<'a>(&'a self, from: &'a str) -> BTreeSet<&'a str> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            queue.extend(self.outgoing(id).map(|e| e.to.as_str()));
        }
        seen
    }
}

fn keys_of_kind(spec: &PatternSpec, kind: SpecNodeKind) -> Vec<String> {
    spec.nodes
        .iter()
        .filter(|(_, n)| n.kind == kind)
        .map(|(k, _)| k.clone())
        .collect()
}
