//! Result Tree Builder.
//!
//! Replays a session's event log into parse trees. Every COMPLETE event owns
//! one tree: its children are the FIREs on the completion's cause chain, in
//! stream order, where a CONSTRUCTION_REF firing is replaced by the tree of
//! the sub-pattern completion it consumed.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::rc::Rc;

use serde::Serialize;

use crate::engine::{EventId, EventKind, ParseEvent};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Terminal {
    pub element_type: String,
    pub element_value: String,
    pub position: u64,
    /// Local node id that consumed the token.
    pub node: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultChild {
    /// Shared with every other tree that consumed the same completion.
    Node(Rc<ResultNode>),
    Terminal(Terminal),
}

/// One recognised construction spanning ticks `start..=end`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultNode {
    pub pattern: String,
    pub start: u64,
    pub end: u64,
    /// The COMPLETE event this tree was built from.
    pub event: EventId,
    pub children: Vec<ResultChild>,
}

impl ResultNode {
    /// Number of tokens covered.
    pub fn span_len(&self) -> u64 {
        self.end + 1 - self.start
    }

    /// Leaves in stream order.
    pub fn terminals(&self) -> Vec<&Terminal> {
        let mut out = Vec::new();
        self.collect_terminals(&mut out);
        out
    }

    fn collect_terminals<'a>(&'a self, out: &mut Vec<&'a Terminal>) {
        for child in &self.children {
            match child {
                ResultChild::Node(node) => node.collect_terminals(out),
                ResultChild::Terminal(t) => out.push(t),
            }
        }
    }

    /// Completion events of every nested construction, at any depth.
    pub fn descendant_events(&self) -> Vec<EventId> {
        let mut out = Vec::new();
        let mut stack: Vec<&ResultNode> = vec![self];
        while let Some(node) = stack.pop() {
            for child in &node.children {
                if let ResultChild::Node(sub) = child {
                    out.push(sub.event);
                    stack.push(sub);
                }
            }
        }
        out
    }

    /// Indented text rendering, one line per node.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        let _ = writeln!(out, "{pad}{} [{}..{}]", self.pattern, self.start, self.end);
        for child in &self.children {
            match child {
                ResultChild::Node(node) => node.render_into(out, depth + 1),
                ResultChild::Terminal(t) => {
                    let _ = writeln!(
                        out,
                        "{pad}  {} {:?} @{}",
                        t.element_type, t.element_value, t.position
                    );
                }
            }
        }
    }
}

/// Which trees to return from a session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeQuery {
    /// Keep only roots of this pattern.
    pub pattern: Option<String>,
    /// Return at most this many roots, in log order.
    pub limit: Option<usize>,
    /// Drop roots that appear nested inside any other root.
    pub maximal_only: bool,
    /// Drop roots covering fewer tokens than this.
    pub min_span: u64,
}

impl TreeQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_pattern(pattern: &str) -> Self {
        Self {
            pattern: Some(pattern.to_string()),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn maximal(mut self) -> Self {
        self.maximal_only = true;
        self
    }

    pub fn with_min_span(mut self, min_span: u64) -> Self {
        self.min_span = min_span;
        self
    }
}

pub struct ResultTreeBuilder;

impl ResultTreeBuilder {
    /// Trees for every COMPLETE event, in log order, memoised by event id.
    /// A sub-tree is built once and shared by every parent that consumed it.
    pub fn build_all(events: &[ParseEvent]) -> Vec<ResultNode> {
        let by_id: HashMap<EventId, &ParseEvent> = events.iter().map(|e| (e.id, e)).collect();
        let mut memo: HashMap<EventId, Rc<ResultNode>> = HashMap::new();
        let mut trees = Vec::new();

        for event in events.iter().filter(|e| e.kind == EventKind::Complete) {
            let tree = Rc::new(Self::assemble(event, &by_id, &memo));
            memo.insert(event.id, Rc::clone(&tree));
            trees.push(tree);
        }
        drop(memo);
        trees.into_iter().map(Rc::unwrap_or_clone).collect()
    }

    /// Root trees: every completion except those nested inside another
    /// completion that ends at the same position.
    pub fn build(events: &[ParseEvent]) -> Vec<ResultNode> {
        let trees = Self::build_all(events);
        let mut covered: HashSet<EventId> = HashSet::new();
        for tree in &trees {
            for child in &tree.children {
                match child {
                    ResultChild::Node(sub) if sub.end == tree.end => {
                        covered.insert(sub.event);
                    }
                    _ => {}
                }
            }
        }
        trees
            .into_iter()
            .filter(|t| !covered.contains(&t.event))
            .collect()
    }

    pub fn query(events: &[ParseEvent], query: &TreeQuery) -> Vec<ResultNode> {
        let mut roots = Self::build(events);

        if query.maximal_only {
            let nested: HashSet<EventId> =
                roots.iter().flat_map(|r| r.descendant_events()).collect();
            roots.retain(|r| !nested.contains(&r.event));
        }
        if let Some(pattern) = &query.pattern {
            roots.retain(|r| &r.pattern == pattern);
        }
        if query.min_span > 0 {
            roots.retain(|r| r.span_len() >= query.min_span);
        }
        if let Some(limit) = query.limit {
            roots.truncate(limit);
        }
        roots
    }

    fn assemble(
        complete: &ParseEvent,
        by_id: &HashMap<EventId, &ParseEvent>,
        memo: &HashMap<EventId, Rc<ResultNode>>,
    ) -> ResultNode {
        let mut chain = Vec::new();
        let mut cursor = complete.cause;
        while let Some(id) = cursor {
            let Some(fire) = by_id.get(&id) else { break };
            chain.push(*fire);
            cursor = fire.cause;
        }
        chain.reverse();

        let children = chain
            .into_iter()
            .map(|fire| match fire.sub_event.and_then(|sub| memo.get(&sub)) {
                Some(sub) => ResultChild::Node(Rc::clone(sub)),
                None => ResultChild::Terminal(Terminal {
                    element_type: fire.element_type.clone().unwrap_or_default(),
                    element_value: fire.element_value.clone().unwrap_or_default(),
                    position: fire.time,
                    node: fire.node.clone(),
                }),
            })
            .collect();

        ResultNode {
            pattern: complete.pattern.clone(),
            start: complete.start,
            end: complete.time,
            event: complete.id,
            children,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::too_many_arguments)]
    fn fire(
        id: usize,
        time: u64,
        start: u64,
        pattern: &str,
        node: &str,
        ty: &str,
        value: &str,
        cause: Option<usize>,
    ) -> ParseEvent {
        ParseEvent {
            id: EventId(id),
            time,
            start,
            pattern: pattern.into(),
            node: node.into(),
            kind: EventKind::Fire,
            element_type: Some(ty.into()),
            element_value: Some(value.into()),
            cause: cause.map(EventId),
            sub_event: None,
        }
    }

    fn complete(id: usize, time: u64, start: u64, pattern: &str, cause: usize) -> ParseEvent {
        ParseEvent {
            id: EventId(id),
            time,
            start,
            pattern: pattern.into(),
            node: "end".into(),
            kind: EventKind::Complete,
            element_type: None,
            element_value: None,
            cause: Some(EventId(cause)),
            sub_event: None,
        }
    }

    /// REF over "the cat", then WRAP := @REF completing in the same tick.
    fn nested_log() -> Vec<ParseEvent> {
        let mut wrap = fire(3, 2, 1, "WRAP", "e0", "CONSTRUCTION_REF", "REF", None);
        wrap.sub_event = Some(EventId(2));
        vec![
            fire(0, 1, 1, "REF", "e0", "DET", "the", None),
            fire(1, 2, 1, "REF", "e1", "NOUN", "cat", Some(0)),
            complete(2, 2, 1, "REF", 1),
            wrap,
            complete(4, 2, 1, "WRAP", 3),
        ]
    }

    #[test]
    fn test_children_follow_cause_chain() {
        let trees = ResultTreeBuilder::build_all(&nested_log());
        assert_eq!(trees.len(), 2);
        let reference = &trees[0];
        assert_eq!(reference.pattern, "REF");
        assert_eq!(reference.span_len(), 2);
        let values: Vec<&str> = reference
            .terminals()
            .iter()
            .map(|t| t.element_value.as_str())
            .collect();
        assert_eq!(values, vec!["the", "cat"]);
    }

    #[test]
    fn test_same_end_child_is_not_root() {
        let roots = ResultTreeBuilder::build(&nested_log());
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].pattern, "WRAP");
        match &roots[0].children[0] {
            ResultChild::Node(sub) => assert_eq!(sub.pattern, "REF"),
            other => panic!("expected nested REF, got {other:?}"),
        }
        assert_eq!(roots[0].terminals().len(), 2);
    }

    #[test]
    fn test_shared_completion_is_built_once() {
        // Two patterns consume the same REF completion.
        let mut log = nested_log();
        let mut other = fire(5, 2, 1, "PAIR", "e0", "CONSTRUCTION_REF", "REF", None);
        other.sub_event = Some(EventId(2));
        log.push(other);
        log.push(complete(6, 2, 1, "PAIR", 5));

        let trees = ResultTreeBuilder::build_all(&log);
        assert_eq!(trees.len(), 3);
        match (&trees[1].children[0], &trees[2].children[0]) {
            (ResultChild::Node(a), ResultChild::Node(b)) => {
                assert!(Rc::ptr_eq(a, b));
                assert_eq!(a.event, EventId(2));
            }
            other => panic!("expected shared REF subtree, got {other:?}"),
        }
    }

    #[test]
    fn test_left_recursive_chain_nests_each_level() {
        // LIST := ITEM | @LIST ITEM over three items.
        let mut log = vec![
            fire(0, 1, 1, "LIST", "item", "ITEM", "a", None),
            complete(1, 1, 1, "LIST", 0),
        ];
        let mut id = 2;
        for time in 2..=3 {
            let mut reference =
                fire(id, time - 1, 1, "LIST", "rec", "CONSTRUCTION_REF", "LIST", None);
            reference.sub_event = Some(EventId(id - 1));
            let item = fire(id + 1, time, 1, "LIST", "tail", "ITEM", "x", Some(id));
            log.extend([reference, item, complete(id + 2, time, 1, "LIST", id + 1)]);
            id += 3;
        }

        let trees = ResultTreeBuilder::build_all(&log);
        let outer = trees.last().unwrap();
        assert_eq!((outer.start, outer.end), (1, 3));
        assert_eq!(outer.descendant_events(), vec![EventId(4), EventId(1)]);
        assert_eq!(outer.terminals().len(), 3);
    }

    #[test]
    fn test_query_filters_and_limits() {
        let log = vec![
            fire(0, 1, 1, "N", "e0", "NOUN", "a", None),
            complete(1, 1, 1, "N", 0),
            fire(2, 2, 2, "N", "e0", "NOUN", "b", None),
            complete(3, 2, 2, "N", 2),
        ];
        assert_eq!(ResultTreeBuilder::query(&log, &TreeQuery::all()).len(), 2);
        let first = ResultTreeBuilder::query(&log, &TreeQuery::for_pattern("N").with_limit(1));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].start, 1);
        assert!(ResultTreeBuilder::query(&log, &TreeQuery::for_pattern("X")).is_empty());
        assert!(ResultTreeBuilder::query(&log, &TreeQuery::all().with_min_span(2)).is_empty());
    }

    #[test]
    fn test_render_indents_children() {
        let roots = ResultTreeBuilder::build(&nested_log());
        let text = roots[0].render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "WRAP [1..2]");
        assert_eq!(lines[1], "  REF [1..2]");
        assert_eq!(lines[2], "    DET \"the\" @1");
    }

    #[test]
    fn test_child_serializes_with_kind_tag() {
        let roots = ResultTreeBuilder::build(&nested_log());
        let json = serde_json::to_value(&roots[0]).unwrap();
        assert_eq!(json["children"][0]["kind"], "NODE");
        assert_eq!(json["children"][0]["children"][0]["kind"], "TERMINAL");
        assert_eq!(json["children"][0]["children"][0]["elementType"], "DET");
    }
}
