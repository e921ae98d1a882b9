//! Read-only views of engine and graph state for inspection and tests.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::engine::{ActivationEngine, ListenerId};
use crate::unified::{EdgeKind, UnifiedGraph, UnifiedNodeKind};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerView {
    pub id: ListenerId,
    /// Pattern-qualified node key.
    pub node: String,
    pub element_type: Option<String>,
    pub pattern: String,
    pub ready_at: u64,
    pub start: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiredNodeView {
    /// Local node id.
    pub id: String,
    pub element_type: Option<String>,
    pub timestamps: Vec<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternState {
    pub fired_nodes: Vec<FiredNodeView>,
    pub completions: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub session: String,
    pub time: u64,
    pub active_listeners: Vec<ListenerView>,
    pub pattern_states: BTreeMap<String, PatternState>,
    pub event_count: usize,
}

impl EngineSnapshot {
    pub fn capture(engine: &ActivationEngine) -> Self {
        let graph = engine.graph();
        let pattern_name = |p: Option<usize>| {
            p.map(|p| graph.patterns()[p].name.clone())
                .unwrap_or_default()
        };

        let active_listeners = engine
            .active_listeners()
            .into_iter()
            .map(|l| {
                let node = graph.node(l.node);
                ListenerView {
                    id: l.id,
                    node: node.key.clone(),
                    element_type: node.match_type().map(str::to_string),
                    pattern: graph.patterns()[l.pattern].name.clone(),
                    ready_at: l.ready_at,
                    start: l.start,
                }
            })
            .collect();

        let mut pattern_states: BTreeMap<String, PatternState> = graph
            .patterns()
            .iter()
            .map(|p| (p.name.clone(), PatternState::default()))
            .collect();
        for (idx, firings) in engine.fired_nodes() {
            let node = graph.node(idx);
            let state = pattern_states.entry(pattern_name(node.pattern)).or_default();
            if node.kind == UnifiedNodeKind::End {
                state.completions += firings.len();
                continue;
            }
            state.fired_nodes.push(FiredNodeView {
                id: node.local_id.clone(),
                element_type: node.match_type().map(str::to_string),
                timestamps: firings.iter().map(|f| f.time).collect(),
            });
        }

        Self {
            session: engine.session().to_string(),
            time: engine.time(),
            active_listeners,
            pattern_states,
            event_count: engine.events().len(),
        }
    }
}

impl ActivationEngine {
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot::capture(self)
    }
}

/// Shape of a composed graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub patterns: usize,
    pub nodes: usize,
    pub edges: BTreeMap<String, usize>,
    pub entry_nodes: BTreeMap<String, Vec<String>>,
    /// Patterns whose START reaches END without a token.
    pub empty_patterns: Vec<String>,
}

impl GraphSummary {
    pub fn of(graph: &UnifiedGraph) -> Self {
        let kinds = [
            (EdgeKind::Sequence, "sequence"),
            (EdgeKind::Bypass, "bypass"),
            (EdgeKind::Entry, "entry"),
            (EdgeKind::Completion, "completion"),
            (EdgeKind::ConstructionRef, "constructionRef"),
        ];
        Self {
            patterns: graph.patterns().len(),
            nodes: graph.node_count(),
            edges: kinds
                .iter()
                .map(|(kind, label)| (label.to_string(), graph.edge_count(*kind)))
                .collect(),
            entry_nodes: graph
                .pattern_entry_nodes()
                .into_iter()
                .map(|(p, keys)| (p.to_string(), keys.into_iter().map(str::to_string).collect()))
                .collect(),
            empty_patterns: graph
                .patterns()
                .iter()
                .filter(|p| p.accepts_empty)
                .map(|p| p.name.clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::spec::{PatternSpec, pattern_set};
    use crate::unified::UnifiedGraphComposer;

    fn grammar() -> crate::spec::PatternSet {
        pattern_set([
            PatternSpec::sequence("REF", &["DET", "NOUN"]),
            PatternSpec::sequence("CLAUSE", &["@REF", "VERB", "@REF"]),
        ])
    }

    #[test]
    fn test_snapshot_reports_histories() {
        let mut engine =
            ActivationEngine::from_patterns(&grammar(), EngineConfig::default()).unwrap();
        engine
            .process_all([("DET", "the"), ("NOUN", "cat"), ("VERB", "sat")])
            .unwrap();
        let snap = engine.snapshot();
        assert_eq!(snap.time, 3);
        let reference = &snap.pattern_states["REF"];
        assert_eq!(reference.completions, 1);
        let det = reference.fired_nodes.iter().find(|f| f.id == "e0").unwrap();
        assert_eq!(det.timestamps, vec![1]);
        let clause = &snap.pattern_states["CLAUSE"];
        let verb = clause.fired_nodes.iter().find(|f| f.id == "e1").unwrap();
        assert_eq!(verb.element_type.as_deref(), Some("VERB"));
        assert_eq!(verb.timestamps, vec![3]);
        // CLAUSE now waits on its object reference.
        assert!(
            snap.active_listeners
                .iter()
                .any(|l| l.node == "CLAUSE::e2" && l.element_type.as_deref() == Some("REF"))
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let engine = ActivationEngine::from_patterns(&grammar(), EngineConfig::default()).unwrap();
        let json = serde_json::to_value(engine.snapshot()).unwrap();
        assert_eq!(json["time"], 0);
        assert!(json["patternStates"]["REF"]["firedNodes"].is_array());
    }

    #[test]
    fn test_graph_summary_counts_edges() {
        let graph = UnifiedGraphComposer::build(&grammar()).unwrap();
        let summary = GraphSummary::of(&graph);
        assert_eq!(summary.patterns, 2);
        assert_eq!(summary.nodes, 12);
        assert_eq!(summary.edges["entry"], 2);
        assert_eq!(summary.edges["constructionRef"], 2);
        assert_eq!(summary.entry_nodes["CLAUSE"], vec!["CLAUSE::e0"]);
        assert!(summary.empty_patterns.is_empty());
    }
}
