use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::CONSTRUCTION_REF;

/// Patterns keyed by name. Name order is the registration order used for
/// deterministic tie-breaking everywhere downstream.
pub type PatternSet = BTreeMap<String, PatternSpec>;

/// Declared role of a node in a pattern spec.
///
/// Anything other than START, END or ELEMENT is a structural junction and
/// compiles to a ROUTING node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpecNodeKind {
    Start,
    End,
    Element,
    #[serde(other)]
    Routing,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecNode {
    pub kind: SpecNodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_value: Option<String>,
}

impl SpecNode {
    pub fn start() -> Self {
        Self {
            kind: SpecNodeKind::Start,
            element_type: None,
            element_value: None,
        }
    }

    pub fn end() -> Self {
        Self {
            kind: SpecNodeKind::End,
            element_type: None,
            element_value: None,
        }
    }

    pub fn routing() -> Self {
        Self {
            kind: SpecNodeKind::Routing,
            element_type: None,
            element_value: None,
        }
    }

    pub fn element(element_type: &str) -> Self {
        Self {
            kind: SpecNodeKind::Element,
            element_type: Some(element_type.to_string()),
            element_value: None,
        }
    }

    /// Element standing in for a full recognition of `pattern`.
    pub fn construction_ref(pattern: &str) -> Self {
        Self {
            kind: SpecNodeKind::Element,
            element_type: Some(CONSTRUCTION_REF.to_string()),
            element_value: Some(pattern.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecEdge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bypass: bool,
}

/// Declarative description of one named construction, as supplied by a
/// pattern store. Treated as immutable once handed to the compiler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    pub nodes: BTreeMap<String, SpecNode>,
    #[serde(default)]
    pub edges: Vec<SpecEdge>,
}

impl PatternSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_node(mut self, key: &str, node: SpecNode) -> Self {
        self.nodes.insert(key.to_string(), node);
        self
    }

    pub fn with_edge(mut self, from: &str, to: &str) -> Self {
        self.edges.push(SpecEdge {
            from: from.to_string(),
            to: to.to_string(),
            bypass: false,
        });
        self
    }

    pub fn with_bypass(mut self, from: &str, to: &str) -> Self {
        self.edges.push(SpecEdge {
            from: from.to_string(),
            to: to.to_string(),
            bypass: true,
        });
        self
    }

    /// Linear pattern `START -> e0 -> e1 -> ... -> END`.
    ///
    /// Each step is an element type, or `@NAME` for a reference to pattern
    /// `NAME`. Node keys are `start`, `e0..eN`, `end`.
    pub fn sequence(name: &str, steps: &[&str]) -> Self {
        let mut spec = Self::new(name)
            .with_node("start", SpecNode::start())
            .with_node("end", SpecNode::end());
        let mut prev = "start".to_string();
        for (i, step) in steps.iter().enumerate() {
            let key = format!("e{i}");
            let node = match step.strip_prefix('@') {
                Some(reference) => SpecNode::construction_ref(reference),
                None => SpecNode::element(step),
            };
            spec = spec.with_node(&key, node).with_edge(&prev, &key);
            prev = key;
        }
        spec.with_edge(&prev, "end")
    }

    /// Names of the patterns this spec references through CONSTRUCTION_REF elements.
    pub fn references(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = self
            .nodes
            .values()
            .filter(|n| n.kind == SpecNodeKind::Element)
            .filter(|n| n.element_type.as_deref() == Some(CONSTRUCTION_REF))
            .filter_map(|n| n.element_value.as_deref())
            .collect();
        refs.sort_unstable();
        refs.dedup();
        refs
    }
}

/// Build a [`PatternSet`] from specs, keyed by each spec's name.
/// A later spec with the same name replaces an earlier one.
pub fn pattern_set(specs: impl IntoIterator<Item = PatternSpec>) -> PatternSet {
    specs.into_iter().map(|s| (s.name.clone(), s)).collect()
}
