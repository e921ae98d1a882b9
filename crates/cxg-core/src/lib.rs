//! Construction-graph recognizer.
//!
//! Grammars are sets of named construction patterns. Each pattern compiles to
//! a small graph automaton; all patterns compose into one unified graph in
//! which a completed pattern feeds the CONSTRUCTION_REF elements of others.
//! The activation engine consumes `(type, value)` tokens one at a time, keeps
//! every ambiguous interpretation alive, and logs each firing with its
//! provenance so parse trees can be rebuilt afterwards.
//!
//! Zero I/O: pattern specs come in through [`PatternStore`], results go out
//! as plain data.

pub mod constants;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod graph;
pub mod pattern_store;
pub mod serde_compat;
pub mod spec;
pub mod tree;
pub mod unified;

pub use constants::{CONSTRUCTION_REF, DEFAULT_MAX_CASCADE_DEPTH, GLOBAL_START};
pub use diagnostics::{EngineSnapshot, FiredNodeView, GraphSummary, ListenerView, PatternState};
pub use engine::{
    ActivationEngine, EngineConfig, EventId, EventKind, Firing, ListenerId, Mode, NodeRef,
    ParseEvent, TickResult,
};
pub use error::{Error, Result, ValidationIssue};
pub use graph::{Closure, SeqEdge, SeqNode, SeqNodeKind, SequenceGraph};
pub use pattern_store::{MemoryPatternStore, MissingPattern, PatternStore};
pub use serde_compat::{
    CURRENT_VERSION, export_events, export_grammar, export_trees, import_grammar,
};
pub use spec::{PatternSet, PatternSpec, SpecEdge, SpecNode, SpecNodeKind, pattern_set};
pub use tree::{ResultChild, ResultNode, ResultTreeBuilder, Terminal, TreeQuery};
pub use unified::{
    EdgeKind, NodeIdx, PatternInfo, UnifiedEdge, UnifiedGraph, UnifiedGraphComposer,
    UnifiedNode, UnifiedNodeKind,
};
