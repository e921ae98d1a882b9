//! Activation Engine.
//!
//! Consumes `(type, value)` tokens one at a time and propagates them through
//! a [`UnifiedGraph`]. Many listeners may wait on the same node at once, so
//! every ambiguous interpretation stays in flight until it fires or is
//! superseded. Each tick resolves completely before `process_input` returns,
//! including zero-width cascades where a completed pattern feeds the
//! CONSTRUCTION_REF elements of other patterns.
//!
//! Time is 1-based: while a token is processed the engine works at tick
//! `time + 1`, then `time` advances by one. After `n` tokens, `time == n`.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{CONSTRUCTION_REF, DEFAULT_MAX_CASCADE_DEPTH};
use crate::error::{Error, Result};
use crate::graph::SequenceGraph;
use crate::spec::PatternSet;
use crate::tree::{ResultNode, ResultTreeBuilder, TreeQuery};
use crate::unified::{NodeIdx, UnifiedGraph, UnifiedGraphComposer, UnifiedNodeKind};

/// Runtime tuning for an [`ActivationEngine`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of pattern hops in one same-tick completion cascade.
    /// Exceeding it raises [`Error::CompositionCycle`].
    pub max_cascade_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
        }
    }
}

/// How patterns are started and how references are satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Each pattern is seeded once, anchored at the first token. References
    /// match a token whose type is the referenced pattern's name.
    Isolated,
    /// Every pattern is re-seeded at every tick and references are satisfied
    /// by completions of the referenced pattern.
    Unified,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Fire,
    Complete,
}

/// One entry of the append-only event log.
///
/// `cause` links a FIRE to the previous FIRE of the same pattern instance
/// (or `None` for the instance's first element) and a COMPLETE to the FIRE
/// that reached END. `sub_event` is set on CONSTRUCTION_REF firings and
/// points at the referenced pattern's COMPLETE event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseEvent {
    pub id: EventId,
    pub time: u64,
    /// Tick of the first token consumed by this pattern instance.
    pub start: u64,
    pub pattern: String,
    pub node: String,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<EventId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_event: Option<EventId>,
}

/// A marker awaiting one element at one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listener {
    pub id: ListenerId,
    pub pattern: usize,
    pub node: NodeIdx,
    pub born_at: u64,
    /// Tick of the token this listener may consume. References wait here
    /// for a completion that starts at this tick.
    pub ready_at: u64,
    /// Tick at which the owning pattern instance consumed its first token.
    pub start: Option<u64>,
    pub origin: Option<EventId>,
}

impl Listener {
    /// Position at which the owning pattern instance began.
    pub fn anchor(&self) -> u64 {
        self.start.unwrap_or(self.ready_at)
    }
}

/// One firing of a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Firing {
    pub time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct NodeRef {
    pub pattern: String,
    pub node: String,
}

/// Effects of one tick, for logging and inspection. The engine's listener
/// set and event log remain the authoritative state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickResult {
    pub time: u64,
    pub fired_nodes: Vec<NodeRef>,
    pub completed_patterns: Vec<String>,
    /// Listeners derived from firings this tick. Perpetual entry seeds are
    /// not reported.
    pub new_listeners: Vec<NodeRef>,
}

impl TickResult {
    pub fn is_empty(&self) -> bool {
        self.fired_nodes.is_empty() && self.completed_patterns.is_empty()
    }
}

/// Completion waiting to be resolved within the current tick.
struct PendingCompletion {
    pattern: usize,
    /// Node whose firing reached END.
    node: NodeIdx,
    start: u64,
    cause: EventId,
    depth: usize,
    path: Vec<String>,
}

pub struct ActivationEngine {
    graph: UnifiedGraph,
    config: EngineConfig,
    mode: Mode,
    session: Uuid,
    time: u64,
    listeners: Vec<Listener>,
    active: BTreeMap<NodeIdx, Vec<ListenerId>>,
    fired: BTreeMap<NodeIdx, Vec<Firing>>,
    events: Vec<ParseEvent>,
    aborted: bool,
}

impl ActivationEngine {
    /// Empty engine in isolated mode; add patterns with [`register`](Self::register).
    pub fn new(config: EngineConfig) -> Self {
        Self::with_graph(UnifiedGraph::default(), Mode::Isolated, config)
    }

    /// Run each graph independently, anchored at the first token.
    pub fn isolated(graphs: &[SequenceGraph], config: EngineConfig) -> Result<Self> {
        let graph = UnifiedGraphComposer::isolated(graphs)?;
        Ok(Self::with_graph(graph, Mode::Isolated, config))
    }

    /// Run a composed graph with continuous re-seeding and cross-pattern cascades.
    pub fn unified(graph: UnifiedGraph, config: EngineConfig) -> Self {
        Self::with_graph(graph, Mode::Unified, config)
    }

    /// Compile, compose and start a unified session over `patterns`.
    pub fn from_patterns(patterns: &PatternSet, config: EngineConfig) -> Result<Self> {
        Ok(Self::unified(UnifiedGraphComposer::build(patterns)?, config))
    }

    fn with_graph(graph: UnifiedGraph, mode: Mode, config: EngineConfig) -> Self {
        let mut engine = Self {
            graph,
            config,
            mode,
            session: Uuid::new_v4(),
            time: 0,
            listeners: Vec::new(),
            active: BTreeMap::new(),
            fired: BTreeMap::new(),
            events: Vec::new(),
            aborted: false,
        };
        if mode == Mode::Isolated {
            for pattern in 0..engine.graph.patterns().len() {
                engine.seed_pattern(pattern, 1);
            }
        }
        engine
    }

    /// Add a compiled graph and return its pattern index.
    ///
    /// In isolated mode the pattern is anchored at the next token. In unified
    /// mode it is composed like any other pattern: its references must name a
    /// registered pattern or itself, and it starts matching at the next tick.
    /// Registering a pattern does not make existing patterns reference it.
    pub fn register(&mut self, graph: &SequenceGraph) -> Result<usize> {
        let pattern = self.graph.attach(graph, self.mode == Mode::Unified)?;
        if self.mode == Mode::Isolated {
            self.seed_pattern(pattern, self.time + 1);
        }
        tracing::debug!(pattern = %graph.id, mode = ?self.mode, "registered pattern");
        Ok(pattern)
    }

    pub fn graph(&self) -> &UnifiedGraph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    /// Number of tokens consumed in this session.
    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn events(&self) -> &[ParseEvent] {
        &self.events
    }

    pub fn listener(&self, id: ListenerId) -> &Listener {
        &self.listeners[id.0]
    }

    /// Active listeners in creation order.
    pub fn active_listeners(&self) -> Vec<&Listener> {
        let mut ids: Vec<ListenerId> = self.active.values().flatten().copied().collect();
        ids.sort_unstable();
        ids.into_iter().map(|id| self.listener(id)).collect()
    }

    pub fn active_listener_count(&self) -> usize {
        self.active.values().map(Vec::len).sum()
    }

    /// Every firing of `pattern`'s node `node` in this session.
    pub fn fired_history(&self, pattern: &str, node: &str) -> &[Firing] {
        self.graph
            .find(pattern, node)
            .and_then(|idx| self.fired.get(&idx))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn fired_nodes(&self) -> impl Iterator<Item = (NodeIdx, &[Firing])> {
        self.fired.iter().map(|(idx, f)| (*idx, f.as_slice()))
    }

    /// Parse trees reconstructed from this session's event log.
    pub fn results(&self, query: &TreeQuery) -> Vec<ResultNode> {
        ResultTreeBuilder::query(&self.events, query)
    }

    /// Discard all runtime state and begin a new session on the same graph.
    pub fn reset(&mut self) {
        self.session = Uuid::new_v4();
        self.time = 0;
        self.listeners.clear();
        self.active.clear();
        self.fired.clear();
        self.events.clear();
        self.aborted = false;
        if self.mode == Mode::Isolated {
            for pattern in 0..self.graph.patterns().len() {
                self.seed_pattern(pattern, 1);
            }
        }
        tracing::debug!(session = %self.session, "engine reset");
    }

    /// Feed one token. Tokens must arrive in stream order.
    pub fn process_input(&mut self, element_type: &str, value: &str) -> Result<TickResult> {
        if self.aborted {
            return Err(Error::SessionAborted { time: self.time });
        }
        let tick = self.time + 1;
        let mut result = TickResult {
            time: tick,
            ..TickResult::default()
        };

        if self.mode == Mode::Unified {
            for pattern in 0..self.graph.patterns().len() {
                self.seed_pattern(pattern, tick);
            }
        }

        let matching = self.take_token_listeners(tick, element_type);
        let mut work = VecDeque::new();
        for id in matching {
            self.fire_token(id, tick, element_type, value, &mut work, &mut result);
        }

        if let Err(err) = self.run_cascade(tick, work, &mut result) {
            self.aborted = true;
            self.time = tick;
            tracing::error!(session = %self.session, "{err}");
            return Err(err);
        }

        if self.mode == Mode::Unified {
            self.prune_references(tick);
        }
        self.time = tick;

        tracing::debug!(
            time = tick,
            token = element_type,
            fired = result.fired_nodes.len(),
            completed = result.completed_patterns.len(),
            active = self.active_listener_count(),
            "tick"
        );
        Ok(result)
    }

    /// Feed a whole token stream, stopping at the first fatal error.
    pub fn process_all<'a, I>(&mut self, tokens: I) -> Result<Vec<TickResult>>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        tokens
            .into_iter()
            .map(|(t, v)| self.process_input(t, v))
            .collect()
    }

    fn seed_pattern(&mut self, pattern: usize, ready_at: u64) {
        let entry = self.graph.patterns()[pattern].entry_nodes.clone();
        for node in entry {
            self.add_listener(pattern, node, ready_at.saturating_sub(1), ready_at, None, None);
        }
    }

    fn add_listener(
        &mut self,
        pattern: usize,
        node: NodeIdx,
        born_at: u64,
        ready_at: u64,
        start: Option<u64>,
        origin: Option<EventId>,
    ) -> ListenerId {
        let id = ListenerId(self.listeners.len());
        self.listeners.push(Listener {
            id,
            pattern,
            node,
            born_at,
            ready_at,
            start,
            origin,
        });
        self.active.entry(node).or_default().push(id);
        id
    }

    /// Whether a listener on `node` consumes tokens directly.
    fn consumes_tokens(&self, node: NodeIdx) -> bool {
        let n = self.graph.node(node);
        n.kind == UnifiedNodeKind::Element
            && (n.reference.is_none() || self.mode == Mode::Isolated)
    }

    /// Remove every token-consuming listener due at `tick`. Matching ones are
    /// returned in firing order, the rest are superseded.
    fn take_token_listeners(&mut self, tick: u64, element_type: &str) -> Vec<ListenerId> {
        let mut matching = Vec::new();
        let mut superseded = 0usize;

        let nodes: Vec<NodeIdx> = self.active.keys().copied().collect();
        for node in nodes {
            if !self.consumes_tokens(node) {
                continue;
            }
            let matches = self.graph.node(node).match_type() == Some(element_type);
            let Some(ids) = self.active.get_mut(&node) else {
                continue;
            };
            let listeners = &self.listeners;
            ids.retain(|id| {
                if listeners[id.0].ready_at > tick {
                    return true;
                }
                if matches {
                    matching.push(*id);
                } else {
                    superseded += 1;
                }
                false
            });
            if ids.is_empty() {
                self.active.remove(&node);
            }
        }

        matching.sort_by_key(|id| (self.listeners[id.0].pattern, *id));
        if superseded > 0 {
            tracing::trace!(time = tick, superseded, "dropped non-matching listeners");
        }
        matching
    }

    fn fire_token(
        &mut self,
        id: ListenerId,
        tick: u64,
        element_type: &str,
        value: &str,
        work: &mut VecDeque<PendingCompletion>,
        result: &mut TickResult,
    ) {
        let listener = self.listeners[id.0].clone();
        let start = listener.start.unwrap_or(tick);
        let event = self.record(
            tick,
            start,
            listener.node,
            EventKind::Fire,
            Some(element_type.to_string()),
            Some(value.to_string()),
            listener.origin,
            None,
        );
        self.note_firing(listener.node, tick, Some(value.to_string()), result);

        let path = vec![self.graph.patterns()[listener.pattern].name.clone()];
        self.advance(&listener, event, start, tick, 0, path, work, result);
    }

    /// Derive listeners after `listener` fired as `event`, queueing a
    /// completion if END is reachable.
    #[allow(clippy::too_many_arguments)]
    fn advance(
        &mut self,
        listener: &Listener,
        event: EventId,
        start: u64,
        tick: u64,
        depth: usize,
        path: Vec<String>,
        work: &mut VecDeque<PendingCompletion>,
        result: &mut TickResult,
    ) {
        let closure = self.graph.closure_after_fire(listener.node);
        for node in closure.elements {
            self.add_listener(listener.pattern, node, tick, tick + 1, Some(start), Some(event));
            result.new_listeners.push(self.node_ref(node));
        }
        if closure.reaches_end {
            work.push_back(PendingCompletion {
                pattern: listener.pattern,
                node: listener.node,
                start,
                cause: event,
                depth,
                path,
            });
        }
    }

    /// Resolve queued completions to a fixed point.
    fn run_cascade(
        &mut self,
        tick: u64,
        mut work: VecDeque<PendingCompletion>,
        result: &mut TickResult,
    ) -> Result<()> {
        while let Some(done) = work.pop_front() {
            if done.depth > self.config.max_cascade_depth {
                return Err(Error::CompositionCycle {
                    time: tick,
                    depth: done.depth,
                    node: self.graph.node(done.node).local_id.clone(),
                    path: done.path,
                });
            }

            let info = &self.graph.patterns()[done.pattern];
            let (end, name) = (info.end, info.name.clone());
            let complete = self.record(
                tick,
                done.start,
                end,
                EventKind::Complete,
                None,
                None,
                Some(done.cause),
                None,
            );
            self.note_firing(end, tick, None, result);
            result.completed_patterns.push(name.clone());
            tracing::trace!(time = tick, pattern = %name, start = done.start, "complete");

            if self.mode != Mode::Unified {
                continue;
            }

            for target in self.graph.ref_targets(done.pattern) {
                let waiting: Vec<ListenerId> = self
                    .active
                    .get(&target)
                    .map(|ids| {
                        ids.iter()
                            .copied()
                            .filter(|id| self.listeners[id.0].ready_at == done.start)
                            .collect()
                    })
                    .unwrap_or_default();

                for id in waiting {
                    let listener = self.listeners[id.0].clone();
                    let start = listener.start.unwrap_or(done.start);
                    let event = self.record(
                        tick,
                        start,
                        listener.node,
                        EventKind::Fire,
                        Some(CONSTRUCTION_REF.to_string()),
                        Some(name.clone()),
                        listener.origin,
                        Some(complete),
                    );
                    self.note_firing(listener.node, tick, Some(name.clone()), result);

                    let mut path = done.path.clone();
                    path.push(self.graph.patterns()[listener.pattern].name.clone());
                    let depth = done.depth + 1;
                    self.advance(&listener, event, start, tick, depth, path, &mut work, result);
                }
            }
        }
        Ok(())
    }

    /// Drop reference listeners whose sub-pattern can no longer complete
    /// from their position. A reference waiting at `r` stays alive while an
    /// in-flight instance of the referenced pattern is anchored at `r`.
    fn prune_references(&mut self, tick: u64) {
        let mut alive: HashSet<(usize, u64)> = HashSet::new();
        let mut pending: Vec<(ListenerId, usize)> = Vec::new();

        for ids in self.active.values() {
            for &id in ids {
                let l = &self.listeners[id.0];
                let reference = self.graph.node(l.node).reference.as_deref();
                match reference {
                    Some(name) if l.ready_at <= tick => match self.graph.pattern_index(name) {
                        Some(target) => pending.push((id, target)),
                        None => pending.push((id, usize::MAX)),
                    },
                    _ => {
                        alive.insert((l.pattern, l.anchor()));
                    }
                }
            }
        }

        loop {
            let before = pending.len();
            pending.retain(|&(id, target)| {
                let l = &self.listeners[id.0];
                if alive.contains(&(target, l.ready_at)) {
                    alive.insert((l.pattern, l.anchor()));
                    false
                } else {
                    true
                }
            });
            if pending.len() == before {
                break;
            }
        }

        for (id, _) in pending {
            let node = self.listeners[id.0].node;
            if let Some(ids) = self.active.get_mut(&node) {
                ids.retain(|x| *x != id);
                if ids.is_empty() {
                    self.active.remove(&node);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        time: u64,
        start: u64,
        node: NodeIdx,
        kind: EventKind,
        element_type: Option<String>,
        element_value: Option<String>,
        cause: Option<EventId>,
        sub_event: Option<EventId>,
    ) -> EventId {
        let id = EventId(self.events.len());
        let n = self.graph.node(node);
        let pattern = n
            .pattern
            .map(|p| self.graph.patterns()[p].name.clone())
            .unwrap_or_default();
        self.events.push(ParseEvent {
            id,
            time,
            start,
            pattern,
            node: n.local_id.clone(),
            kind,
            element_type,
            element_value,
            cause,
            sub_event,
        });
        id
    }

    fn note_firing(
        &mut self,
        node: NodeIdx,
        time: u64,
        value: Option<String>,
        result: &mut TickResult,
    ) {
        self.fired.entry(node).or_default().push(Firing { time, value });
        if self.graph.node(node).kind == UnifiedNodeKind::Element {
            result.fired_nodes.push(self.node_ref(node));
        }
    }

    fn node_ref(&self, node: NodeIdx) -> NodeRef {
        let n = self.graph.node(node);
        NodeRef {
            pattern: n
                .pattern
                .map(|p| self.graph.patterns()[p].name.clone())
                .unwrap_or_default(),
            node: n.local_id.clone(),
        }
    }
}
