//! Integration tests exercising the full recognizer pipeline:
//! store → compile → compose → process tokens → trees, across module boundaries.

use cxg_core::{
    ActivationEngine, EngineConfig, Error, EventKind, MemoryPatternStore, PatternSet, PatternSpec,
    PatternStore, ResultChild, ResultNode, SpecNode, TreeQuery, UnifiedGraphComposer,
    ValidationIssue, export_events, export_trees, import_grammar, pattern_set,
};
use proptest::prelude::*;

const GRAMMAR_JSON: &str = r#"{
    "version": "1",
    "patterns": [
        {
            "name": "REF",
            "nodes": {
                "start": {"kind": "START"},
                "det": {"kind": "ELEMENT", "elementType": "DET"},
                "adj": {"kind": "ELEMENT", "elementType": "ADJ"},
                "noun": {"kind": "ELEMENT", "elementType": "NOUN"},
                "end": {"kind": "END"}
            },
            "edges": [
                {"from": "start", "to": "det"},
                {"from": "det", "to": "adj"},
                {"from": "adj", "to": "noun", "bypass": true},
                {"from": "adj", "to": "noun"},
                {"from": "noun", "to": "end"}
            ]
        },
        {
            "name": "CLAUSE",
            "nodes": {
                "start": {"kind": "START"},
                "subj": {"kind": "ELEMENT", "elementType": "CONSTRUCTION_REF", "elementValue": "REF"},
                "verb": {"kind": "ELEMENT", "elementType": "VERB"},
                "obj": {"kind": "ELEMENT", "elementType": "CONSTRUCTION_REF", "elementValue": "REF"},
                "end": {"kind": "END"}
            },
            "edges": [
                {"from": "start", "to": "subj"},
                {"from": "subj", "to": "verb"},
                {"from": "verb", "to": "obj"},
                {"from": "obj", "to": "end"}
            ]
        }
    ]
}"#;

fn clause_grammar() -> PatternSet {
    pattern_set([
        PatternSpec::sequence("REF", &["DET", "NOUN"]),
        PatternSpec::sequence("CLAUSE", &["@REF", "VERB", "@REF"]),
    ])
}

const SENTENCE: [(&str, &str); 5] = [
    ("DET", "the"),
    ("NOUN", "cat"),
    ("VERB", "chased"),
    ("DET", "the"),
    ("NOUN", "mouse"),
];

fn child_labels(node: &ResultNode) -> Vec<String> {
    node.children
        .iter()
        .map(|c| match c {
            ResultChild::Node(n) => n.pattern.clone(),
            ResultChild::Terminal(t) => t.element_type.clone(),
        })
        .collect()
}

/// REF completes at t=2 and t=5; CLAUSE completes at t=5 over the whole sentence.
#[test]
fn clause_example_end_to_end() {
    let mut engine =
        ActivationEngine::from_patterns(&clause_grammar(), EngineConfig::default()).unwrap();
    for (t, v) in SENTENCE {
        engine.process_input(t, v).unwrap();
    }

    let completes: Vec<(&str, u64)> = engine
        .events()
        .iter()
        .filter(|e| e.kind == EventKind::Complete)
        .map(|e| (e.pattern.as_str(), e.time))
        .collect();
    assert_eq!(completes, vec![("REF", 2), ("REF", 5), ("CLAUSE", 5)]);

    let clause = engine.results(&TreeQuery::for_pattern("CLAUSE"));
    assert_eq!(clause.len(), 1);
    assert_eq!((clause[0].start, clause[0].end), (1, 5));
    assert_eq!(child_labels(&clause[0]), vec!["REF", "VERB", "REF"]);
    let words: Vec<&str> = clause[0]
        .terminals()
        .iter()
        .map(|t| t.element_value.as_str())
        .collect();
    assert_eq!(words, vec!["the", "cat", "chased", "the", "mouse"]);
}

/// The second REF ends where CLAUSE ends, so it is not a root. The first is.
#[test]
fn roots_exclude_same_end_children() {
    let mut engine =
        ActivationEngine::from_patterns(&clause_grammar(), EngineConfig::default()).unwrap();
    engine.process_all(SENTENCE).unwrap();

    let roots = engine.results(&TreeQuery::all());
    let spans: Vec<(&str, u64, u64)> = roots
        .iter()
        .map(|r| (r.pattern.as_str(), r.start, r.end))
        .collect();
    assert_eq!(spans, vec![("REF", 1, 2), ("CLAUSE", 1, 5)]);

    let maximal = engine.results(&TreeQuery::all().maximal());
    assert_eq!(maximal.len(), 1);
    assert_eq!(maximal[0].pattern, "CLAUSE");
}

/// Grammar loaded from JSON with an optional adjective.
#[test]
fn json_grammar_with_optional_element() {
    let patterns = import_grammar(GRAMMAR_JSON).unwrap();
    let mut engine = ActivationEngine::from_patterns(&patterns, EngineConfig::default()).unwrap();
    engine
        .process_all([
            ("DET", "the"),
            ("ADJ", "grey"),
            ("NOUN", "cat"),
            ("VERB", "saw"),
            ("DET", "a"),
            ("NOUN", "bird"),
        ])
        .unwrap();

    let clauses = engine.results(&TreeQuery::for_pattern("CLAUSE"));
    assert_eq!(clauses.len(), 1);
    let subject = match &clauses[0].children[0] {
        ResultChild::Node(n) => n,
        other => panic!("expected subject REF, got {other:?}"),
    };
    assert_eq!(child_labels(subject), vec!["DET", "ADJ", "NOUN"]);

    let json = export_trees(&clauses).unwrap();
    assert!(json.contains("\"pattern\": \"CLAUSE\""));
    let events = export_events(engine.events()).unwrap();
    assert!(events.contains("\"kind\": \"COMPLETE\""));
    assert!(events.contains("\"subEvent\""));
}

/// Specs flow through the store interface into the composer.
#[test]
fn store_backed_session() {
    let store = MemoryPatternStore::new(clause_grammar().into_values());
    let patterns = store.load_by_names(&["CLAUSE", "REF"]).unwrap();
    let mut engine = ActivationEngine::from_patterns(&patterns, EngineConfig::default()).unwrap();
    engine.process_all(SENTENCE).unwrap();
    assert_eq!(engine.results(&TreeQuery::all().maximal()).len(), 1);

    // CLAUSE alone cannot compose: REF is missing.
    let partial = store.load_by_names(&["CLAUSE"]).unwrap();
    assert!(matches!(
        UnifiedGraphComposer::build(&partial),
        Err(Error::UnknownPatternReference { .. })
    ));
}

/// A spec with two START nodes is rejected before any token is processed.
#[test]
fn two_starts_rejected_at_build() {
    let bad = PatternSpec::sequence("REF", &["DET", "NOUN"])
        .with_node("start2", SpecNode::start())
        .with_edge("start2", "e0");
    let result = ActivationEngine::from_patterns(&pattern_set([bad]), EngineConfig::default());
    match result {
        Err(Error::GraphValidation { pattern, issue }) => {
            assert_eq!(pattern, "REF");
            assert!(matches!(issue, ValidationIssue::DuplicateStart(_)));
        }
        Err(other) => panic!("expected GraphValidation, got {other}"),
        Ok(_) => panic!("expected GraphValidation"),
    }
}

/// Noise between constructions leaves recognition intact.
#[test]
fn recognition_resumes_after_noise() {
    let mut engine =
        ActivationEngine::from_patterns(&clause_grammar(), EngineConfig::default()).unwrap();
    engine
        .process_all([
            ("PUNCT", ","),
            ("DET", "the"),
            ("PUNCT", ","),
            ("DET", "a"),
            ("NOUN", "dog"),
        ])
        .unwrap();
    let refs = engine.results(&TreeQuery::for_pattern("REF"));
    assert_eq!(refs.len(), 1);
    assert_eq!((refs[0].start, refs[0].end), (4, 5));
}

fn token_strategy() -> impl Strategy<Value = Vec<(&'static str, &'static str)>> {
    let token = prop_oneof![
        Just(("DET", "the")),
        Just(("NOUN", "cat")),
        Just(("VERB", "sat")),
        Just(("ADJ", "big")),
        Just(("PUNCT", ".")),
    ];
    prop::collection::vec(token, 0..40)
}

fn run(tokens: &[(&'static str, &'static str)]) -> ActivationEngine {
    let mut engine =
        ActivationEngine::from_patterns(&clause_grammar(), EngineConfig::default()).unwrap();
    engine.process_all(tokens.iter().copied()).unwrap();
    engine
}

proptest! {
    #[test]
    fn event_log_is_deterministic(tokens in token_strategy()) {
        let a = run(&tokens);
        let b = run(&tokens);
        prop_assert_eq!(a.events(), b.events());
        prop_assert_eq!(a.results(&TreeQuery::all()), b.results(&TreeQuery::all()));
    }

    #[test]
    fn time_counts_tokens_and_events_are_ordered(tokens in token_strategy()) {
        let engine = run(&tokens);
        prop_assert_eq!(engine.time(), tokens.len() as u64);
        let mut last = 0;
        for event in engine.events() {
            prop_assert!(event.time >= last);
            prop_assert!(event.start <= event.time);
            prop_assert!(event.time >= 1 && event.time <= tokens.len() as u64);
            last = event.time;
        }
    }

    #[test]
    fn every_tree_covers_its_span(tokens in token_strategy()) {
        let engine = run(&tokens);
        for tree in engine.results(&TreeQuery::all()) {
            let positions: Vec<u64> = tree.terminals().iter().map(|t| t.position).collect();
            let expected: Vec<u64> = (tree.start..=tree.end).collect();
            prop_assert_eq!(positions, expected);
        }
    }

    #[test]
    fn ambiguous_prefix_fires_every_time(count in 1usize..12) {
        let patterns = pattern_set([
            PatternSpec::sequence("N", &["NOUN"]),
            PatternSpec::sequence("NN", &["NOUN", "NOUN"]),
        ]);
        let mut engine =
            ActivationEngine::from_patterns(&patterns, EngineConfig::default()).unwrap();
        for _ in 0..count {
            engine.process_input("NOUN", "x").unwrap();
        }
        prop_assert_eq!(engine.fired_history("N", "e0").len(), count);
        prop_assert_eq!(engine.fired_history("NN", "e0").len(), count);
        prop_assert_eq!(engine.fired_history("NN", "e1").len(), count - 1);
    }
}
