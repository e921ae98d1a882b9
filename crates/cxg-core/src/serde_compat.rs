//! JSON serde for the grammar interchange format.
//!
//! A grammar file is either `{"version": "...", "patterns": [...]}` or a bare
//! array of pattern specs. Field names are camelCase (`elementType`,
//! `elementValue`) and node kinds are upper-case.

use serde::{Deserialize, Serialize};

use crate::engine::ParseEvent;
use crate::spec::{PatternSet, PatternSpec, pattern_set};
use crate::tree::ResultNode;

pub const CURRENT_VERSION: &str = "1";

// --- Wire format types ---

#[derive(Serialize, Deserialize, Debug)]
pub struct WireGrammar {
    #[serde(default = "current_version")]
    pub version: String,
    pub patterns: Vec<PatternSpec>,
}

fn current_version() -> String {
    CURRENT_VERSION.to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GrammarDocument {
    Wrapped(WireGrammar),
    Bare(Vec<PatternSpec>),
}

#[derive(Serialize)]
struct WireEvents<'a> {
    version: &'a str,
    events: &'a [ParseEvent],
}

#[derive(Serialize)]
struct WireTrees<'a> {
    version: &'a str,
    trees: &'a [ResultNode],
}

/// Deserialize a grammar document into a [`PatternSet`].
pub fn import_grammar(json: &str) -> Result<PatternSet, serde_json::Error> {
    let patterns = match serde_json::from_str::<GrammarDocument>(json)? {
        GrammarDocument::Wrapped(wire) => {
            if wire.version != CURRENT_VERSION {
                tracing::warn!(
                    version = %wire.version,
                    "grammar written by a different format version"
                );
            }
            wire.patterns
        }
        GrammarDocument::Bare(patterns) => patterns,
    };
    Ok(pattern_set(patterns))
}

/// Serialize a [`PatternSet`] in the wrapped wire format, patterns in name order.
pub fn export_grammar(patterns: &PatternSet) -> Result<String, serde_json::Error> {
    let wire = WireGrammar {
        version: current_version(),
        patterns: patterns.values().cloned().collect(),
    };
    serde_json::to_string_pretty(&wire)
}

pub fn export_events(events: &[ParseEvent]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&WireEvents {
        version: CURRENT_VERSION,
        events,
    })
}

pub fn export_trees(trees: &[ResultNode]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&WireTrees {
        version: CURRENT_VERSION,
        trees,
    })
}
