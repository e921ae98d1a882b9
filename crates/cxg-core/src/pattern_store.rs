//! Lookup interface for pattern specs.
//!
//! The core never touches files or databases. A store hands back a
//! [`PatternSet`] and the compiler takes it from there.

use std::fmt;

use crate::spec::{PatternSet, PatternSpec, pattern_set};

pub trait PatternStore {
    type Error;

    /// Specs for exactly `names`. Missing names are an error.
    fn load_by_names(&self, names: &[&str]) -> Result<PatternSet, Self::Error>;

    fn load_all(&self) -> Result<PatternSet, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPattern(pub String);

impl fmt::Display for MissingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pattern '{}' not found", self.0)
    }
}

impl std::error::Error for MissingPattern {}

/// Store backed by a map held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryPatternStore {
    patterns: PatternSet,
}

impl MemoryPatternStore {
    pub fn new(specs: impl IntoIterator<Item = PatternSpec>) -> Self {
        Self {
            patterns: pattern_set(specs),
        }
    }

    pub fn insert(&mut self, spec: PatternSpec) {
        self.patterns.insert(spec.name.clone(), spec);
    }
}

impl PatternStore for MemoryPatternStore {
    type Error = MissingPattern;

    fn load_by_names(&self, names: &[&str]) -> Result<PatternSet, MissingPattern> {
        names
            .iter()
            .map(|&name| {
                self.patterns
                    .get(name)
                    .map(|spec| (name.to_string(), spec.clone()))
                    .ok_or_else(|| MissingPattern(name.to_string()))
            })
            .collect()
    }

    fn load_all(&self) -> Result<PatternSet, MissingPattern> {
        Ok(self.patterns.clone())
    }
}
