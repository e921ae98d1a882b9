use std::fmt;

/// Structural problem found while compiling a pattern spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingStart,
    DuplicateStart(Vec<String>),
    MissingEnd,
    DuplicateEnd(Vec<String>),
    DanglingEdge { from: String, to: String },
    Unreachable(String),
    /// END cannot be reached from this node.
    DeadEnd(String),
    /// CONSTRUCTION_REF element without a referenced pattern name.
    MissingReference(String),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingStart => write!(f, "no START node"),
            ValidationIssue::DuplicateStart(ids) => {
                write!(f, "multiple START nodes: {}", ids.join(", "))
            }
            ValidationIssue::MissingEnd => write!(f, "no END node"),
            ValidationIssue::DuplicateEnd(ids) => {
                write!(f, "multiple END nodes: {}", ids.join(", "))
            }
            ValidationIssue::DanglingEdge { from, to } => {
                write!(f, "edge {from} -> {to} references a missing node")
            }
            ValidationIssue::Unreachable(id) => write!(f, "node '{id}' is unreachable from START"),
            ValidationIssue::DeadEnd(id) => write!(f, "END is unreachable from node '{id}'"),
            ValidationIssue::MissingReference(id) => {
                write!(f, "reference node '{id}' does not name a pattern")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed pattern spec; raised by the compiler, never at runtime.
    GraphValidation {
        pattern: String,
        issue: ValidationIssue,
    },
    /// A CONSTRUCTION_REF element names a pattern that is not being composed.
    UnknownPatternReference {
        pattern: String,
        node: String,
        reference: String,
    },
    /// A pattern with this name is already part of the graph.
    DuplicatePattern(String),
    /// Same-tick completion cascade exceeded the configured depth.
    /// `path` lists the patterns of the offending chain, oldest first.
    /// `node` is the local id of the firing that exceeded the bound, in the
    /// last pattern of `path`.
    CompositionCycle {
        time: u64,
        depth: usize,
        node: String,
        path: Vec<String>,
    },
    /// The session hit a fatal error earlier and no longer accepts input.
    SessionAborted { time: u64 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::GraphValidation { pattern, issue } => {
                write!(f, "invalid pattern '{pattern}': {issue}")
            }
            Error::UnknownPatternReference {
                pattern,
                node,
                reference,
            } => write!(
                f,
                "pattern '{pattern}' node '{node}' references unknown pattern '{reference}'"
            ),
            Error::DuplicatePattern(name) => write!(f, "pattern '{name}' is already registered"),
            Error::CompositionCycle {
                time,
                depth,
                node,
                path,
            } => write!(
                f,
                "composition cycle at t={time} node '{node}': cascade depth {depth} ({})",
                path.join(" -> ")
            ),
            Error::SessionAborted { time } => {
                write!(f, "parse session aborted at t={time}; start a new session")
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_includes_path() {
        let err = Error::CompositionCycle {
            time: 3,
            depth: 4,
            node: "ref".into(),
            path: vec!["A".into(), "B".into(), "A".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("t=3"), "{msg}");
        assert!(msg.contains("node 'ref'"), "{msg}");
        assert!(msg.contains("A -> B -> A"), "{msg}");
    }

    #[test]
    fn test_validation_message_names_pattern() {
        let err = Error::GraphValidation {
            pattern: "REF".into(),
            issue: ValidationIssue::DuplicateStart(vec!["s1".into(), "s2".into()]),
        };
        assert_eq!(
            err.to_string(),
            "invalid pattern 'REF': multiple START nodes: s1, s2"
        );
    }
}
