/// Element type marking a node that stands for a whole sub-pattern.
/// The node's element value names the referenced pattern.
pub const CONSTRUCTION_REF: &str = "CONSTRUCTION_REF";

/// Key of the shared entry node in a unified graph.
pub const GLOBAL_START: &str = "GLOBAL_START";

/// Prefix of the per-pattern completion nodes in a unified graph.
pub const PATTERN_NODE_PREFIX: &str = "PATTERN";

/// Separator between pattern name and local node id in unified node keys.
pub const KEY_SEPARATOR: &str = "::";

/// Default bound on same-tick completion cascades (pattern hops).
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 64;
