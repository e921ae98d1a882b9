use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use cxg_core::{
    PatternSet, PatternSpec, PatternStore, SequenceGraph, SpecEdge, SpecNode, SpecNodeKind,
};

use crate::error::{Result, StoreError};
use crate::schema;

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        tracing::info!(path = %path.display(), "opened pattern store");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Save ---

    /// Compile `spec` and store it, replacing any pattern with the same name.
    pub fn save_pattern(&self, spec: &PatternSpec) -> Result<()> {
        SequenceGraph::build(&spec.name, spec)?;
        let tx = self.conn.unchecked_transaction()?;
        self.save_pattern_on(&tx, spec)?;
        tx.commit()?;
        Ok(())
    }

    /// Store every pattern in one transaction. Nothing is written if any
    /// pattern fails to compile.
    pub fn save_patterns(&self, patterns: &PatternSet) -> Result<usize> {
        for (name, spec) in patterns {
            SequenceGraph::build(name, spec)?;
        }
        let tx = self.conn.unchecked_transaction()?;
        for spec in patterns.values() {
            self.save_pattern_on(&tx, spec)?;
        }
        tx.commit()?;
        tracing::info!(count = patterns.len(), "saved patterns");
        Ok(patterns.len())
    }

    fn save_pattern_on(&self, conn: &Connection, spec: &PatternSpec) -> Result<()> {
        self.delete_pattern_on(conn, &spec.name)?;
        conn.execute(
            "INSERT INTO patterns (name, updated_at) VALUES (?1, datetime('now'))",
            [&spec.name],
        )?;

        for (ordinal, (key, node)) in spec.nodes.iter().enumerate() {
            conn.execute(
                "INSERT INTO pattern_nodes (pattern, ordinal, node_key, kind, element_type, element_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    spec.name,
                    ordinal as i64,
                    key,
                    kind_label(node.kind),
                    node.element_type,
                    node.element_value,
                ],
            )?;
        }

        for (ordinal, edge) in spec.edges.iter().enumerate() {
            conn.execute(
                "INSERT INTO pattern_edges (pattern, ordinal, from_node, to_node, bypass)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![spec.name, ordinal as i64, edge.from, edge.to, edge.bypass as i32],
            )?;
        }

        Ok(())
    }

    // --- Delete ---

    /// Remove a pattern. Returns whether it existed.
    pub fn delete_pattern(&self, name: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let existed = self.delete_pattern_on(&tx, name)?;
        tx.commit()?;
        Ok(existed)
    }

    fn delete_pattern_on(&self, conn: &Connection, name: &str) -> Result<bool> {
        conn.execute("DELETE FROM pattern_edges WHERE pattern = ?1", [name])?;
        conn.execute("DELETE FROM pattern_nodes WHERE pattern = ?1", [name])?;
        let removed = conn.execute("DELETE FROM patterns WHERE name = ?1", [name])?;
        Ok(removed > 0)
    }

    // --- Load ---

    pub fn pattern_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM patterns ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(names)
    }

    pub fn load_pattern(&self, name: &str) -> Result<Option<PatternSpec>> {
        let exists: Option<String> = self
            .conn
            .query_row("SELECT name FROM patterns WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }

        let mut spec = PatternSpec::new(name);

        let mut stmt = self.conn.prepare(
            "SELECT node_key, kind, element_type, element_value
             FROM pattern_nodes WHERE pattern = ?1 ORDER BY ordinal",
        )?;
        let rows: Vec<(String, String, Option<String>, Option<String>)> = stmt
            .query_map([name], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<std::result::Result<_, _>>()?;
        for (key, kind, element_type, element_value) in rows {
            let kind = parse_kind(&kind).ok_or_else(|| {
                StoreError::InvalidData(format!("pattern '{name}' node '{key}' has kind '{kind}'"))
            })?;
            spec.nodes.insert(
                key,
                SpecNode {
                    kind,
                    element_type,
                    element_value,
                },
            );
        }

        let mut stmt = self.conn.prepare(
            "SELECT from_node, to_node, bypass
             FROM pattern_edges WHERE pattern = ?1 ORDER BY ordinal",
        )?;
        spec.edges = stmt
            .query_map([name], |row| {
                Ok(SpecEdge {
                    from: row.get(0)?,
                    to: row.get(1)?,
                    bypass: row.get::<_, i32>(2)? != 0,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;

        Ok(Some(spec))
    }
}

impl PatternStore for Store {
    type Error = StoreError;

    fn load_by_names(&self, names: &[&str]) -> Result<PatternSet> {
        let mut set = PatternSet::new();
        for &name in names {
            let spec = self
                .load_pattern(name)?
                .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
            set.insert(name.to_string(), spec);
        }
        Ok(set)
    }

    fn load_all(&self) -> Result<PatternSet> {
        let mut set = PatternSet::new();
        for name in self.pattern_names()? {
            if let Some(spec) = self.load_pattern(&name)? {
                set.insert(name, spec);
            }
        }
        tracing::debug!(count = set.len(), "loaded patterns");
        Ok(set)
    }
}

fn kind_label(kind: SpecNodeKind) -> &'static str {
    match kind {
        SpecNodeKind::Start => "START",
        SpecNodeKind::End => "END",
        SpecNodeKind::Element => "ELEMENT",
        SpecNodeKind::Routing => "ROUTING",
    }
}

fn parse_kind(label: &str) -> Option<SpecNodeKind> {
    match label {
        "START" => Some(SpecNodeKind::Start),
        "END" => Some(SpecNodeKind::End),
        "ELEMENT" => Some(SpecNodeKind::Element),
        "ROUTING" => Some(SpecNodeKind::Routing),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxg_core::pattern_set;

    fn optional_np() -> PatternSpec {
        PatternSpec::new("NP")
            .with_node("s", SpecNode::start())
            .with_node("det", SpecNode::element("DET"))
            .with_node("adj", SpecNode::element("ADJ"))
            .with_node("noun", SpecNode::element("NOUN"))
            .with_node("e", SpecNode::end())
            .with_edge("s", "det")
            .with_edge("det", "adj")
            .with_edge("adj", "noun")
            .with_bypass("adj", "noun")
            .with_edge("noun", "e")
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let original = optional_np();
        store.save_pattern(&original).unwrap();
        let loaded = store.load_pattern("NP").unwrap().unwrap();
        assert_eq!(loaded, original);
        // Edge order and the bypass flag survive.
        assert_eq!(loaded.edges[3].from, "adj");
        assert!(loaded.edges[3].bypass);
    }

    #[test]
    fn test_reference_nodes_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let clause = PatternSpec::sequence("CLAUSE", &["@REF", "VERB"]);
        store.save_pattern(&clause).unwrap();
        let loaded = store.load_pattern("CLAUSE").unwrap().unwrap();
        assert_eq!(loaded.references(), vec!["REF"]);
    }

    #[test]
    fn test_save_overwrites_previous() {
        let store = Store::open_in_memory().unwrap();
        store
            .save_pattern(&PatternSpec::sequence("REF", &["DET", "NOUN"]))
            .unwrap();
        store
            .save_pattern(&PatternSpec::sequence("REF", &["PRON"]))
            .unwrap();
        let loaded = store.load_pattern("REF").unwrap().unwrap();
        assert_eq!(loaded.nodes.len(), 3);
        assert_eq!(store.pattern_names().unwrap(), vec!["REF"]);
    }

    #[test]
    fn test_invalid_pattern_not_saved() {
        let store = Store::open_in_memory().unwrap();
        let bad = PatternSpec::sequence("BAD", &["X"]).with_edge("e0", "ghost");
        assert!(matches!(
            store.save_pattern(&bad),
            Err(StoreError::Grammar(cxg_core::Error::GraphValidation { .. }))
        ));
        assert!(store.pattern_names().unwrap().is_empty());
    }

    #[test]
    fn test_save_patterns_is_all_or_nothing() {
        let store = Store::open_in_memory().unwrap();
        let set = pattern_set([
            PatternSpec::sequence("GOOD", &["X"]),
            PatternSpec::new("BAD").with_node("s", SpecNode::start()),
        ]);
        assert!(store.save_patterns(&set).is_err());
        assert!(store.pattern_names().unwrap().is_empty());
    }

    #[test]
    fn test_load_by_names_missing() {
        let store = Store::open_in_memory().unwrap();
        store
            .save_pattern(&PatternSpec::sequence("REF", &["DET", "NOUN"]))
            .unwrap();
        let set = store.load_by_names(&["REF"]).unwrap();
        assert_eq!(set.len(), 1);
        match store.load_by_names(&["REF", "CLAUSE"]) {
            Err(StoreError::NotFound(name)) => assert_eq!(name, "CLAUSE"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_delete_pattern() {
        let store = Store::open_in_memory().unwrap();
        store.save_pattern(&optional_np()).unwrap();
        assert!(store.delete_pattern("NP").unwrap());
        assert!(!store.delete_pattern("NP").unwrap());
        assert!(store.load_pattern("NP").unwrap().is_none());
        let orphans: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM pattern_edges", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_metadata() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.get_metadata("grammar").unwrap(), None);
        store.set_metadata("grammar", "english").unwrap();
        assert_eq!(
            store.get_metadata("grammar").unwrap().as_deref(),
            Some("english")
        );
    }

    #[test]
    fn test_load_empty_db() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.db");
        {
            let store = Store::open(&path).unwrap();
            store.save_pattern(&optional_np()).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.load_all().unwrap()["NP"], optional_np());
    }
}
