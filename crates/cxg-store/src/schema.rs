use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    // Node and edge ordinals preserve declaration order across a round trip.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS patterns (
            name       TEXT PRIMARY KEY,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS pattern_nodes (
            pattern       TEXT NOT NULL REFERENCES patterns(name) ON DELETE CASCADE,
            ordinal       INTEGER NOT NULL,
            node_key      TEXT NOT NULL,
            kind          TEXT NOT NULL,
            element_type  TEXT,
            element_value TEXT,
            PRIMARY KEY (pattern, node_key)
        );

        CREATE TABLE IF NOT EXISTS pattern_edges (
            pattern   TEXT NOT NULL REFERENCES patterns(name) ON DELETE CASCADE,
            ordinal   INTEGER NOT NULL,
            from_node TEXT NOT NULL,
            to_node   TEXT NOT NULL,
            bypass    INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (pattern, ordinal)
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_pattern ON pattern_nodes(pattern, ordinal);
        CREATE INDEX IF NOT EXISTS idx_edges_pattern ON pattern_edges(pattern, ordinal);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
        let version: String = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION.to_string());
    }
}
