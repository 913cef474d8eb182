//! SQL DDL for the record store.
//!
//! Defines the `review_items`, `vector_mappings` and `schema_meta` tables.
//! All DDL uses `IF NOT EXISTS` for idempotent initialization. Later tables
//! arrive through [`super::migrations`].

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Study items and their SM-2 state
CREATE TABLE IF NOT EXISTS review_items (
    id TEXT PRIMARY KEY,
    term TEXT NOT NULL,
    definition TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    ease REAL NOT NULL CHECK(ease >= 1.3),
    interval_days INTEGER NOT NULL DEFAULT 0 CHECK(interval_days >= 0),
    repetitions INTEGER NOT NULL DEFAULT 0 CHECK(repetitions >= 0),
    next_due TEXT,
    last_result INTEGER,
    embedding_state TEXT NOT NULL DEFAULT 'pending' CHECK(embedding_state IN ('present','absent','pending')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_review_items_next_due ON review_items(next_due);
CREATE INDEX IF NOT EXISTS idx_review_items_embedding ON review_items(embedding_state);

-- Vector index internal id -> owning object
CREATE TABLE IF NOT EXISTS vector_mappings (
    internal_id INTEGER PRIMARY KEY CHECK(internal_id >= 0),
    external_id TEXT NOT NULL,
    category TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_vector_mappings_external ON vector_mappings(external_id);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
