#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use gre_mentor::app::Mentor;
use gre_mentor::config::MentorConfig;
use gre_mentor::db;
use rusqlite::{params, Connection};
use std::path::Path;

/// Embedding width used by integration tests.
pub const DIM: usize = 32;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&conn).unwrap();
    conn
}

/// Deterministic `DIM`-wide embedding with a spike at `seed`.
pub fn test_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[seed % DIM] = 1.0;
    v
}

/// A fixed reference instant so tests do not depend on the wall clock.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
}

/// Overwrite an item's due date directly.
pub fn set_next_due(conn: &Connection, id: &str, due: Option<DateTime<Utc>>) {
    let due = due.map(|d| db::format_timestamp(&d));
    conn.execute(
        "UPDATE review_items SET next_due = ?1 WHERE id = ?2",
        params![due, id],
    )
    .unwrap();
}

/// Config rooted in `dir`, using the offline hashing provider.
pub fn test_config(dir: &Path) -> MentorConfig {
    let mut config = MentorConfig::default();
    config.storage.db_path = dir.join("mentor.db").to_string_lossy().into_owned();
    config.index.path = dir.join("index").join("index.bin").to_string_lossy().into_owned();
    config.index.dimension = DIM;
    config.embedding.provider = "hash".into();
    config
}

pub fn open_mentor(dir: &Path) -> Mentor {
    Mentor::open(test_config(dir)).unwrap()
}
