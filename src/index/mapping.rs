//! `vector_mappings` table access and the internal-id high-water mark.
//!
//! The high-water mark (`schema_meta.next_vector_id`) is the first internal
//! id never handed out. It only moves forward, except during a rebuild,
//! which renumbers everything at once.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{MentorError, Result};

const HIGH_WATER_KEY: &str = "next_vector_id";

/// One row of the mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VectorMapping {
    pub internal_id: u64,
    pub external_id: String,
    pub category: String,
}

fn row_to_mapping(row: &Row<'_>) -> rusqlite::Result<VectorMapping> {
    Ok(VectorMapping {
        internal_id: row.get::<_, i64>(0)? as u64,
        external_id: row.get(1)?,
        category: row.get(2)?,
    })
}

/// Insert a mapping and advance the high-water mark past it, atomically.
///
/// `Inconsistent` when the mark is already past `internal_id`: that id was
/// handed out by someone else.
pub fn insert(conn: &Connection, internal_id: u64, external_id: &str, category: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let current = high_water(&tx)?;
    if current > internal_id {
        return Err(MentorError::Inconsistent(format!(
            "internal id {internal_id} is behind the high-water mark {current}"
        )));
    }
    tx.execute(
        "INSERT INTO vector_mappings (internal_id, external_id, category) VALUES (?1, ?2, ?3)",
        params![internal_id as i64, external_id, category],
    )?;
    set_high_water(&tx, internal_id + 1)?;
    tx.commit()?;
    Ok(())
}

pub fn find(conn: &Connection, internal_id: u64) -> Result<Option<VectorMapping>> {
    let mapping = conn
        .prepare_cached(
            "SELECT internal_id, external_id, category FROM vector_mappings WHERE internal_id = ?1",
        )?
        .query_row(params![internal_id as i64], row_to_mapping)
        .optional()?;
    Ok(mapping)
}

/// Direct lookup. `NotFound` when the id was never mapped or was deleted.
pub fn get(conn: &Connection, internal_id: u64) -> Result<VectorMapping> {
    find(conn, internal_id)?.ok_or_else(|| MentorError::not_found("vector mapping", internal_id))
}

/// Remove a mapping row. Returns whether a row existed.
pub fn delete(conn: &Connection, internal_id: u64) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM vector_mappings WHERE internal_id = ?1",
        params![internal_id as i64],
    )?;
    Ok(rows > 0)
}

/// Internal ids currently mapped to `external_id`, ascending.
pub fn ids_for_external(conn: &Connection, external_id: &str) -> Result<Vec<u64>> {
    let mut stmt = conn.prepare(
        "SELECT internal_id FROM vector_mappings WHERE external_id = ?1 ORDER BY internal_id",
    )?;
    let ids = stmt
        .query_map(params![external_id], |row| row.get::<_, i64>(0))?
        .map(|r| r.map(|id| id as u64))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Every mapping, ascending by internal id.
pub fn all(conn: &Connection) -> Result<Vec<VectorMapping>> {
    let mut stmt = conn.prepare(
        "SELECT internal_id, external_id, category FROM vector_mappings ORDER BY internal_id",
    )?;
    let rows = stmt
        .query_map([], row_to_mapping)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn count(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM vector_mappings", [], |row| row.get(0))?;
    Ok(n as u64)
}

/// Delete and return every mapping with `internal_id >= from`.
pub fn remove_from(conn: &Connection, from: u64) -> Result<Vec<VectorMapping>> {
    let tx = conn.unchecked_transaction()?;
    let removed = {
        let mut stmt = tx.prepare(
            "SELECT internal_id, external_id, category FROM vector_mappings \
             WHERE internal_id >= ?1 ORDER BY internal_id",
        )?;
        let rows = stmt
            .query_map(params![from as i64], row_to_mapping)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };
    tx.execute(
        "DELETE FROM vector_mappings WHERE internal_id >= ?1",
        params![from as i64],
    )?;
    tx.commit()?;
    Ok(removed)
}

/// External ids mapped more than once, with their internal ids.
pub fn duplicates(conn: &Connection) -> Result<Vec<(String, Vec<u64>)>> {
    let mut stmt = conn.prepare(
        "SELECT external_id, group_concat(internal_id) FROM vector_mappings \
         GROUP BY external_id HAVING COUNT(*) > 1 ORDER BY external_id",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (external_id, joined) in rows {
        let mut ids = joined
            .split(',')
            .map(|s| {
                s.parse::<u64>()
                    .map_err(|e| MentorError::Inconsistent(format!("bad internal id {s:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        ids.sort_unstable();
        out.push((external_id, ids));
    }
    Ok(out)
}

/// Replace the whole table with `mappings` and reset the high-water mark to
/// `next_id`. Runs on the caller's transaction.
pub(crate) fn replace_all(conn: &Connection, mappings: &[VectorMapping], next_id: u64) -> Result<()> {
    conn.execute("DELETE FROM vector_mappings", [])?;
    {
        let mut stmt = conn.prepare(
            "INSERT INTO vector_mappings (internal_id, external_id, category) VALUES (?1, ?2, ?3)",
        )?;
        for m in mappings {
            stmt.execute(params![m.internal_id as i64, m.external_id, m.category])?;
        }
    }
    set_high_water(conn, next_id)?;
    Ok(())
}

/// First internal id never handed out. 0 on a fresh store.
pub fn high_water(conn: &Connection) -> Result<u64> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = ?1",
            params![HIGH_WATER_KEY],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        None => Ok(0),
        Some(v) => v
            .parse::<u64>()
            .map_err(|e| MentorError::Inconsistent(format!("bad {HIGH_WATER_KEY} value {v:?}: {e}"))),
    }
}

fn set_high_water(conn: &Connection, next: u64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES (?1, ?2)",
        params![HIGH_WATER_KEY, next.to_string()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::ErrorKind;

    #[test]
    fn insert_advances_high_water() {
        let conn = db::open_memory_database().unwrap();
        assert_eq!(high_water(&conn).unwrap(), 0);

        insert(&conn, 0, "a", "word").unwrap();
        insert(&conn, 1, "b", "question").unwrap();
        assert_eq!(high_water(&conn).unwrap(), 2);

        // deleting never moves the mark back
        delete(&conn, 1).unwrap();
        assert_eq!(high_water(&conn).unwrap(), 2);
    }

    #[test]
    fn insert_behind_high_water_is_inconsistent() {
        let conn = db::open_memory_database().unwrap();
        set_high_water(&conn, 4).unwrap();

        let err = insert(&conn, 2, "a", "word").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inconsistent);
        assert_eq!(count(&conn).unwrap(), 0);

        insert(&conn, 4, "a", "word").unwrap();
        assert_eq!(high_water(&conn).unwrap(), 5);
    }

    #[test]
    fn get_after_delete_is_not_found() {
        let conn = db::open_memory_database().unwrap();
        insert(&conn, 0, "a", "word").unwrap();
        assert_eq!(get(&conn, 0).unwrap().external_id, "a");

        assert!(delete(&conn, 0).unwrap());
        assert!(!delete(&conn, 0).unwrap());
        assert_eq!(get(&conn, 0).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn duplicate_internal_id_is_rejected() {
        let conn = db::open_memory_database().unwrap();
        insert(&conn, 0, "a", "word").unwrap();
        assert!(insert(&conn, 0, "b", "word").is_err());
        // failed insert leaves the first row alone
        assert_eq!(get(&conn, 0).unwrap().external_id, "a");
    }

    #[test]
    fn remove_from_returns_removed_rows() {
        let conn = db::open_memory_database().unwrap();
        for (id, ext) in [(0, "a"), (1, "b"), (2, "c"), (3, "d")] {
            insert(&conn, id, ext, "word").unwrap();
        }

        let removed = remove_from(&conn, 2).unwrap();
        let ids: Vec<u64> = removed.iter().map(|m| m.internal_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(count(&conn).unwrap(), 2);
    }

    #[test]
    fn duplicates_groups_by_external_id() {
        let conn = db::open_memory_database().unwrap();
        insert(&conn, 0, "word-1", "word").unwrap();
        insert(&conn, 1, "word-2", "word").unwrap();
        insert(&conn, 2, "word-1", "word").unwrap();

        let dups = duplicates(&conn).unwrap();
        assert_eq!(dups, vec![("word-1".to_string(), vec![0, 2])]);
        assert_eq!(ids_for_external(&conn, "word-1").unwrap(), vec![0, 2]);
    }

    #[test]
    fn replace_all_resets_high_water() {
        let conn = db::open_memory_database().unwrap();
        for id in 0..5 {
            insert(&conn, id, &format!("e{id}"), "word").unwrap();
        }

        let compacted = vec![VectorMapping {
            internal_id: 0,
            external_id: "e3".into(),
            category: "word".into(),
        }];
        replace_all(&conn, &compacted, 1).unwrap();

        assert_eq!(all(&conn).unwrap(), compacted);
        assert_eq!(high_water(&conn).unwrap(), 1);
    }
}
