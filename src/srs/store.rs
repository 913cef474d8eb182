//! Record-store access for review items.
//!
//! Row mapping and the handful of statements the scheduler and the
//! composition layer need: insert, fetch, schedule update, embedding state,
//! tag listing, delete, and the review log.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{EmbeddingState, NewItem, Quality, ReviewItem, Sm2State};
use crate::db::{format_timestamp, parse_timestamp};
use crate::error::{MentorError, Result};

/// Column list matching [`row_to_item`].
pub(crate) const ITEM_COLUMNS: &str = "id, term, definition, tags, ease, interval_days, repetitions, \
     next_due, last_result, embedding_state, created_at, updated_at";

/// Map a row selected with [`ITEM_COLUMNS`] into a [`ReviewItem`].
pub(crate) fn row_to_item(row: &Row<'_>) -> rusqlite::Result<ReviewItem> {
    let tags_json: String = row.get(3)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let next_due = row
        .get::<_, Option<String>>(7)?
        .map(|raw| parse_timestamp(7, &raw))
        .transpose()?;

    let state_raw: String = row.get(9)?;
    let embedding = state_raw.parse::<EmbeddingState>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            9,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;

    Ok(ReviewItem {
        id: row.get(0)?,
        term: row.get(1)?,
        definition: row.get(2)?,
        tags,
        ease: row.get(4)?,
        interval_days: row.get(5)?,
        repetitions: row.get(6)?,
        next_due,
        last_result: row.get(8)?,
        embedding,
        created_at: parse_timestamp(10, &row.get::<_, String>(10)?)?,
        updated_at: parse_timestamp(11, &row.get::<_, String>(11)?)?,
    })
}

/// Reject ids that cannot have come from [`insert_item`].
pub fn validate_item_id(id: &str) -> Result<()> {
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|e| MentorError::Validation(format!("invalid item id {id:?}: {e}")))
}

/// Insert a new item with default schedule fields. Returns the stored record.
pub fn insert_item(
    conn: &Connection,
    item: &NewItem,
    default_ease: f64,
    now: DateTime<Utc>,
) -> Result<ReviewItem> {
    if item.term.trim().is_empty() {
        return Err(MentorError::Validation("term must not be empty".into()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let tags_json = serde_json::to_string(&item.tags)
        .map_err(|e| MentorError::Validation(format!("tags are not serializable: {e}")))?;
    let ts = format_timestamp(&now);

    conn.execute(
        "INSERT INTO review_items (id, term, definition, tags, ease, interval_days, repetitions, \
         next_due, last_result, embedding_state, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, NULL, NULL, 'pending', ?6, ?6)",
        params![id, item.term, item.definition, tags_json, default_ease, ts],
    )?;

    get_item(conn, &id)
}

/// Fetch one item. `NotFound` if the id does not exist.
pub fn get_item(conn: &Connection, id: &str) -> Result<ReviewItem> {
    find_item(conn, id)?.ok_or_else(|| MentorError::not_found("review item", id))
}

pub fn find_item(conn: &Connection, id: &str) -> Result<Option<ReviewItem>> {
    let item = conn
        .query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM review_items WHERE id = ?1"),
            params![id],
            row_to_item,
        )
        .optional()?;
    Ok(item)
}

/// Write the outcome of a review onto the item row.
pub(crate) fn update_schedule(
    conn: &Connection,
    id: &str,
    state: &Sm2State,
    next_due: DateTime<Utc>,
    last_result: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let rows = conn.execute(
        "UPDATE review_items SET ease = ?1, interval_days = ?2, repetitions = ?3, \
         next_due = ?4, last_result = ?5, updated_at = ?6 WHERE id = ?7",
        params![
            state.ease,
            state.interval_days,
            state.repetitions,
            format_timestamp(&next_due),
            last_result,
            format_timestamp(&now),
            id,
        ],
    )?;
    if rows == 0 {
        return Err(MentorError::not_found("review item", id));
    }
    Ok(())
}

/// Append one row to the review history.
pub(crate) fn write_review_log(
    conn: &Connection,
    id: &str,
    quality: Quality,
    before: &Sm2State,
    after: &Sm2State,
    reviewed_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO review_log (item_id, quality, prev_ease, prev_interval_days, prev_repetitions, \
         new_ease, new_interval_days, new_repetitions, reviewed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id,
            quality.value(),
            before.ease,
            before.interval_days,
            before.repetitions,
            after.ease,
            after.interval_days,
            after.repetitions,
            format_timestamp(&reviewed_at),
        ],
    )?;
    Ok(())
}

/// One entry of an item's review history.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReviewLogEntry {
    pub quality: u8,
    pub before: Sm2State,
    pub after: Sm2State,
    pub reviewed_at: DateTime<Utc>,
}

/// Review history for an item, oldest first.
pub fn review_history(conn: &Connection, id: &str) -> Result<Vec<ReviewLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT quality, prev_ease, prev_interval_days, prev_repetitions, \
         new_ease, new_interval_days, new_repetitions, reviewed_at \
         FROM review_log WHERE item_id = ?1 ORDER BY id",
    )?;
    let entries = stmt
        .query_map(params![id], |row| {
            Ok(ReviewLogEntry {
                quality: row.get(0)?,
                before: Sm2State {
                    ease: row.get(1)?,
                    interval_days: row.get(2)?,
                    repetitions: row.get(3)?,
                },
                after: Sm2State {
                    ease: row.get(4)?,
                    interval_days: row.get(5)?,
                    repetitions: row.get(6)?,
                },
                reviewed_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

pub fn set_embedding_state(conn: &Connection, id: &str, state: EmbeddingState) -> Result<()> {
    let rows = conn.execute(
        "UPDATE review_items SET embedding_state = ?1 WHERE id = ?2",
        params![state.as_str(), id],
    )?;
    if rows == 0 {
        return Err(MentorError::not_found("review item", id));
    }
    Ok(())
}

pub fn count_with_embedding_state(conn: &Connection, state: EmbeddingState) -> Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM review_items WHERE embedding_state = ?1",
        params![state.as_str()],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// Items in the given embedding state, insertion order.
pub fn items_with_embedding_state(
    conn: &Connection,
    state: EmbeddingState,
    limit: usize,
) -> Result<Vec<ReviewItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLUMNS} FROM review_items WHERE embedding_state = ?1 ORDER BY rowid LIMIT ?2"
    ))?;
    let items = stmt
        .query_map(params![state.as_str(), limit as i64], row_to_item)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

/// Most recently created items, optionally only those carrying `tag`.
pub fn list_items(conn: &Connection, tag: Option<&str>, limit: usize) -> Result<Vec<ReviewItem>> {
    let items = match tag {
        Some(tag) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM review_items \
                 WHERE EXISTS (SELECT 1 FROM json_each(review_items.tags) WHERE json_each.value = ?1) \
                 ORDER BY rowid DESC LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![tag, limit as i64], row_to_item)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM review_items ORDER BY rowid DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map(params![limit as i64], row_to_item)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
    };
    Ok(items)
}

/// Delete an item and, via cascade, its review history.
pub fn delete_item(conn: &Connection, id: &str) -> Result<()> {
    let rows = conn.execute("DELETE FROM review_items WHERE id = ?1", params![id])?;
    if rows == 0 {
        return Err(MentorError::not_found("review item", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::ErrorKind;
    use crate::srs::types::DEFAULT_EASE;

    #[test]
    fn insert_and_get_round_trip() {
        let conn = db::open_memory_database().unwrap();
        let now = Utc::now();
        let new = NewItem::new("ebullient")
            .with_definition("cheerful and full of energy")
            .with_tags(["gre", "adjective"]);

        let stored = insert_item(&conn, &new, DEFAULT_EASE, now).unwrap();
        assert!(validate_item_id(&stored.id).is_ok());

        let fetched = get_item(&conn, &stored.id).unwrap();
        assert_eq!(fetched.term, "ebullient");
        assert_eq!(fetched.definition.as_deref(), Some("cheerful and full of energy"));
        assert_eq!(fetched.tags, vec!["gre".to_string(), "adjective".to_string()]);
        assert_eq!(fetched.ease, DEFAULT_EASE);
        assert_eq!(fetched.interval_days, 0);
        assert_eq!(fetched.repetitions, 0);
        assert!(fetched.next_due.is_none());
        assert!(fetched.last_result.is_none());
        assert_eq!(fetched.embedding, EmbeddingState::Pending);
    }

    #[test]
    fn empty_term_is_rejected() {
        let conn = db::open_memory_database().unwrap();
        let err = insert_item(&conn, &NewItem::new("  "), DEFAULT_EASE, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn missing_item_is_not_found() {
        let conn = db::open_memory_database().unwrap();
        let id = uuid::Uuid::now_v7().to_string();
        assert_eq!(get_item(&conn, &id).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(delete_item(&conn, &id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn validate_item_id_rejects_garbage() {
        assert_eq!(
            validate_item_id("not-a-uuid").unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn list_items_filters_by_tag() {
        let conn = db::open_memory_database().unwrap();
        let now = Utc::now();
        insert_item(&conn, &NewItem::new("a").with_tags(["verbal"]), DEFAULT_EASE, now).unwrap();
        insert_item(&conn, &NewItem::new("b").with_tags(["quant"]), DEFAULT_EASE, now).unwrap();
        insert_item(&conn, &NewItem::new("c").with_tags(["verbal", "hard"]), DEFAULT_EASE, now).unwrap();

        let verbal = list_items(&conn, Some("verbal"), 10).unwrap();
        let terms: Vec<&str> = verbal.iter().map(|i| i.term.as_str()).collect();
        assert_eq!(terms, vec!["c", "a"]);

        assert_eq!(list_items(&conn, None, 10).unwrap().len(), 3);
        assert_eq!(list_items(&conn, None, 2).unwrap().len(), 2);
    }

    #[test]
    fn embedding_state_updates() {
        let conn = db::open_memory_database().unwrap();
        let item = insert_item(&conn, &NewItem::new("x"), DEFAULT_EASE, Utc::now()).unwrap();

        set_embedding_state(&conn, &item.id, EmbeddingState::Present).unwrap();
        assert_eq!(get_item(&conn, &item.id).unwrap().embedding, EmbeddingState::Present);

        let pending = items_with_embedding_state(&conn, EmbeddingState::Pending, 10).unwrap();
        assert!(pending.is_empty());
    }
}
