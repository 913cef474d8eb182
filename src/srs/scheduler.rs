//! The review scheduler: applies SM-2 to stored items and answers
//! "what is due" and "what is new".
//!
//! [`Scheduler`] holds only configuration. Every operation takes the record
//! store connection explicitly, so callers decide how connections are shared.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};

use super::algorithm::{due_after, next_state};
use super::store::{self, row_to_item, ITEM_COLUMNS};
use super::types::{NewItem, Quality, ReviewItem, ReviewStats, DEFAULT_EASE, MIN_EASE};
use crate::config::SrsConfig;
use crate::db::format_timestamp;
use crate::error::{MentorError, Result};

#[derive(Debug, Clone)]
pub struct Scheduler {
    default_ease: f64,
    new_items_per_day: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            default_ease: DEFAULT_EASE,
            new_items_per_day: 50,
        }
    }
}

impl Scheduler {
    pub fn new(config: &SrsConfig) -> Result<Self> {
        if !(config.default_ease >= MIN_EASE) {
            return Err(MentorError::Validation(format!(
                "default ease must be at least {MIN_EASE}, got {}",
                config.default_ease
            )));
        }
        Ok(Self {
            default_ease: config.default_ease,
            new_items_per_day: config.new_items_per_day,
        })
    }

    pub fn default_ease(&self) -> f64 {
        self.default_ease
    }

    /// Insert a new, never-reviewed item.
    pub fn create_item(&self, conn: &Connection, item: &NewItem, now: DateTime<Utc>) -> Result<ReviewItem> {
        let created = store::insert_item(conn, item, self.default_ease, now)?;
        tracing::debug!(id = %created.id, term = %created.term, "review item created");
        Ok(created)
    }

    /// Apply a graded review to an item and persist the new schedule.
    ///
    /// The read, the SM-2 update and the write happen inside one IMMEDIATE
    /// transaction, so two reviews of the same item cannot interleave. A
    /// busy store surfaces as `StoreUnavailable` and nothing is written.
    pub fn record_review(
        &self,
        conn: &mut Connection,
        item_id: &str,
        quality: Quality,
        now: DateTime<Utc>,
    ) -> Result<ReviewItem> {
        store::validate_item_id(item_id)?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let item = store::get_item(&tx, item_id)?;
        let before = item.sm2_state();
        let after = next_state(before, quality);
        let next_due = due_after(now, after.interval_days);

        store::update_schedule(&tx, item_id, &after, next_due, quality.is_success(), now)?;
        store::write_review_log(&tx, item_id, quality, &before, &after, now)?;
        let updated = store::get_item(&tx, item_id)?;

        tx.commit()?;

        tracing::info!(
            id = %item_id,
            quality = quality.value(),
            ease = after.ease,
            interval_days = after.interval_days,
            repetitions = after.repetitions,
            "review recorded"
        );
        Ok(updated)
    }

    /// Items due at `now`, new items first, then oldest due date first.
    ///
    /// Ties on the due date keep insertion order. New (never reviewed) items
    /// are only included when `include_new` is set.
    pub fn due_items(
        &self,
        conn: &Connection,
        now: DateTime<Utc>,
        limit: usize,
        include_new: bool,
    ) -> Result<Vec<ReviewItem>> {
        let predicate = if include_new {
            "next_due IS NULL OR next_due <= ?1"
        } else {
            "next_due IS NOT NULL AND next_due <= ?1"
        };
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM review_items WHERE {predicate} \
             ORDER BY next_due IS NOT NULL, next_due, rowid LIMIT ?2"
        );

        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![format_timestamp(&now), limit as i64], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Never-reviewed items in insertion order, capped at `limit` or the
    /// configured daily allowance.
    pub fn new_items(&self, conn: &Connection, limit: Option<usize>) -> Result<Vec<ReviewItem>> {
        let limit = limit.unwrap_or(self.new_items_per_day);
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM review_items WHERE next_due IS NULL ORDER BY rowid LIMIT ?1"
        ))?;
        let items = stmt
            .query_map(params![limit as i64], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Total, new, due and upcoming counts from a single query.
    pub fn stats(&self, conn: &Connection, now: DateTime<Utc>) -> Result<ReviewStats> {
        let (total, new, due): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*), \
                    COALESCE(SUM(next_due IS NULL), 0), \
                    COALESCE(SUM(next_due IS NOT NULL AND next_due <= ?1), 0) \
             FROM review_items",
            params![format_timestamp(&now)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let (total, new, due) = (total as u64, new as u64, due as u64);
        Ok(ReviewStats {
            total,
            new,
            due,
            upcoming: total.saturating_sub(new + due),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::ErrorKind;
    use crate::srs::store::review_history;
    use chrono::Duration;

    fn q(value: i64) -> Quality {
        Quality::new(value).unwrap()
    }

    fn set_due(conn: &Connection, id: &str, due: Option<DateTime<Utc>>) {
        conn.execute(
            "UPDATE review_items SET next_due = ?1 WHERE id = ?2",
            params![due.map(|d| format_timestamp(&d)), id],
        )
        .unwrap();
    }

    #[test]
    fn record_review_persists_schedule() {
        let mut conn = db::open_memory_database().unwrap();
        let scheduler = Scheduler::default();
        let now = Utc::now();
        let item = scheduler.create_item(&conn, &NewItem::new("test"), now).unwrap();

        let updated = scheduler.record_review(&mut conn, &item.id, q(4), now).unwrap();
        assert_eq!(updated.repetitions, 1);
        assert_eq!(updated.interval_days, 1);
        assert_eq!(updated.last_result, Some(true));
        let due = updated.next_due.unwrap();
        assert_eq!(format_timestamp(&due), format_timestamp(&(now + Duration::days(1))));

        let reloaded = store::get_item(&conn, &item.id).unwrap();
        assert_eq!(reloaded.repetitions, 1);
    }

    #[test]
    fn record_review_failure_sets_last_result_false() {
        let mut conn = db::open_memory_database().unwrap();
        let scheduler = Scheduler::default();
        let now = Utc::now();
        let item = scheduler.create_item(&conn, &NewItem::new("test"), now).unwrap();

        let updated = scheduler.record_review(&mut conn, &item.id, q(1), now).unwrap();
        assert_eq!(updated.last_result, Some(false));
        assert_eq!(updated.repetitions, 0);
        assert_eq!(updated.interval_days, 1);
        assert!(updated.ease < DEFAULT_EASE);
    }

    #[test]
    fn record_review_writes_history() {
        let mut conn = db::open_memory_database().unwrap();
        let scheduler = Scheduler::default();
        let now = Utc::now();
        let item = scheduler.create_item(&conn, &NewItem::new("test"), now).unwrap();

        scheduler.record_review(&mut conn, &item.id, q(5), now).unwrap();
        scheduler.record_review(&mut conn, &item.id, q(5), now + Duration::days(1)).unwrap();

        let history = review_history(&conn, &item.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].before.repetitions, 0);
        assert_eq!(history[1].after.repetitions, 2);
        assert_eq!(history[1].after.interval_days, 3);
    }

    #[test]
    fn record_review_unknown_item_is_not_found() {
        let mut conn = db::open_memory_database().unwrap();
        let scheduler = Scheduler::default();
        let id = uuid::Uuid::now_v7().to_string();
        let err = scheduler.record_review(&mut conn, &id, q(3), Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn record_review_rejects_bad_id() {
        let mut conn = db::open_memory_database().unwrap();
        let err = Scheduler::default()
            .record_review(&mut conn, "42", q(3), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn due_items_orders_new_first_then_by_due_date() {
        let conn = db::open_memory_database().unwrap();
        let scheduler = Scheduler::default();
        let now = Utc::now();

        let later = scheduler.create_item(&conn, &NewItem::new("due_later"), now).unwrap();
        let overdue = scheduler.create_item(&conn, &NewItem::new("due_now"), now).unwrap();
        let fresh = scheduler.create_item(&conn, &NewItem::new("new_word"), now).unwrap();
        set_due(&conn, &later.id, Some(now + Duration::days(7)));
        set_due(&conn, &overdue.id, Some(now - Duration::days(1)));

        let due = scheduler.due_items(&conn, now, 10, true).unwrap();
        let terms: Vec<&str> = due.iter().map(|i| i.term.as_str()).collect();
        assert_eq!(terms, vec!["new_word", "due_now"]);
        assert_eq!(due[0].id, fresh.id);
    }

    #[test]
    fn due_items_without_new() {
        let conn = db::open_memory_database().unwrap();
        let scheduler = Scheduler::default();
        let now = Utc::now();

        let overdue = scheduler.create_item(&conn, &NewItem::new("due_now"), now).unwrap();
        scheduler.create_item(&conn, &NewItem::new("new_word"), now).unwrap();
        set_due(&conn, &overdue.id, Some(now - Duration::days(1)));

        let due = scheduler.due_items(&conn, now, 10, false).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, overdue.id);
    }

    #[test]
    fn due_items_ties_keep_insertion_order() {
        let conn = db::open_memory_database().unwrap();
        let scheduler = Scheduler::default();
        let now = Utc::now();
        let same_due = now - Duration::hours(3);

        let mut ids = Vec::new();
        for term in ["first", "second", "third"] {
            let item = scheduler.create_item(&conn, &NewItem::new(term), now).unwrap();
            set_due(&conn, &item.id, Some(same_due));
            ids.push(item.id);
        }

        let due = scheduler.due_items(&conn, now, 10, false).unwrap();
        let got: Vec<String> = due.into_iter().map(|i| i.id).collect();
        assert_eq!(got, ids);
    }

    #[test]
    fn due_items_respects_limit() {
        let conn = db::open_memory_database().unwrap();
        let scheduler = Scheduler::default();
        let now = Utc::now();
        for i in 0..5 {
            scheduler.create_item(&conn, &NewItem::new(format!("w{i}")), now).unwrap();
        }
        assert_eq!(scheduler.due_items(&conn, now, 3, true).unwrap().len(), 3);
        assert!(scheduler.due_items(&conn, now, 0, true).unwrap().is_empty());
    }

    #[test]
    fn due_boundary_is_inclusive() {
        let conn = db::open_memory_database().unwrap();
        let scheduler = Scheduler::default();
        let now = Utc::now();
        let item = scheduler.create_item(&conn, &NewItem::new("edge"), now).unwrap();
        set_due(&conn, &item.id, Some(now));

        assert_eq!(scheduler.due_items(&conn, now, 10, false).unwrap().len(), 1);
    }

    #[test]
    fn new_items_uses_configured_default_limit() {
        let conn = db::open_memory_database().unwrap();
        let scheduler = Scheduler::new(&SrsConfig {
            default_ease: 2.5,
            new_items_per_day: 2,
            due_limit: 50,
        })
        .unwrap();
        let now = Utc::now();
        for i in 0..4 {
            scheduler.create_item(&conn, &NewItem::new(format!("w{i}")), now).unwrap();
        }

        let items = scheduler.new_items(&conn, None).unwrap();
        let terms: Vec<&str> = items.iter().map(|i| i.term.as_str()).collect();
        assert_eq!(terms, vec!["w0", "w1"]);
        assert_eq!(scheduler.new_items(&conn, Some(3)).unwrap().len(), 3);
    }

    #[test]
    fn new_items_excludes_reviewed() {
        let mut conn = db::open_memory_database().unwrap();
        let scheduler = Scheduler::default();
        let now = Utc::now();
        let reviewed = scheduler.create_item(&conn, &NewItem::new("seen"), now).unwrap();
        scheduler.create_item(&conn, &NewItem::new("unseen"), now).unwrap();
        scheduler.record_review(&mut conn, &reviewed.id, q(3), now).unwrap();

        let items = scheduler.new_items(&conn, None).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].term, "unseen");
    }

    #[test]
    fn stats_partition_total() {
        let conn = db::open_memory_database().unwrap();
        let scheduler = Scheduler::default();
        let now = Utc::now();

        for i in 0..5 {
            let item = scheduler.create_item(&conn, &NewItem::new(format!("w{i}")), now).unwrap();
            if i >= 2 {
                set_due(&conn, &item.id, Some(now - Duration::days(1)));
            }
        }
        let upcoming = scheduler.create_item(&conn, &NewItem::new("later"), now).unwrap();
        set_due(&conn, &upcoming.id, Some(now + Duration::days(4)));

        let stats = scheduler.stats(&conn, now).unwrap();
        assert_eq!(stats.total, 6);
        assert_eq!(stats.new, 2);
        assert_eq!(stats.due, 3);
        assert_eq!(stats.upcoming, 1);
        assert_eq!(stats.new + stats.due + stats.upcoming, stats.total);
    }

    #[test]
    fn stats_on_empty_store() {
        let conn = db::open_memory_database().unwrap();
        let stats = Scheduler::default().stats(&conn, Utc::now()).unwrap();
        assert_eq!(
            stats,
            ReviewStats {
                total: 0,
                new: 0,
                due: 0,
                upcoming: 0
            }
        );
    }

    #[test]
    fn scheduler_rejects_low_default_ease() {
        let err = Scheduler::new(&SrsConfig {
            default_ease: 1.2,
            new_items_per_day: 10,
            due_limit: 10,
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
