//! The [`Mentor`] context: one record store connection, the scheduler, the
//! vector index and the embedding provider, wired together.
//!
//! The scheduler and the index never call each other. Everything that
//! touches both (adding an item and embedding it, deleting an item and its
//! vectors, backfilling pending embeddings) lives here.

use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::time::Duration;

use crate::config::MentorConfig;
use crate::db::{self, migrations, HealthReport};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{MentorError, Result};
use crate::index::{mapping, ReconcileReport, RebuildReport, VectorIndex, VectorMapping};
use crate::srs::store::{self, ReviewLogEntry};
use crate::srs::{EmbeddingState, NewItem, Quality, ReviewItem, ReviewStats, Scheduler};

/// Category under which review items are indexed.
pub const WORD_CATEGORY: &str = "word";

/// Texts sent to the embedding provider per batch during backfill.
const BACKFILL_BATCH: usize = 32;

/// A review item returned by semantic search.
#[derive(Debug, Clone, Serialize)]
pub struct ItemHit {
    pub item: ReviewItem,
    pub distance: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub attempted: usize,
    pub embedded: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct DoctorReport {
    pub database: HealthReport,
    pub index: ReconcileReport,
    /// Items marked present with no vector mapped to them.
    pub items_without_vectors: Vec<String>,
    /// Word vectors whose item no longer exists.
    pub vectors_without_items: Vec<VectorMapping>,
    pub configured_model: String,
}

impl DoctorReport {
    pub fn is_healthy(&self) -> bool {
        self.database.integrity_ok
            && self.index.is_consistent()
            && self.items_without_vectors.is_empty()
            && self.vectors_without_items.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub requeued_items: usize,
    pub removed_mappings: usize,
}

pub struct Mentor {
    conn: Connection,
    scheduler: Scheduler,
    index: VectorIndex,
    embedder: Box<dyn EmbeddingProvider>,
    config: MentorConfig,
}

impl Mentor {
    /// Open the database and index named by `config`.
    ///
    /// Fails with a `StoreUnavailable` error when another process keeps the
    /// index locked for longer than the configured busy timeout.
    pub fn open(config: MentorConfig) -> anyhow::Result<Self> {
        let busy_timeout = Duration::from_millis(config.storage.busy_timeout_ms);
        let conn = db::open_database(config.resolved_db_path(), busy_timeout)?;

        let scheduler = Scheduler::new(&config.srs)?;
        let embedder = embedding::create_provider(&config.embedding, config.index.dimension)
            .context("failed to create embedding provider")?;

        let (index, lost) = VectorIndex::open(
            config.resolved_index_path(),
            config.index.dimension,
            config.index.persist_every,
            busy_timeout,
            &conn,
        )
        .context("failed to open vector index")?;

        let requeued = requeue_lost(&conn, &lost)?;
        if requeued > 0 {
            tracing::warn!(count = requeued, "items lost their vectors and were marked pending");
        }

        let mentor = Self::from_parts(conn, scheduler, index, embedder, config);
        mentor.check_embedding_model()?;
        Ok(mentor)
    }

    /// Assemble a context from already-built parts.
    pub fn from_parts(
        conn: Connection,
        scheduler: Scheduler,
        index: VectorIndex,
        embedder: Box<dyn EmbeddingProvider>,
        config: MentorConfig,
    ) -> Self {
        Self {
            conn,
            scheduler,
            index,
            embedder,
            config,
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &MentorConfig {
        &self.config
    }

    pub fn model_id(&self) -> String {
        self.embedder.model_id()
    }

    /// Record the configured model on first use; warn when it changed.
    fn check_embedding_model(&self) -> Result<()> {
        if !self.embedder.is_enabled() {
            return Ok(());
        }
        let current = self.embedder.model_id();
        match migrations::get_embedding_model(&self.conn)? {
            None => migrations::set_embedding_model(&self.conn, &current)?,
            Some(stored) if stored != current => {
                tracing::warn!(
                    stored = %stored,
                    configured = %current,
                    "embedding model changed; existing vectors are not comparable, run `backfill --all`"
                );
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Create an item and try to embed it.
    ///
    /// Once the item row is written the call succeeds: an embedding or
    /// indexing failure is logged and leaves the item `pending` for
    /// [`Mentor::backfill`].
    pub fn add_item(&mut self, item: &NewItem) -> Result<ReviewItem> {
        let created = self.scheduler.create_item(&self.conn, item, Utc::now())?;

        match self.embedder.embed(&created.embedding_text()) {
            Ok(vector) => {
                if let Err(e) = self.store_vector(&created.id, &vector) {
                    tracing::warn!(id = %created.id, error = %e, "indexing failed, item left pending");
                }
            }
            Err(e) => {
                tracing::warn!(id = %created.id, error = %e, "embedding failed, item left pending");
            }
        }
        store::get_item(&self.conn, &created.id)
    }

    /// Create an item that is never embedded.
    pub fn add_item_unindexed(&mut self, item: &NewItem) -> Result<ReviewItem> {
        let created = self.scheduler.create_item(&self.conn, item, Utc::now())?;
        store::set_embedding_state(&self.conn, &created.id, EmbeddingState::Absent)?;
        store::get_item(&self.conn, &created.id)
    }

    /// Replace any vectors for `item_id` with `vector` and mark it present.
    fn store_vector(&mut self, item_id: &str, vector: &[f32]) -> Result<()> {
        self.index.delete_external(&self.conn, item_id)?;
        self.index.add_vector(&self.conn, vector, item_id, WORD_CATEGORY)?;
        store::set_embedding_state(&self.conn, item_id, EmbeddingState::Present)
    }

    pub fn get_item(&self, id: &str) -> Result<ReviewItem> {
        store::validate_item_id(id)?;
        store::get_item(&self.conn, id)
    }

    pub fn list_items(&self, tag: Option<&str>, limit: usize) -> Result<Vec<ReviewItem>> {
        store::list_items(&self.conn, tag, limit)
    }

    pub fn review(&mut self, id: &str, quality: Quality) -> Result<ReviewItem> {
        self.scheduler
            .record_review(&mut self.conn, id, quality, Utc::now())
    }

    pub fn history(&self, id: &str) -> Result<Vec<ReviewLogEntry>> {
        store::validate_item_id(id)?;
        store::review_history(&self.conn, id)
    }

    /// Due items, capped at `limit` or the configured due limit.
    pub fn due_items(&self, limit: Option<usize>, include_new: bool) -> Result<Vec<ReviewItem>> {
        let limit = limit.unwrap_or(self.config.srs.due_limit);
        self.scheduler
            .due_items(&self.conn, Utc::now(), limit, include_new)
    }

    pub fn new_items(&self, limit: Option<usize>) -> Result<Vec<ReviewItem>> {
        self.scheduler.new_items(&self.conn, limit)
    }

    pub fn stats(&self) -> Result<ReviewStats> {
        self.scheduler.stats(&self.conn, Utc::now())
    }

    /// Embed `query` and return the closest items, closest first.
    ///
    /// Vectors whose item has since been deleted are skipped.
    pub fn search_items(&self, query: &str, k: Option<usize>) -> Result<Vec<ItemHit>> {
        if query.trim().is_empty() {
            return Err(MentorError::Validation("search query is empty".into()));
        }
        let k = k.unwrap_or(self.config.index.search_k);
        let vector = self.embedder.embed(query)?;

        let mut hits = Vec::new();
        for hit in self
            .index
            .search(&self.conn, &vector, k, Some(WORD_CATEGORY))?
        {
            if let Some(item) = store::find_item(&self.conn, &hit.external_id)? {
                hits.push(ItemHit {
                    item,
                    distance: hit.distance,
                });
            }
        }
        Ok(hits)
    }

    /// Delete an item, its review history and its vector mappings.
    /// Returns how many mappings were removed.
    pub fn delete_item(&mut self, id: &str) -> Result<usize> {
        store::validate_item_id(id)?;
        store::get_item(&self.conn, id)?;

        let removed = self.index.delete_external(&self.conn, id)?;
        store::delete_item(&self.conn, id)?;
        tracing::info!(id = %id, vectors = removed, "review item deleted");
        Ok(removed)
    }

    /// Items still waiting for an embedding.
    pub fn pending_items(&self, limit: usize) -> Result<Vec<ReviewItem>> {
        store::items_with_embedding_state(&self.conn, EmbeddingState::Pending, limit)
    }

    pub fn pending_count(&self) -> Result<u64> {
        store::count_with_embedding_state(&self.conn, EmbeddingState::Pending)
    }

    /// Embed up to `limit` pending items in batches.
    ///
    /// A failed batch is logged and its items stay pending. `on_item` is
    /// called once per item with whether it was embedded.
    pub fn backfill(
        &mut self,
        limit: usize,
        mut on_item: impl FnMut(&ReviewItem, bool),
    ) -> Result<BackfillReport> {
        let pending = self.pending_items(limit)?;
        let mut report = BackfillReport {
            attempted: pending.len(),
            ..BackfillReport::default()
        };

        for chunk in pending.chunks(BACKFILL_BATCH) {
            let texts: Vec<String> = chunk.iter().map(ReviewItem::embedding_text).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

            match self.embedder.embed_batch(&refs) {
                Ok(vectors) => {
                    for (item, vector) in chunk.iter().zip(vectors) {
                        self.store_vector(&item.id, &vector)?;
                        report.embedded += 1;
                        on_item(item, true);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, batch = chunk.len(), "embedding batch failed");
                    report.failed += chunk.len();
                    for item in chunk {
                        on_item(item, false);
                    }
                }
            }
        }

        if report.failed == 0 && self.pending_count()? == 0 && self.embedder.is_enabled() {
            migrations::set_embedding_model(&self.conn, &self.embedder.model_id())?;
        }
        self.index.flush()?;
        tracing::info!(
            attempted = report.attempted,
            embedded = report.embedded,
            failed = report.failed,
            "backfill finished"
        );
        Ok(report)
    }

    /// Drop every item's vectors and mark all indexed items pending, so the
    /// next backfill embeds them with the current model. `absent` items stay
    /// unindexed.
    pub fn requeue_all(&mut self) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM vector_mappings WHERE category = ?1", params![WORD_CATEGORY])?;
        let n = tx.execute(
            "UPDATE review_items SET embedding_state = ?1 WHERE embedding_state != ?2",
            params![EmbeddingState::Pending.as_str(), EmbeddingState::Absent.as_str()],
        )?;
        tx.commit()?;
        tracing::info!(count = n, "all items requeued for embedding");
        Ok(n)
    }

    /// Compact the vector index, dropping soft-deleted vectors.
    pub fn rebuild_index(&mut self) -> Result<RebuildReport> {
        self.index.rebuild(&mut self.conn)
    }

    /// Check the database and the agreement between items, mappings and
    /// stored vectors.
    pub fn doctor(&self) -> Result<DoctorReport> {
        Ok(DoctorReport {
            database: db::check_database_health(&self.conn)?,
            index: self.index.reconcile(&self.conn)?,
            items_without_vectors: items_without_vectors(&self.conn)?,
            vectors_without_items: vectors_without_items(&self.conn)?,
            configured_model: self.embedder.model_id(),
        })
    }

    /// Fix what [`Mentor::doctor`] finds between items and mappings: items
    /// missing vectors go back to pending, vectors of deleted items are
    /// soft-deleted, and mappings past the stored vectors are dropped.
    pub fn repair(&mut self) -> Result<RepairReport> {
        let mut report = RepairReport::default();

        let lost = self.index.drop_dangling(&self.conn)?;
        report.removed_mappings += lost.len();
        requeue_lost(&self.conn, &lost)?;

        for id in items_without_vectors(&self.conn)? {
            store::set_embedding_state(&self.conn, &id, EmbeddingState::Pending)?;
            report.requeued_items += 1;
        }
        for m in vectors_without_items(&self.conn)? {
            if self.index.delete_vector(&self.conn, m.internal_id)? {
                report.removed_mappings += 1;
            }
        }
        tracing::info!(
            requeued = report.requeued_items,
            removed = report.removed_mappings,
            "repair finished"
        );
        Ok(report)
    }

    /// Write any unsaved vectors to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.index.flush()
    }
}

impl Drop for Mentor {
    fn drop(&mut self) {
        if let Err(e) = self.index.flush() {
            tracing::warn!(error = %e, "failed to persist vector index on shutdown");
        }
    }
}

/// Mark items pending when their only vector mapping was dropped.
fn requeue_lost(conn: &Connection, lost: &[VectorMapping]) -> Result<usize> {
    let mut requeued = 0;
    for m in lost.iter().filter(|m| m.category == WORD_CATEGORY) {
        if store::find_item(conn, &m.external_id)?.is_none() {
            continue;
        }
        if !mapping::ids_for_external(conn, &m.external_id)?.is_empty() {
            continue;
        }
        store::set_embedding_state(conn, &m.external_id, EmbeddingState::Pending)?;
        requeued += 1;
    }
    Ok(requeued)
}

fn items_without_vectors(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM review_items WHERE embedding_state = 'present' \
         AND NOT EXISTS (SELECT 1 FROM vector_mappings m WHERE m.external_id = review_items.id) \
         ORDER BY rowid",
    )?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

fn vectors_without_items(conn: &Connection) -> Result<Vec<VectorMapping>> {
    let mut stmt = conn.prepare(
        "SELECT internal_id, external_id, category FROM vector_mappings m \
         WHERE m.category = ?1 \
         AND NOT EXISTS (SELECT 1 FROM review_items i WHERE i.id = m.external_id) \
         ORDER BY internal_id",
    )?;
    let rows = stmt
        .query_map(params![WORD_CATEGORY], |row| {
            Ok(VectorMapping {
                internal_id: row.get::<_, i64>(0)? as u64,
                external_id: row.get(1)?,
                category: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
