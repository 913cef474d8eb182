//! Flat embedding index with an append-only id mapping.
//!
//! Vectors live in memory as one row-major `Array2<f32>`; row `i` is the
//! vector with internal id `i`. The `vector_mappings` table resolves internal
//! ids to caller ids. Deleting only removes the mapping, leaving a hole that
//! search skips, and [`VectorIndex::rebuild`] compacts holes away.
//!
//! Mapping rows and the id high-water mark are committed together; the
//! matrix reaches disk every `persist_every` additions. On open, mappings that
//! point past the persisted rows are returned as lost so their owners can be
//! re-embedded, and the matrix is padded up to the high-water mark so no id is
//! ever handed out twice.
//!
//! An opened index holds an exclusive lock on its file for its whole life, so
//! only one process appends at a time.

pub mod mapping;
pub mod persist;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MentorError, Result};
pub use mapping::VectorMapping;

/// Embedding width used when none is configured.
pub const DEFAULT_DIMENSION: usize = 768;

/// Additions between automatic writes to disk.
pub const DEFAULT_PERSIST_EVERY: usize = 100;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub external_id: String,
    pub category: String,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub vectors_before: usize,
    pub vectors_after: usize,
}

impl RebuildReport {
    pub fn dropped(&self) -> usize {
        self.vectors_before - self.vectors_after
    }
}

/// Disagreements between the matrix and the mapping table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub stored: usize,
    pub mapped: usize,
    /// First internal id never handed out, as recorded in the database.
    pub high_water: u64,
    /// Stored rows with no mapping (soft-deleted or never mapped).
    pub orphans: Vec<u64>,
    /// Mappings pointing at rows that do not exist.
    pub dangling: Vec<VectorMapping>,
    /// External ids mapped more than once.
    pub duplicates: Vec<(String, Vec<u64>)>,
}

impl ReconcileReport {
    /// Dangling mappings, duplicates and a high-water mark past the stored
    /// rows are errors; orphans are expected holes.
    pub fn is_consistent(&self) -> bool {
        self.dangling.is_empty()
            && self.duplicates.is_empty()
            && self.high_water <= self.stored as u64
    }
}

pub struct VectorIndex {
    dimension: usize,
    vectors: Array2<f32>,
    path: Option<PathBuf>,
    persist_every: usize,
    unsaved: usize,
    _lock: Option<File>,
}

impl VectorIndex {
    /// An empty in-memory index that never touches disk.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Array2::zeros((0, dimension)),
            path: None,
            persist_every: DEFAULT_PERSIST_EVERY,
            unsaved: 0,
            _lock: None,
        }
    }

    /// Lock and load the index file at `path`, then line it up with the
    /// mapping table.
    ///
    /// Waits up to `lock_wait` for another holder to let go, then fails with
    /// [`MentorError::IndexLocked`]. A missing or unreadable file starts an
    /// empty index. Returns the index and any mappings that had to be dropped
    /// because their vectors were never persisted.
    pub fn open(
        path: impl AsRef<Path>,
        dimension: usize,
        persist_every: usize,
        lock_wait: Duration,
        conn: &Connection,
    ) -> Result<(Self, Vec<VectorMapping>)> {
        if dimension == 0 {
            return Err(MentorError::Validation("index dimension must be non-zero".into()));
        }
        let path = path.as_ref().to_path_buf();
        let lock = persist::acquire_lock(&path, lock_wait)?;

        let vectors = match persist::load(&path, dimension) {
            Ok(Some(vectors)) => {
                tracing::info!(path = %path.display(), count = vectors.nrows(), "loaded vector index");
                vectors
            }
            Ok(None) => {
                tracing::info!(path = %path.display(), "no vector index file, starting empty");
                Array2::zeros((0, dimension))
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable vector index, starting empty");
                Array2::zeros((0, dimension))
            }
        };

        let mut index = Self {
            dimension,
            vectors,
            path: Some(path),
            persist_every: persist_every.max(1),
            unsaved: 0,
            _lock: Some(lock),
        };

        let lost = index.drop_dangling(conn)?;
        if !lost.is_empty() {
            tracing::warn!(count = lost.len(), "dropped mappings whose vectors were not persisted");
        }

        let high_water = mapping::high_water(conn)?;
        let stored = index.len() as u64;
        if high_water > stored {
            let zeros = Array1::<f32>::zeros(dimension);
            for _ in stored..high_water {
                index.push(zeros.view())?;
            }
            tracing::debug!(from = stored, to = high_water, "padded index to high-water mark");
            index.unsaved += (high_water - stored) as usize;
            index.persist_best_effort();
        }

        Ok((index, lost))
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Stored vectors, including unmapped holes.
    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.nrows() == 0
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Additions not yet written to disk.
    pub fn unsaved(&self) -> usize {
        self.unsaved
    }

    /// Stored vector for `internal_id`, mapped or not.
    pub fn vector(&self, internal_id: u64) -> Option<ArrayView1<'_, f32>> {
        let row = usize::try_from(internal_id).ok()?;
        (row < self.len()).then(|| self.vectors.row(row))
    }

    fn check_embedding(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(MentorError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        if let Some(pos) = embedding.iter().position(|v| !v.is_finite()) {
            return Err(MentorError::Validation(format!(
                "embedding value at position {pos} is not finite"
            )));
        }
        Ok(())
    }

    fn push(&mut self, row: ArrayView1<'_, f32>) -> Result<()> {
        self.vectors
            .push_row(row)
            .map_err(|e| MentorError::Inconsistent(format!("failed to append vector: {e}")))
    }

    /// Append `embedding` and map it to `external_id`. Returns the new
    /// internal id.
    ///
    /// If the mapping write fails the vector stays stored as an unmapped
    /// hole; its id is not reused. A database whose high-water mark is already
    /// past the new id was advanced by another writer, and the add fails with
    /// `Inconsistent`.
    pub fn add_vector(
        &mut self,
        conn: &Connection,
        embedding: &[f32],
        external_id: &str,
        category: &str,
    ) -> Result<u64> {
        self.check_embedding(embedding)?;

        let internal_id = self.len() as u64;
        self.push(ArrayView1::from(embedding))?;
        self.unsaved += 1;

        mapping::insert(conn, internal_id, external_id, category)?;
        tracing::debug!(internal_id, external_id, category, "vector added");

        if self.unsaved >= self.persist_every {
            self.persist_best_effort();
        }
        Ok(internal_id)
    }

    /// Nearest `k` mapped vectors to `query`, closest first.
    ///
    /// Ranking happens before the mapping lookup and category filter, so
    /// holes and other categories can leave fewer than `k` hits.
    pub fn search(
        &self,
        conn: &Connection,
        query: &[f32],
        k: usize,
        category: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        self.check_embedding(query)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query = ArrayView1::from(query);
        let mut ranked: Vec<(f32, u64)> = self
            .vectors
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let distance = row
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>();
                (distance, i as u64)
            })
            .collect();

        let by_distance =
            |a: &(f32, u64), b: &(f32, u64)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        if ranked.len() > k {
            ranked.select_nth_unstable_by(k - 1, by_distance);
            ranked.truncate(k);
        }
        ranked.sort_unstable_by(by_distance);

        let mut hits = Vec::with_capacity(ranked.len());
        for (distance, internal_id) in ranked {
            let Some(m) = mapping::find(conn, internal_id)? else {
                continue;
            };
            if category.is_some_and(|c| c != m.category) {
                continue;
            }
            hits.push(SearchHit {
                external_id: m.external_id,
                category: m.category,
                distance,
            });
        }
        Ok(hits)
    }

    /// Direct mapping lookup; `NotFound` for unmapped ids.
    pub fn mapping(&self, conn: &Connection, internal_id: u64) -> Result<VectorMapping> {
        mapping::get(conn, internal_id)
    }

    /// Soft delete: remove the mapping, keep the stored vector.
    /// Returns whether a mapping existed.
    pub fn delete_vector(&mut self, conn: &Connection, internal_id: u64) -> Result<bool> {
        let removed = mapping::delete(conn, internal_id)?;
        if removed {
            tracing::debug!(internal_id, "vector mapping removed");
        }
        Ok(removed)
    }

    /// Soft-delete every vector mapped to `external_id`.
    pub fn delete_external(&mut self, conn: &Connection, external_id: &str) -> Result<usize> {
        let ids = mapping::ids_for_external(conn, external_id)?;
        let mut removed = 0;
        for id in ids {
            if self.delete_vector(conn, id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Compact to the mapped vectors and renumber them densely from zero.
    ///
    /// The new file is written aside first, then the mapping table and
    /// high-water mark are replaced in one transaction, then the file is
    /// moved into place and the new matrix swapped in.
    pub fn rebuild(&mut self, conn: &mut Connection) -> Result<RebuildReport> {
        let before = self.len();
        let mut keep = Vec::new();
        let mut renumbered = Vec::new();
        for m in mapping::all(conn)? {
            if m.internal_id >= before as u64 {
                continue;
            }
            keep.push(m.internal_id as usize);
            renumbered.push(VectorMapping {
                internal_id: renumbered.len() as u64,
                external_id: m.external_id,
                category: m.category,
            });
        }

        let compacted = self.vectors.select(Axis(0), &keep);

        let staged = match &self.path {
            Some(path) => Some(persist::write_temp(path, &compacted)?),
            None => None,
        };

        let tx = conn.transaction()?;
        mapping::replace_all(&tx, &renumbered, renumbered.len() as u64)?;
        tx.commit()?;

        self.vectors = compacted;
        self.unsaved = 0;
        if let (Some(tmp), Some(path)) = (staged, self.path.as_deref()) {
            if let Err(e) = persist::commit_temp(&tmp, path) {
                // in memory is already authoritative; the next persist retries
                self.unsaved = self.len().max(1);
                return Err(e);
            }
        }

        let report = RebuildReport {
            vectors_before: before,
            vectors_after: self.len(),
        };
        tracing::info!(
            before = report.vectors_before,
            after = report.vectors_after,
            "vector index rebuilt"
        );
        Ok(report)
    }

    /// Compare the matrix with the mapping table without changing either.
    pub fn reconcile(&self, conn: &Connection) -> Result<ReconcileReport> {
        let stored = self.len();
        let mappings = mapping::all(conn)?;

        let mapped: HashSet<u64> = mappings.iter().map(|m| m.internal_id).collect();
        let orphans = (0..stored as u64).filter(|id| !mapped.contains(id)).collect();
        let dangling = mappings
            .iter()
            .filter(|m| m.internal_id >= stored as u64)
            .cloned()
            .collect();

        Ok(ReconcileReport {
            stored,
            mapped: mappings.len(),
            high_water: mapping::high_water(conn)?,
            orphans,
            dangling,
            duplicates: mapping::duplicates(conn)?,
        })
    }

    /// Remove mappings that point past the stored rows and return them.
    pub fn drop_dangling(&mut self, conn: &Connection) -> Result<Vec<VectorMapping>> {
        mapping::remove_from(conn, self.len() as u64)
    }

    /// Write the matrix to disk now. No-op for in-memory indexes.
    pub fn persist(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        persist::save(path, &self.vectors)?;
        tracing::debug!(path = %path.display(), count = self.len(), "vector index persisted");
        self.unsaved = 0;
        Ok(())
    }

    fn persist_best_effort(&mut self) {
        if let Err(e) = self.persist() {
            tracing::warn!(error = %e, unsaved = self.unsaved, "vector index persist failed, will retry");
        }
    }

    /// Persist if anything changed since the last write.
    pub fn flush(&mut self) -> Result<()> {
        if self.unsaved > 0 {
            self.persist()?;
        }
        Ok(())
    }
}
