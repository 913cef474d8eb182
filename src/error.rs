//! Error taxonomy for the scheduler, the vector index, and their record store.
//!
//! Every fallible core operation returns [`MentorError`]. Callers that only
//! care about the broad category (retry or not, 4xx vs 5xx) use
//! [`MentorError::kind`].

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, MentorError>;

/// Broad classification of a [`MentorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input from the immediate caller. Never retried.
    Validation,
    /// The record store or index could not be reached or timed out. Caller
    /// may retry.
    StoreUnavailable,
    /// A directly referenced item or vector id does not exist.
    NotFound,
    /// Stored state disagrees with itself (orphaned or duplicate mappings).
    Inconsistent,
    /// Anything else: SQL errors, index file I/O, oracle failures.
    Internal,
}

#[derive(Debug, Error)]
pub enum MentorError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("record store unavailable: {0}")]
    StoreUnavailable(#[source] rusqlite::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("vector index is in use by another process (lock held on {})", .0.display())]
    IndexLocked(std::path::PathBuf),

    #[error("inconsistent state: {0}")]
    Inconsistent(String),

    #[error("database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("index file error: {0}")]
    IndexFile(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding error: {0}")]
    Embedding(String),
}

impl MentorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::DimensionMismatch { .. } => ErrorKind::Validation,
            Self::StoreUnavailable(_) | Self::IndexLocked(_) => ErrorKind::StoreUnavailable,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Inconsistent(_) => ErrorKind::Inconsistent,
            Self::Database(_) | Self::IndexFile(_) | Self::Io(_) | Self::Embedding(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for MentorError {
    fn from(err: rusqlite::Error) -> Self {
        if is_unavailable(&err) {
            Self::StoreUnavailable(err)
        } else {
            Self::Database(err)
        }
    }
}

/// SQLite result codes that mean "the store is not reachable right now"
/// rather than "the statement is wrong".
fn is_unavailable(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::NotADatabase
        ),
        _ => false,
    }
}
