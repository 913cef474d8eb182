//! Review item and scheduling type definitions.
//!
//! Defines [`Quality`] (a validated 0–5 recall grade), [`Sm2State`] (the
//! numeric triple the update rule works on), [`EmbeddingState`], and
//! [`ReviewItem`] (a full record from the `review_items` table).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MentorError, Result};

/// Ease factor floor. No item's interval growth rate drops below this.
pub const MIN_EASE: f64 = 1.3;

/// Ease factor given to items entering the system unless configured otherwise.
pub const DEFAULT_EASE: f64 = 2.5;

/// Recall quality, 0 (blackout) to 5 (perfect). 3 and above is a success.
///
/// Out-of-range grades are rejected, never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub const MAX: u8 = 5;
    pub const PASS: u8 = 3;

    pub fn new(value: i64) -> Result<Self> {
        if (0..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(MentorError::Validation(format!(
                "quality must be between 0 and {}, got {value}",
                Self::MAX
            )))
        }
    }

    /// Grade a right/wrong attempt: correct → 4, incorrect → 2.
    pub fn from_correct(correct: bool) -> Self {
        if correct {
            Self(4)
        } else {
            Self(2)
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 >= Self::PASS
    }
}

impl TryFrom<i64> for Quality {
    type Error = MentorError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Quality> for u8 {
    fn from(q: Quality) -> Self {
        q.0
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three numbers SM-2 carries from one review to the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sm2State {
    pub ease: f64,
    pub interval_days: u32,
    pub repetitions: u32,
}

/// Whether an item has a vector in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingState {
    /// A mapping row for this item exists in the vector index.
    Present,
    /// No vector and none wanted.
    Absent,
    /// Waiting for the embedding oracle; picked up by backfill.
    Pending,
}

impl EmbeddingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Pending => "pending",
        }
    }
}

impl std::fmt::Display for EmbeddingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EmbeddingState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "pending" => Ok(Self::Pending),
            _ => Err(format!("unknown embedding state: {s}")),
        }
    }
}

/// Content for a new item. Schedule fields start from defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewItem {
    pub term: String,
    pub definition: Option<String>,
    pub tags: Vec<String>,
}

impl NewItem {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Default::default()
        }
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// A review item record, matching the `review_items` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    /// UUID v7 primary key.
    pub id: String,
    pub term: String,
    pub definition: Option<String>,
    pub tags: Vec<String>,
    /// SM-2 ease factor, never below [`MIN_EASE`].
    pub ease: f64,
    /// Days until the next review; 0 until the first successful review.
    pub interval_days: u32,
    /// Consecutive successful reviews since the last failure.
    pub repetitions: u32,
    /// `None` means never reviewed: new and immediately due.
    pub next_due: Option<DateTime<Utc>>,
    /// `true` iff the most recent quality was a pass.
    pub last_result: Option<bool>,
    pub embedding: EmbeddingState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewItem {
    pub fn is_new(&self) -> bool {
        self.next_due.is_none()
    }

    /// Scheduled and past its due date. New items are not counted here.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.next_due.is_some_and(|due| due <= now)
    }

    pub fn sm2_state(&self) -> Sm2State {
        Sm2State {
            ease: self.ease,
            interval_days: self.interval_days,
            repetitions: self.repetitions,
        }
    }

    /// Text handed to the embedding oracle for this item.
    pub fn embedding_text(&self) -> String {
        match &self.definition {
            Some(def) => format!("{} {}", self.term, def),
            None => self.term.clone(),
        }
    }
}

/// Counts returned by the scheduler's stats query.
///
/// `new`, `due` and `upcoming` partition `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReviewStats {
    pub total: u64,
    pub new: u64,
    pub due: u64,
    pub upcoming: u64,
}
