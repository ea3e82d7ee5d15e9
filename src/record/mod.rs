//! Records - the persisted task items.
//!
//! A [`Record`] is a value: the store hands out clones, and the only way to
//! change a stored record is through [`Store`](crate::Store) so that
//! persistence and change notification stay in step.

mod category;
mod id;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use category::{Category, CategoryColor};
pub use id::RecordId;

/// Manual sort key. Not contiguous; unique among live records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rank(pub i64);

impl Rank {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredFields")]
pub struct Record {
    id: RecordId,
    title: String,
    is_completed: bool,
    category: Category,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    rank: Rank,
}

/// Wire shape of a record. Decoding goes through [`Record::restore`] so
/// every backend applies the same normalization.
#[derive(Deserialize)]
struct StoredFields {
    id: RecordId,
    title: String,
    is_completed: bool,
    category: Category,
    created_at: DateTime<Utc>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    rank: Rank,
}

impl From<StoredFields> for Record {
    fn from(fields: StoredFields) -> Self {
        Record::restore(
            fields.id,
            fields.title,
            fields.is_completed,
            fields.category,
            fields.created_at,
            fields.completed_at,
            fields.rank,
        )
    }
}

impl Record {
    pub(crate) fn new(
        title: String,
        category: Category,
        created_at: DateTime<Utc>,
        rank: Rank,
    ) -> Self {
        Record {
            id: RecordId::new(),
            title,
            is_completed: false,
            category,
            created_at,
            completed_at: None,
            rank,
        }
    }

    /// Rebuild a record from stored columns.
    ///
    /// `completed_at` is dropped for records that are not completed so a
    /// stray stored timestamp cannot leak into the completed ordering.
    pub(crate) fn restore(
        id: RecordId,
        title: String,
        is_completed: bool,
        category: Category,
        created_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        rank: Rank,
    ) -> Self {
        Record {
            id,
            title,
            is_completed,
            category,
            created_at,
            completed_at: if is_completed { completed_at } else { None },
            rank,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn is_active(&self) -> bool {
        !self.is_completed
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Set iff the record is completed; holds the time of the last
    /// false-to-true transition.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub(crate) fn set_title(&mut self, title: String) {
        self.title = title;
    }

    pub(crate) fn set_category(&mut self, category: Category) {
        self.category = category;
    }

    pub(crate) fn set_rank(&mut self, rank: Rank) {
        self.rank = rank;
    }

    /// Apply a completion transition. Stamps `completed_at` only on
    /// false-to-true, clears it on true-to-false, and leaves it alone when
    /// the flag does not change.
    pub(crate) fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        if completed == self.is_completed {
            return;
        }
        self.is_completed = completed;
        self.completed_at = if completed { Some(now) } else { None };
    }
}

/// Trim a candidate title, rejecting empty results.
pub(crate) fn normalize_title(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
