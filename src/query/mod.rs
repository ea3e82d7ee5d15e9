//! Query views - live, filtered and sorted projections over the store.
//!
//! The set of projections is fixed: active records in manual order,
//! completed records by completion time, and everything in manual order,
//! each optionally narrowed to one category.

mod view;

use std::cmp::Ordering;

use crate::record::{Category, Record};

pub use view::{QueryView, ViewChanged};

/// Which partition of the collection a view shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// `is_completed == false`, by rank ascending then newest first.
    Active,
    /// `is_completed == true`, most recently completed first.
    Completed,
    /// Every record, by rank ascending then newest first.
    All,
}

/// Filter and sort rules for a view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewSpec {
    pub kind: ViewKind,
    pub category: Option<Category>,
}

impl ViewSpec {
    pub fn new(kind: ViewKind) -> Self {
        ViewSpec {
            kind,
            category: None,
        }
    }

    pub fn active() -> Self {
        Self::new(ViewKind::Active)
    }

    pub fn completed() -> Self {
        Self::new(ViewKind::Completed)
    }

    pub fn all() -> Self {
        Self::new(ViewKind::All)
    }

    /// Narrow to a single category.
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        let partition = match self.kind {
            ViewKind::Active => record.is_active(),
            ViewKind::Completed => record.is_completed(),
            ViewKind::All => true,
        };
        partition && self.category.map_or(true, |c| c == record.category())
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        match self.kind {
            ViewKind::Active | ViewKind::All => by_rank(a, b),
            ViewKind::Completed => by_completion(a, b),
        }
    }

    /// Filter and sort `records` into this view's order.
    pub fn project<'a, I>(&self, records: I) -> Vec<Record>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut items: Vec<Record> = records
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();
        items.sort_by(|a, b| self.compare(a, b));
        items
    }
}

/// Rank ascending; equal ranks newest first; id as the last resort so the
/// order is total.
pub fn by_rank(a: &Record, b: &Record) -> Ordering {
    a.rank()
        .cmp(&b.rank())
        .then_with(|| b.created_at().cmp(&a.created_at()))
        .then_with(|| a.id().cmp(&b.id()))
}

/// Completion time descending. Rank plays no part.
pub fn by_completion(a: &Record, b: &Record) -> Ordering {
    // Option orders None first; reversed, records without a completion
    // time sink to the end.
    b.completed_at()
        .cmp(&a.completed_at())
        .then_with(|| b.created_at().cmp(&a.created_at()))
        .then_with(|| a.id().cmp(&b.id()))
}
