use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::record::{normalize_title, Category, Record};

/// Field-level access handed to [`Store::update`](crate::Store::update)
/// mutators.
///
/// Works on a private copy of the record; nothing reaches the store unless
/// the mutator returns `Ok` and the write is durable. Identity, creation
/// time and rank are not editable here.
pub struct RecordEdit<'a> {
    record: &'a mut Record,
    now: DateTime<Utc>,
}

impl<'a> RecordEdit<'a> {
    pub(crate) fn new(record: &'a mut Record, now: DateTime<Utc>) -> Self {
        RecordEdit { record, now }
    }

    /// Current state of the copy being edited.
    pub fn record(&self) -> &Record {
        self.record
    }

    /// Replace the title. Same rules as creation: trimmed, must not be empty.
    pub fn set_title(&mut self, title: &str) -> Result<(), StoreError> {
        let title = normalize_title(title)
            .ok_or_else(|| StoreError::validation("title must not be empty"))?;
        self.record.set_title(title);
        Ok(())
    }

    pub fn set_category(&mut self, category: Category) {
        self.record.set_category(category);
    }

    /// Mark complete or active. Completing stamps `completed_at` with the
    /// edit time; reactivating clears it.
    pub fn set_completed(&mut self, completed: bool) {
        self.record.set_completed(completed, self.now);
    }

    pub fn toggle_completed(&mut self) {
        let completed = !self.record.is_completed();
        self.set_completed(completed);
    }
}
