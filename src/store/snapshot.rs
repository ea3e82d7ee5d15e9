use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::{Batch, Change};
use crate::record::{Record, RecordId};

/// Immutable view of the committed collection at one revision.
///
/// Cheap to clone; every successful mutation produces a new snapshot and
/// leaves the old ones untouched.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    revision: u64,
    records: Arc<BTreeMap<RecordId, Record>>,
}

impl Snapshot {
    pub(crate) fn new(revision: u64, records: BTreeMap<RecordId, Record>) -> Self {
        Snapshot {
            revision,
            records: Arc::new(records),
        }
    }

    /// Number of successful mutations since the store was opened.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    /// Records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Record> {
        self.records.values().cloned().collect()
    }

    /// The snapshot that results from applying `batch` on top of this one.
    pub(crate) fn apply(&self, batch: &Batch) -> Snapshot {
        let mut next = (*self.records).clone();
        for change in batch.changes() {
            match change {
                Change::Put(record) => {
                    next.insert(record.id(), record.clone());
                }
                Change::Remove(id) => {
                    next.remove(id);
                }
            }
        }
        Snapshot::new(self.revision + 1, next)
    }
}

/// What a committed mutation did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created(RecordId),
    Updated(RecordId),
    Deleted(RecordId),
    /// Ranks were reassigned for these ids, in their new relative order.
    Reordered(Vec<RecordId>),
}

/// Notification delivered to store subscribers after a durable mutation.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    pub revision: u64,
    pub kind: ChangeKind,
    /// Committed state right after this mutation.
    pub snapshot: Snapshot,
}
