//! Backends - durable storage behind the store.
//!
//! A backend only has to do two things: hand back every stored record, and
//! apply a [`Batch`] of changes all-or-nothing. Ordering, validation and
//! notification live in the [`Store`](crate::Store).
//!
//! ## Example
//!
//! ```ignore
//! use taskbook::{Backend, Batch, InMemoryBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.apply(&Batch::new().put(record.clone()))?;
//! assert_eq!(backend.load_all()?.len(), 1);
//! ```

mod error;
#[cfg(feature = "file")]
mod file;
mod in_memory;
#[cfg(feature = "sqlite")]
mod sqlite;

use crate::record::{Record, RecordId};

pub use error::BackendError;
#[cfg(feature = "file")]
pub use file::{Codec, FileBackend};
pub use in_memory::InMemoryBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

/// A single change inside a batch.
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    /// Insert or overwrite the record with this id.
    Put(Record),
    /// Remove the record with this id. Removing an absent id is not an error.
    Remove(RecordId),
}

impl Change {
    pub fn id(&self) -> RecordId {
        match self {
            Change::Put(record) => record.id(),
            Change::Remove(id) => *id,
        }
    }
}

/// Ordered set of changes applied atomically.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    changes: Vec<Change>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, record: Record) -> Self {
        self.changes.push(Change::Put(record));
        self
    }

    pub fn remove(mut self, id: RecordId) -> Self {
        self.changes.push(Change::Remove(id));
        self
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl Extend<Change> for Batch {
    fn extend<T: IntoIterator<Item = Change>>(&mut self, iter: T) {
        self.changes.extend(iter);
    }
}

/// Durable record storage.
///
/// `apply` must either make every change in the batch durable or leave the
/// stored data untouched and return an error. It is only called by one
/// writer at a time.
pub trait Backend: Send + Sync {
    /// Every stored record, in no particular order.
    fn load_all(&self) -> Result<Vec<Record>, BackendError>;

    /// Apply a batch atomically.
    fn apply(&self, batch: &Batch) -> Result<(), BackendError>;

    /// Short name used in logs.
    fn kind(&self) -> &'static str {
        "custom"
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn load_all(&self) -> Result<Vec<Record>, BackendError> {
        (**self).load_all()
    }

    fn apply(&self, batch: &Batch) -> Result<(), BackendError> {
        (**self).apply(batch)
    }

    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}

impl<B: Backend + ?Sized> Backend for std::sync::Arc<B> {
    fn load_all(&self) -> Result<Vec<Record>, BackendError> {
        (**self).load_all()
    }

    fn apply(&self, batch: &Batch) -> Result<(), BackendError> {
        (**self).apply(batch)
    }

    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}
