//! InMemoryBackend - HashMap-backed storage for tests and ephemeral stores.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{Backend, BackendError, Batch, Change};
use crate::record::{Record, RecordId};

/// Internal stored representation of a record.
struct StoredRecord {
    bytes: Vec<u8>,
    version: u64,
}

/// In-memory backend keyed by record id.
///
/// Records are held serialized, so anything that would not survive a real
/// round trip fails here too. Clone-friendly via Arc: clones share storage,
/// which lets a test reopen a store over the same data.
#[derive(Clone)]
pub struct InMemoryBackend {
    storage: Arc<RwLock<HashMap<RecordId, StoredRecord>>>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of times the record has been written, if it is stored.
    pub fn version_of(&self, id: RecordId) -> Option<u64> {
        self.storage.read().ok()?.get(&id).map(|s| s.version)
    }

    pub fn len(&self) -> usize {
        self.storage.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Encoded {
    Put(RecordId, Vec<u8>),
    Remove(RecordId),
}

impl Backend for InMemoryBackend {
    fn load_all(&self) -> Result<Vec<Record>, BackendError> {
        let storage = self
            .storage
            .read()
            .map_err(|_| BackendError::Unavailable("lock poisoned".into()))?;

        storage
            .values()
            .map(|stored| serde_json::from_slice(&stored.bytes).map_err(BackendError::from))
            .collect()
    }

    fn apply(&self, batch: &Batch) -> Result<(), BackendError> {
        // Encode everything before touching storage so a codec failure
        // leaves it untouched.
        let encoded = batch
            .changes()
            .iter()
            .map(|change| match change {
                Change::Put(record) => {
                    serde_json::to_vec(record).map(|bytes| Encoded::Put(record.id(), bytes))
                }
                Change::Remove(id) => Ok(Encoded::Remove(*id)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut storage = self
            .storage
            .write()
            .map_err(|_| BackendError::Unavailable("lock poisoned".into()))?;

        for change in encoded {
            match change {
                Encoded::Put(id, bytes) => {
                    let version = storage.get(&id).map(|s| s.version + 1).unwrap_or(1);
                    storage.insert(id, StoredRecord { bytes, version });
                }
                Encoded::Remove(id) => {
                    storage.remove(&id);
                }
            }
        }

        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Category, Rank};
    use chrono::Utc;

    fn record(title: &str, rank: i64) -> Record {
        Record::new(title.into(), Category::Work, Utc::now(), Rank(rank))
    }

    #[test]
    fn put_and_load() {
        let backend = InMemoryBackend::new();
        let a = record("a", 1);
        backend.apply(&Batch::new().put(a.clone())).unwrap();

        assert_eq!(backend.load_all().unwrap(), vec![a.clone()]);
        assert_eq!(backend.version_of(a.id()), Some(1));
    }

    #[test]
    fn put_increments_version() {
        let backend = InMemoryBackend::new();
        let mut a = record("a", 1);
        backend.apply(&Batch::new().put(a.clone())).unwrap();
        a.set_rank(Rank(5));
        backend.apply(&Batch::new().put(a.clone())).unwrap();

        assert_eq!(backend.version_of(a.id()), Some(2));
        assert_eq!(backend.load_all().unwrap()[0].rank(), Rank(5));
    }

    #[test]
    fn remove_missing_is_noop() {
        let backend = InMemoryBackend::new();
        backend.apply(&Batch::new().remove(RecordId::new())).unwrap();
        assert!(backend.is_empty());
    }

    #[test]
    fn batch_applies_in_order() {
        let backend = InMemoryBackend::new();
        let a = record("a", 1);
        let b = record("b", 2);
        backend
            .apply(&Batch::new().put(a.clone()).put(b.clone()).remove(a.id()))
            .unwrap();

        assert_eq!(backend.load_all().unwrap(), vec![b]);
    }

    #[test]
    fn clone_shares_storage() {
        let backend = InMemoryBackend::new();
        let clone = backend.clone();
        backend.apply(&Batch::new().put(record("a", 1))).unwrap();

        assert_eq!(clone.len(), 1);
    }
}
