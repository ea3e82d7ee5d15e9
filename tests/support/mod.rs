#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use taskbook::{
    Backend, BackendError, Batch, ChangeEvent, ChangeKind, InMemoryBackend, ManualClock,
    QueryView, Record, RecordId, Store,
};

pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// A clock that advances one second per reading.
pub fn ticking_clock() -> ManualClock {
    ManualClock::with_step(epoch(), Duration::seconds(1))
}

pub fn memory_store() -> Store<InMemoryBackend> {
    Store::open_with_clock(InMemoryBackend::new(), ticking_clock()).unwrap()
}

/// In-memory backend whose writes can be made to fail on demand.
#[derive(Clone, Default)]
pub struct FlakyBackend {
    inner: InMemoryBackend,
    failing: Arc<AtomicBool>,
    applied: Arc<AtomicUsize>,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of batches that reached storage.
    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Vec<Record> {
        self.inner.load_all().unwrap()
    }
}

impl Backend for FlakyBackend {
    fn load_all(&self) -> Result<Vec<Record>, BackendError> {
        self.inner.load_all()
    }

    fn apply(&self, batch: &Batch) -> Result<(), BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("injected failure".into()));
        }
        self.inner.apply(batch)?;
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "flaky"
    }
}

pub fn flaky_store() -> (Store<FlakyBackend>, FlakyBackend) {
    let backend = FlakyBackend::new();
    let store = Store::open_with_clock(backend.clone(), ticking_clock()).unwrap();
    (store, backend)
}

/// Collects every store change event.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<ChangeEvent>>>,
}

impl Recorder {
    pub fn attach<B: Backend>(store: &Store<B>) -> Self {
        let recorder = Recorder::default();
        let events = Arc::clone(&recorder.events);
        store.subscribe(move |event| events.lock().unwrap().push(event.clone()));
        recorder
    }

    pub fn kinds(&self) -> Vec<ChangeKind> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.kind.clone())
            .collect()
    }

    pub fn revisions(&self) -> Vec<u64> {
        self.events.lock().unwrap().iter().map(|e| e.revision).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

/// Collects the id sequence of every view change.
#[derive(Clone, Default)]
pub struct ViewLog {
    sequences: Arc<Mutex<Vec<Vec<RecordId>>>>,
}

impl ViewLog {
    pub fn attach(view: &QueryView) -> Self {
        let log = ViewLog::default();
        let sequences = Arc::clone(&log.sequences);
        view.on_change(move |changed| {
            sequences
                .lock()
                .unwrap()
                .push(changed.items.iter().map(Record::id).collect());
        });
        log
    }

    pub fn sequences(&self) -> Vec<Vec<RecordId>> {
        self.sequences.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.sequences.lock().unwrap().len()
    }
}

pub fn ids(records: &[Record]) -> Vec<RecordId> {
    records.iter().map(Record::id).collect()
}
