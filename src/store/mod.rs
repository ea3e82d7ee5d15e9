//! Store - sole owner of the record collection.
//!
//! Every mutation follows the same path: take the writer lock, plan a
//! [`Batch`] against the committed [`Snapshot`], apply it to the backend,
//! and only once the backend reports success swap in the next snapshot and
//! notify subscribers. A failed write never touches the committed snapshot,
//! so there is nothing to roll back and no subscriber sees the attempt.
//!
//! ## Example
//!
//! ```ignore
//! use taskbook::{Category, InMemoryBackend, Store};
//!
//! let store = Store::open(InMemoryBackend::new())?;
//! let active = store.active_view();
//!
//! let milk = store.create("Buy milk", Category::Personal)?;
//! let report = store.create("Quarterly report", Category::Work)?;
//! store.reorder(&[report.id(), milk.id()])?;
//! store.toggle_completion(milk.id())?;
//!
//! assert_eq!(active.ids(), vec![report.id()]);
//! ```

mod dispatch;
mod edit;
mod snapshot;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};

use crate::backend::{Backend, BackendError, Batch};
use crate::clock::{Clock, SystemClock};
use crate::emitter::{Emitter, ListenerId};
use crate::error::StoreError;
use crate::query::{QueryView, ViewSpec};
use dispatch::Dispatcher;
use crate::rank::RankAssigner;
use crate::record::{normalize_title, Category, Rank, Record, RecordId};

pub use edit::RecordEdit;
pub use snapshot::{ChangeEvent, ChangeKind, Snapshot};

/// What a mutation intends to write, decided under the writer lock.
struct Plan<T> {
    batch: Batch,
    kind: ChangeKind,
    output: T,
}

impl<T> Plan<T> {
    fn noop(kind: ChangeKind, output: T) -> Self {
        Plan {
            batch: Batch::new(),
            kind,
            output,
        }
    }
}

struct Inner<B> {
    backend: B,
    clock: Box<dyn Clock>,
    /// Serializes mutations; held from planning through the backend write.
    writer: Mutex<()>,
    state: RwLock<Snapshot>,
    emitter: Emitter<ChangeEvent>,
    dispatcher: Dispatcher,
}

/// Persistent, observable record store.
///
/// Cloning is cheap and clones share the same collection, backend and
/// subscribers.
pub struct Store<B: Backend> {
    inner: Arc<Inner<B>>,
}

impl<B: Backend> Clone for Store<B> {
    fn clone(&self) -> Self {
        Store {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> Store<B> {
    /// Load every record from `backend` and start serving it.
    pub fn open(backend: B) -> Result<Self, StoreError> {
        Self::open_with_clock(backend, SystemClock)
    }

    pub fn open_with_clock(backend: B, clock: impl Clock + 'static) -> Result<Self, StoreError> {
        let loaded = backend.load_all()?;

        let mut records = BTreeMap::new();
        for record in loaded {
            let id = record.id();
            if records.insert(id, record).is_some() {
                return Err(BackendError::Corrupt(format!("duplicate record id {id}")).into());
            }
        }

        let distinct_ranks: HashSet<Rank> = records.values().map(Record::rank).collect();
        if distinct_ranks.len() != records.len() {
            tracing::warn!(
                records = records.len(),
                distinct_ranks = distinct_ranks.len(),
                "stored ranks are not unique; ties fall back to creation time"
            );
        }

        tracing::info!(backend = backend.kind(), records = records.len(), "store opened");

        Ok(Store {
            inner: Arc::new(Inner {
                backend,
                clock: Box::new(clock),
                writer: Mutex::new(()),
                state: RwLock::new(Snapshot::new(0, records)),
                emitter: Emitter::new(),
                dispatcher: Dispatcher::default(),
            }),
        })
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    // ----- reads -----

    /// The committed collection as of now.
    pub fn snapshot(&self) -> Snapshot {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn get(&self, id: RecordId) -> Option<Record> {
        self.snapshot().get(id).cloned()
    }

    /// Every record, in id order. Use a [`QueryView`] for user-facing order.
    pub fn records(&self) -> Vec<Record> {
        self.snapshot().to_vec()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.snapshot().revision()
    }

    // ----- mutations -----

    /// Create an active record ranked after every existing record.
    pub fn create(&self, title: &str, category: Category) -> Result<Record, StoreError> {
        let title = normalize_title(title)
            .ok_or_else(|| StoreError::validation("title must not be empty"))?;

        self.commit("create", move |current, now| {
            let rank = RankAssigner::next_rank(current.iter()).ok_or(StoreError::RankExhausted)?;
            let record = Record::new(title, category, now, rank);
            Ok(Plan {
                batch: Batch::new().put(record.clone()),
                kind: ChangeKind::Created(record.id()),
                output: record,
            })
        })
    }

    /// Remove a record. Returns the record as it was.
    pub fn delete(&self, id: RecordId) -> Result<Record, StoreError> {
        self.commit("delete", |current, _| {
            let record = current.get(id).cloned().ok_or(StoreError::NotFound(id))?;
            Ok(Plan {
                batch: Batch::new().remove(id),
                kind: ChangeKind::Deleted(id),
                output: record,
            })
        })
    }

    /// Apply `mutator` to a copy of the record and persist the result.
    ///
    /// If the mutator returns an error, or leaves the record unchanged,
    /// nothing is written and no event fires. The mutator runs while the
    /// writer lock is held: it may read the store but must not mutate it.
    pub fn update<F>(&self, id: RecordId, mutator: F) -> Result<Record, StoreError>
    where
        F: FnOnce(&mut RecordEdit<'_>) -> Result<(), StoreError>,
    {
        self.commit("update", move |current, now| {
            let original = current.get(id).ok_or(StoreError::NotFound(id))?;
            let mut edited = original.clone();
            mutator(&mut RecordEdit::new(&mut edited, now))?;

            if &edited == original {
                return Ok(Plan::noop(ChangeKind::Updated(id), edited));
            }
            Ok(Plan {
                batch: Batch::new().put(edited.clone()),
                kind: ChangeKind::Updated(id),
                output: edited,
            })
        })
    }

    /// Flip completion. Completing stamps `completed_at`; reactivating
    /// clears it.
    pub fn toggle_completion(&self, id: RecordId) -> Result<Record, StoreError> {
        self.update(id, |edit| {
            edit.toggle_completed();
            Ok(())
        })
    }

    pub fn set_completed(&self, id: RecordId, completed: bool) -> Result<Record, StoreError> {
        self.update(id, |edit| {
            edit.set_completed(completed);
            Ok(())
        })
    }

    pub fn rename(&self, id: RecordId, title: &str) -> Result<Record, StoreError> {
        self.update(id, |edit| edit.set_title(title))
    }

    pub fn set_category(&self, id: RecordId, category: Category) -> Result<Record, StoreError> {
        self.update(id, |edit| {
            edit.set_category(category);
            Ok(())
        })
    }

    /// Give the listed active records the relative order of `ordered`.
    ///
    /// The records keep the set of ranks they already hold, redistributed
    /// in the new order, so every record outside `ordered` keeps its rank
    /// and its position relative to the others. Fails with a validation
    /// error if an id is unknown, completed or repeated.
    pub fn reorder(&self, ordered: &[RecordId]) -> Result<(), StoreError> {
        let ordered = ordered.to_vec();
        self.commit("reorder", move |current, _| plan_reorder(current, ordered))
    }

    /// Move one active record to `to_index` within the active ordering.
    /// Indices past the end move it to the end.
    pub fn move_active(&self, id: RecordId, to_index: usize) -> Result<(), StoreError> {
        self.commit("move", move |current, _| {
            let record = current.get(id).ok_or(StoreError::NotFound(id))?;
            if record.is_completed() {
                return Err(StoreError::validation(format!("record {id} is not active")));
            }

            let mut order: Vec<RecordId> = ViewSpec::active()
                .project(current.iter())
                .iter()
                .map(Record::id)
                .collect();
            order.retain(|other| *other != id);
            order.insert(to_index.min(order.len()), id);

            plan_reorder(current, order)
        })
    }

    /// Reassign ranks `1..=n` across every record, keeping the current
    /// order. Recovers from tied ranks and from [`StoreError::RankExhausted`].
    pub fn renormalize(&self) -> Result<(), StoreError> {
        self.commit("renormalize", |current, _| {
            let order = display_order(current);
            Ok(Plan {
                batch: rank_changes(current, RankAssigner::renumber(&order)),
                kind: ChangeKind::Reordered(order),
                output: (),
            })
        })
    }

    // ----- notification -----

    /// Register a listener called after every successful mutation, once the
    /// change is durable.
    ///
    /// Every listener sees every event, in revision order. Listeners run
    /// after the writer lock is released, so they may read the store and
    /// even mutate it; such a nested mutation is committed at once but its
    /// event is delivered only after the current event has reached every
    /// listener.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.inner.emitter.on(listener)
    }

    /// Remove a listener. Idempotent; returns whether it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.emitter.remove(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.emitter.listener_count()
    }

    // ----- views -----

    /// A live projection. It follows the store until dropped.
    pub fn view(&self, spec: ViewSpec) -> QueryView {
        QueryView::attach(spec, &self.inner.emitter, || self.snapshot())
    }

    pub fn active_view(&self) -> QueryView {
        self.view(ViewSpec::active())
    }

    pub fn completed_view(&self) -> QueryView {
        self.view(ViewSpec::completed())
    }

    pub fn all_view(&self) -> QueryView {
        self.view(ViewSpec::all())
    }

    fn commit<T, P>(&self, op: &'static str, plan: P) -> Result<T, StoreError>
    where
        P: FnOnce(&Snapshot, DateTime<Utc>) -> Result<Plan<T>, StoreError>,
    {
        let writer = self
            .inner
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = self.snapshot();
        let now = self.inner.clock.now();
        let Plan {
            batch,
            kind,
            output,
        } = plan(&current, now)?;

        if batch.is_empty() {
            tracing::trace!(op, change = ?kind, "store mutation was a no-op");
            return Ok(output);
        }

        if let Err(err) = self.inner.backend.apply(&batch) {
            tracing::warn!(
                op,
                backend = self.inner.backend.kind(),
                error = %err,
                "store write failed; state unchanged"
            );
            return Err(err.into());
        }

        let next = current.apply(&batch);
        let revision = next.revision();
        *self
            .inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next.clone();
        tracing::debug!(op, revision, change = ?kind, "store mutation committed");
        self.inner.dispatcher.enqueue(ChangeEvent {
            revision,
            kind,
            snapshot: next,
        });
        drop(writer);

        self.inner.dispatcher.deliver(&self.inner.emitter);

        Ok(output)
    }
}

fn plan_reorder(current: &Snapshot, ordered: Vec<RecordId>) -> Result<Plan<()>, StoreError> {
    let mut ranks = HashMap::with_capacity(ordered.len());
    for id in &ordered {
        let record = current
            .get(*id)
            .ok_or_else(|| StoreError::validation(format!("reorder names unknown record {id}")))?;
        if record.is_completed() {
            return Err(StoreError::validation(format!(
                "reorder names completed record {id}"
            )));
        }
        if ranks.insert(*id, record.rank()).is_some() {
            return Err(StoreError::validation(format!(
                "reorder names record {id} more than once"
            )));
        }
    }

    let assigned = match RankAssigner::reassign(&ordered, &ranks) {
        Some(assigned) => assigned,
        None => {
            // Tied ranks leave no room to express the order in place, so
            // every record is renumbered with the subset permuted.
            tracing::warn!(
                records = ordered.len(),
                "reordered records share a rank; renumbering all ranks"
            );
            let order = RankAssigner::permute_within(&display_order(current), &ordered);
            RankAssigner::renumber(&order)
        }
    };

    Ok(Plan {
        batch: rank_changes(current, assigned),
        kind: ChangeKind::Reordered(ordered),
        output: (),
    })
}

/// Every record, active and completed, in rank order.
fn display_order(current: &Snapshot) -> Vec<RecordId> {
    ViewSpec::all()
        .project(current.iter())
        .iter()
        .map(Record::id)
        .collect()
}

/// A batch writing only the records whose rank actually changes.
fn rank_changes(current: &Snapshot, assigned: Vec<(RecordId, Rank)>) -> Batch {
    let mut batch = Batch::new();
    for (id, rank) in assigned {
        if let Some(record) = current.get(id) {
            if record.rank() != rank {
                let mut moved = record.clone();
                moved.set_rank(rank);
                batch = batch.put(moved);
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone};

    fn store() -> Store<InMemoryBackend> {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Store::open_with_clock(
            InMemoryBackend::new(),
            ManualClock::with_step(start, Duration::seconds(1)),
        )
        .unwrap()
    }

    #[test]
    fn create_assigns_increasing_ranks() {
        let store = store();
        let a = store.create("a", Category::Work).unwrap();
        let b = store.create("b", Category::Personal).unwrap();

        assert_eq!(a.rank(), Rank(1));
        assert_eq!(b.rank(), Rank(2));
        assert!(!b.is_completed());
        assert_eq!(store.len(), 2);
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn create_trims_title() {
        let store = store();
        let record = store.create("  Water plants  ", Category::Personal).unwrap();
        assert_eq!(record.title(), "Water plants");
    }

    #[test]
    fn completed_records_still_count_for_next_rank() {
        let store = store();
        let a = store.create("a", Category::Work).unwrap();
        store.toggle_completion(a.id()).unwrap();
        let b = store.create("b", Category::Work).unwrap();
        assert!(b.rank() > a.rank());
    }

    #[test]
    fn update_noop_writes_nothing() {
        let store = store();
        let a = store.create("a", Category::Work).unwrap();
        let revision = store.revision();

        let same = store.set_category(a.id(), Category::Work).unwrap();
        assert_eq!(same, a);
        assert_eq!(store.revision(), revision);
        assert_eq!(store.backend().version_of(a.id()), Some(1));
    }

    #[test]
    fn mutator_error_aborts_update() {
        let store = store();
        let a = store.create("a", Category::Work).unwrap();

        let err = store
            .update(a.id(), |edit| {
                edit.set_category(Category::Personal);
                edit.set_title("   ")
            })
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.get(a.id()).unwrap(), a);
    }

    #[test]
    fn move_active_repositions() {
        let store = store();
        let a = store.create("a", Category::Work).unwrap();
        let b = store.create("b", Category::Work).unwrap();
        let c = store.create("c", Category::Work).unwrap();

        store.move_active(c.id(), 0).unwrap();
        assert_eq!(store.active_view().ids(), vec![c.id(), a.id(), b.id()]);

        store.move_active(c.id(), 99).unwrap();
        assert_eq!(store.active_view().ids(), vec![a.id(), b.id(), c.id()]);
    }

    #[test]
    fn move_active_rejects_completed() {
        let store = store();
        let a = store.create("a", Category::Work).unwrap();
        store.toggle_completion(a.id()).unwrap();

        assert!(store.move_active(a.id(), 0).unwrap_err().is_validation());
        assert!(store
            .move_active(RecordId::new(), 0)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn reorder_rejects_duplicates() {
        let store = store();
        let a = store.create("a", Category::Work).unwrap();
        let b = store.create("b", Category::Work).unwrap();

        let err = store.reorder(&[a.id(), b.id(), a.id()]).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn empty_reorder_is_noop() {
        let store = store();
        store.create("a", Category::Work).unwrap();
        let revision = store.revision();
        store.reorder(&[]).unwrap();
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn clones_share_state() {
        let store = store();
        let clone = store.clone();
        let a = store.create("a", Category::Work).unwrap();
        assert_eq!(clone.get(a.id()), Some(a));
    }

    #[test]
    fn reopen_rejects_duplicate_ids() {
        struct Doubled(Record);
        impl Backend for Doubled {
            fn load_all(&self) -> Result<Vec<Record>, BackendError> {
                Ok(vec![self.0.clone(), self.0.clone()])
            }
            fn apply(&self, _: &Batch) -> Result<(), BackendError> {
                Ok(())
            }
        }

        let record = Record::new("a".into(), Category::Work, Utc::now(), Rank(1));
        let err = Store::open(Doubled(record)).err().unwrap();
        assert!(err.is_persistence());
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    /// Backend seeded with records written under the given ranks, oldest first.
    fn seeded(ranks: &[i64]) -> (InMemoryBackend, Vec<Record>) {
        let backend = InMemoryBackend::new();
        let records: Vec<Record> = ranks
            .iter()
            .enumerate()
            .map(|(i, rank)| {
                Record::new(format!("r{i}"), Category::Work, at(i as i64), Rank(*rank))
            })
            .collect();
        let mut batch = Batch::new();
        for record in &records {
            batch = batch.put(record.clone());
        }
        backend.apply(&batch).unwrap();
        (backend, records)
    }

    #[test]
    fn reorder_over_tied_ranks_applies_order() {
        let (backend, records) = seeded(&[5, 5, 9]);
        let (a, b, c) = (records[0].id(), records[1].id(), records[2].id());
        let store = Store::open(backend).unwrap();
        assert_eq!(store.active_view().ids(), vec![b, a, c]);

        store.reorder(&[a, b]).unwrap();

        assert_eq!(store.active_view().ids(), vec![a, b, c]);
        let mut ranks: Vec<Rank> = store.records().iter().map(Record::rank).collect();
        ranks.sort();
        ranks.dedup();
        assert_eq!(ranks.len(), 3);
    }

    #[test]
    fn renormalize_keeps_order_and_frees_rank_space() {
        let (backend, records) = seeded(&[3, 3, i64::MAX]);
        let store = Store::open(backend).unwrap();
        let before = store.all_view().ids();
        assert!(matches!(
            store.create("x", Category::Work),
            Err(StoreError::RankExhausted)
        ));

        store.renormalize().unwrap();

        assert_eq!(store.all_view().ids(), before);
        assert_eq!(store.get(records[2].id()).unwrap().rank(), Rank(3));
        assert_eq!(store.create("x", Category::Work).unwrap().rank(), Rank(4));
    }

    #[test]
    fn nested_mutation_is_delivered_after_current_event() {
        let store = store();
        let follower = store.clone();
        store.subscribe(move |event| {
            if let ChangeKind::Created(id) = event.kind {
                follower.set_completed(id, true).unwrap();
            }
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        store.subscribe(move |event| s.lock().unwrap().push(event.revision));

        store.create("a", Category::Work).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(store.completed_view().len(), 1);
    }

    #[test]
    fn view_attached_mid_commit_catches_up() {
        let store = store();
        let view = QueryView::attach(ViewSpec::active(), &store.inner.emitter, || {
            let stale = store.snapshot();
            store.create("racing", Category::Work).unwrap();
            stale
        });
        assert_eq!(view.len(), 1);
        assert_eq!(view.revision(), 1);
    }
}
