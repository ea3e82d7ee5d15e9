use std::sync::{Arc, RwLock};

use super::ViewSpec;
use crate::emitter::{Emitter, ListenerId, Remover};
use crate::record::{Record, RecordId};
use crate::store::{ChangeEvent, Snapshot};

/// Notification delivered to view listeners when the projected sequence
/// changes in content or order.
#[derive(Clone, Debug)]
pub struct ViewChanged {
    /// Store revision the new sequence was derived from.
    pub revision: u64,
    pub items: Arc<[Record]>,
}

struct ViewState {
    revision: Option<u64>,
    items: Arc<[Record]>,
}

struct Shared {
    spec: ViewSpec,
    state: RwLock<ViewState>,
    emitter: Emitter<ViewChanged>,
}

impl Shared {
    /// Re-derive the projection from `snapshot`. Events that arrive out of
    /// order are ignored; a view never moves back to an older revision.
    fn refresh(&self, snapshot: &Snapshot) {
        let changed = {
            let mut state = self
                .state
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if state
                .revision
                .is_some_and(|seen| snapshot.revision() <= seen)
            {
                return;
            }

            let items: Arc<[Record]> = self.spec.project(snapshot.iter()).into();
            state.revision = Some(snapshot.revision());
            if items[..] == state.items[..] {
                None
            } else {
                state.items = Arc::clone(&items);
                Some(ViewChanged {
                    revision: snapshot.revision(),
                    items,
                })
            }
        };

        if let Some(event) = changed {
            self.emitter.emit(&event);
        }
    }
}

/// Live projection over a [`Store`](crate::Store).
///
/// Holds no mutation authority: it only reads the snapshots the store
/// publishes. Dropping the view detaches it from the store.
pub struct QueryView {
    shared: Arc<Shared>,
    store_listener: ListenerId,
    store_remover: Remover<ChangeEvent>,
}

impl QueryView {
    /// Subscribe to `store_emitter`, then project whatever `current` returns.
    /// A commit that lands between the two reaches the view through the
    /// listener; the revision guard drops whichever copy arrives second.
    pub(crate) fn attach<F>(
        spec: ViewSpec,
        store_emitter: &Emitter<ChangeEvent>,
        current: F,
    ) -> Self
    where
        F: FnOnce() -> Snapshot,
    {
        let shared = Arc::new(Shared {
            spec,
            state: RwLock::new(ViewState {
                revision: None,
                items: Arc::from(Vec::new()),
            }),
            emitter: Emitter::new(),
        });

        let listener_shared = Arc::clone(&shared);
        let store_listener = store_emitter.on(move |event: &ChangeEvent| {
            listener_shared.refresh(&event.snapshot);
        });
        shared.refresh(&current());

        QueryView {
            shared,
            store_listener,
            store_remover: store_emitter.remover(),
        }
    }

    pub fn spec(&self) -> ViewSpec {
        self.shared.spec
    }

    fn state(&self) -> std::sync::RwLockReadGuard<'_, ViewState> {
        self.shared
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The current ordered sequence.
    pub fn current_items(&self) -> Vec<Record> {
        self.state().items.to_vec()
    }

    /// Shared handle to the current sequence, without copying it.
    pub fn items(&self) -> Arc<[Record]> {
        Arc::clone(&self.state().items)
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.state().items.iter().map(Record::id).collect()
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().items.is_empty()
    }

    /// Store revision the current sequence reflects.
    pub fn revision(&self) -> u64 {
        self.state().revision.unwrap_or(0)
    }

    /// Position of a record in the current sequence.
    pub fn position(&self, id: RecordId) -> Option<usize> {
        self.state().items.iter().position(|r| r.id() == id)
    }

    /// Register a listener for sequence changes. Mutations that leave this
    /// view's sequence as it was do not fire it.
    pub fn on_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ViewChanged) + Send + Sync + 'static,
    {
        self.shared.emitter.on(listener)
    }

    /// Idempotent.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.emitter.remove(id)
    }
}

impl Drop for QueryView {
    fn drop(&mut self) {
        self.store_remover.remove(self.store_listener);
    }
}

impl std::fmt::Debug for QueryView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryView")
            .field("spec", &self.shared.spec)
            .field("revision", &self.revision())
            .field("len", &self.len())
            .finish()
    }
}
