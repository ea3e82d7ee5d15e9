use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned when registering a listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

struct Registry<E> {
    listeners: RwLock<BTreeMap<ListenerId, Listener<E>>>,
    next_id: AtomicU64,
}

/// Synchronous publish/subscribe hub.
///
/// Listeners run on the emitting thread, in registration order. The
/// listener table is not locked while they run, so a listener may register
/// or remove listeners (itself included) without deadlocking.
pub struct Emitter<E> {
    registry: Arc<Registry<E>>,
}

impl<E> Emitter<E> {
    pub fn new() -> Self {
        Emitter {
            registry: Arc::new(Registry {
                listeners: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self
            .registry
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.insert(id, Arc::new(listener));
        id
    }

    /// Remove a listener. Returns whether it was registered; removing twice
    /// is harmless.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.registry.remove(id)
    }

    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = {
            let listeners = self
                .registry
                .listeners
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            listeners.values().cloned().collect()
        };
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry
            .listeners
            .read()
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// A weak handle that can remove listeners without keeping the emitter
    /// alive.
    pub(crate) fn remover(&self) -> Remover<E> {
        Remover {
            registry: Arc::downgrade(&self.registry),
        }
    }
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Registry<E> {
    fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.remove(&id).is_some()
    }
}

pub(crate) struct Remover<E> {
    registry: Weak<Registry<E>>,
}

impl<E> Remover<E> {
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(id),
            None => false,
        }
    }
}
