use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use super::ChangeEvent;
use crate::emitter::Emitter;

#[derive(Default)]
struct Outbox {
    queue: VecDeque<ChangeEvent>,
    /// Thread currently delivering, if any.
    draining: Option<ThreadId>,
}

/// Delivers change events to store listeners one at a time, in the order
/// they were enqueued.
///
/// Events are enqueued under the store's writer lock, so queue order is
/// revision order. A commit made from inside a listener only enqueues; the
/// delivery already running on that thread picks it up once the current
/// event has reached every listener. Other threads wait for the running
/// delivery to finish, so a mutating call returns only after its own event
/// has been delivered.
#[derive(Default)]
pub(crate) struct Dispatcher {
    outbox: Mutex<Outbox>,
    idle: Condvar,
}

impl Dispatcher {
    fn outbox(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn enqueue(&self, event: ChangeEvent) {
        self.outbox().queue.push_back(event);
    }

    pub(crate) fn deliver(&self, emitter: &Emitter<ChangeEvent>) {
        let me = thread::current().id();
        {
            let mut outbox = self.outbox();
            loop {
                match outbox.draining {
                    Some(owner) if owner == me => return,
                    Some(_) => {
                        outbox = self.idle.wait(outbox).unwrap_or_else(PoisonError::into_inner);
                    }
                    None => break,
                }
            }
            if outbox.queue.is_empty() {
                return;
            }
            outbox.draining = Some(me);
        }

        let _release = Release(self);
        loop {
            let next = self.outbox().queue.pop_front();
            match next {
                Some(event) => emitter.emit(&event),
                None => break,
            }
        }
    }
}

/// Hands delivery back even if a listener panics.
struct Release<'a>(&'a Dispatcher);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.0.outbox().draining = None;
        self.0.idle.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangeKind, Snapshot};
    use crate::record::RecordId;
    use std::sync::Arc;

    fn event(revision: u64) -> ChangeEvent {
        ChangeEvent {
            revision,
            kind: ChangeKind::Deleted(RecordId::new()),
            snapshot: Snapshot::default(),
        }
    }

    #[test]
    fn nested_enqueue_waits_for_current_event() {
        let dispatcher = Arc::new(Dispatcher::default());
        let emitter = Arc::new(Emitter::<ChangeEvent>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let d = Arc::clone(&dispatcher);
        let e = Arc::clone(&emitter);
        emitter.on(move |ev: &ChangeEvent| {
            if ev.revision == 1 {
                d.enqueue(event(2));
                d.deliver(&e);
            }
        });
        let s = Arc::clone(&seen);
        emitter.on(move |ev: &ChangeEvent| s.lock().unwrap().push(ev.revision));

        dispatcher.enqueue(event(1));
        dispatcher.deliver(&emitter);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert!(dispatcher.outbox().queue.is_empty());
        assert!(dispatcher.outbox().draining.is_none());
    }

    #[test]
    fn empty_queue_delivers_nothing() {
        let dispatcher = Dispatcher::default();
        let emitter = Emitter::<ChangeEvent>::new();
        dispatcher.deliver(&emitter);
        assert!(dispatcher.outbox().draining.is_none());
    }
}
