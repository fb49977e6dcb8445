use std::sync::Arc;

use parking_lot::Mutex;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Explicit listener list for actor events.
///
/// Listeners run synchronously on the dispatching task, after the emitting
/// actor has released its own state lock.
pub(crate) struct EventListeners<E> {
    listeners: Mutex<Vec<Listener<E>>>,
}

impl<E> Default for EventListeners<E> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<E> EventListeners<E> {
    pub fn add(&self, listener: impl Fn(&E) + Send + Sync + 'static) {
        self.listeners.lock().push(Arc::new(listener));
    }

    pub fn emit(&self, event: &E) {
        // Snapshot so a listener may register further listeners.
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(event);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn listeners_may_subscribe_while_handling_an_event() {
        let listeners = Arc::new(EventListeners::<u32>::default());
        let hits = Arc::new(AtomicUsize::new(0));

        let inner = listeners.clone();
        let counter = hits.clone();
        listeners.add(move |value| {
            counter.fetch_add(*value as usize, Ordering::SeqCst);
            let counter = counter.clone();
            inner.add(move |_| {
                counter.fetch_add(100, Ordering::SeqCst);
            });
        });

        listeners.emit(&1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(listeners.len(), 2);
    }
}
