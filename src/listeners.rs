use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, PoisonError},
};
use tracing::error;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered set of callbacks sharing one event type
///
/// Every dispatch runs each listener in registration order. A listener that
/// panics is logged and skipped; the rest still receive the event.
pub struct ListenerRegistry<T> {
    listeners: Mutex<Vec<Listener<T>>>,
}

impl<T> ListenerRegistry<T> {
    /// Create an empty registry
    #[must_use]
    pub const fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback
    pub fn add<F>(&self, listener: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.lock().push(Arc::new(listener));
    }

    /// Number of registered callbacks
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no callbacks are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Invoke every callback with `event`, returning how many panicked
    pub fn dispatch(&self, event: &T) -> usize {
        // Snapshot so listeners may register further listeners
        let snapshot: Vec<Listener<T>> = self.lock().clone();

        let mut failures = 0;
        for (index, listener) in snapshot.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!("Listener {} panicked; continuing dispatch", index);
                failures += 1;
            }
        }
        failures
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Listener<T>>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ListenerRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
