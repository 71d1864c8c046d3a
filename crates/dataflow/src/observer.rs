//! Observer bus - fan-out of topology changes

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{trace, warn};

use contracts::{ComponentId, DataflowObserver, Subgraph};

/// Registered listeners, notified in registration order
///
/// A panicking listener is logged and skipped; the remaining listeners and the
/// mutation in progress are unaffected.
#[derive(Default)]
pub struct ObserverBus {
    observers: Vec<Arc<dyn DataflowObserver>>,
    failures: AtomicU64,
}

impl ObserverBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `observer`; returns `false` if it was already registered
    pub fn register(&mut self, observer: Arc<dyn DataflowObserver>) -> bool {
        if self.observers.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            return false;
        }
        self.observers.push(observer);
        true
    }

    /// Remove `observer`; returns `false` if it was not registered
    pub fn unregister(&mut self, observer: &Arc<dyn DataflowObserver>) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| !Arc::ptr_eq(o, observer));
        self.observers.len() != before
    }

    /// Remove every observer
    pub fn clear(&mut self) {
        self.observers.clear();
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Listener panics caught so far
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn notify_removed(&self, pattern: &str, id: &ComponentId) {
        observability::record_topology_change("delete");
        for observer in &self.observers {
            trace!(pattern, id = %id, "Notifying observer of deletion");
            let result = catch_unwind(AssertUnwindSafe(|| {
                observer.notify_delete_component(pattern, id)
            }));
            if result.is_err() {
                self.record_failure("delete", pattern, id);
            }
        }
    }

    pub fn notify_added(&self, pattern: &str, id: &ComponentId, subgraph: &Subgraph) {
        observability::record_topology_change("add");
        for observer in &self.observers {
            trace!(pattern, id = %id, "Notifying observer of addition");
            let result = catch_unwind(AssertUnwindSafe(|| {
                observer.notify_add_component(pattern, id, subgraph)
            }));
            if result.is_err() {
                self.record_failure("add", pattern, id);
            }
        }
    }

    fn record_failure(&self, event: &'static str, pattern: &str, id: &ComponentId) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        observability::record_observer_failure(event);
        warn!(event, pattern, id = %id, "Observer panicked, notification skipped");
    }
}
