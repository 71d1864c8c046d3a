//! EventQueue - priority ordered, bounded per receiving port
//!
//! Events are ordered by `(priority, sequence)`: lower keys first, FIFO among
//! equal keys. A receiving port registered with a bound keeps at most that many
//! pending events; on overflow the oldest pending event of that port is evicted.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use slab::Slab;
use tracing::{debug, trace};

use contracts::MeasurementKind;

use crate::metrics::QueueMetrics;

/// Work executed on the dispatch thread
pub type Delivery = Box<dyn FnOnce() + Send>;

/// Handle of a registered receiving port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortKey(usize);

/// Result of an enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Event queued
    Queued,
    /// Event queued after evicting the oldest pending event of the port
    ReplacedOldest,
    /// Port no longer registered, event discarded
    Detached,
}

/// A pending delivery
pub struct Event {
    port: PortKey,
    kind: MeasurementKind,
    priority: u64,
    enqueued_at: Instant,
    deliver: Delivery,
}

impl Event {
    /// Receiving port
    pub fn port(&self) -> PortKey {
        self.port
    }

    /// Kind of the carried measurement
    pub fn kind(&self) -> MeasurementKind {
        self.kind
    }

    /// Priority key
    pub fn priority(&self) -> u64 {
        self.priority
    }

    /// Time spent in the queue so far
    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Run the delivery
    pub fn deliver(self) {
        (self.deliver)()
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("port", &self.port)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

struct PortQueue {
    label: String,
    kind: MeasurementKind,
    max_len: Option<NonZeroUsize>,
    /// sequence -> priority, oldest first
    pending: BTreeMap<u64, u64>,
}

#[derive(Default)]
struct Inner {
    ports: Slab<PortQueue>,
    order: BTreeMap<(u64, u64), Event>,
    next_seq: u64,
}

/// Shared event queue feeding the dispatch thread
#[derive(Default)]
pub struct EventQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
    metrics: QueueMetrics,
}

impl EventQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue counters
    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }

    /// Register a receiving port; `max_len` bounds its pending events
    pub fn register_port(
        &self,
        label: impl Into<String>,
        kind: MeasurementKind,
        max_len: Option<NonZeroUsize>,
    ) -> PortKey {
        let label = label.into();
        let mut inner = self.lock();
        let key = inner.ports.insert(PortQueue {
            label: label.clone(),
            kind,
            max_len,
            pending: BTreeMap::new(),
        });
        trace!(port = %label, kind = %kind, ?max_len, "Port registered");
        PortKey(key)
    }

    /// Drop every pending event of `port`; returns how many were dropped
    pub fn purge_port(&self, port: PortKey) -> usize {
        let mut inner = self.lock();
        let removed = Self::purge_locked(&mut inner, port);
        self.metrics.set_queue_len(inner.order.len());
        removed
    }

    /// Purge `port` and forget it; later enqueues report [`EnqueueOutcome::Detached`]
    pub fn unregister_port(&self, port: PortKey) -> usize {
        let mut inner = self.lock();
        let removed = Self::purge_locked(&mut inner, port);
        if let Some(entry) = inner.ports.try_remove(port.0) {
            trace!(port = %entry.label, removed, "Port unregistered");
        }
        self.metrics.set_queue_len(inner.order.len());
        removed
    }

    fn purge_locked(inner: &mut Inner, port: PortKey) -> usize {
        let Some(entry) = inner.ports.get_mut(port.0) else {
            return 0;
        };
        let pending = std::mem::take(&mut entry.pending);
        for (seq, priority) in &pending {
            inner.order.remove(&(*priority, *seq));
        }
        pending.len()
    }

    /// Queue `deliver` for `port` with `priority`
    pub fn enqueue(&self, port: PortKey, priority: u64, deliver: Delivery) -> EnqueueOutcome {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let Some(entry) = inner.ports.get_mut(port.0) else {
            return EnqueueOutcome::Detached;
        };
        let kind = entry.kind;

        let mut outcome = EnqueueOutcome::Queued;
        let mut evicted = None;
        if let Some(max) = entry.max_len {
            if entry.pending.len() >= max.get() {
                evicted = entry.pending.pop_first();
                outcome = EnqueueOutcome::ReplacedOldest;
            }
        }
        entry.pending.insert(seq, priority);

        if let Some((old_seq, old_priority)) = evicted {
            inner.order.remove(&(old_priority, old_seq));
            self.metrics.inc_dropped();
            observability::record_event_dropped(kind, "overflow");
            debug!(kind = %kind, "Queue bound reached, oldest event dropped");
        }

        inner.order.insert(
            (priority, seq),
            Event {
                port,
                kind,
                priority,
                enqueued_at: Instant::now(),
                deliver,
            },
        );
        let len = inner.order.len();
        drop(inner);

        self.metrics.inc_enqueued();
        self.metrics.set_queue_len(len);
        observability::record_event_enqueued(kind);
        self.ready.notify_one();
        outcome
    }

    /// Pop the lowest-priority event, waiting up to `timeout` for one
    pub fn pop_blocking(&self, timeout: Duration) -> Option<Event> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if let Some(((_, seq), event)) = inner.order.pop_first() {
                if let Some(entry) = inner.ports.get_mut(event.port.0) {
                    entry.pending.remove(&seq);
                }
                self.metrics.set_queue_len(inner.order.len());
                return Some(event);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = self
                .ready
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
            if result.timed_out() && inner.order.is_empty() {
                return None;
            }
        }
    }

    /// Pop without waiting
    pub fn try_pop(&self) -> Option<Event> {
        self.pop_blocking(Duration::ZERO)
    }

    /// Wake every waiter of [`pop_blocking`](Self::pop_blocking)
    pub fn wake_all(&self) {
        self.ready.notify_all();
    }

    /// Drop every pending event; ports stay registered
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let removed = inner.order.len();
        inner.order.clear();
        for (_, entry) in inner.ports.iter_mut() {
            entry.pending.clear();
        }
        drop(inner);
        self.metrics.set_queue_len(0);
        self.metrics.add_cleared(removed);
        if removed > 0 {
            debug!(removed, "Event queue cleared");
        }
        removed
    }

    /// Pending events across all ports
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending events of one port
    pub fn port_len(&self, port: PortKey) -> usize {
        self.lock()
            .ports
            .get(port.0)
            .map(|entry| entry.pending.len())
            .unwrap_or(0)
    }

    /// Registered receiving ports
    pub fn port_count(&self) -> usize {
        self.lock().ports.len()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Delivery) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |tag: u32| -> Delivery {
            let sink = Arc::clone(&sink);
            Box::new(move || sink.lock().unwrap().push(tag))
        };
        (log, make)
    }

    fn drain(queue: &EventQueue) {
        while let Some(event) = queue.try_pop() {
            event.deliver();
        }
    }

    #[test]
    fn test_lower_priority_first_fifo_on_ties() {
        let queue = EventQueue::new();
        let port = queue.register_port("sink.Input", MeasurementKind::Pose, None);
        let (log, make) = recorder();

        queue.enqueue(port, 30, make(1));
        queue.enqueue(port, 10, make(2));
        queue.enqueue(port, 20, make(3));
        queue.enqueue(port, 10, make(4));

        drain(&queue);
        assert_eq!(*log.lock().unwrap(), vec![2, 4, 3, 1]);
        assert_eq!(queue.metrics().delivered(), 0);
        assert_eq!(queue.metrics().enqueued(), 4);
    }

    #[test]
    fn test_bound_one_keeps_latest() {
        let queue = EventQueue::new();
        let port = queue.register_port("viewer.Input", MeasurementKind::Image, NonZeroUsize::new(1));
        let (log, make) = recorder();

        assert_eq!(queue.enqueue(port, 1, make(1)), EnqueueOutcome::Queued);
        assert_eq!(queue.enqueue(port, 2, make(2)), EnqueueOutcome::ReplacedOldest);
        assert_eq!(queue.enqueue(port, 3, make(3)), EnqueueOutcome::ReplacedOldest);
        assert_eq!(queue.port_len(port), 1);

        drain(&queue);
        assert_eq!(*log.lock().unwrap(), vec![3]);
        assert_eq!(queue.metrics().dropped(), 2);
    }

    #[test]
    fn test_bound_evicts_oldest_not_lowest_priority() {
        let queue = EventQueue::new();
        let port = queue.register_port("p", MeasurementKind::Distance, NonZeroUsize::new(2));
        let (log, make) = recorder();

        queue.enqueue(port, 50, make(1));
        queue.enqueue(port, 10, make(2));
        queue.enqueue(port, 30, make(3));

        drain(&queue);
        assert_eq!(*log.lock().unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_bound_is_per_port() {
        let queue = EventQueue::new();
        let a = queue.register_port("a", MeasurementKind::Image, NonZeroUsize::new(1));
        let b = queue.register_port("b", MeasurementKind::Image, NonZeroUsize::new(1));
        let (log, make) = recorder();

        queue.enqueue(a, 1, make(1));
        queue.enqueue(b, 2, make(2));

        drain(&queue);
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_unregistered_port_is_detached() {
        let queue = EventQueue::new();
        let port = queue.register_port("gone", MeasurementKind::Pose, None);
        let (log, make) = recorder();

        queue.enqueue(port, 1, make(1));
        assert_eq!(queue.unregister_port(port), 1);
        assert_eq!(queue.enqueue(port, 2, make(2)), EnqueueOutcome::Detached);

        drain(&queue);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(queue.port_count(), 0);
    }

    #[test]
    fn test_purge_only_touches_one_port() {
        let queue = EventQueue::new();
        let a = queue.register_port("a", MeasurementKind::Pose, None);
        let b = queue.register_port("b", MeasurementKind::Pose, None);
        let (log, make) = recorder();

        queue.enqueue(a, 1, make(1));
        queue.enqueue(b, 2, make(2));
        queue.enqueue(a, 3, make(3));

        assert_eq!(queue.purge_port(a), 2);
        drain(&queue);
        assert_eq!(*log.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_clear_keeps_ports() {
        let queue = EventQueue::new();
        let port = queue.register_port("p", MeasurementKind::Image, NonZeroUsize::new(1));
        let (_log, make) = recorder();

        queue.enqueue(port, 1, make(1));
        assert_eq!(queue.clear(), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.port_len(port), 0);
        assert_eq!(queue.enqueue(port, 2, make(2)), EnqueueOutcome::Queued);
        assert_eq!(queue.metrics().cleared(), 1);
    }

    #[test]
    fn test_pop_blocking_times_out() {
        let queue = EventQueue::new();
        let start = Instant::now();
        assert!(queue.pop_blocking(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_pop_blocking_wakes_on_enqueue() {
        let queue = Arc::new(EventQueue::new());
        let port = queue.register_port("p", MeasurementKind::Button, None);

        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                queue.enqueue(port, 0, Box::new(|| {}));
            })
        };

        let event = queue.pop_blocking(Duration::from_secs(5));
        assert!(event.is_some());
        producer.join().unwrap();
    }
}
