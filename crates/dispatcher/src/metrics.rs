//! Queue metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters of one event queue
#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// Current number of pending events
    queue_len: AtomicUsize,
    /// Total events accepted
    enqueued: AtomicU64,
    /// Total events handed to their receiver
    delivered: AtomicU64,
    /// Total events evicted by a queue bound
    dropped: AtomicU64,
    /// Total events discarded by clear / purge
    cleared: AtomicU64,
}

impl QueueMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current queue length
    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    /// Set current queue length
    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Get enqueued count
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Increment enqueued count
    pub fn inc_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Get delivered count
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Increment delivered count
    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Get dropped count
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Increment dropped count
    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get cleared count
    pub fn cleared(&self) -> u64 {
        self.cleared.load(Ordering::Relaxed)
    }

    /// Add to cleared count
    pub fn add_cleared(&self, n: usize) {
        self.cleared.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            queue_len: self.queue_len(),
            enqueued: self.enqueued(),
            delivered: self.delivered(),
            dropped: self.dropped(),
            cleared: self.cleared(),
        }
    }
}

/// Snapshot of queue metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub queue_len: usize,
    pub enqueued: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub cleared: u64,
}
