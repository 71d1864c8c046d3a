//! Adapter metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of one application endpoint
#[derive(Debug, Default)]
pub struct PortMetrics {
    /// Measurements handed to the application (sinks) or the bus (sources)
    transferred: AtomicU64,
    /// Measurements delivered while no callback was set
    dropped_without_callback: AtomicU64,
    /// String encode/decode failures
    string_failures: AtomicU64,
    /// Pull requests answered
    pulls: AtomicU64,
    /// Pull requests that failed
    pull_failures: AtomicU64,
}

impl PortMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    pub fn inc_transferred(&self) {
        self.transferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_without_callback(&self) -> u64 {
        self.dropped_without_callback.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_without_callback(&self) {
        self.dropped_without_callback.fetch_add(1, Ordering::Relaxed);
    }

    pub fn string_failures(&self) -> u64 {
        self.string_failures.load(Ordering::Relaxed)
    }

    pub fn inc_string_failures(&self) {
        self.string_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pulls(&self) -> u64 {
        self.pulls.load(Ordering::Relaxed)
    }

    pub fn inc_pulls(&self) {
        self.pulls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pull_failures(&self) -> u64 {
        self.pull_failures.load(Ordering::Relaxed)
    }

    pub fn inc_pull_failures(&self) {
        self.pull_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> PortSnapshot {
        PortSnapshot {
            transferred: self.transferred(),
            dropped_without_callback: self.dropped_without_callback(),
            string_failures: self.string_failures(),
            pulls: self.pulls(),
            pull_failures: self.pull_failures(),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortSnapshot {
    pub transferred: u64,
    pub dropped_without_callback: u64,
    pub string_failures: u64,
    pub pulls: u64,
    pub pull_failures: u64,
}
