//! Per-stream fan-out metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for one stream's listener
#[derive(Debug, Default)]
pub struct StreamMetrics {
    /// Sinks currently in the set
    sink_count: AtomicUsize,
    /// Payloads handed to the listener
    deliveries: AtomicU64,
    /// Successful sink writes
    write_count: AtomicU64,
    /// Failed sink writes
    failure_count: AtomicU64,
    /// Sinks dropped at delivery time
    pruned_count: AtomicU64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink_count(&self) -> usize {
        self.sink_count.load(Ordering::Acquire)
    }

    pub fn set_sink_count(&self, count: usize) {
        self.sink_count.store(count, Ordering::Release);
    }

    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    pub fn inc_deliveries(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    pub fn inc_write_count(&self) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pruned_count(&self) -> u64 {
        self.pruned_count.load(Ordering::Relaxed)
    }

    pub fn inc_pruned_count(&self) {
        self.pruned_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot {
            sink_count: self.sink_count(),
            deliveries: self.deliveries(),
            write_count: self.write_count(),
            failure_count: self.failure_count(),
            pruned_count: self.pruned_count(),
        }
    }
}

/// Snapshot of stream metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamMetricsSnapshot {
    pub sink_count: usize,
    pub deliveries: u64,
    pub write_count: u64,
    pub failure_count: u64,
    pub pruned_count: u64,
}
