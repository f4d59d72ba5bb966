//! Sink metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Batches currently being delivered
    in_flight: AtomicUsize,
    /// Requests sent to the sink (one per attempt)
    dispatch_count: AtomicU64,
    /// Items resubmitted after a partial failure
    retried_items: AtomicU64,
    /// Batches that completed successfully
    delivered_batches: AtomicU64,
    /// Events covered by successful batches
    delivered_events: AtomicU64,
    /// Batches that ended with an error
    failed_batches: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current in-flight batch count
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Mark a batch as started
    pub fn inc_in_flight(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark a batch as finished
    pub fn dec_in_flight(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get total dispatch count
    pub fn dispatch_count(&self) -> u64 {
        self.dispatch_count.load(Ordering::Relaxed)
    }

    /// Increment dispatch count
    pub fn inc_dispatch_count(&self) {
        self.dispatch_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get retried item count
    pub fn retried_items(&self) -> u64 {
        self.retried_items.load(Ordering::Relaxed)
    }

    /// Add resubmitted items
    pub fn add_retried_items(&self, count: usize) {
        self.retried_items.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get delivered batch count
    pub fn delivered_batches(&self) -> u64 {
        self.delivered_batches.load(Ordering::Relaxed)
    }

    /// Get delivered event count
    pub fn delivered_events(&self) -> u64 {
        self.delivered_events.load(Ordering::Relaxed)
    }

    /// Record a successful batch
    pub fn record_delivered(&self, events: usize) {
        self.delivered_batches.fetch_add(1, Ordering::Relaxed);
        self.delivered_events
            .fetch_add(events as u64, Ordering::Relaxed);
    }

    /// Get failed batch count
    pub fn failed_batches(&self) -> u64 {
        self.failed_batches.load(Ordering::Relaxed)
    }

    /// Record a failed batch
    pub fn inc_failed_batches(&self) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            in_flight: self.in_flight(),
            dispatch_count: self.dispatch_count(),
            retried_items: self.retried_items(),
            delivered_batches: self.delivered_batches(),
            delivered_events: self.delivered_events(),
            failed_batches: self.failed_batches(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub in_flight: usize,
    pub dispatch_count: u64,
    pub retried_items: u64,
    pub delivered_batches: u64,
    pub delivered_events: u64,
    pub failed_batches: u64,
}
