use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Counters shared between the hub actor and its handles.
///
/// `stalled` is the observable side of a listener that stops draining its
/// queue: each eviction after a send timeout bumps it.
#[derive(Debug, Default)]
pub struct HubMetrics {
    submitted: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    stalled: AtomicU64,
    detached: AtomicU64,
    subscribers: AtomicUsize,
}

/// Point-in-time copy of [`HubMetrics`], served on `/health`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Messages accepted into the input queue.
    pub submitted: u64,
    /// Messages rejected because the input queue was full.
    pub dropped: u64,
    /// Individual per-listener deliveries.
    pub delivered: u64,
    /// Listeners evicted after a send timeout.
    pub stalled: u64,
    /// Listeners removed because their session went away without unregistering.
    pub detached: u64,
    /// Listeners currently registered.
    pub subscribers: usize,
}

impl HubMetrics {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, n: u64) {
        self.delivered.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_stalled(&self) {
        self.stalled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_detached(&self) {
        self.detached.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_subscribers(&self, n: usize) {
        self.subscribers.store(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            stalled: self.stalled.load(Ordering::Relaxed),
            detached: self.detached.load(Ordering::Relaxed),
            subscribers: self.subscribers.load(Ordering::Relaxed),
        }
    }
}
