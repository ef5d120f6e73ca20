use std::sync::atomic::{AtomicU64, Ordering};

/// Per-ring counters, maintained only when `RingConfig::enable_metrics` is set.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    full_rejections: AtomicU64,
    high_water: AtomicU64,
}

impl Counters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_enqueued(&self, n: u64) {
        self.enqueued.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_dequeued(&self, n: u64) {
        self.dequeued.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_full_rejection(&self) {
        self.full_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_occupancy(&self, occupied: u64) {
        self.high_water.fetch_max(occupied, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RingMetrics {
        RingMetrics {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            full_rejections: self.full_rejections.load(Ordering::Relaxed),
            high_water: self.high_water.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of a ring's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingMetrics {
    /// Slots published by the producer.
    pub enqueued: u64,
    /// Slots retired by the consumer.
    pub dequeued: u64,
    /// Pushes rejected because the ring was full.
    pub full_rejections: u64,
    /// Highest occupancy observed at publish time.
    pub high_water: u64,
}
