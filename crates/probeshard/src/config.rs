/// Number of slots a shard inspects per batch: the coalescing look-ahead
/// window and the ceiling on concurrently pipelined probes. Kept at no more
/// than half the smallest queue capacity so a full window always fits behind
/// the producer.
pub const BATCH_SIZE: usize = 32;

/// Hard cap on shard count, matching the engine's logical-thread ceiling.
pub const MAX_SHARDS: usize = 256;

/// Service-wide settings, read-only after startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of shard threads; one per paired transaction worker.
    pub shards: usize,
    /// Coalesce duplicate-key probes within a batch.
    pub coalesce: bool,
    /// Service probes through resumable tasks instead of synchronous calls.
    pub coroutine: bool,
    /// Per-shard queue capacity as a power of 2.
    pub queue_bits: u8,
    /// Track per-queue counters (occupancy high-water, full rejections).
    pub queue_metrics: bool,
    /// Workload name used to select the key partitioner.
    pub benchmark: String,
}

impl Config {
    /// A serial, non-coalescing configuration for `shards` shard threads.
    ///
    /// # Panics
    ///
    /// Panics if `shards` is 0 or exceeds [`MAX_SHARDS`].
    pub fn new(shards: usize) -> Self {
        assert!(
            shards >= 1 && shards <= MAX_SHARDS,
            "shards must be between 1 and {MAX_SHARDS}"
        );

        Self {
            shards,
            coalesce: false,
            coroutine: false,
            queue_bits: 12, // 4K slots
            queue_metrics: false,
            benchmark: String::from("ycsb"),
        }
    }

    pub fn coalesce(mut self, on: bool) -> Self {
        self.coalesce = on;
        self
    }

    pub fn coroutine(mut self, on: bool) -> Self {
        self.coroutine = on;
        self
    }

    pub fn queue_bits(mut self, bits: u8) -> Self {
        self.queue_bits = bits;
        self
    }

    pub fn queue_metrics(mut self, on: bool) -> Self {
        self.queue_metrics = on;
        self
    }

    pub fn benchmark(mut self, name: &str) -> Self {
        self.benchmark = name.to_string();
        self
    }

    /// Per-shard queue capacity in slots.
    #[inline]
    pub fn queue_capacity(&self) -> usize {
        1 << self.queue_bits
    }

    /// Re-validates every field; services call this at startup.
    ///
    /// # Panics
    ///
    /// Panics on out-of-range shard counts or a queue too shallow for the
    /// batch window.
    pub(crate) fn assert_valid(&self) {
        assert!(
            self.shards >= 1 && self.shards <= MAX_SHARDS,
            "shards must be between 1 and {MAX_SHARDS}"
        );
        assert!(
            self.queue_bits >= 1 && self.queue_bits <= 20,
            "queue_bits must be between 1 and 20"
        );
        assert!(
            self.queue_capacity() >= 2 * BATCH_SIZE,
            "queue capacity {} cannot hold two batch windows of {BATCH_SIZE}",
            self.queue_capacity()
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(1)
    }
}
