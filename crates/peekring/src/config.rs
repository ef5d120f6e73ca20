/// Sizing and instrumentation knobs for a ring.
#[derive(Debug, Clone, Copy)]
pub struct RingConfig {
    /// Ring capacity as a power of 2 (default: 12 = 4K slots)
    pub ring_bits: u8,
    /// Enable the per-ring counters (slight overhead on the hot paths)
    pub enable_metrics: bool,
}

impl RingConfig {
    /// Creates a new configuration with custom settings.
    ///
    /// # Panics
    ///
    /// Panics if `ring_bits` is 0 or greater than 20 (1M slots max).
    pub const fn new(ring_bits: u8, enable_metrics: bool) -> Self {
        assert!(
            ring_bits > 0 && ring_bits <= 20,
            "ring_bits must be between 1 and 20 (max 1M slots)"
        );

        Self {
            ring_bits,
            enable_metrics,
        }
    }

    /// Returns the slot capacity of the ring.
    #[inline]
    pub const fn capacity(&self) -> usize {
        1 << self.ring_bits
    }

    /// Returns the mask for index wrapping.
    #[inline]
    pub const fn mask(&self) -> usize {
        self.capacity() - 1
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            ring_bits: 12, // 4K slots
            enable_metrics: false,
        }
    }
}

/// Small ring (64 slots) for tests and tight-memory deployments.
pub const SHALLOW_RING: RingConfig = RingConfig::new(6, false);

/// Deep ring (256K slots) for producers that burst far ahead of the consumer.
pub const DEEP_RING: RingConfig = RingConfig::new(18, false);
