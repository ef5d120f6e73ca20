use crate::invariants::{
    debug_assert_bounded_count, debug_assert_monotonic, debug_assert_peek_not_retired,
    debug_assert_tail_not_past_head,
};
use crate::metrics::Counters;
use crate::{RingConfig, RingMetrics};
use crossbeam_utils::Backoff;
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// The ring uses a classic SPSC protocol with two monotonic u64 cursors:
//
// - `head`: producer cursor; next slot to publish. Written only by the
//   producer, read by the consumer.
// - `tail`: consumer cursor; next slot to retire. Written only by the
//   consumer, read by the producer.
//
// Unbounded sequence numbers (not wrapped indices) rule out ABA confusion;
// the buffer index is `cursor & mask`, computed only at slot access.
//
// **Producer (publish path):**
// 1. Load `head` with Relaxed (single writer)
// 2. Load `cached_tail` (UnsafeCell, producer-private)
// 3. If the cache shows no space: load `tail` with Acquire and refresh
// 4. Write the slot (plain write, protected by the protocol)
// 5. Store `head` with Release (publishes the slot)
//
// **Consumer (peek/retire path):**
// 1. Load `tail` with Relaxed (single writer)
// 2. Load `cached_head` (UnsafeCell, consumer-private)
// 3. If the peek position is not covered: load `head` with Acquire, refresh
// 4. Read slots in `[tail, head)` (plain reads, protected by the protocol)
// 5. Store `tail` with Release after retiring a batch
//
// The peek window contract: a slot in `[tail, head)` is immutable until the
// consumer advances `tail` past it, so `&T` references handed out by `peek`
// stay valid for as long as the borrow rules hold them (the retire methods
// take `&mut self`, which ends all outstanding peeks).
//
// Single-writer fields accessed through UnsafeCell without atomics:
// - `cached_tail`: written and read only by the producer
// - `cached_head`: written and read only by the consumer
// - `buffer[idx]`: written by the producer before the `head` release,
//   read by the consumer before the `tail` release
//
// The `RingProducer`/`RingConsumer` handles are the sole owners of their
// side: neither is `Clone`, and every cursor-moving method takes `&mut self`.
//
// =============================================================================

/// Error returned by a failed push, carrying the rejected item back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError<T> {
    /// The ring is full; retry after the consumer retires slots.
    Full(T),
    /// The ring is closed; no further slots will be accepted.
    Closed(T),
}

impl<T> PushError<T> {
    /// Recovers the item that could not be pushed.
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }

    /// Returns `true` if the push failed only because the ring was full.
    #[inline]
    pub fn is_full(&self) -> bool {
        matches!(self, PushError::Full(_))
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("ring is full"),
            PushError::Closed(_) => f.write_str("ring is closed"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for PushError<T> {}

/// The shared ring state. Constructed through [`ring`], which hands the two
/// sides out as single-owner handles.
#[repr(C)]
pub(crate) struct PeekRing<T> {
    // === PRODUCER HOT === (128-byte aligned)
    /// Producer cursor (written by producer, read by consumer)
    head: CacheAligned<AtomicU64>,
    /// Producer's cached view of tail (avoids cross-core reads)
    cached_tail: CacheAligned<UnsafeCell<u64>>,

    // === CONSUMER HOT === (128-byte aligned)
    /// Consumer cursor (written by consumer, read by producer)
    tail: CacheAligned<AtomicU64>,
    /// Consumer's cached view of head (avoids cross-core reads)
    cached_head: CacheAligned<UnsafeCell<u64>>,

    // === COLD STATE ===
    closed: AtomicBool,
    counters: Counters,
    config: RingConfig,

    // === DATA BUFFER ===
    /// Fixed slot storage. `Box<[MaybeUninit<T>]>` rather than `Vec`: the size
    /// never changes after construction.
    buffer: UnsafeCell<Box<[MaybeUninit<T>]>>,
}

// Safety: the cursor protocol above makes the ring shareable between exactly
// one producer thread and one consumer thread as long as T itself is Send.
unsafe impl<T: Send> Send for PeekRing<T> {}
unsafe impl<T: Send> Sync for PeekRing<T> {}

impl<T> PeekRing<T> {
    fn new(config: RingConfig) -> Self {
        let capacity = config.capacity();
        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, MaybeUninit::uninit);

        Self {
            head: CacheAligned::new(AtomicU64::new(0)),
            cached_tail: CacheAligned::new(UnsafeCell::new(0)),
            tail: CacheAligned::new(AtomicU64::new(0)),
            cached_head: CacheAligned::new(UnsafeCell::new(0)),
            closed: AtomicBool::new(false),
            counters: Counters::new(),
            config,
            buffer: UnsafeCell::new(buffer.into_boxed_slice()),
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.config.capacity()
    }

    #[inline]
    fn mask(&self) -> usize {
        self.config.mask()
    }

    #[inline]
    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail) as usize
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn metrics(&self) -> RingMetrics {
        self.counters.snapshot()
    }
}

impl<T> Drop for PeekRing<T> {
    fn drop(&mut self) {
        // Drop every slot still in the published window.
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        let count = head.wrapping_sub(tail) as usize;

        if count > 0 {
            let mask = self.mask();
            let buffer = self.buffer.get_mut();

            for i in 0..count {
                let idx = ((tail as usize).wrapping_add(i)) & mask;
                unsafe {
                    ptr::drop_in_place(buffer[idx].as_mut_ptr());
                }
            }
        }
    }
}

/// Creates a ring and splits it into its two single-owner endpoints.
pub fn ring<T>(config: RingConfig) -> (RingProducer<T>, RingConsumer<T>) {
    let shared = Arc::new(PeekRing::new(config));
    (
        RingProducer {
            ring: Arc::clone(&shared),
        },
        RingConsumer { ring: shared },
    )
}

/// The producing endpoint. Not `Clone`: exactly one producer per ring.
pub struct RingProducer<T> {
    ring: Arc<PeekRing<T>>,
}

impl<T> RingProducer<T> {
    /// Publishes one item, failing immediately when the ring is full or closed.
    pub fn try_push(&mut self, item: T) -> Result<(), PushError<T>> {
        let ring = &*self.ring;

        if ring.is_closed() {
            return Err(PushError::Closed(item));
        }

        let head = ring.head.load(Ordering::Relaxed);

        // Fast path: check the cached tail.
        // SAFETY: cached_tail is written only by the producer (this method),
        // and `&mut self` guarantees no concurrent producer call.
        let mut tail = unsafe { *ring.cached_tail.get() };
        let mut free = ring.capacity().saturating_sub(head.wrapping_sub(tail) as usize);

        if free == 0 {
            // Slow path: refresh the cache from the consumer's cursor.
            tail = ring.tail.load(Ordering::Acquire);
            // SAFETY: as above; the Acquire load synchronizes with the
            // consumer's Release store of tail.
            unsafe {
                *ring.cached_tail.get() = tail;
            }
            free = ring.capacity().saturating_sub(head.wrapping_sub(tail) as usize);
            if free == 0 {
                if ring.config.enable_metrics {
                    ring.counters.add_full_rejection();
                }
                return Err(PushError::Full(item));
            }
        }

        let idx = (head as usize) & ring.mask();
        // SAFETY: free > 0 means the slot at `head` is outside the published
        // window `[tail, head)` and outside the consumer's reach; only this
        // producer writes it, and the Release store below publishes it.
        unsafe {
            let buffer = &mut *ring.buffer.get();
            buffer[idx].write(item);
        }

        let new_head = head.wrapping_add(1);
        debug_assert_bounded_count!(new_head.wrapping_sub(tail) as usize, ring.capacity());
        debug_assert_monotonic!("head", head, new_head);

        ring.head.store(new_head, Ordering::Release);

        if ring.config.enable_metrics {
            ring.counters.add_enqueued(1);
            let occupied = new_head.wrapping_sub(ring.tail.load(Ordering::Relaxed));
            ring.counters.record_occupancy(occupied);
        }

        Ok(())
    }

    /// Publishes one item, spinning briefly and then yielding while the ring
    /// is full. Items are never dropped; the only failure is a closed ring.
    pub fn push_blocking(&mut self, item: T) -> Result<(), PushError<T>> {
        let backoff = Backoff::new();
        let mut item = item;
        loop {
            match self.try_push(item) {
                Ok(()) => return Ok(()),
                Err(PushError::Closed(it)) => return Err(PushError::Closed(it)),
                Err(PushError::Full(it)) => {
                    item = it;
                    backoff.snooze();
                }
            }
        }
    }

    /// Returns the number of published, unretired slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` if no published slot is outstanding.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the slot capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Closes the ring; subsequent pushes fail with [`PushError::Closed`].
    pub fn close(&self) {
        self.ring.close();
    }

    /// Returns `true` if the ring has been closed by either side.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.ring.is_closed()
    }

    /// Returns a counter snapshot (all zeros unless metrics are enabled).
    pub fn metrics(&self) -> RingMetrics {
        self.ring.metrics()
    }
}

/// The consuming endpoint. Not `Clone`: exactly one consumer per ring.
///
/// The consumer addresses slots by absolute position (monotonic u64). The
/// current batch starts at [`pos`](RingConsumer::pos); positions up to
/// `pos() + n` may be peeked without retiring anything, and a whole batch is
/// retired at once with [`advance`](RingConsumer::advance).
pub struct RingConsumer<T> {
    ring: Arc<PeekRing<T>>,
}

impl<T> RingConsumer<T> {
    /// Returns the consumer cursor: the absolute position of the oldest
    /// unretired slot.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.ring.tail.load(Ordering::Relaxed)
    }

    /// Returns `true` if the slot at `pos` has been published.
    ///
    /// Refreshes the cached producer cursor on a miss, so a `false` result
    /// reflects the producer's state at some point during the call.
    pub fn published(&mut self, pos: u64) -> bool {
        // SAFETY: cached_head is written only by the consumer (this method),
        // and `&mut self` guarantees no concurrent consumer call.
        let cached = unsafe { *self.ring.cached_head.get() };
        if pos < cached {
            return true;
        }

        let head = self.ring.head.load(Ordering::Acquire);
        // SAFETY: as above; the Acquire load synchronizes with the producer's
        // Release store of head.
        unsafe {
            *self.ring.cached_head.get() = head;
        }
        pos < head
    }

    /// Borrows the slot at absolute position `pos` without retiring it.
    ///
    /// Returns `None` if the slot has not been published yet. Peeking a
    /// position the consumer has already retired is a bug (debug assertion).
    pub fn peek(&mut self, pos: u64) -> Option<&T> {
        debug_assert_peek_not_retired!(pos, self.ring.tail.load(Ordering::Relaxed));

        if !self.published(pos) {
            return None;
        }

        let idx = (pos as usize) & self.ring.mask();
        // SAFETY: `published(pos)` observed `pos < head` under Acquire, so the
        // producer's write of this slot happens-before this read, and the slot
        // stays immutable until `advance`/`pop` move tail past it — which
        // cannot happen while the `&mut self` borrow backing this `&T` lives.
        unsafe {
            let buffer = &*self.ring.buffer.get();
            Some(buffer[idx].assume_init_ref())
        }
    }

    /// Blocks until the slot at the consumer cursor is published and borrows
    /// it. Returns `None` once the ring is closed and fully drained.
    pub fn wait_next(&mut self) -> Option<&T> {
        let backoff = Backoff::new();
        loop {
            let pos = self.pos();
            if self.published(pos) {
                return self.peek(pos);
            }
            // Re-check after observing closed: `published` refreshes from the
            // producer cursor, so everything pushed before close is seen.
            if self.ring.is_closed() && !self.published(pos) {
                return None;
            }
            backoff.snooze();
        }
    }

    /// Removes and returns the slot at the consumer cursor, if published.
    pub fn pop(&mut self) -> Option<T> {
        let pos = self.pos();
        if !self.published(pos) {
            return None;
        }

        let idx = (pos as usize) & self.ring.mask();
        // SAFETY: same publication argument as `peek`; `assume_init_read`
        // moves the value out, and the tail store below retires the slot so
        // it is never read (or dropped) again.
        let item = unsafe {
            let buffer = &*self.ring.buffer.get();
            buffer[idx].assume_init_read()
        };

        self.ring.tail.store(pos.wrapping_add(1), Ordering::Release);

        if self.ring.config.enable_metrics {
            self.ring.counters.add_dequeued(1);
        }

        Some(item)
    }

    /// Retires `n` slots starting at the consumer cursor, dropping each in
    /// place, with a single cursor update for the whole batch.
    pub fn advance(&mut self, n: usize) {
        if n == 0 {
            return;
        }

        let ring = &*self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);
        let head = ring.head.load(Ordering::Relaxed);
        let new_tail = tail.wrapping_add(n as u64);

        debug_assert_tail_not_past_head!(new_tail, head);
        debug_assert_monotonic!("tail", tail, new_tail);

        let mask = ring.mask();
        // SAFETY: every slot in [tail, tail + n) is published (asserted
        // against head above) and owned by the consumer until the tail store;
        // each is dropped exactly once here and never touched again.
        unsafe {
            let buffer = &mut *ring.buffer.get();
            for i in 0..n {
                let idx = ((tail as usize).wrapping_add(i)) & mask;
                buffer[idx].assume_init_drop();
            }
        }

        ring.tail.store(new_tail, Ordering::Release);

        if ring.config.enable_metrics {
            ring.counters.add_dequeued(n as u64);
        }
    }

    /// Returns the number of published, unretired slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` if no published slot is outstanding.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the slot capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Closes the ring; the producer's next push fails.
    pub fn close(&self) {
        self.ring.close();
    }

    /// Returns `true` if the ring has been closed by either side.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.ring.is_closed()
    }

    /// Returns a counter snapshot (all zeros unless metrics are enabled).
    pub fn metrics(&self) -> RingMetrics {
        self.ring.metrics()
    }
}

// ---------------------------------------------------------------------
// HELPER: 128-byte cache-aligned wrapper
// ---------------------------------------------------------------------

/// Ensures 128-byte alignment to keep the producer and consumer cursor pairs
/// on prefetcher-distinct cache lines.
#[repr(align(128))]
struct CacheAligned<T> {
    value: T,
}

impl<T> CacheAligned<T> {
    const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}
