use crate::index::OrderedIndex;
use crate::txn::TxnToken;
use crossbeam_utils::Backoff;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Object identifier yielded by an index probe; the key into the engine's
/// version-chain layer. Zero is reserved for "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oid(u64);

impl Oid {
    /// The reserved "no object" value.
    pub const NONE: Oid = Oid(0);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Probe outcome delivered back to the worker.
///
/// `Invalid` is the initial sentinel a pending probe carries; a completed
/// probe always carries one of the other values. `True`/`False` answer
/// insert-style probes, `NotFound` and `Abort` pass index outcomes through.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcCode {
    Invalid = 0,
    True = 1,
    False = 2,
    NotFound = 3,
    Abort = 4,
}

impl RcCode {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => RcCode::Invalid,
            1 => RcCode::True,
            2 => RcCode::False,
            3 => RcCode::NotFound,
            4 => RcCode::Abort,
            _ => unreachable!("invalid rc encoding {raw}"),
        }
    }
}

/// Completion cell shared between one in-flight probe and the worker that
/// issued it.
///
/// Publication protocol: the servicing side writes `oid` first, then stores
/// `rc` with Release; the worker polls `rc` with Acquire and reads `oid` only
/// after observing a non-`Invalid` code. For every probe, `rc` leaves
/// `Invalid` exactly once.
pub struct ResultCell {
    rc: AtomicU8,
    oid: UnsafeCell<Oid>,
}

// Safety: `oid` is written only by the single servicing thread before its
// Release store of `rc`, and read by others only after an Acquire load
// observes `rc != Invalid`; `reset` is called only by the sole worker while
// no probe is in flight.
unsafe impl Send for ResultCell {}
unsafe impl Sync for ResultCell {}

impl ResultCell {
    pub(crate) fn new() -> Self {
        Self {
            rc: AtomicU8::new(RcCode::Invalid as u8),
            oid: UnsafeCell::new(Oid::NONE),
        }
    }

    /// Completes the probe: stores `oid`, then releases `rc`.
    ///
    /// Called exactly once per probe, by the servicing thread (or by an index
    /// coroutine on its behalf).
    pub fn publish(&self, rc: RcCode, oid: Oid) {
        debug_assert!(rc != RcCode::Invalid, "publishing the pending sentinel");
        debug_assert_eq!(
            self.rc.load(Ordering::Relaxed),
            RcCode::Invalid as u8,
            "probe result published twice"
        );

        // SAFETY: single publisher per probe; readers order their oid read
        // after the Release store below via their Acquire load of rc.
        unsafe {
            *self.oid.get() = oid;
        }
        self.rc.store(rc as u8, Ordering::Release);
    }

    /// Reads the published outcome, or `None` while the probe is pending.
    pub(crate) fn load(&self) -> Option<(RcCode, Oid)> {
        let rc = RcCode::from_u8(self.rc.load(Ordering::Acquire));
        if rc == RcCode::Invalid {
            return None;
        }
        // SAFETY: the Acquire load above observed the publisher's Release
        // store, so the oid write happens-before this read.
        let oid = unsafe { *self.oid.get() };
        Some((rc, oid))
    }

    fn reset(&self) {
        self.rc.store(RcCode::Invalid as u8, Ordering::Relaxed);
    }
}

/// Worker-side view of a probe's completion cell.
///
/// A handle may be reused across probes: [`reset`](ProbeHandle::reset) it
/// after consuming one outcome, then pass it to the next send. Exactly one
/// probe may reference the handle at a time.
#[derive(Clone, Default)]
pub struct ProbeHandle {
    cell: Arc<ResultCell>,
}

impl ProbeHandle {
    pub fn new() -> Self {
        Self {
            cell: Arc::new(ResultCell::new()),
        }
    }

    /// Returns the outcome if the probe has completed.
    #[inline]
    pub fn poll(&self) -> Option<(RcCode, Oid)> {
        self.cell.load()
    }

    /// Returns `true` while no outcome has been published.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.poll().is_none()
    }

    /// Spins (then yields) until the outcome is published. This is the one
    /// busy wait a worker performs.
    pub fn wait(&self) -> (RcCode, Oid) {
        let backoff = Backoff::new();
        loop {
            if let Some(outcome) = self.poll() {
                return outcome;
            }
            backoff.snooze();
        }
    }

    /// Rearms the handle for the next probe. Only valid between probes, after
    /// the previous outcome has been observed.
    pub fn reset(&self) {
        self.cell.reset();
    }

    pub(crate) fn cell(&self) -> Arc<ResultCell> {
        Arc::clone(&self.cell)
    }
}

impl Default for ResultCell {
    fn default() -> Self {
        Self::new()
    }
}

/// What a probe asks of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProbeKind {
    /// Resolve the key to an OID under the transaction's visibility.
    Get,
    /// Install `key -> oid` if and only if the key is absent.
    Insert,
}

/// One queued probe. Owned by the ring slot from publish to retire; the
/// worker keeps only the result cell.
pub(crate) struct ProbeRequest {
    pub(crate) txn: TxnToken,
    pub(crate) index: Arc<dyn OrderedIndex>,
    pub(crate) key: Arc<[u8]>,
    pub(crate) result: Arc<ResultCell>,
    /// OID to install for `Insert`; `NONE` for `Get`.
    pub(crate) oid_in: Oid,
    pub(crate) kind: ProbeKind,
}
