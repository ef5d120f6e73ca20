use crate::probe::{Oid, RcCode, ResultCell};
use crate::txn::{TxnToken, XidContext};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Outcome of a synchronous OID lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    pub rc: RcCode,
    pub oid: Oid,
}

impl Lookup {
    /// A hit: the key resolved to `oid` under the caller's visibility.
    pub fn found(oid: Oid) -> Self {
        Self {
            rc: RcCode::True,
            oid,
        }
    }

    /// A miss: the key is not visible to the caller.
    pub fn not_found() -> Self {
        Self {
            rc: RcCode::NotFound,
            oid: Oid::NONE,
        }
    }
}

/// A resumable index probe.
///
/// `advance` performs one step and returns `true` while there is more to do.
/// A task suspends only at points of its own choosing (typically between
/// issuing a prefetch and consuming the line) and must never hold a lock
/// across a suspension. By the time `advance` returns `false` the task has
/// published its outcome into the cell it was given.
pub trait ProbeTask {
    fn advance(&mut self) -> bool;
}

/// Capability set an ordered index exposes to the dispatch layer.
///
/// `get_oid` must report a non-`Invalid` rc; `insert_if_absent` returns
/// `true` iff the key was installed, and leaves the index untouched
/// otherwise. The resumable variants have default implementations that wrap
/// the synchronous calls in a single-step task, so an index without native
/// suspension support still works under the pipelined handler.
pub trait OrderedIndex: Send + Sync + 'static {
    /// Resolves `key` to an OID under the given visibility context.
    fn get_oid(&self, key: &[u8], xid: XidContext) -> Lookup;

    /// Installs `key -> oid` iff the key is absent. On `false` the key
    /// already existed and nothing was modified.
    fn insert_if_absent(&self, txn: TxnToken, key: &[u8], oid: Oid) -> bool;

    /// Resumable form of [`get_oid`](OrderedIndex::get_oid); publishes into
    /// `dest` before completing.
    fn coro_get_oid(
        self: Arc<Self>,
        key: Arc<[u8]>,
        xid: XidContext,
        dest: Arc<ResultCell>,
    ) -> Box<dyn ProbeTask> {
        Box::new(OneShot {
            index: self,
            op: OneShotOp::Get { key, xid },
            dest: Some(dest),
        })
    }

    /// Resumable form of [`insert_if_absent`](OrderedIndex::insert_if_absent);
    /// publishes `True` with the installed OID, or `False`, into `dest`.
    fn coro_insert_if_absent(
        self: Arc<Self>,
        txn: TxnToken,
        key: Arc<[u8]>,
        oid: Oid,
        dest: Arc<ResultCell>,
    ) -> Box<dyn ProbeTask> {
        Box::new(OneShot {
            index: self,
            op: OneShotOp::Insert { txn, key, oid },
            dest: Some(dest),
        })
    }
}

enum OneShotOp {
    Get { key: Arc<[u8]>, xid: XidContext },
    Insert { txn: TxnToken, key: Arc<[u8]>, oid: Oid },
}

/// Adapter task completing a synchronous probe in a single advance.
struct OneShot<I: OrderedIndex + ?Sized> {
    index: Arc<I>,
    op: OneShotOp,
    dest: Option<Arc<ResultCell>>,
}

impl<I: OrderedIndex + ?Sized> ProbeTask for OneShot<I> {
    fn advance(&mut self) -> bool {
        if let Some(dest) = self.dest.take() {
            match &self.op {
                OneShotOp::Get { key, xid } => {
                    let found = self.index.get_oid(key, *xid);
                    dest.publish(found.rc, found.oid);
                }
                OneShotOp::Insert { txn, key, oid } => {
                    if self.index.insert_if_absent(*txn, key, *oid) {
                        dest.publish(RcCode::True, *oid);
                    } else {
                        dest.publish(RcCode::False, Oid::NONE);
                    }
                }
            }
        }
        false
    }
}

/// In-memory ordered index for demos and tests.
///
/// A mutex-guarded `BTreeMap` with probe counters, plus a configurable number
/// of synthetic suspension points on the resumable paths so the pipelined
/// handler has something to interleave. Visibility contexts are accepted and
/// ignored: every committed entry is visible to everyone.
pub struct MemIndex {
    entries: Mutex<BTreeMap<Vec<u8>, Oid>>,
    get_calls: AtomicU64,
    insert_calls: AtomicU64,
    yield_points: u32,
}

impl MemIndex {
    pub fn new() -> Self {
        Self::with_yield_points(0)
    }

    /// An index whose resumable probes suspend `n` times before touching the
    /// map.
    pub fn with_yield_points(n: u32) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            get_calls: AtomicU64::new(0),
            insert_calls: AtomicU64::new(0),
            yield_points: n,
        }
    }

    /// Number of `get_oid` probes served (including resumable ones).
    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::Relaxed)
    }

    /// Number of `insert_if_absent` probes served (including resumable ones).
    pub fn insert_calls(&self) -> u64 {
        self.insert_calls.load(Ordering::Relaxed)
    }

    /// Direct read of the current mapping, bypassing probe accounting.
    pub fn entry(&self, key: &[u8]) -> Option<Oid> {
        self.lock_entries().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<Vec<u8>, Oid>> {
        // A poisoned map is still structurally sound; recover and continue.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderedIndex for MemIndex {
    fn get_oid(&self, key: &[u8], _xid: XidContext) -> Lookup {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        match self.lock_entries().get(key) {
            Some(&oid) => Lookup::found(oid),
            None => Lookup::not_found(),
        }
    }

    fn insert_if_absent(&self, _txn: TxnToken, key: &[u8], oid: Oid) -> bool {
        self.insert_calls.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.lock_entries();
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.to_vec(), oid);
        true
    }

    fn coro_get_oid(
        self: Arc<Self>,
        key: Arc<[u8]>,
        xid: XidContext,
        dest: Arc<ResultCell>,
    ) -> Box<dyn ProbeTask> {
        let yields_left = self.yield_points;
        Box::new(YieldingProbe {
            index: self,
            op: OneShotOp::Get { key, xid },
            dest: Some(dest),
            yields_left,
        })
    }

    fn coro_insert_if_absent(
        self: Arc<Self>,
        txn: TxnToken,
        key: Arc<[u8]>,
        oid: Oid,
        dest: Arc<ResultCell>,
    ) -> Box<dyn ProbeTask> {
        let yields_left = self.yield_points;
        Box::new(YieldingProbe {
            index: self,
            op: OneShotOp::Insert { txn, key, oid },
            dest: Some(dest),
            yields_left,
        })
    }
}

/// Probe task that suspends a fixed number of times before resolving.
struct YieldingProbe {
    index: Arc<MemIndex>,
    op: OneShotOp,
    dest: Option<Arc<ResultCell>>,
    yields_left: u32,
}

impl ProbeTask for YieldingProbe {
    fn advance(&mut self) -> bool {
        if self.yields_left > 0 {
            self.yields_left -= 1;
            return true;
        }

        if let Some(dest) = self.dest.take() {
            match &self.op {
                OneShotOp::Get { key, xid } => {
                    let found = self.index.get_oid(key, *xid);
                    dest.publish(found.rc, found.oid);
                }
                OneShotOp::Insert { txn, key, oid } => {
                    if self.index.insert_if_absent(*txn, key, *oid) {
                        dest.publish(RcCode::True, *oid);
                    } else {
                        dest.publish(RcCode::False, Oid::NONE);
                    }
                }
            }
        }
        false
    }
}
