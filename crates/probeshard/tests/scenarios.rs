//! End-to-end scenarios for the dispatch stack: batching, coalescing, the
//! pipelined handlers, partition routing, backpressure, and shutdown.
//!
//! Several tests need a whole set of requests to land in one batch. The
//! `GateIndex` wrapper makes that deterministic: a probe of its gate key
//! parks the shard inside the index until the test has enqueued the real
//! requests, which the shard then picks up as its next batch.

use probeshard::{
    Config, ConfigError, Dispatcher, DispatchError, Lookup, MemIndex, NoopRegistry, Oid,
    OrderedIndex, ProbeHandle, ProbeService, ProbeTask, RcCode, ResultCell, TxnToken, XidContext,
    BATCH_SIZE,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

/// 16-byte key with the owning shard in the high half of the leading digest
/// and the record id in the low half.
fn shard_key(shard: u32, record: u32) -> Arc<[u8]> {
    let mut key = [0u8; 16];
    key[..4].copy_from_slice(&record.to_le_bytes());
    key[4..8].copy_from_slice(&shard.to_le_bytes());
    Arc::from(&key[..])
}

// =============================================================================
// Test indexes
// =============================================================================

/// Parks the shard inside any probe of `gate_key` until released.
struct GateIndex {
    inner: Arc<dyn OrderedIndex>,
    gate_key: Arc<[u8]>,
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
}

impl OrderedIndex for GateIndex {
    fn get_oid(&self, key: &[u8], xid: XidContext) -> Lookup {
        if *key == *self.gate_key {
            self.entered.wait();
            self.release.wait();
            return Lookup::not_found();
        }
        self.inner.get_oid(key, xid)
    }

    fn insert_if_absent(&self, txn: TxnToken, key: &[u8], oid: Oid) -> bool {
        self.inner.insert_if_absent(txn, key, oid)
    }

    fn coro_get_oid(
        self: Arc<Self>,
        key: Arc<[u8]>,
        xid: XidContext,
        dest: Arc<ResultCell>,
    ) -> Box<dyn ProbeTask> {
        if *key == *self.gate_key {
            return Box::new(GateTask {
                entered: Arc::clone(&self.entered),
                release: Arc::clone(&self.release),
                dest: Some(dest),
            });
        }
        Arc::clone(&self.inner).coro_get_oid(key, xid, dest)
    }

    fn coro_insert_if_absent(
        self: Arc<Self>,
        txn: TxnToken,
        key: Arc<[u8]>,
        oid: Oid,
        dest: Arc<ResultCell>,
    ) -> Box<dyn ProbeTask> {
        Arc::clone(&self.inner).coro_insert_if_absent(txn, key, oid, dest)
    }
}

struct GateTask {
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
    dest: Option<Arc<ResultCell>>,
}

impl ProbeTask for GateTask {
    fn advance(&mut self) -> bool {
        if let Some(dest) = self.dest.take() {
            self.entered.wait();
            self.release.wait();
            dest.publish(RcCode::NotFound, Oid::NONE);
        }
        false
    }
}

/// Records the digest order of synchronous read probes.
struct RecordingIndex {
    inner: Arc<MemIndex>,
    order: Mutex<Vec<u64>>,
}

impl OrderedIndex for RecordingIndex {
    fn get_oid(&self, key: &[u8], xid: XidContext) -> Lookup {
        let digest = u64::from_le_bytes(key[..8].try_into().unwrap());
        self.order.lock().unwrap().push(digest);
        self.inner.get_oid(key, xid)
    }

    fn insert_if_absent(&self, txn: TxnToken, key: &[u8], oid: Oid) -> bool {
        self.inner.insert_if_absent(txn, key, oid)
    }
}

/// Read probes resolve after exactly two suspensions, counting every advance.
struct TwoYieldIndex {
    inner: Arc<MemIndex>,
    advances: Arc<AtomicU64>,
}

impl OrderedIndex for TwoYieldIndex {
    fn get_oid(&self, key: &[u8], xid: XidContext) -> Lookup {
        self.inner.get_oid(key, xid)
    }

    fn insert_if_absent(&self, txn: TxnToken, key: &[u8], oid: Oid) -> bool {
        self.inner.insert_if_absent(txn, key, oid)
    }

    fn coro_get_oid(
        self: Arc<Self>,
        key: Arc<[u8]>,
        xid: XidContext,
        dest: Arc<ResultCell>,
    ) -> Box<dyn ProbeTask> {
        Box::new(CountedGet {
            index: Arc::clone(&self.inner),
            advances: Arc::clone(&self.advances),
            yields_left: 2,
            key,
            xid,
            dest: Some(dest),
        })
    }
}

struct CountedGet {
    index: Arc<MemIndex>,
    advances: Arc<AtomicU64>,
    yields_left: u32,
    key: Arc<[u8]>,
    xid: XidContext,
    dest: Option<Arc<ResultCell>>,
}

impl ProbeTask for CountedGet {
    fn advance(&mut self) -> bool {
        self.advances.fetch_add(1, Ordering::Relaxed);
        if self.yields_left > 0 {
            self.yields_left -= 1;
            return true;
        }
        if let Some(dest) = self.dest.take() {
            let found = self.index.get_oid(&self.key, self.xid);
            dest.publish(found.rc, found.oid);
        }
        false
    }
}

/// Burns cycles on every probe so a producer can outrun the shard.
struct SlowIndex {
    inner: Arc<MemIndex>,
}

impl OrderedIndex for SlowIndex {
    fn get_oid(&self, key: &[u8], xid: XidContext) -> Lookup {
        for _ in 0..2000 {
            std::hint::spin_loop();
        }
        self.inner.get_oid(key, xid)
    }

    fn insert_if_absent(&self, txn: TxnToken, key: &[u8], oid: Oid) -> bool {
        self.inner.insert_if_absent(txn, key, oid)
    }
}

// =============================================================================
// Single-shard rig with deterministic batch boundaries
// =============================================================================

struct BatchRig {
    service: ProbeService,
    dispatcher: Dispatcher,
    index: Arc<dyn OrderedIndex>,
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
    gate_key: Arc<[u8]>,
    txn: TxnToken,
}

impl BatchRig {
    fn start(coalesce: bool, coroutine: bool, inner: Arc<dyn OrderedIndex>) -> Self {
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let gate_key = shard_key(0, u32::MAX);
        let index: Arc<dyn OrderedIndex> = Arc::new(GateIndex {
            inner,
            gate_key: Arc::clone(&gate_key),
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        });

        let config = Config::new(1)
            .coalesce(coalesce)
            .coroutine(coroutine)
            .queue_bits(8);
        let service = ProbeService::start(config, Arc::new(NoopRegistry)).expect("start service");
        let dispatcher = service.attach_worker(0).expect("attach worker");

        Self {
            service,
            dispatcher,
            index,
            entered,
            release,
            gate_key,
            txn: TxnToken::ready(1),
        }
    }

    /// Parks the shard on the gate key, lets `enqueue` fill the next batch,
    /// then releases the shard.
    fn in_one_batch(&mut self, enqueue: impl FnOnce(&mut Dispatcher, TxnToken, &Arc<dyn OrderedIndex>)) {
        let gate = ProbeHandle::new();
        self.dispatcher
            .send_get(self.txn, &self.index, &self.gate_key, &gate)
            .expect("send gate probe");
        self.entered.wait();
        enqueue(&mut self.dispatcher, self.txn, &self.index);
        self.release.wait();
        assert_eq!(gate.wait().0, RcCode::NotFound);
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn serial_gets_probe_per_request() {
    let mem = Arc::new(MemIndex::new());
    let mut rig = BatchRig::start(false, false, mem.clone());

    let key = shard_key(0, 1);
    let handles: Vec<ProbeHandle> = (0..4).map(|_| ProbeHandle::new()).collect();
    rig.in_one_batch(|d, txn, index| {
        for h in &handles {
            d.send_get(txn, index, &key, h).unwrap();
        }
    });

    for h in &handles {
        assert_eq!(h.wait(), (RcCode::NotFound, Oid::NONE));
    }
    assert_eq!(mem.get_calls(), 4);
    rig.service.shutdown();
}

#[test]
fn coalesced_gets_probe_once() {
    let mem = Arc::new(MemIndex::new());
    let mut rig = BatchRig::start(true, false, mem.clone());

    let key = shard_key(0, 1);
    let handles: Vec<ProbeHandle> = (0..4).map(|_| ProbeHandle::new()).collect();
    rig.in_one_batch(|d, txn, index| {
        for h in &handles {
            d.send_get(txn, index, &key, h).unwrap();
        }
    });

    for h in &handles {
        assert_eq!(h.wait(), (RcCode::NotFound, Oid::NONE));
    }
    assert_eq!(mem.get_calls(), 1, "duplicate reads in one batch elide");
    rig.service.shutdown();
}

#[test]
fn read_insert_read_within_batch() {
    let mem = Arc::new(MemIndex::new());
    let mut rig = BatchRig::start(true, false, mem.clone());

    let key = shard_key(0, 7);
    let first_get = ProbeHandle::new();
    let insert = ProbeHandle::new();
    let second_get = ProbeHandle::new();
    rig.in_one_batch(|d, txn, index| {
        d.send_get(txn, index, &key, &first_get).unwrap();
        d.send_insert(txn, index, &key, Oid::new(42), &insert).unwrap();
        d.send_get(txn, index, &key, &second_get).unwrap();
    });

    assert_eq!(first_get.wait().0, RcCode::NotFound);
    assert_eq!(insert.wait(), (RcCode::True, Oid::new(42)));
    assert_eq!(second_get.wait(), (RcCode::True, Oid::new(42)));

    assert_eq!(mem.get_calls(), 1);
    assert_eq!(mem.insert_calls(), 1);
    assert_eq!(mem.entry(&key), Some(Oid::new(42)));
    rig.service.shutdown();
}

#[test]
fn insert_insert_within_batch() {
    let mem = Arc::new(MemIndex::new());
    let mut rig = BatchRig::start(true, false, mem.clone());

    let key = shard_key(0, 9);
    let first = ProbeHandle::new();
    let second = ProbeHandle::new();
    rig.in_one_batch(|d, txn, index| {
        d.send_insert(txn, index, &key, Oid::new(7), &first).unwrap();
        d.send_insert(txn, index, &key, Oid::new(9), &second).unwrap();
    });

    assert_eq!(first.wait(), (RcCode::True, Oid::new(7)));
    assert_eq!(second.wait().0, RcCode::False);
    assert_eq!(mem.entry(&key), Some(Oid::new(7)), "the first oid sticks");
    assert_eq!(mem.insert_calls(), 1, "the doomed insert is elided");
    rig.service.shutdown();
}

#[derive(Clone, Copy)]
enum Op {
    Get(u32),
    Insert(u32, u64),
}

fn run_stream(ops: &[Op], coalesce: bool, coroutine: bool) -> (Vec<(RcCode, Oid)>, Vec<Option<Oid>>) {
    let mem = Arc::new(MemIndex::new());
    let mut rig = BatchRig::start(coalesce, coroutine, mem.clone());

    let handles: Vec<ProbeHandle> = ops.iter().map(|_| ProbeHandle::new()).collect();
    rig.in_one_batch(|d, txn, index| {
        for (op, h) in ops.iter().zip(&handles) {
            match *op {
                Op::Get(r) => d.send_get(txn, index, &shard_key(0, r), h).unwrap(),
                Op::Insert(r, oid) => d
                    .send_insert(txn, index, &shard_key(0, r), Oid::new(oid), h)
                    .unwrap(),
            }
        }
    });

    let results = handles.iter().map(ProbeHandle::wait).collect();
    let contents = (0..5).map(|r| mem.entry(&shard_key(0, r))).collect();
    rig.service.shutdown();
    (results, contents)
}

/// The published (rc, oid) stream and the final index state are identical
/// with coalescing on or off, for every handler.
#[test]
fn coalescing_is_observationally_equivalent() {
    let ops = [
        Op::Get(1),
        Op::Insert(1, 10),
        Op::Get(1),
        Op::Insert(1, 11),
        Op::Get(2),
        Op::Insert(3, 30),
        Op::Get(3),
        Op::Get(2),
        Op::Insert(2, 20),
        Op::Get(2),
        Op::Insert(3, 31),
        Op::Get(3),
    ];

    let baseline = run_stream(&ops, false, false);
    assert_eq!(run_stream(&ops, true, false), baseline);
    assert_eq!(run_stream(&ops, false, true), baseline);
    assert_eq!(run_stream(&ops, true, true), baseline);
}

/// Distinct keys in one coalesced batch do not disturb each other.
#[test]
fn distinct_keys_do_not_interfere() {
    let mem = Arc::new(MemIndex::new());
    let mut rig = BatchRig::start(true, false, mem.clone());

    let inserts: Vec<ProbeHandle> = (0..6).map(|_| ProbeHandle::new()).collect();
    let reads: Vec<ProbeHandle> = (0..6).map(|_| ProbeHandle::new()).collect();
    rig.in_one_batch(|d, txn, index| {
        for (r, (ih, rh)) in inserts.iter().zip(&reads).enumerate() {
            let key = shard_key(0, r as u32);
            d.send_insert(txn, index, &key, Oid::new(100 + r as u64), ih).unwrap();
            d.send_get(txn, index, &key, rh).unwrap();
        }
    });

    for (r, (ih, rh)) in inserts.iter().zip(&reads).enumerate() {
        assert_eq!(ih.wait(), (RcCode::True, Oid::new(100 + r as u64)));
        assert_eq!(rh.wait(), (RcCode::True, Oid::new(100 + r as u64)));
        assert_eq!(mem.entry(&shard_key(0, r as u32)), Some(Oid::new(100 + r as u64)));
    }
    rig.service.shutdown();
}

/// Every enqueued probe gets exactly one outcome, and re-polling is stable.
#[test]
fn every_probe_publishes_once() {
    let mem = Arc::new(MemIndex::new());
    let index: Arc<dyn OrderedIndex> = mem.clone();
    let mut service = ProbeService::start(
        Config::new(1).coalesce(true),
        Arc::new(NoopRegistry),
    )
    .unwrap();
    let mut dispatcher = service.attach_worker(0).unwrap();
    let txn = TxnToken::ready(3);

    let handles: Vec<ProbeHandle> = (0..100).map(|_| ProbeHandle::new()).collect();
    for (i, h) in handles.iter().enumerate() {
        let key = shard_key(0, (i % 10) as u32);
        if i % 3 == 0 {
            dispatcher.send_insert(txn, &index, &key, Oid::new(i as u64 + 1), h).unwrap();
        } else {
            dispatcher.send_get(txn, &index, &key, h).unwrap();
        }
    }

    for h in &handles {
        let outcome = h.wait();
        assert_ne!(outcome.0, RcCode::Invalid);
        assert_eq!(h.poll(), Some(outcome), "published outcome never changes");
    }
    service.shutdown();
}

/// Requests on one queue reach the index in enqueue order.
#[test]
fn per_queue_fifo_order() {
    let mem = Arc::new(MemIndex::new());
    let recording = Arc::new(RecordingIndex {
        inner: mem,
        order: Mutex::new(Vec::new()),
    });
    let index: Arc<dyn OrderedIndex> = recording.clone();

    let mut service =
        ProbeService::start(Config::new(1), Arc::new(NoopRegistry)).unwrap();
    let mut dispatcher = service.attach_worker(0).unwrap();
    let txn = TxnToken::ready(1);

    let handles: Vec<ProbeHandle> = (0..10).map(|_| ProbeHandle::new()).collect();
    let mut expected = Vec::new();
    for (r, h) in handles.iter().enumerate() {
        let key = shard_key(0, r as u32);
        expected.push(u64::from_le_bytes(key[..8].try_into().unwrap()));
        dispatcher.send_get(txn, &index, &key, h).unwrap();
    }
    for h in &handles {
        h.wait();
    }

    assert_eq!(*recording.order.lock().unwrap(), expected);
    service.shutdown();
}

/// Two shards, disjoint partitions, randomized get/insert streams: every
/// outcome matches a sequential reference model, and the final index is the
/// union of both partitions.
#[test]
fn two_shard_stress_matches_reference() {
    for (coalesce, coroutine) in [(true, false), (true, true)] {
        let mem = Arc::new(MemIndex::new());
        let index: Arc<dyn OrderedIndex> = mem.clone();
        let config = Config::new(2).coalesce(coalesce).coroutine(coroutine).queue_bits(8);
        let mut service = ProbeService::start(config, Arc::new(NoopRegistry)).unwrap();

        let mut joins = Vec::new();
        for shard in 0..2u32 {
            let mut dispatcher = service.attach_worker(shard as usize).unwrap();
            let index = Arc::clone(&index);
            joins.push(thread::spawn(move || {
                let mut rng = SmallRng::seed_from_u64(0x5eed + u64::from(shard));
                let txn = TxnToken::ready(u64::from(shard) + 1);
                let handle = ProbeHandle::new();
                let mut reference: BTreeMap<u32, Oid> = BTreeMap::new();

                for op in 0u64..1000 {
                    let record = rng.gen_range(0..50u32);
                    let key = shard_key(shard, record);
                    if rng.gen_bool(0.5) {
                        handle.reset();
                        dispatcher.send_get(txn, &index, &key, &handle).unwrap();
                        let (rc, oid) = handle.wait();
                        match reference.get(&record) {
                            Some(&expect) => assert_eq!((rc, oid), (RcCode::True, expect)),
                            None => assert_eq!(rc, RcCode::NotFound),
                        }
                    } else {
                        let oid_in = Oid::new(u64::from(record) * 10_000 + op + 1);
                        handle.reset();
                        dispatcher.send_insert(txn, &index, &key, oid_in, &handle).unwrap();
                        let (rc, _) = handle.wait();
                        if reference.contains_key(&record) {
                            assert_eq!(rc, RcCode::False);
                        } else {
                            assert_eq!(rc, RcCode::True);
                            reference.insert(record, oid_in);
                        }
                    }
                }
                (shard, reference)
            }));
        }

        let mut expected_entries = 0;
        for join in joins {
            let (shard, reference) = join.join().unwrap();
            for (record, oid) in &reference {
                assert_eq!(mem.entry(&shard_key(shard, *record)), Some(*oid));
            }
            expected_entries += reference.len();
        }
        assert_eq!(mem.len(), expected_entries);
        service.shutdown();
    }
}

/// A full pipelined batch: every probe suspends twice, every outcome is
/// published, and the scheduler takes three advances per task.
#[test]
fn pipelined_batch_overlaps_suspensions() {
    let advances = Arc::new(AtomicU64::new(0));
    let two_yield = Arc::new(TwoYieldIndex {
        inner: Arc::new(MemIndex::new()),
        advances: Arc::clone(&advances),
    });
    let mut rig = BatchRig::start(false, true, two_yield);

    let handles: Vec<ProbeHandle> = (0..BATCH_SIZE).map(|_| ProbeHandle::new()).collect();
    rig.in_one_batch(|d, txn, index| {
        for (r, h) in handles.iter().enumerate() {
            d.send_get(txn, index, &shard_key(0, r as u32), h).unwrap();
        }
    });

    for h in &handles {
        assert_eq!(h.wait(), (RcCode::NotFound, Oid::NONE));
    }
    // Two suspensions plus the resolving step, for every probe in the batch.
    assert_eq!(advances.load(Ordering::Relaxed), 3 * BATCH_SIZE as u64);
    rig.service.shutdown();
}

/// A producer outrunning its shard backpressures without losing probes, and
/// the queue's high-water mark hits its capacity.
#[test]
fn backpressure_never_drops() {
    const OPS: usize = 100_000;

    let mem = Arc::new(MemIndex::new());
    let slow = Arc::new(SlowIndex { inner: mem });
    let index: Arc<dyn OrderedIndex> = slow;

    let config = Config::new(1).queue_bits(6).queue_metrics(true); // 64 slots
    let mut service = ProbeService::start(config, Arc::new(NoopRegistry)).unwrap();
    let mut dispatcher = service.attach_worker(0).unwrap();
    let txn = TxnToken::ready(1);

    let handles: Vec<ProbeHandle> = (0..OPS).map(|_| ProbeHandle::new()).collect();
    for (i, h) in handles.iter().enumerate() {
        dispatcher
            .send_get(txn, &index, &shard_key(0, i as u32), h)
            .unwrap();
    }
    for h in &handles {
        assert_ne!(h.wait().0, RcCode::Invalid);
    }

    let metrics = dispatcher.queue_metrics();
    assert_eq!(metrics.enqueued, OPS as u64, "no probe lost");
    assert_eq!(metrics.high_water, 64, "queue filled to capacity under pressure");
    assert!(metrics.full_rejections > 0, "producer actually backpressured");
    service.shutdown();
}

// =============================================================================
// Boundary and lifecycle
// =============================================================================

#[test]
fn attach_and_shutdown_lifecycle() {
    let mem = Arc::new(MemIndex::new());
    let index: Arc<dyn OrderedIndex> = mem;
    let mut service =
        ProbeService::start(Config::new(1), Arc::new(NoopRegistry)).unwrap();

    let mut dispatcher = service.attach_worker(0).unwrap();
    assert_eq!(
        service.attach_worker(0).err(),
        Some(DispatchError::AlreadyAttached(0))
    );
    assert_eq!(
        service.attach_worker(5).err(),
        Some(DispatchError::NoSuchShard(5))
    );

    let txn = TxnToken::ready(1);
    let key = shard_key(0, 1);
    let handle = ProbeHandle::new();
    dispatcher.send_insert(txn, &index, &key, Oid::new(4), &handle).unwrap();
    assert_eq!(handle.wait(), (RcCode::True, Oid::new(4)));

    service.shutdown();

    handle.reset();
    let err = dispatcher.send_get(txn, &index, &key, &handle).unwrap_err();
    assert_eq!(err, DispatchError::ShuttingDown);
    assert!(err.is_terminal());
}

#[test]
fn unknown_benchmark_has_no_partitioner() {
    let err = ProbeService::start(
        Config::new(1).benchmark("tpcc"),
        Arc::new(NoopRegistry),
    )
    .err();
    assert_eq!(
        err,
        Some(ConfigError::UnsupportedBenchmark(String::from("tpcc")))
    );
}

#[test]
#[should_panic(expected = "not ready")]
fn dispatch_rejects_pending_transaction() {
    let index: Arc<dyn OrderedIndex> = Arc::new(MemIndex::new());
    let service = ProbeService::start(Config::new(1), Arc::new(NoopRegistry)).unwrap();
    let mut dispatcher = service.attach_worker(0).unwrap();

    let handle = ProbeHandle::new();
    let _ = dispatcher.send_get(TxnToken::pending(1), &index, &shard_key(0, 1), &handle);
}

#[test]
#[should_panic(expected = "at least")]
fn dispatch_rejects_short_key() {
    let index: Arc<dyn OrderedIndex> = Arc::new(MemIndex::new());
    let service = ProbeService::start(Config::new(1), Arc::new(NoopRegistry)).unwrap();
    let mut dispatcher = service.attach_worker(0).unwrap();

    let key: Arc<[u8]> = Arc::from(&[1u8, 2, 3][..]);
    let handle = ProbeHandle::new();
    let _ = dispatcher.send_get(TxnToken::ready(1), &index, &key, &handle);
}

#[test]
#[should_panic(expected = "partitioned to shard")]
fn dispatch_rejects_foreign_partition() {
    let index: Arc<dyn OrderedIndex> = Arc::new(MemIndex::new());
    let service = ProbeService::start(Config::new(2), Arc::new(NoopRegistry)).unwrap();
    let mut dispatcher = service.attach_worker(0).unwrap();

    // Shard 1's key sent through worker 0's endpoint.
    let handle = ProbeHandle::new();
    let _ = dispatcher.send_get(TxnToken::ready(1), &index, &shard_key(1, 5), &handle);
}

#[test]
#[should_panic(expected = "unconsumed result")]
fn dispatch_rejects_unreset_handle() {
    let index: Arc<dyn OrderedIndex> = Arc::new(MemIndex::new());
    let service = ProbeService::start(Config::new(1), Arc::new(NoopRegistry)).unwrap();
    let mut dispatcher = service.attach_worker(0).unwrap();

    let txn = TxnToken::ready(1);
    let key = shard_key(0, 2);
    let handle = ProbeHandle::new();
    dispatcher.send_insert(txn, &index, &key, Oid::new(1), &handle).unwrap();
    handle.wait();

    // Missing reset: the handle still holds the insert's outcome.
    let _ = dispatcher.send_get(txn, &index, &key, &handle);
}
