use crate::coalesce::{key_digest, CoalesceMap};
use crate::config::{Config, BATCH_SIZE};
use crate::dispatch::Dispatcher;
use crate::error::{ConfigError, DispatchError};
use crate::index::ProbeTask;
use crate::partition::{partitioner_for_benchmark, Partitioner};
use crate::probe::{Oid, ProbeKind, ProbeRequest, RcCode, ResultCell};
use crate::registry::ThreadRegistry;
use crate::sched::RoundRobin;
use crossbeam_utils::Backoff;
use peekring::{ring, RingConfig, RingConsumer, RingProducer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// Process-scoped handle over the shard threads.
///
/// Starting the service spawns one shard thread per configured worker, each
/// owning the consuming side of its ring. Workers claim their dispatch
/// endpoints with [`attach_worker`](ProbeService::attach_worker) and the
/// service joins everything back on [`shutdown`](ProbeService::shutdown).
pub struct ProbeService {
    producers: Mutex<Vec<Option<RingProducer<ProbeRequest>>>>,
    threads: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    partitioner: Arc<dyn Partitioner>,
    shards: usize,
}

impl ProbeService {
    /// Starts the service with the partitioner selected by the configured
    /// benchmark name.
    pub fn start(
        config: Config,
        registry: Arc<dyn ThreadRegistry>,
    ) -> Result<Self, ConfigError> {
        let partitioner: Arc<dyn Partitioner> =
            Arc::from(partitioner_for_benchmark(&config.benchmark)?);
        Ok(Self::start_with_partitioner(config, registry, partitioner))
    }

    /// Starts the service with an explicitly injected partitioner.
    ///
    /// Blocks until every shard thread has registered with `registry` and
    /// entered its handler loop.
    pub fn start_with_partitioner(
        config: Config,
        registry: Arc<dyn ThreadRegistry>,
        partitioner: Arc<dyn Partitioner>,
    ) -> Self {
        config.assert_valid();

        let shutdown = Arc::new(AtomicBool::new(false));
        let startup = Arc::new(Barrier::new(config.shards + 1));
        let ring_config = RingConfig::new(config.queue_bits, config.queue_metrics);

        let mut producers = Vec::with_capacity(config.shards);
        let mut threads = Vec::with_capacity(config.shards);

        for id in 0..config.shards {
            let (tx, rx) = ring::<ProbeRequest>(ring_config);
            let worker = ShardWorker {
                id,
                rx,
                shutdown: Arc::clone(&shutdown),
                registry: Arc::clone(&registry),
                coalesce: config.coalesce,
                coroutine: config.coroutine,
            };
            let startup_gate = Arc::clone(&startup);
            let handle = thread::Builder::new()
                .name(format!("probeshard-{id}"))
                .spawn(move || worker.run(&startup_gate))
                .expect("spawn probe shard thread");

            producers.push(Some(tx));
            threads.push(handle);
        }

        startup.wait();
        log::info!("probe service up: {} shard(s)", config.shards);

        Self {
            producers: Mutex::new(producers),
            threads,
            shutdown,
            partitioner,
            shards: config.shards,
        }
    }

    /// Number of shard threads.
    #[inline]
    pub fn shards(&self) -> usize {
        self.shards
    }

    /// Claims the dispatch endpoint pairing `worker` with its shard. Each
    /// slot can be claimed exactly once.
    pub fn attach_worker(&self, worker: usize) -> Result<Dispatcher, DispatchError> {
        let mut producers = self
            .producers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let slot = producers
            .get_mut(worker)
            .ok_or(DispatchError::NoSuchShard(worker))?;
        let tx = slot.take().ok_or(DispatchError::AlreadyAttached(worker))?;

        Ok(Dispatcher::new(
            worker,
            self.shards as u32,
            Arc::clone(&self.partitioner),
            tx,
        ))
    }

    /// Stops every shard at its next batch boundary and joins the threads.
    /// Idempotent.
    ///
    /// Workers must have awaited every outstanding probe and stopped sending
    /// first. Probes already enqueued are drained before the shards exit; a
    /// send racing this call either completes normally or fails with
    /// [`DispatchError::ShuttingDown`].
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                log::error!("probe shard panicked before shutdown");
            }
        }
    }
}

impl Drop for ProbeService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One shard: a thread draining its ring through the configured handler.
struct ShardWorker {
    id: usize,
    rx: RingConsumer<ProbeRequest>,
    shutdown: Arc<AtomicBool>,
    registry: Arc<dyn ThreadRegistry>,
    coalesce: bool,
    coroutine: bool,
}

impl ShardWorker {
    fn run(mut self, startup: &Barrier) {
        self.registry.register();
        startup.wait();
        log::info!(
            "shard {} servicing probes (coalesce={}, pipelined={})",
            self.id,
            self.coalesce,
            self.coroutine
        );

        match (self.coroutine, self.coalesce) {
            (false, false) => self.serial_loop(),
            (false, true) => self.serial_coalesced_loop(),
            (true, false) => self.coroutine_loop(),
            (true, true) => self.coroutine_coalesced_loop(),
        }

        // Refuse any probe sent past the drain, then let reclamation forget
        // this thread.
        self.rx.close();
        self.registry.deregister();
        log::info!("shard {} stopped", self.id);
    }

    fn stop_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire) || self.rx.is_closed()
    }

    /// Blocks until the next request is published. `None` means stop: the
    /// shutdown flag (or a closed ring) was observed with the ring drained.
    fn wait_request(&mut self) -> Option<u64> {
        let backoff = Backoff::new();
        loop {
            let pos = self.rx.pos();
            if self.rx.published(pos) {
                return Some(pos);
            }
            if self.stop_requested() && !self.rx.published(pos) {
                return None;
            }
            backoff.snooze();
        }
    }

    /// Blocks until at least one request is published, then sizes the batch:
    /// up to [`BATCH_SIZE`] contiguous published slots. `None` means stop.
    fn wait_batch(&mut self) -> Option<(u64, usize)> {
        let backoff = Backoff::new();
        loop {
            let (base, n) = self.batch_extent();
            if n > 0 {
                return Some((base, n));
            }
            if self.stop_requested() {
                let (_, drained) = self.batch_extent();
                if drained == 0 {
                    return None;
                }
            }
            backoff.snooze();
        }
    }

    fn batch_extent(&mut self) -> (u64, usize) {
        let base = self.rx.pos();
        let mut n = 0;
        while n < BATCH_SIZE && self.rx.published(base + n as u64) {
            n += 1;
        }
        (base, n)
    }

    /// One probe at a time, synchronously against the index.
    fn serial_loop(&mut self) {
        while let Some(pos) = self.wait_request() {
            let req = self.rx.peek(pos).expect("published request missing");
            assert!(req.txn.is_ready(), "serviced a not-ready transaction");

            match req.kind {
                ProbeKind::Get => {
                    let found = req.index.get_oid(&req.key, req.txn.xid());
                    assert!(found.rc != RcCode::Invalid, "index reported an invalid rc");
                    req.result.publish(found.rc, found.oid);
                }
                ProbeKind::Insert => {
                    if req.index.insert_if_absent(req.txn, &req.key, req.oid_in) {
                        req.result.publish(RcCode::True, req.oid_in);
                    } else {
                        req.result.publish(RcCode::False, Oid::NONE);
                    }
                }
            }

            self.rx.advance(1);
        }
    }

    /// Batched, with duplicate-key probes served from the group's history.
    fn serial_coalesced_loop(&mut self) {
        let mut groups = CoalesceMap::new();

        while let Some((base, n)) = self.wait_batch() {
            groups.clear();
            for i in 0..n {
                let req = self.rx.peek(base + i as u64).expect("published request missing");
                assert!(req.txn.is_ready(), "serviced a not-ready transaction");
                groups.note(key_digest(&req.key), i);
            }

            for offsets in groups.iter() {
                let mut history = GroupHistory::new();
                for &off in offsets {
                    let req = self
                        .rx
                        .peek(base + off as u64)
                        .expect("published request missing");
                    fulfill(req, &mut history);
                }
            }

            self.rx.advance(n);
        }
    }

    /// Every probe in the batch becomes a resumable task; the round-robin
    /// pass overlaps their suspensions on this one thread.
    fn coroutine_loop(&mut self) {
        let mut sched = RoundRobin::new();

        while let Some((base, n)) = self.wait_batch() {
            for i in 0..n {
                let req = self.rx.peek(base + i as u64).expect("published request missing");
                assert!(req.txn.is_ready(), "serviced a not-ready transaction");
                let dest = Arc::clone(&req.result);
                sched.spawn(spawn_probe(req, dest));
            }

            let steps = sched.run();
            log::trace!("shard {}: batch of {n} pipelined in {steps} steps", self.id);

            self.rx.advance(n);
        }
    }

    /// Pipelined and coalesced: one task per distinct key (the group leader,
    /// resolving into a scratch cell), with the rest of each group replayed
    /// from the leader's result after the batch drains.
    fn coroutine_coalesced_loop(&mut self) {
        let mut groups = CoalesceMap::new();
        let mut sched = RoundRobin::new();
        let mut scratch: Vec<Option<Arc<ResultCell>>> = Vec::with_capacity(BATCH_SIZE);

        while let Some((base, n)) = self.wait_batch() {
            groups.clear();
            scratch.clear();
            scratch.resize_with(n, || None);

            for i in 0..n {
                let req = self.rx.peek(base + i as u64).expect("published request missing");
                assert!(req.txn.is_ready(), "serviced a not-ready transaction");

                let digest = key_digest(&req.key);
                if !groups.contains(digest) {
                    let cell = Arc::new(ResultCell::new());
                    let task = spawn_probe(req, Arc::clone(&cell));
                    scratch[i] = Some(cell);
                    sched.spawn(task);
                }
                groups.note(digest, i);
            }

            let steps = sched.run();
            log::trace!("shard {}: batch of {n} pipelined in {steps} steps", self.id);

            for offsets in groups.iter() {
                let mut history = GroupHistory::new();
                for (i, &off) in offsets.iter().enumerate() {
                    let req = self
                        .rx
                        .peek(base + off as u64)
                        .expect("published request missing");

                    if i == 0 {
                        let cell = scratch[off]
                            .as_ref()
                            .expect("group leader has no scratch result");
                        let (rc, oid) =
                            cell.load().expect("probe task finished without publishing");
                        history.rc = rc;
                        if rc == RcCode::True {
                            history.oid = oid;
                            if req.kind == ProbeKind::Insert {
                                history.insert_ok = true;
                            }
                        }
                        req.result.publish(rc, oid);
                    } else {
                        fulfill(req, &mut history);
                    }
                }
            }

            self.rx.advance(n);
        }
    }
}

/// Builds the resumable task fulfilling `req`, resolving into `dest`.
fn spawn_probe(req: &ProbeRequest, dest: Arc<ResultCell>) -> Box<dyn ProbeTask> {
    match req.kind {
        ProbeKind::Get => {
            Arc::clone(&req.index).coro_get_oid(Arc::clone(&req.key), req.txn.xid(), dest)
        }
        ProbeKind::Insert => Arc::clone(&req.index).coro_insert_if_absent(
            req.txn,
            Arc::clone(&req.key),
            req.oid_in,
            dest,
        ),
    }
}

/// What a same-key group has established so far. Results are tracked here,
/// never read back from the published cells: the worker owns those and may
/// consume (or reset) them the instant rc publishes.
struct GroupHistory {
    oid: Oid,
    rc: RcCode,
    insert_ok: bool,
}

impl GroupHistory {
    fn new() -> Self {
        Self {
            oid: Oid::NONE,
            rc: RcCode::Invalid,
            insert_ok: false,
        }
    }
}

/// Serves one request against its group's local history, probing the index
/// only when the outcome is not already determined, and publishes exactly
/// one result.
///
/// The interplay within a same-key group, in enqueue order:
/// - a successful insert satisfies every later read and fails every later
///   insert;
/// - a successful read fails later inserts without probing;
/// - a recorded miss (or failed insert) answers later reads without
///   probing, and leaves later inserts free to try.
fn fulfill(req: &ProbeRequest, history: &mut GroupHistory) {
    match req.kind {
        ProbeKind::Get => {
            if history.insert_ok || history.rc != RcCode::Invalid {
                debug_assert!(
                    (!history.insert_ok && history.rc != RcCode::Invalid)
                        || (history.insert_ok
                            && !history.oid.is_none()
                            && history.rc == RcCode::True),
                    "group history in an impossible state"
                );
            } else {
                let found = req.index.get_oid(&req.key, req.txn.xid());
                history.rc = found.rc;
                history.oid = found.oid;
            }

            assert!(history.rc != RcCode::Invalid, "index reported an invalid rc");
            req.result.publish(history.rc, history.oid);
        }
        ProbeKind::Insert => {
            if history.insert_ok {
                debug_assert_eq!(history.rc, RcCode::True);
                req.result.publish(RcCode::False, Oid::NONE);
            } else if history.rc == RcCode::True {
                // An earlier read saw the key; this insert must collide.
                req.result.publish(RcCode::False, Oid::NONE);
            } else if req.index.insert_if_absent(req.txn, &req.key, req.oid_in) {
                history.insert_ok = true;
                history.rc = RcCode::True;
                history.oid = req.oid_in;
                req.result.publish(history.rc, history.oid);
            } else {
                history.rc = RcCode::False;
                history.oid = Oid::NONE;
                req.result.publish(RcCode::False, Oid::NONE);
            }
        }
    }
}
