//! End-to-end dispatch demo.
//!
//! Spins up a two-shard probe service over an in-memory index with synthetic
//! suspension points, pairs a transaction worker with each shard, and runs an
//! insert-then-read-twice workload whose adjacent same-key reads coalesce.
//! Finishes with a throughput and queue summary.
//!
//! ```bash
//! cargo run -p probeshard --bin demo --release
//! RUST_LOG=info cargo run -p probeshard --bin demo --release
//! ```

use probeshard::{
    Config, Dispatcher, MemIndex, NoopRegistry, Oid, OrderedIndex, ProbeHandle, ProbeService,
    RcCode, RingMetrics, TxnToken,
};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const WORKERS: usize = 2;
const RECORDS: u32 = 20_000;

fn make_key(worker: u32, record: u32) -> Arc<[u8]> {
    let mut key = [0u8; 16];
    key[..4].copy_from_slice(&record.to_le_bytes());
    key[4..8].copy_from_slice(&worker.to_le_bytes());
    Arc::from(&key[..])
}

struct WorkerStats {
    installed: u64,
    hits: u64,
    misses: u64,
    queue: RingMetrics,
}

fn worker_loop(worker: u32, dispatcher: &mut Dispatcher, index: &Arc<dyn OrderedIndex>) -> WorkerStats {
    let txn = TxnToken::ready(u64::from(worker) + 1);
    let handle = ProbeHandle::new();
    let mut stats = WorkerStats {
        installed: 0,
        hits: 0,
        misses: 0,
        queue: RingMetrics::default(),
    };

    for record in 0..RECORDS {
        let key = make_key(worker, record);

        handle.reset();
        dispatcher
            .send_insert(txn, index, &key, Oid::new(u64::from(record) + 1), &handle)
            .expect("send insert");
        if handle.wait().0 == RcCode::True {
            stats.installed += 1;
        }

        // Read it back twice; back-to-back same-key reads coalesce when they
        // land in one batch.
        for _ in 0..2 {
            handle.reset();
            dispatcher.send_get(txn, index, &key, &handle).expect("send get");
            match handle.wait() {
                (RcCode::True, _) => stats.hits += 1,
                _ => stats.misses += 1,
            }
        }
    }

    stats.queue = dispatcher.queue_metrics();
    stats
}

fn main() {
    env_logger::init();

    let mem = Arc::new(MemIndex::with_yield_points(2));
    let index: Arc<dyn OrderedIndex> = mem.clone();

    let config = Config::new(WORKERS)
        .coalesce(true)
        .coroutine(true)
        .queue_metrics(true);
    let mut service =
        ProbeService::start(config, Arc::new(NoopRegistry)).expect("start probe service");

    let started = Instant::now();
    let mut joins = Vec::new();
    for worker in 0..WORKERS {
        let mut dispatcher = service.attach_worker(worker).expect("attach worker");
        let index = Arc::clone(&index);
        joins.push(thread::spawn(move || {
            worker_loop(worker as u32, &mut dispatcher, &index)
        }));
    }

    let mut installed = 0u64;
    let mut hits = 0u64;
    let mut misses = 0u64;
    for (worker, join) in joins.into_iter().enumerate() {
        let stats = join.join().expect("worker thread");
        println!(
            "worker {worker}: installed {} / hits {} / misses {} | queue enqueued {} high-water {} full-rejections {}",
            stats.installed,
            stats.hits,
            stats.misses,
            stats.queue.enqueued,
            stats.queue.high_water,
            stats.queue.full_rejections,
        );
        installed += stats.installed;
        hits += stats.hits;
        misses += stats.misses;
    }

    let elapsed = started.elapsed();
    service.shutdown();

    let total_ops = u64::from(RECORDS) * WORKERS as u64 * 3;
    println!();
    println!("{total_ops} probes in {elapsed:.2?} ({:.0} probes/sec)",
        total_ops as f64 / elapsed.as_secs_f64());
    println!("installed {installed}, read hits {hits}, read misses {misses}");
    println!(
        "index: {} entries, {} gets and {} inserts served ({} read probes elided)",
        mem.len(),
        mem.get_calls(),
        mem.insert_calls(),
        hits + misses - mem.get_calls(),
    );
}
