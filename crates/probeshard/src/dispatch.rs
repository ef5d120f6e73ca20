use crate::coalesce::KEY_DIGEST_LEN;
use crate::error::DispatchError;
use crate::index::OrderedIndex;
use crate::partition::Partitioner;
use crate::probe::{Oid, ProbeHandle, ProbeKind, ProbeRequest};
use crate::txn::TxnToken;
use peekring::{PushError, RingMetrics, RingProducer};
use std::sync::Arc;

/// A worker's dispatch endpoint.
///
/// Each endpoint pairs one transaction worker with one shard and owns the
/// producing side of that shard's ring. The partitioner decides which shard
/// owns a key; the workload's key layout must route every key a worker
/// touches to its paired shard, and each send asserts that it did. This is
/// what lets the ring stay single-producer without locks.
///
/// A send returns once the probe is enqueued. Completion arrives through the
/// [`ProbeHandle`] the caller passed in, which must be pending (freshly
/// created or [`reset`](ProbeHandle::reset)) at the time of the send.
pub struct Dispatcher {
    worker: usize,
    shards: u32,
    partitioner: Arc<dyn Partitioner>,
    tx: RingProducer<ProbeRequest>,
}

impl Dispatcher {
    pub(crate) fn new(
        worker: usize,
        shards: u32,
        partitioner: Arc<dyn Partitioner>,
        tx: RingProducer<ProbeRequest>,
    ) -> Self {
        Self {
            worker,
            shards,
            partitioner,
            tx,
        }
    }

    /// The worker (and shard) this endpoint is paired with.
    #[inline]
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Enqueues a read probe resolving `key` to an OID under `txn`'s
    /// visibility.
    pub fn send_get(
        &mut self,
        txn: TxnToken,
        index: &Arc<dyn OrderedIndex>,
        key: &Arc<[u8]>,
        handle: &ProbeHandle,
    ) -> Result<(), DispatchError> {
        self.precheck(txn, key, handle);
        self.enqueue(ProbeRequest {
            txn,
            index: Arc::clone(index),
            key: Arc::clone(key),
            result: handle.cell(),
            oid_in: Oid::NONE,
            kind: ProbeKind::Get,
        })
    }

    /// Enqueues an insert probe installing `key -> oid` if the key is absent.
    /// Completion carries `True` with `oid` on install, `False` on collision.
    pub fn send_insert(
        &mut self,
        txn: TxnToken,
        index: &Arc<dyn OrderedIndex>,
        key: &Arc<[u8]>,
        oid: Oid,
        handle: &ProbeHandle,
    ) -> Result<(), DispatchError> {
        self.precheck(txn, key, handle);
        self.enqueue(ProbeRequest {
            txn,
            index: Arc::clone(index),
            key: Arc::clone(key),
            result: handle.cell(),
            oid_in: oid,
            kind: ProbeKind::Insert,
        })
    }

    /// Counter snapshot of the paired shard's ring (zeros unless the service
    /// was configured with queue metrics).
    pub fn queue_metrics(&self) -> RingMetrics {
        self.tx.metrics()
    }

    fn precheck(&self, txn: TxnToken, key: &[u8], handle: &ProbeHandle) {
        assert!(
            txn.is_ready(),
            "dispatching for a transaction that is not ready"
        );
        assert!(
            key.len() >= KEY_DIGEST_LEN,
            "probe key must carry at least {KEY_DIGEST_LEN} bytes"
        );
        assert!(
            handle.is_pending(),
            "probe handle still holds an unconsumed result"
        );

        let target = self.partitioner.shard_of(key) % self.shards;
        assert_eq!(
            target as usize, self.worker,
            "key partitioned to shard {target} but dispatched from worker {}",
            self.worker
        );
    }

    fn enqueue(&mut self, request: ProbeRequest) -> Result<(), DispatchError> {
        // Backpressure is the only admission control: a full ring spins the
        // producer briefly, then yields, and never drops the probe.
        match self.tx.push_blocking(request) {
            Ok(()) => Ok(()),
            Err(PushError::Closed(_)) => Err(DispatchError::ShuttingDown),
            Err(PushError::Full(_)) => unreachable!("blocking push never reports full"),
        }
    }
}
