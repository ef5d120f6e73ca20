//! Key-partitioned index-probe dispatch.
//!
//! Transaction workers in a main-memory storage engine spend a large share of
//! their time resolving keys to object identifiers through an ordered index.
//! This crate moves that work onto dedicated shard threads: a worker hands a
//! probe descriptor to its [`Dispatcher`], which routes it by key onto the
//! owning shard's ring; the shard drains its ring in batches, coalesces
//! duplicate-key probes inside a batch, and — when enabled — expresses each
//! probe as a resumable task so many tree traversals overlap their memory
//! stalls on one thread.
//!
//! Because a key is only ever serviced by the shard that owns its partition,
//! same-key probes are naturally serialized without any cross-thread locking.
//!
//! The index itself stays behind the [`OrderedIndex`] trait; an in-memory
//! implementation ([`MemIndex`]) is included for demos and tests.
//!
//! # Example
//!
//! ```
//! use probeshard::{Config, MemIndex, NoopRegistry, Oid, OrderedIndex, ProbeHandle,
//!                  ProbeService, RcCode, TxnToken};
//! use std::sync::Arc;
//!
//! let mem = Arc::new(MemIndex::new());
//! let index: Arc<dyn OrderedIndex> = mem.clone();
//!
//! let mut service = ProbeService::start(Config::new(1), Arc::new(NoopRegistry)).unwrap();
//! let mut dispatcher = service.attach_worker(0).unwrap();
//!
//! let txn = TxnToken::ready(1);
//! let key: Arc<[u8]> = Arc::from(&[1, 0, 0, 0, 0, 0, 0, 0][..]);
//! let handle = ProbeHandle::new();
//!
//! dispatcher.send_insert(txn, &index, &key, Oid::new(42), &handle).unwrap();
//! assert_eq!(handle.wait(), (RcCode::True, Oid::new(42)));
//!
//! handle.reset();
//! dispatcher.send_get(txn, &index, &key, &handle).unwrap();
//! assert_eq!(handle.wait(), (RcCode::True, Oid::new(42)));
//!
//! service.shutdown();
//! ```

mod coalesce;
mod config;
mod dispatch;
mod error;
mod index;
mod partition;
mod probe;
mod registry;
mod sched;
mod service;
mod txn;

pub use config::{Config, BATCH_SIZE, MAX_SHARDS};
pub use dispatch::Dispatcher;
pub use peekring::RingMetrics;
pub use error::{ConfigError, DispatchError};
pub use index::{Lookup, MemIndex, OrderedIndex, ProbeTask};
pub use partition::{partitioner_for_benchmark, KeyPrefixPartitioner, Partitioner};
pub use probe::{Oid, ProbeHandle, RcCode, ResultCell};
pub use registry::{NoopRegistry, ThreadRegistry};
pub use service::ProbeService;
pub use txn::{TxnToken, XidContext};
