//! Error types for service assembly and dispatch.

use thiserror::Error;

/// Errors raised while assembling a probe service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No partitioner is wired up for the named benchmark workload.
    #[error("no partitioner for benchmark workload {0:?}")]
    UnsupportedBenchmark(String),
}

/// Errors surfaced to workers by the dispatch API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The service is shutting down; no new probes are accepted.
    #[error("probe service is shutting down")]
    ShuttingDown,

    /// The worker slot was already claimed by an earlier attach.
    #[error("worker {0} is already attached")]
    AlreadyAttached(usize),

    /// The worker id exceeds the configured shard count.
    #[error("no shard pairs with worker {0}")]
    NoSuchShard(usize),
}

impl DispatchError {
    /// Returns `true` if this error indicates the service is permanently
    /// unusable for new probes.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ShuttingDown)
    }
}
