/// Seam to the engine's memory-reclamation subsystem.
///
/// Every shard thread registers itself before servicing its first probe and
/// deregisters when its loop exits, so epoch-based reclamation can track the
/// thread for the index structures it touches. The subsystem itself lives
/// outside this crate.
pub trait ThreadRegistry: Send + Sync {
    fn register(&self);
    fn deregister(&self);
}

/// Registry for deployments without a reclamation subsystem (tests, demos,
/// indexes that own their memory).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistry;

impl ThreadRegistry for NoopRegistry {
    fn register(&self) {}
    fn deregister(&self) {}
}
