use crate::coalesce::key_digest;
use crate::error::ConfigError;

/// Deterministic mapping from key to the shard that owns it.
///
/// The mapping must be stable for the lifetime of the service: it is what
/// guarantees a key is only ever serviced by one shard, so same-key probes
/// serialize without locks.
pub trait Partitioner: Send + Sync + std::fmt::Debug {
    /// The raw partition number for `key`; callers reduce it modulo the
    /// shard count.
    fn shard_of(&self, key: &[u8]) -> u32;
}

/// Partitions on the top 32 bits of the key's leading 8-byte digest.
///
/// This matches keyspaces that embed the owning partition in the key prefix,
/// as the YCSB-style loaders do; record ids live in the low half.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyPrefixPartitioner;

impl Partitioner for KeyPrefixPartitioner {
    #[inline]
    fn shard_of(&self, key: &[u8]) -> u32 {
        (key_digest(key) >> 32) as u32
    }
}

/// Selects the partitioner for a named benchmark workload.
///
/// Selection keys on the leading byte of the name; only the YCSB family is
/// wired up. Deployments with other key layouts inject their own
/// [`Partitioner`] instead.
pub fn partitioner_for_benchmark(name: &str) -> Result<Box<dyn Partitioner>, ConfigError> {
    match name.as_bytes().first() {
        Some(b'y') => Ok(Box::new(KeyPrefixPartitioner)),
        _ => Err(ConfigError::UnsupportedBenchmark(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_partitioner_uses_high_half() {
        let mut key = [0u8; 16];
        key[4..8].copy_from_slice(&3u32.to_le_bytes());
        assert_eq!(KeyPrefixPartitioner.shard_of(&key), 3);

        // The low half (the record id) does not affect placement.
        key[..4].copy_from_slice(&0xdead_beefu32.to_le_bytes());
        assert_eq!(KeyPrefixPartitioner.shard_of(&key), 3);
    }

    #[test]
    fn benchmark_selection() {
        assert!(partitioner_for_benchmark("ycsb").is_ok());
        assert!(partitioner_for_benchmark("ycsb-c").is_ok());

        let err = partitioner_for_benchmark("tpcc").unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnsupportedBenchmark(String::from("tpcc"))
        );
    }
}
