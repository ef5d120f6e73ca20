use std::collections::BTreeMap;

/// Width of the key prefix that identifies a key for coalescing and
/// partitioning purposes. Keys shorter than this are rejected at the
/// dispatch boundary.
pub(crate) const KEY_DIGEST_LEN: usize = 8;

/// First 8 bytes of the key, little-endian.
///
/// Two keys with equal digests are treated as the same key by the coalescer;
/// keyspaces that want exact-key coalescing must make the prefix identifying.
pub(crate) fn key_digest(key: &[u8]) -> u64 {
    debug_assert!(key.len() >= KEY_DIGEST_LEN, "key shorter than digest");
    let mut bytes = [0u8; KEY_DIGEST_LEN];
    bytes.copy_from_slice(&key[..KEY_DIGEST_LEN]);
    u64::from_le_bytes(bytes)
}

/// Batch-local grouping of request offsets by key digest.
///
/// Lives for one batch: `clear` resets it each iteration. Within a group,
/// offsets keep their enqueue order; groups replay in digest order, which
/// keeps batch processing deterministic.
pub(crate) struct CoalesceMap {
    groups: BTreeMap<u64, Vec<usize>>,
}

impl CoalesceMap {
    pub(crate) fn new() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.groups.clear();
    }

    /// Returns `true` if a request with this digest was already noted in the
    /// current batch.
    pub(crate) fn contains(&self, digest: u64) -> bool {
        self.groups.contains_key(&digest)
    }

    /// Records that the request at batch offset `offset` carries `digest`.
    pub(crate) fn note(&mut self, digest: u64, offset: usize) {
        self.groups.entry(digest).or_default().push(offset);
    }

    /// Iterates the groups' offset lists in digest order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.groups.values().map(Vec::as_slice)
    }

    #[cfg(test)]
    pub(crate) fn group_count(&self) -> usize {
        self.groups.len()
    }
}
