/// Identity of the transaction on whose behalf a probe runs.
///
/// Bit 63 marks a transaction whose setup has not finished; such a token must
/// never reach a dispatcher. The remaining bits are an engine-assigned id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnToken(u64);

impl TxnToken {
    const NOT_READY_BIT: u64 = 1 << 63;

    /// Token for a transaction that is fully set up and may issue probes.
    ///
    /// # Panics
    ///
    /// Panics if `id` has the not-ready bit set.
    pub fn ready(id: u64) -> Self {
        assert!(
            id & Self::NOT_READY_BIT == 0,
            "transaction id collides with the not-ready bit"
        );
        Self(id)
    }

    /// Token for a transaction still being set up. Dispatching with one of
    /// these is a programmer error and panics at the dispatch boundary.
    pub fn pending(id: u64) -> Self {
        Self(id | Self::NOT_READY_BIT)
    }

    /// Returns `true` if the transaction may issue probes.
    #[inline]
    pub fn is_ready(self) -> bool {
        self.0 & Self::NOT_READY_BIT == 0
    }

    /// The engine-assigned transaction id, without the flag bit.
    #[inline]
    pub fn id(self) -> u64 {
        self.0 & !Self::NOT_READY_BIT
    }

    /// The visibility context the index consults for this transaction.
    #[inline]
    pub fn xid(self) -> XidContext {
        XidContext(self.id())
    }
}

/// Visibility token the index uses to pick the version a reader may see.
/// Opaque to the dispatch layer; it is only carried through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XidContext(u64);

impl XidContext {
    /// Raw token value, for index implementations.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}
