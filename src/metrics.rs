/// A 'snapshot' of the counters a heap keeps about itself.
///
/// Obtained by calling [`crate::Heap::metrics`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapMetrics {
    /// Total bytes obtained from the memory provider, metadata included.
    pub heap_size: usize,

    /// Number of times the heap was extended with a new free region,
    /// including the initial extension done by `init`.
    pub grow_events: u64,

    /// Successful allocations, counting resizes that moved the block.
    pub allocations: u64,

    /// Blocks returned to the free lists by a release.
    pub releases: u64,

    /// Allocations that failed because the heap could not grow.
    pub failed_allocations: u64,

    /// Releases that were ignored because the pointer did not validate.
    pub ignored_releases: u64,
}

impl HeapMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_live_allocations(&self) -> u64 {
        self.allocations.saturating_sub(self.releases)
    }
}
