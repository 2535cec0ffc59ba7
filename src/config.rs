/// This structure contains the configuration settings for a heap.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
    /// The minimum number of bytes the heap grows by when no free block can
    /// satisfy a request. The initial free region is also this size.
    /// Rounded up to a multiple of the alignment unit, and never less than
    /// the minimum block size.
    pub chunk_size: usize,

    /// The capacity in bytes of the arena created by [`crate::Heap::new`]
    /// and [`crate::LockedHeap`]. Growth past this point fails with
    /// [`crate::AllocError::OOM`].
    pub arena_capacity: usize,
}

pub const HEAP_CONFIG_DEFAULT_CHUNK_SIZE: usize = 1 << 12;
pub const HEAP_CONFIG_DEFAULT_ARENA_CAPACITY: usize = 20 * (1 << 20);

impl HeapConfig {
    pub const DEFAULT: HeapConfig = HeapConfig {
        chunk_size: HEAP_CONFIG_DEFAULT_CHUNK_SIZE,
        arena_capacity: HEAP_CONFIG_DEFAULT_ARENA_CAPACITY,
    };
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
