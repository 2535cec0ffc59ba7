//! A segregated free-list heap allocator with boundary tags.
//!
//! A Heap manages one contiguous region that grows like `sbrk`. Every block
//! carries its size and allocation bit in a header and a footer, free blocks
//! sit in ten size classed lists, and a released block is immediately merged
//! with any free neighbour.
//! ```rust
//! use segheap::Heap;
//!
//! let mut heap = Heap::new().unwrap();
//!
//! let ptr = heap.allocate(100).unwrap();
//! assert_eq!(ptr.as_ptr() as usize % segheap::ALIGNMENT, 0);
//! assert!(heap.usable_size(ptr.as_ptr()).unwrap() >= 100);
//!
//! let ptr = unsafe { heap.resize(ptr.as_ptr(), 5000) }.unwrap();
//! unsafe { heap.release(ptr.as_ptr()) };
//!
//! assert_eq!(heap.check(), 0);
//! ```
//!
//! A heap can sit on any [`MemoryProvider`]. The default is an [`Arena`], a
//! fixed reservation handed out front to back. For sharing between threads,
//! or as a `#[global_allocator]`, wrap it in a [`LockedHeap`].
//! ```rust
//! use segheap::{HeapConfig, LockedHeap};
//!
//! static HEAP: LockedHeap = LockedHeap::new(HeapConfig::DEFAULT);
//!
//! let ptr = HEAP.allocate(24).unwrap();
//! unsafe { HEAP.release(ptr.as_ptr()) };
//! ```
mod allocator;
mod config;
mod error;
mod locked;
mod metrics;
mod provider;

pub use allocator::{
    adjusted_size, BlockInfo, Heap, Violation, ALIGNMENT, CHUNK_SIZE, MIN_BLOCK_SIZE,
    SIZE_CLASS_COUNT, WORD_SIZE,
};
pub use config::HeapConfig;
pub use error::AllocError;
pub use locked::LockedHeap;
pub use metrics::HeapMetrics;
pub use provider::{Arena, MemoryProvider};
