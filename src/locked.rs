use super::allocator::{Heap, ALIGNMENT};
use super::config::HeapConfig;
use super::error::AllocError;
use super::metrics::HeapMetrics;
use super::provider::Arena;
use std::alloc::{GlobalAlloc, Layout};
use std::ptr::{self, NonNull};
use std::sync::{Mutex, MutexGuard};

/// A [`Heap`] behind a mutex, so it can be shared between threads or used as
/// a `#[global_allocator]`.
///
/// The heap and its arena are created on first use. Layouts that need more
/// than 8 byte alignment are served from an over sized block, with the
/// distance back to the block start kept in the word below the pointer.
///
/// Anything that allocates while the lock is held would reenter the lock when
/// this is the global allocator. Log records are emitted under the lock, so
/// it must not be paired with a logger that allocates, and
/// [`Heap::violations`] must not be called through [`LockedHeap::with_heap`].
/// [`LockedHeap::check`] does not allocate.
pub struct LockedHeap {
    heap: Mutex<Option<Heap<Arena>>>,
    config: HeapConfig,
}

impl LockedHeap {
    pub const fn new(config: HeapConfig) -> Self {
        Self {
            heap: Mutex::new(None),
            config,
        }
    }

    /// Runs `f` on the heap, creating it first if this is the first call.
    pub fn with_heap<F, R>(&self, f: F) -> Result<R, AllocError>
    where
        F: FnOnce(&mut Heap<Arena>) -> R,
    {
        let mut guard = self.lock();

        if guard.is_none() {
            *guard = Some(Heap::with_config(self.config)?);
        }

        match guard.as_mut() {
            Some(heap) => Ok(f(heap)),
            None => Err(AllocError::OOM),
        }
    }

    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.with_heap(|heap| heap.allocate(size)).ok().flatten()
    }

    /// # Safety
    /// Same as [`Heap::release`].
    pub unsafe fn release(&self, ptr: *mut u8) {
        let mut guard = self.lock();

        if let Some(heap) = guard.as_mut() {
            unsafe { heap.release(ptr) }
        }
    }

    /// # Safety
    /// Same as [`Heap::resize`].
    pub unsafe fn resize(&self, ptr: *mut u8, size: usize) -> Option<NonNull<u8>> {
        self.with_heap(|heap| unsafe { heap.resize(ptr, size) })
            .ok()
            .flatten()
    }

    pub fn check(&self) -> usize {
        self.lock().as_ref().map_or(0, Heap::check)
    }

    pub fn metrics(&self) -> HeapMetrics {
        self.lock()
            .as_ref()
            .map_or_else(HeapMetrics::new, Heap::metrics)
    }

    // a panic while holding the lock cannot leave the heap half written, the
    // heap never panics mid update outside of debug assertions
    fn lock(&self) -> MutexGuard<'_, Option<Heap<Arena>>> {
        self.heap.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for LockedHeap {
    fn default() -> Self {
        Self::new(HeapConfig::DEFAULT)
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = if layout.align() <= ALIGNMENT {
            self.allocate(layout.size())
        } else {
            self.allocate_over_aligned(layout)
        };

        ptr.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if layout.align() <= ALIGNMENT {
            unsafe { self.release(ptr) }
        } else {
            unsafe { self.release(block_start(ptr)) }
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() <= ALIGNMENT {
            return unsafe { self.resize(ptr, new_size) }
                .map_or(ptr::null_mut(), NonNull::as_ptr);
        }

        let new_layout = unsafe { Layout::from_size_align_unchecked(new_size, layout.align()) };
        let new_ptr = unsafe { self.alloc(new_layout) };

        if !new_ptr.is_null() {
            unsafe {
                ptr::copy_nonoverlapping(ptr, new_ptr, layout.size().min(new_size));
                self.dealloc(ptr, layout);
            }
        }

        new_ptr
    }
}

impl LockedHeap {
    // Takes `align` extra bytes and returns the first aligned address at
    // least one word past the block start. The block payload is 8 byte
    // aligned and `align` is a larger power of two, so the shift is between
    // 8 and `align`.
    fn allocate_over_aligned(&self, layout: Layout) -> Option<NonNull<u8>> {
        let align = layout.align();
        let block = self.allocate(layout.size().checked_add(align)?)?;
        let start = block.as_ptr() as usize;
        let shift = ((start + ALIGNMENT + align - 1) & !(align - 1)) - start;

        unsafe {
            let ptr = block.as_ptr().add(shift);
            ptr.cast::<usize>().sub(1).write(shift);

            NonNull::new(ptr)
        }
    }
}

unsafe fn block_start(ptr: *mut u8) -> *mut u8 {
    unsafe {
        let shift = ptr.cast::<usize>().sub(1).read();

        ptr.sub(shift)
    }
}
