use super::error::AllocError;
use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr::NonNull;

/// The source of raw bytes beneath a [`crate::Heap`].
///
/// A provider behaves like `sbrk`: it hands out contiguous memory at its
/// current break and never takes any of it back while the heap is alive.
pub trait MemoryProvider {
    /// Extends the region by exactly `bytes` and returns the previous break,
    /// which is the start of the new bytes. A failed grow changes nothing.
    fn grow(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError>;

    /// The lowest address and the last valid byte of the region.
    fn bounds(&self) -> (*const u8, *const u8);
}

/// A fixed reservation that is handed out front to back.
///
/// The reservation comes from [`System`] rather than the global allocator so
/// an arena can sit underneath a `#[global_allocator]`.
pub struct Arena {
    ptr: NonNull<u8>,
    layout: Layout,
    brk: usize,
}

pub const ARENA_ALIGN: usize = 8;

unsafe impl Send for Arena {}

impl Arena {
    pub fn new(capacity: usize) -> Result<Arena, AllocError> {
        if capacity == 0 {
            return Err(AllocError::BadRequest);
        }

        let layout =
            Layout::from_size_align(capacity, ARENA_ALIGN).map_err(|_| AllocError::BadRequest)?;

        Ok(Arena {
            ptr: Self::alloc_arena(layout)?,
            layout,
            brk: 0,
        })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn capacity(&self) -> usize {
        self.layout.size()
    }

    pub fn used(&self) -> usize {
        self.brk
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.brk
    }

    fn alloc_arena(layout: Layout) -> Result<NonNull<u8>, AllocError> {
        // zeroed so a stray pointer into unused payload reads zero tags
        let ptr = unsafe { System.alloc_zeroed(layout) };

        NonNull::new(ptr).ok_or(AllocError::OOM)
    }
}

impl MemoryProvider for Arena {
    fn grow(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
        if bytes > self.remaining() {
            log::warn!(
                "Arena::grow({bytes:#x}): only {:#x} of {:#x} bytes left",
                self.remaining(),
                self.capacity()
            );

            return Err(AllocError::OOM);
        }

        let old_brk = unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(self.brk)) };
        self.brk += bytes;

        Ok(old_brk)
    }

    fn bounds(&self) -> (*const u8, *const u8) {
        let lo = self.as_ptr();
        let hi = lo.wrapping_add(self.brk).wrapping_sub(1);

        (lo, hi)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { System.dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_returns_old_break() {
        let mut arena = Arena::new(64).unwrap();
        let base = arena.as_ptr();

        let first = arena.grow(16).unwrap();
        let second = arena.grow(8).unwrap();

        assert_eq!(first.as_ptr() as *const u8, base);
        assert_eq!(second.as_ptr() as usize, base as usize + 16);
        assert_eq!(arena.used(), 24);
    }

    #[test]
    fn grow_past_capacity() {
        let mut arena = Arena::new(32).unwrap();

        arena.grow(24).unwrap();

        assert_eq!(arena.grow(16), Err(AllocError::OOM));
        assert_eq!(arena.used(), 24);

        // the exact remainder still fits
        arena.grow(8).unwrap();
        assert_eq!(arena.remaining(), 0);
    }

    #[test]
    fn bounds_track_break() {
        let mut arena = Arena::new(128).unwrap();
        arena.grow(40).unwrap();

        let (lo, hi) = arena.bounds();

        assert_eq!(lo, arena.as_ptr());
        assert_eq!(hi as usize, lo as usize + 39);
    }

    #[test]
    fn arena_is_aligned() {
        let arena = Arena::new(100).unwrap();

        assert_eq!(arena.as_ptr() as usize % ARENA_ALIGN, 0);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(Arena::new(0), Err(AllocError::BadRequest)));
    }
}
