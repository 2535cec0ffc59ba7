use super::block::{Block, BlockInfo, HeapMemory, Tag};
use super::check::{self, Violation};
use super::coalesce::coalesce;
use super::constants::{
    ALIGNMENT, CLASS_HEADS_SIZE, DWORD_SIZE, FIRST_BLOCK_OFFSET, INITIAL_HEAP_SIZE,
    MAX_BLOCK_SIZE, MAX_HEAP_SIZE, MIN_BLOCK_SIZE, PROLOGUE_OFFSET, PROLOGUE_SIZE, WORD_SIZE,
};
use super::free_list;
use super::size_class::SizeClass;
use crate::config::HeapConfig;
use crate::error::AllocError;
use crate::metrics::HeapMetrics;
use crate::provider::{Arena, MemoryProvider};
use std::cmp::{max, min};
use std::ptr::NonNull;

/// A segregated free-list heap over a single growable region.
///
/// Blocks carry a boundary tag (size and allocation bit) at both ends. Free
/// blocks are kept in ten LIFO lists by size class and are merged with their
/// free neighbours as soon as they are released, so no two adjacent blocks
/// are ever both free. When no free block fits a request the region is
/// grown through the [`MemoryProvider`] by at least the configured chunk.
///
/// Every payload is 8 byte aligned.
pub struct Heap<P: MemoryProvider = Arena> {
    provider: P,
    mem: HeapMemory,
    chunk_size: usize,
    metrics: HeapMetrics,
}

unsafe impl<P: MemoryProvider + Send> Send for Heap<P> {}

impl Heap<Arena> {
    /// A heap over a fresh [`Arena`] with the default [`HeapConfig`].
    pub fn new() -> Result<Self, AllocError> {
        Self::with_config(HeapConfig::default())
    }

    pub fn with_config(config: HeapConfig) -> Result<Self, AllocError> {
        let arena = Arena::new(config.arena_capacity)?;

        Self::init(arena, config)
    }
}

impl<P: MemoryProvider> Heap<P> {
    /// Lays out the class heads, prologue and epilogue at the provider's
    /// break, then extends the heap by one chunk of free space.
    pub fn init(mut provider: P, config: HeapConfig) -> Result<Self, AllocError> {
        let base = provider.grow(INITIAL_HEAP_SIZE)?;

        if base.as_ptr() as usize % ALIGNMENT != 0 {
            return Err(AllocError::BadRequest);
        }

        let mut heap = Self {
            provider,
            mem: HeapMemory::new(base, INITIAL_HEAP_SIZE),
            chunk_size: chunk_size(config.chunk_size),
            metrics: HeapMetrics {
                heap_size: INITIAL_HEAP_SIZE,
                ..HeapMetrics::new()
            },
        };

        free_list::clear(&mut heap.mem);
        // padding word ahead of the prologue
        heap.mem.put(CLASS_HEADS_SIZE, 0);

        let prologue = Block::from_offset(PROLOGUE_OFFSET);
        heap.mem.frame(prologue, PROLOGUE_SIZE, true);
        heap.mem
            .set_header(heap.mem.next_block(prologue), Tag::EPILOGUE);

        heap.extend(heap.chunk_size / WORD_SIZE)?;

        log::debug!(
            "Heap::init: base {:?}, chunk {:#x}",
            heap.mem.base(),
            heap.chunk_size
        );

        Ok(heap)
    }

    /// Allocates at least `size` bytes. Returns `None` for a zero size, or
    /// when the heap cannot grow far enough.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }

        self.try_allocate(size).ok()
    }

    /// Like [`Heap::allocate`] but says why it failed.
    pub fn try_allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let block = self.allocate_block(size)?;

        Ok(self.mem.payload(block))
    }

    /// Returns a block to the heap. Null pointers, pointers outside the heap
    /// and pointers that do not name a live block are ignored.
    ///
    /// # Safety
    /// `ptr` must be null, lie outside the heap, or be a pointer returned by
    /// this heap. A pointer into the middle of a live payload may be taken
    /// for a block if the payload happens to look like one.
    pub unsafe fn release(&mut self, ptr: *mut u8) {
        if let Err(err) = unsafe { self.try_release(ptr) } {
            self.metrics.ignored_releases += 1;

            log::warn!("Heap::release({ptr:?}) ignored: {err}");
        }
    }

    /// Like [`Heap::release`] but reports pointers it had to ignore.
    ///
    /// # Safety
    /// Same as [`Heap::release`].
    pub unsafe fn try_release(&mut self, ptr: *mut u8) -> Result<(), AllocError> {
        if ptr.is_null() {
            return Ok(());
        }

        let block = self.validate(ptr)?;
        self.free_block(block);

        Ok(())
    }

    /// Resizes an allocation, moving it if it has to grow.
    ///
    /// A null `ptr` allocates, a zero `size` releases and returns `None`, and
    /// an invalid `ptr` is treated as null. Shrinking always happens in
    /// place. When the block moves, the first `min(old payload, size)` bytes
    /// are copied over and the old block is released. If no new block can be
    /// had, `None` is returned and the old block is left alone.
    ///
    /// # Safety
    /// Same as [`Heap::release`].
    pub unsafe fn resize(&mut self, ptr: *mut u8, size: usize) -> Option<NonNull<u8>> {
        if ptr.is_null() {
            return self.allocate(size);
        }

        if size == 0 {
            unsafe { self.release(ptr) };

            return None;
        }

        let block = match self.validate(ptr) {
            Ok(block) => block,
            Err(err) => {
                log::warn!("Heap::resize({ptr:?}, {size}) on a bad pointer: {err}");

                return self.allocate(size);
            }
        };

        let asize = match adjusted_size(size) {
            Ok(asize) => asize,
            Err(err) => {
                self.metrics.failed_allocations += 1;
                log::warn!("Heap::resize({ptr:?}, {size}) failed: {err}");

                return None;
            }
        };

        let old_size = self.mem.size(block);

        if asize <= old_size {
            self.shrink(block, asize);

            return Some(self.mem.payload(block));
        }

        let new_block = self.allocate_block(size).ok()?;
        let copy = min(old_size - DWORD_SIZE, size);

        self.mem.copy_payload(block, new_block, copy);
        self.free_block(block);

        log::trace!(
            "Heap::resize({:#x}, {size}) moved to {:#x}",
            block.offset(),
            new_block.offset()
        );

        Some(self.mem.payload(new_block))
    }

    /// Payload bytes of a live allocation, which may exceed what was asked
    /// for. `None` if `ptr` does not name one.
    pub fn usable_size(&self, ptr: *const u8) -> Option<usize> {
        let block = self.validate(ptr).ok()?;

        Some(self.mem.size(block) - DWORD_SIZE)
    }

    /// Every block between the prologue and the epilogue, in address order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.mem.blocks()
    }

    /// Total size of the blocks on the free lists, tags included.
    pub fn free_bytes(&self) -> usize {
        SizeClass::all()
            .flat_map(|class| free_list::iter(&self.mem, class))
            .map(|block| self.mem.size(block))
            .sum()
    }

    pub fn free_block_count(&self) -> usize {
        SizeClass::all()
            .map(|class| free_list::iter(&self.mem, class).count())
            .sum()
    }

    pub fn metrics(&self) -> HeapMetrics {
        self.metrics
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// The address of the first byte of the heap.
    pub fn base(&self) -> NonNull<u8> {
        self.mem.base()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Runs every consistency check and returns what failed.
    pub fn violations(&self) -> Vec<Violation> {
        check::violations(&self.mem)
    }

    /// Number of consistency violations, 0 for a healthy heap. Unlike
    /// [`Heap::violations`] this does not allocate.
    pub fn check(&self) -> usize {
        check::count(&self.mem)
    }

    fn allocate_block(&mut self, size: usize) -> Result<Block, AllocError> {
        let result = adjusted_size(size).and_then(|asize| {
            let block = match free_list::find_fit(&self.mem, asize) {
                Some(block) => block,
                None => self.extend(max(asize, self.chunk_size) / WORD_SIZE)?,
            };

            self.place(block, asize);

            Ok(block)
        });

        match result {
            Ok(block) => {
                self.metrics.allocations += 1;
                log::trace!("Heap::allocate({size}) -> {:#x}", block.offset());
            }
            Err(err) => {
                if size != 0 {
                    self.metrics.failed_allocations += 1;
                    log::warn!("Heap::allocate({size}) failed: {err}");
                }
            }
        }

        result
    }

    /// Grows the heap by `words` (rounded up to even) and returns the new
    /// free block after merging it with a free tail. The block is on its
    /// free list.
    fn extend(&mut self, words: usize) -> Result<Block, AllocError> {
        let words = words + words % 2;
        let size = words * WORD_SIZE;
        let old_len = self.mem.len();

        if size > MAX_BLOCK_SIZE || old_len + size > MAX_HEAP_SIZE {
            return Err(AllocError::OOM);
        }

        let brk = self.provider.grow(size)?;

        debug_assert_eq!(
            brk.as_ptr() as usize,
            self.mem.base().as_ptr() as usize + old_len
        );

        // the old epilogue header becomes the new block's header
        let block = Block::from_offset(old_len);
        self.mem.set_len(old_len + size);
        self.mem.frame(block, size, false);

        let epilogue = self.mem.next_block(block);
        self.mem.set_header(epilogue, Tag::EPILOGUE);

        self.metrics.heap_size += size;
        self.metrics.grow_events += 1;

        log::debug!(
            "Heap::extend({words}): grew by {size:#x} to {:#x}",
            self.mem.len()
        );

        Ok(coalesce(&mut self.mem, block))
    }

    /// Takes a free block off its list and marks the first `asize` bytes
    /// allocated. The rest is split off when it can hold a block of its own.
    fn place(&mut self, block: Block, asize: usize) {
        free_list::remove(&mut self.mem, block);

        let size = self.mem.size(block);

        debug_assert!(asize <= size);

        if size - asize >= MIN_BLOCK_SIZE {
            self.mem.frame(block, asize, true);

            let rest = self.mem.next_block(block);
            self.mem.frame(rest, size - asize, false);
            free_list::insert(&mut self.mem, rest);
        } else {
            self.mem.frame(block, size, true);
        }
    }

    // An allocated block is on no list, and its right neighbour may be free,
    // so the split off tail goes through coalesce.
    fn shrink(&mut self, block: Block, asize: usize) {
        let size = self.mem.size(block);

        if size - asize < MIN_BLOCK_SIZE {
            return;
        }

        self.mem.frame(block, asize, true);

        let rest = self.mem.next_block(block);
        self.mem.frame(rest, size - asize, false);
        coalesce(&mut self.mem, rest);
    }

    fn free_block(&mut self, block: Block) {
        let size = self.mem.size(block);

        self.mem.frame(block, size, false);
        coalesce(&mut self.mem, block);

        self.metrics.releases += 1;
        log::trace!("Heap::release({:#x}), {size:#x} bytes", block.offset());
    }

    /// Checks that `ptr` is the payload of a live block without reading
    /// outside the heap.
    fn validate(&self, ptr: *const u8) -> Result<Block, AllocError> {
        let (lo, hi) = self.provider.bounds();

        if ptr < lo || ptr > hi {
            return Err(AllocError::InvalidPointer);
        }

        let block = self
            .mem
            .block_at(ptr)
            .ok_or(AllocError::InvalidPointer)?;

        if block.offset() % ALIGNMENT != 0 || block.offset() < FIRST_BLOCK_OFFSET {
            return Err(AllocError::InvalidPointer);
        }

        let header = self.mem.header(block);

        if !header.is_allocated()
            || header.size() < MIN_BLOCK_SIZE
            || block.offset() + header.size() > self.mem.len()
        {
            return Err(AllocError::InvalidPointer);
        }

        if self.mem.footer(block) != header {
            return Err(AllocError::InvalidPointer);
        }

        Ok(block)
    }
}

/// Block size for a request: payload plus header and footer, rounded up to
/// the alignment, and never below the minimum block.
pub fn adjusted_size(size: usize) -> Result<usize, AllocError> {
    if size == 0 {
        return Err(AllocError::BadRequest);
    }

    if size <= DWORD_SIZE {
        return Ok(MIN_BLOCK_SIZE);
    }

    size.checked_add(DWORD_SIZE + ALIGNMENT - 1)
        .map(|padded| padded & !(ALIGNMENT - 1))
        .filter(|&asize| asize <= MAX_BLOCK_SIZE)
        .ok_or(AllocError::BadRequest)
}

fn chunk_size(requested: usize) -> usize {
    let aligned = requested.saturating_add(ALIGNMENT - 1) & !(ALIGNMENT - 1);

    max(aligned, MIN_BLOCK_SIZE)
}
