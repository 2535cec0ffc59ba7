use super::constants::{
    ALLOC_BIT, CLASS_HEADS_OFFSET, DWORD_SIZE, FIRST_BLOCK_OFFSET, SIZE_MASK, WORD_SIZE,
};
use super::size_class::SizeClass;
use std::ptr::{self, NonNull};

/// A boundary tag: block size and allocation bit packed into one word.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Tag(u32);

impl Tag {
    pub const EPILOGUE: Tag = Tag::pack(0, true);

    pub const fn pack(size: usize, allocated: bool) -> Tag {
        Tag((size as u32 & SIZE_MASK) | allocated as u32)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn size(self) -> usize {
        (self.0 & SIZE_MASK) as usize
    }

    pub fn is_allocated(self) -> bool {
        self.0 & ALLOC_BIT != 0
    }
}

/// A block, named by the offset of its payload from the heap base.
///
/// Offset 0 is inside the class head table and never names a block, so it
/// doubles as the null link in the free lists.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(u32);

impl Block {
    pub fn from_offset(offset: usize) -> Block {
        debug_assert!(offset != 0 && offset <= u32::MAX as usize);

        Block(offset as u32)
    }

    fn from_link(link: u32) -> Option<Block> {
        if link == 0 {
            None
        } else {
            Some(Block(link))
        }
    }

    fn into_link(block: Option<Block>) -> u32 {
        block.map_or(0, |b| b.0)
    }

    pub fn offset(self) -> usize {
        self.0 as usize
    }

    pub fn header_offset(self) -> usize {
        self.offset() - WORD_SIZE
    }
}

/// Word level view of the heap region.
///
/// This is the only place that dereferences heap addresses. Everything above
/// it works with [`Block`] offsets. The accessors trust the tags they read:
/// footers and neighbours are computed from sizes that must already be
/// correct, so a header has to be written before its footer or successor is
/// looked up.
pub struct HeapMemory {
    base: NonNull<u8>,
    len: usize,
}

impl HeapMemory {
    pub fn new(base: NonNull<u8>, len: usize) -> Self {
        Self { base, len }
    }

    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn set_len(&mut self, len: usize) {
        debug_assert!(len >= self.len);

        self.len = len;
    }

    pub fn get(&self, at: usize) -> u32 {
        debug_assert!(at % WORD_SIZE == 0);
        debug_assert!(at + WORD_SIZE <= self.len, "read at {at:#x} past {:#x}", self.len);

        unsafe { self.base.as_ptr().add(at).cast::<u32>().read() }
    }

    pub fn put(&mut self, at: usize, value: u32) {
        debug_assert!(at % WORD_SIZE == 0);
        debug_assert!(at + WORD_SIZE <= self.len, "write at {at:#x} past {:#x}", self.len);

        unsafe { self.base.as_ptr().add(at).cast::<u32>().write(value) }
    }

    pub fn tag_at(&self, at: usize) -> Tag {
        Tag(self.get(at))
    }

    pub fn put_tag(&mut self, at: usize, tag: Tag) {
        self.put(at, tag.raw())
    }

    pub fn header(&self, block: Block) -> Tag {
        self.tag_at(block.header_offset())
    }

    pub fn size(&self, block: Block) -> usize {
        self.header(block).size()
    }

    pub fn footer_offset(&self, block: Block) -> usize {
        block.offset() + self.size(block) - DWORD_SIZE
    }

    pub fn footer(&self, block: Block) -> Tag {
        self.tag_at(self.footer_offset(block))
    }

    pub fn set_header(&mut self, block: Block, tag: Tag) {
        self.put_tag(block.header_offset(), tag)
    }

    /// Writes the footer at the position given by the current header.
    pub fn set_footer(&mut self, block: Block, tag: Tag) {
        let at = self.footer_offset(block);

        self.put_tag(at, tag)
    }

    /// Writes a matching header and footer.
    pub fn frame(&mut self, block: Block, size: usize, allocated: bool) {
        let tag = Tag::pack(size, allocated);

        self.set_header(block, tag);
        self.set_footer(block, tag);
    }

    pub fn next_block(&self, block: Block) -> Block {
        Block::from_offset(block.offset() + self.size(block))
    }

    /// Needs the footer of the previous block to be correct.
    pub fn prev_block(&self, block: Block) -> Block {
        let prev_footer = self.tag_at(block.offset() - DWORD_SIZE);

        Block::from_offset(block.offset() - prev_footer.size())
    }

    // The link words are payload bytes and only mean anything while the
    // block is free.
    pub fn prev_free(&self, block: Block) -> Option<Block> {
        Block::from_link(self.get(block.offset()))
    }

    pub fn next_free(&self, block: Block) -> Option<Block> {
        Block::from_link(self.get(block.offset() + WORD_SIZE))
    }

    pub fn set_prev_free(&mut self, block: Block, prev: Option<Block>) {
        self.put(block.offset(), Block::into_link(prev))
    }

    pub fn set_next_free(&mut self, block: Block, next: Option<Block>) {
        self.put(block.offset() + WORD_SIZE, Block::into_link(next))
    }

    pub fn class_head(&self, class: SizeClass) -> Option<Block> {
        Block::from_link(self.get(CLASS_HEADS_OFFSET + class.index() * WORD_SIZE))
    }

    pub fn set_class_head(&mut self, class: SizeClass, head: Option<Block>) {
        self.put(
            CLASS_HEADS_OFFSET + class.index() * WORD_SIZE,
            Block::into_link(head),
        )
    }

    pub fn payload(&self, block: Block) -> NonNull<u8> {
        debug_assert!(block.offset() < self.len);

        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(block.offset())) }
    }

    /// The block whose payload starts at `ptr`, if `ptr` lies in the heap.
    /// Nothing is read, so the result still has to be validated.
    pub fn block_at(&self, ptr: *const u8) -> Option<Block> {
        let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;

        if offset == 0 || offset >= self.len {
            return None;
        }

        Some(Block::from_offset(offset))
    }

    pub fn copy_payload(&mut self, from: Block, to: Block, bytes: usize) {
        debug_assert!(from.offset() + bytes <= self.len);
        debug_assert!(to.offset() + bytes <= self.len);
        debug_assert!(from.offset() + bytes <= to.offset() || to.offset() + bytes <= from.offset());

        unsafe {
            let base = self.base.as_ptr();

            ptr::copy_nonoverlapping(base.add(from.offset()), base.add(to.offset()), bytes)
        }
    }

    /// Walks the heap from the first block up to the epilogue.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            mem: self,
            next: FIRST_BLOCK_OFFSET,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Payload offset from the heap base.
    pub offset: usize,
    pub size: usize,
    pub allocated: bool,
}

pub struct Blocks<'a> {
    mem: &'a HeapMemory,
    next: usize,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    // Stops at the epilogue, or as soon as a size points past the heap.
    fn next(&mut self) -> Option<BlockInfo> {
        let offset = self.next;

        if offset >= self.mem.len() {
            return None;
        }

        let header = self.mem.tag_at(offset - WORD_SIZE);

        if header.size() == 0 {
            return None;
        }

        self.next = offset + header.size();

        Some(BlockInfo {
            offset,
            size: header.size(),
            allocated: header.is_allocated(),
        })
    }
}
