use super::block::{Block, BlockInfo, HeapMemory, Tag};
use super::constants::{
    ALIGNMENT, DWORD_SIZE, FIRST_BLOCK_OFFSET, MIN_BLOCK_SIZE, PROLOGUE_OFFSET, PROLOGUE_SIZE,
    WORD_SIZE,
};
use super::size_class::SizeClass;
use std::fmt;

/// A broken heap invariant found by [`crate::Heap::violations`].
///
/// Offsets are payload offsets from the heap base.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    BadPrologue,
    /// The walk did not end on an epilogue exactly at the heap's end.
    BadEpilogue { offset: usize },
    Misaligned { offset: usize, size: usize },
    TagMismatch { offset: usize },
    AllocatedInFreeList { offset: usize },
    WrongSizeClass { offset: usize, size: usize, class: usize },
    /// A list member with a free physical neighbour.
    Uncoalesced { offset: usize },
    /// A free block the heap walk found that is on no list.
    NotInFreeList { offset: usize },
    /// A link that names no block, a bad back link, or a block listed twice.
    BrokenLink { offset: usize },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Violation::BadPrologue => write!(f, "prologue has been overwritten"),
            Violation::BadEpilogue { offset } => {
                write!(f, "heap walk ended at {offset:#x} without an epilogue")
            }
            Violation::Misaligned { offset, size } => {
                write!(f, "block {offset:#x} of size {size:#x} is misaligned")
            }
            Violation::TagMismatch { offset } => {
                write!(f, "block {offset:#x} header and footer differ")
            }
            Violation::AllocatedInFreeList { offset } => {
                write!(f, "allocated block {offset:#x} is in a free list")
            }
            Violation::WrongSizeClass {
                offset,
                size,
                class,
            } => write!(
                f,
                "block {offset:#x} of size {size:#x} is in size class {class}"
            ),
            Violation::Uncoalesced { offset } => {
                write!(f, "free block {offset:#x} has a free neighbour")
            }
            Violation::NotInFreeList { offset } => {
                write!(f, "free block {offset:#x} is in no free list")
            }
            Violation::BrokenLink { offset } => {
                write!(f, "free list link at {offset:#x} is broken")
            }
        }
    }
}

pub fn violations(mem: &HeapMemory) -> Vec<Violation> {
    let mut found = vec![];

    scan(mem, &mut |violation| found.push(violation));

    found
}

/// Counts violations without allocating, so it is safe to run while the
/// heap is serving the global allocator.
pub fn count(mem: &HeapMemory) -> usize {
    let mut found = 0;

    scan(mem, &mut |_| found += 1);

    found
}

// Walks the blocks and then every free list. Nothing is collected: list
// membership and block starts are looked up by walking again, and list
// walks are cut off after as many steps as there are blocks.
fn scan(mem: &HeapMemory, report: &mut dyn FnMut(Violation)) {
    let mut emit = |violation: Violation| {
        log::error!("heap check: {violation}");
        report(violation);
    };

    let prologue = Block::from_offset(PROLOGUE_OFFSET);
    let prologue_tag = Tag::pack(PROLOGUE_SIZE, true);
    if mem.header(prologue) != prologue_tag || mem.footer(prologue) != prologue_tag {
        emit(Violation::BadPrologue);
    }

    let block_count = walk(mem).count();
    let mut end = FIRST_BLOCK_OFFSET;

    for info in walk(mem) {
        let block = Block::from_offset(info.offset);

        if info.offset % ALIGNMENT != 0 || info.size < MIN_BLOCK_SIZE {
            emit(Violation::Misaligned {
                offset: info.offset,
                size: info.size,
            });
        }

        if mem.header(block) != mem.footer(block) {
            emit(Violation::TagMismatch {
                offset: info.offset,
            });
        }

        if !info.allocated && !is_listed(mem, block, block_count) {
            emit(Violation::NotInFreeList {
                offset: info.offset,
            });
        }

        end = info.offset + info.size;
    }

    if end != mem.len() || mem.tag_at(mem.len() - WORD_SIZE) != Tag::EPILOGUE {
        emit(Violation::BadEpilogue { offset: end });
    }

    for class in SizeClass::all() {
        check_free_list(mem, class, block_count, &mut emit);
    }
}

// Every block that fits inside the heap, stopping at the epilogue or at the
// first size that runs past the end.
fn walk(mem: &HeapMemory) -> impl Iterator<Item = BlockInfo> + '_ {
    mem.blocks()
        .take_while(|info| info.offset + info.size <= mem.len())
}

fn is_block(mem: &HeapMemory, block: Block) -> bool {
    walk(mem)
        .take_while(|info| info.offset <= block.offset())
        .any(|info| info.offset == block.offset())
}

fn in_heap(mem: &HeapMemory, block: Block) -> bool {
    block.offset() >= FIRST_BLOCK_OFFSET && block.offset() + DWORD_SIZE <= mem.len()
}

fn is_listed(mem: &HeapMemory, block: Block, limit: usize) -> bool {
    SizeClass::all().any(|class| {
        let mut next = mem.class_head(class);

        for _ in 0..limit {
            match next {
                Some(member) if member == block => return true,
                // broken links are reported by the list walk
                Some(member) if in_heap(mem, member) => next = mem.next_free(member),
                _ => return false,
            }
        }

        false
    })
}

fn check_free_list(
    mem: &HeapMemory,
    class: SizeClass,
    limit: usize,
    emit: &mut impl FnMut(Violation),
) {
    let mut prev = None;
    let mut next = mem.class_head(class);
    let mut steps = 0;

    while let Some(block) = next {
        steps += 1;

        // links are only followed into blocks the heap walk vouches for, and
        // a list longer than the heap has a cycle
        if steps > limit || !is_block(mem, block) || mem.prev_free(block) != prev {
            emit(Violation::BrokenLink {
                offset: block.offset(),
            });
            return;
        }

        let offset = block.offset();
        let header = mem.header(block);

        if header.is_allocated() {
            emit(Violation::AllocatedInFreeList { offset });
        }

        if !class.contains(header.size()) {
            emit(Violation::WrongSizeClass {
                offset,
                size: header.size(),
                class: class.index(),
            });
        }

        // the word before the header is the previous block's footer
        let prev_free = !mem.tag_at(block.header_offset() - WORD_SIZE).is_allocated();
        let next_free = !mem.header(mem.next_block(block)).is_allocated();
        if prev_free || next_free {
            emit(Violation::Uncoalesced { offset });
        }

        prev = Some(block);
        next = mem.next_free(block);
    }
}
