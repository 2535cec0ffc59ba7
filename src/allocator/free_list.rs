//! The segregated free lists.
//!
//! Every free block sits in exactly one doubly linked list, picked by its
//! size class. The list heads live in the first words of the heap and the
//! links live in the free blocks' own payloads. Lists are LIFO: inserted
//! blocks become the new head.
use super::block::{Block, HeapMemory};
use super::size_class::SizeClass;

pub fn clear(mem: &mut HeapMemory) {
    for class in SizeClass::all() {
        mem.set_class_head(class, None);
    }
}

pub fn insert(mem: &mut HeapMemory, block: Block) {
    let class = SizeClass::get_for_size(mem.size(block));
    let head = mem.class_head(class);

    mem.set_prev_free(block, None);
    mem.set_next_free(block, head);

    if let Some(head) = head {
        mem.set_prev_free(head, Some(block));
    }

    mem.set_class_head(class, Some(block));
}

/// Unlinks a block that is currently on its class list. The class is taken
/// from the block's header, so the size must not change before removal.
pub fn remove(mem: &mut HeapMemory, block: Block) {
    let prev = mem.prev_free(block);
    let next = mem.next_free(block);

    match prev {
        Some(prev) => mem.set_next_free(prev, next),
        None => {
            let class = SizeClass::get_for_size(mem.size(block));

            debug_assert_eq!(mem.class_head(class), Some(block));

            mem.set_class_head(class, next);
        }
    }

    if let Some(next) = next {
        mem.set_prev_free(next, prev);
    }
}

/// First fit, starting in the class of `size` and moving to larger classes
/// once a list is exhausted.
pub fn find_fit(mem: &HeapMemory, size: usize) -> Option<Block> {
    SizeClass::get_for_size(size)
        .and_larger()
        .flat_map(|class| iter(mem, class))
        .find(|&block| {
            let header = mem.header(block);

            !header.is_allocated() && header.size() >= size
        })
}

pub fn iter(mem: &HeapMemory, class: SizeClass) -> FreeListIter<'_> {
    FreeListIter {
        mem,
        next: mem.class_head(class),
    }
}

pub struct FreeListIter<'a> {
    mem: &'a HeapMemory,
    next: Option<Block>,
}

impl Iterator for FreeListIter<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let current = self.next?;

        self.next = self.mem.next_free(current);

        Some(current)
    }
}
