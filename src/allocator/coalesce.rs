use super::block::{Block, HeapMemory, Tag};
use super::free_list;

/// Merges a free block that is on no list with its free neighbours and puts
/// the result on the list for its new size.
///
/// The block must already be framed as free. The prologue and epilogue are
/// always allocated, so both neighbours exist.
pub fn coalesce(mem: &mut HeapMemory, block: Block) -> Block {
    let prev = mem.prev_block(block);
    let next = mem.next_block(block);
    let prev_alloc = mem.footer(prev).is_allocated();
    let next_alloc = mem.header(next).is_allocated();
    let mut size = mem.size(block);

    let merged = match (prev_alloc, next_alloc) {
        (true, true) => block,
        (true, false) => {
            free_list::remove(mem, next);
            size += mem.size(next);
            mem.frame(block, size, false);
            block
        }
        (false, true) => {
            free_list::remove(mem, prev);
            size += mem.size(prev);
            // the old footer of `block` is the end of the merged block
            let footer = mem.footer_offset(block);
            mem.put_tag(footer, Tag::pack(size, false));
            mem.set_header(prev, Tag::pack(size, false));
            prev
        }
        (false, false) => {
            free_list::remove(mem, prev);
            free_list::remove(mem, next);
            size += mem.size(prev) + mem.size(next);
            let footer = mem.footer_offset(next);
            mem.put_tag(footer, Tag::pack(size, false));
            mem.set_header(prev, Tag::pack(size, false));
            prev
        }
    };

    log::trace!(
        "coalesce({:#x}) -> {:#x} ({size:#x} bytes)",
        block.offset(),
        merged.offset()
    );

    free_list::insert(mem, merged);

    merged
}

#[cfg(test)]
mod tests {
    use super::super::constants::{FIRST_BLOCK_OFFSET, PROLOGUE_OFFSET, PROLOGUE_SIZE};
    use super::super::size_class::SizeClass;
    use super::*;
    use std::ptr::NonNull;

    // A prologue, four 32 byte blocks A B C D, and an epilogue.
    struct Fixture {
        _words: Vec<u64>,
        mem: HeapMemory,
        blocks: [Block; 4],
    }

    impl Fixture {
        fn new() -> Self {
            let mut words = vec![0u64; 64];
            let base = NonNull::new(words.as_mut_ptr().cast::<u8>()).unwrap();
            let mut mem = HeapMemory::new(base, words.len() * 8);

            free_list::clear(&mut mem);
            mem.frame(Block::from_offset(PROLOGUE_OFFSET), PROLOGUE_SIZE, true);

            let mut blocks = [Block::from_offset(FIRST_BLOCK_OFFSET); 4];
            let mut at = FIRST_BLOCK_OFFSET;
            for block in blocks.iter_mut() {
                *block = Block::from_offset(at);
                mem.frame(*block, 32, true);
                at += 32;
            }
            mem.set_header(Block::from_offset(at), Tag::EPILOGUE);

            Self {
                _words: words,
                mem,
                blocks,
            }
        }

        // free a block and push it straight on its list without merging
        fn free_unmerged(&mut self, index: usize) {
            let block = self.blocks[index];

            self.mem.frame(block, 32, false);
            free_list::insert(&mut self.mem, block);
        }

        fn release(&mut self, index: usize) -> Block {
            let block = self.blocks[index];

            self.mem.frame(block, 32, false);
            coalesce(&mut self.mem, block)
        }

        fn free_lists(&self) -> Vec<(Block, usize)> {
            SizeClass::all()
                .flat_map(|class| free_list::iter(&self.mem, class))
                .map(|block| (block, self.mem.size(block)))
                .collect()
        }
    }

    #[test]
    fn no_free_neighbours() {
        let mut f = Fixture::new();
        let [_, b, _, _] = f.blocks;

        assert_eq!(f.release(1), b);
        assert_eq!(f.free_lists(), vec![(b, 32)]);
    }

    #[test]
    fn merge_with_next() {
        let mut f = Fixture::new();
        let [_, b, _, _] = f.blocks;

        f.free_unmerged(2);
        let merged = f.release(1);

        assert_eq!(merged, b);
        assert_eq!(f.mem.header(b), Tag::pack(64, false));
        assert_eq!(f.mem.footer(b), Tag::pack(64, false));
        assert_eq!(f.free_lists(), vec![(b, 64)]);
    }

    #[test]
    fn merge_with_prev() {
        let mut f = Fixture::new();
        let [a, _, _, _] = f.blocks;

        f.free_unmerged(0);
        let merged = f.release(1);

        assert_eq!(merged, a);
        assert_eq!(f.mem.header(a), f.mem.footer(a));
        assert_eq!(f.mem.size(a), 64);
        assert_eq!(f.free_lists(), vec![(a, 64)]);
    }

    #[test]
    fn merge_with_both() {
        let mut f = Fixture::new();
        let [a, _, _, d] = f.blocks;

        f.free_unmerged(0);
        f.free_unmerged(2);
        let merged = f.release(1);

        assert_eq!(merged, a);
        assert_eq!(f.mem.size(a), 96);
        assert_eq!(f.mem.footer(a), Tag::pack(96, false));
        assert_eq!(f.mem.next_block(a), d);
        assert_eq!(f.mem.prev_block(d), a);
        assert_eq!(f.free_lists(), vec![(a, 96)]);
    }

    #[test]
    fn edges_stop_at_prologue_and_epilogue() {
        let mut f = Fixture::new();
        let [a, _, _, d] = f.blocks;

        assert_eq!(f.release(0), a);
        assert_eq!(f.release(3), d);
        assert_eq!(f.mem.size(a), 32);
        assert_eq!(f.mem.size(d), 32);
    }
}
