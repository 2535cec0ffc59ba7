// A word holds one boundary tag or one free-list link.
pub const WORD_SIZE: usize = 4;
pub const DWORD_SIZE: usize = 2 * WORD_SIZE;

pub const ALIGNMENT: usize = DWORD_SIZE;
pub const MIN_BLOCK_SIZE: usize = 2 * ALIGNMENT;

pub const CHUNK_SIZE: usize = 1 << 12;

pub const ALLOC_BIT: u32 = 0x1;
pub const SIZE_MASK: u32 = !0x7;

// Block sizes are stored in a 32 bit tag.
pub const MAX_BLOCK_SIZE: usize = SIZE_MASK as usize;

pub const SIZE_CLASS_COUNT: usize = 10;

// Inclusive upper bound of every class but the last, which is unbounded.
pub const SIZE_CLASS_LIMITS: [usize; SIZE_CLASS_COUNT - 1] =
    [64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384];

// Offsets from the heap base of the fixed heap layout. The class heads come
// first, then a padding word so the prologue footer lands on a double word.
pub const CLASS_HEADS_OFFSET: usize = 0;
pub const CLASS_HEADS_SIZE: usize = SIZE_CLASS_COUNT * WORD_SIZE;
pub const PROLOGUE_OFFSET: usize = CLASS_HEADS_SIZE + 2 * WORD_SIZE;
pub const PROLOGUE_SIZE: usize = DWORD_SIZE;
pub const FIRST_BLOCK_OFFSET: usize = PROLOGUE_OFFSET + DWORD_SIZE;
pub const INITIAL_HEAP_SIZE: usize = CLASS_HEADS_SIZE + 4 * WORD_SIZE;

// Blocks are named by 32 bit offsets.
pub const MAX_HEAP_SIZE: usize = u32::MAX as usize;
