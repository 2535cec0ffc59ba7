mod block;
mod check;
mod coalesce;
mod constants;
mod free_list;
mod heap;
mod size_class;


pub use block::BlockInfo;
pub use check::Violation;
pub use constants::{ALIGNMENT, CHUNK_SIZE, MIN_BLOCK_SIZE, SIZE_CLASS_COUNT, WORD_SIZE};
pub use heap::{adjusted_size, Heap};
