use super::constants::{SIZE_CLASS_COUNT, SIZE_CLASS_LIMITS};

/// Index of one of the segregated free lists.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SizeClass(u8);

impl SizeClass {
    pub fn get_for_size(block_size: usize) -> SizeClass {
        let index = SIZE_CLASS_LIMITS
            .iter()
            .position(|&limit| block_size <= limit)
            .unwrap_or(SIZE_CLASS_COUNT - 1);

        SizeClass(index as u8)
    }

    pub fn all() -> impl Iterator<Item = SizeClass> {
        (0..SIZE_CLASS_COUNT).map(|i| SizeClass(i as u8))
    }

    /// This class followed by every larger one.
    pub fn and_larger(self) -> impl Iterator<Item = SizeClass> {
        (self.index()..SIZE_CLASS_COUNT).map(|i| SizeClass(i as u8))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn contains(self, block_size: usize) -> bool {
        Self::get_for_size(block_size) == self
    }
}
