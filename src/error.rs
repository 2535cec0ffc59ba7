use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// A zero sized request, a size that does not fit in a boundary tag, or
    /// an arena with no capacity.
    BadRequest,
    /// The memory provider could not extend the heap.
    OOM,
    /// A pointer that does not name a live allocated block of this heap.
    InvalidPointer,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::BadRequest => write!(f, "bad allocation request"),
            AllocError::OOM => write!(f, "out of memory"),
            AllocError::InvalidPointer => write!(f, "pointer is not a live allocation"),
        }
    }
}

impl std::error::Error for AllocError {}
