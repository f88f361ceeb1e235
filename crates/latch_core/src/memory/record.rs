use super::Tag;
use std::ops::Range;

/// Bookkeeping for one outstanding sub-allocation.
///
/// `offset` is already wrapped into `[0, capacity)`. `end` is the write
/// cursor after this allocation; any padding between the previous record's
/// `end` and `offset` belongs to this record and is released with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRecord {
    pub offset: usize,
    pub size: usize,
    pub aligned_size: usize,
    pub tag: Tag,
    pub end: usize,
}

impl AllocationRecord {
    /// Byte range reserved in the backing block.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.aligned_size
    }

    #[inline]
    pub fn overlaps(&self, other: &AllocationRecord) -> bool {
        let (a, b) = (self.range(), other.range());
        a.start < b.end && b.start < a.end
    }
}
