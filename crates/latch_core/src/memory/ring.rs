use super::{align_up, AllocError, AllocationRecord, ExecutionQueue, Tag};
use latch_metrics::{metrics, WaitTimer};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Running totals for a ring, always collected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    pub allocations: u64,
    pub bytes_requested: u64,
    /// Bytes consumed from the ring including alignment and wrap padding.
    pub bytes_reserved: u64,
    pub wraps: u64,
    pub reclaimed: u64,
    pub waits: u64,
}

/// Circular sub-allocator over a fixed number of bytes.
///
/// Hands out offsets, never pointers. Space is reused only after the
/// execution queue retires the tag of every allocation covering it, and
/// always in allocation order.
pub struct RingAllocator {
    capacity: usize,
    write: usize,
    read: usize,
    records: VecDeque<AllocationRecord>,
    stats: RingStats,
    stalls: WaitTimer,
}

impl RingAllocator {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            capacity,
            write: 0,
            read: 0,
            records: VecDeque::new(),
            stats: RingStats::default(),
            stalls: WaitTimer::default(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn write_cursor(&self) -> usize {
        self.write
    }

    #[inline]
    pub fn read_cursor(&self) -> usize {
        self.read
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Outstanding allocations, oldest first.
    pub fn outstanding(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.records.iter()
    }

    pub fn outstanding_len(&self) -> usize {
        self.records.len()
    }

    /// Bytes held by outstanding allocations, padding included.
    pub fn outstanding_bytes(&self) -> usize {
        self.capacity - self.free_size()
    }

    pub fn stats(&self) -> RingStats {
        self.stats
    }

    pub fn stall_timer(&self) -> &WaitTimer {
        &self.stalls
    }

    /// Free bytes between the write cursor and the read cursor.
    ///
    /// The free span may be split across the end of the block, so a request
    /// smaller than this can still need to wait.
    pub fn free_size(&self) -> usize {
        if self.records.is_empty() {
            self.capacity
        } else if self.read > self.write {
            self.read - self.write
        } else if self.read == self.write {
            0
        } else {
            self.capacity - self.write + self.read
        }
    }

    /// Reserve `size` bytes aligned to `align` for work tagged `tag`.
    ///
    /// Blocks on `queue` while the ring is too full. Returns the byte offset
    /// of the region within the backing block.
    pub fn sub_allocate<Q>(
        &mut self,
        queue: &Q,
        tag: Tag,
        size: usize,
        align: usize,
    ) -> Result<usize, AllocError>
    where
        Q: ExecutionQueue + ?Sized,
    {
        let aligned_size = self.validate(tag, size, align)?;

        loop {
            if let Some(offset) = self.place(tag, size, aligned_size, align) {
                return Ok(offset);
            }
            self.make_room(queue, size, align)?;
        }
    }

    /// Drop every record whose tag is at or below `last_retired`.
    ///
    /// Returns the number of records reclaimed. Never blocks.
    pub fn reclaim(&mut self, last_retired: Tag) -> usize {
        let mut freed = 0;
        while let Some(front) = self.records.front() {
            if front.tag > last_retired {
                break;
            }
            self.read = front.end;
            self.records.pop_front();
            freed += 1;
        }

        if self.records.is_empty() {
            self.write = 0;
            self.read = 0;
        }

        if freed > 0 {
            self.stats.reclaimed += freed as u64;
            trace!(freed, %last_retired, free = self.free_size(), "reclaimed upload records");
        }
        freed
    }

    fn validate(&self, tag: Tag, size: usize, align: usize) -> Result<usize, AllocError> {
        if !align.is_power_of_two() {
            return Err(AllocError::InvalidAlignment { align });
        }

        let aligned_size = align_up(size.max(1), align)
            .filter(|&aligned| aligned <= self.capacity)
            .ok_or(AllocError::ExceedsCapacity {
                requested: size,
                align,
                capacity: self.capacity,
            })?;

        if let Some(newest) = self.records.back() {
            if tag < newest.tag {
                return Err(AllocError::TagRegression {
                    tag,
                    newest: newest.tag,
                });
            }
        }

        Ok(aligned_size)
    }

    /// Find a contiguous span for `aligned_size` bytes. The flag is set when
    /// the span wraps to the start of the block.
    fn find_fit(&self, aligned_size: usize, align: usize) -> Option<(usize, bool)> {
        if self.records.is_empty() {
            // cursors are reset to zero whenever the ring drains
            return (aligned_size <= self.capacity).then_some((0, false));
        }

        let aligned = align_up(self.write, align)?;
        let end = aligned.checked_add(aligned_size)?;

        if self.read > self.write {
            // free span is [write, read)
            return (end <= self.read).then_some((aligned, false));
        }
        if self.read == self.write {
            return None;
        }

        // free span is [write, capacity) followed by [0, read)
        if end <= self.capacity {
            Some((aligned, false))
        } else if aligned_size <= self.read {
            Some((0, true))
        } else {
            None
        }
    }

    fn place(&mut self, tag: Tag, size: usize, aligned_size: usize, align: usize) -> Option<usize> {
        let (offset, wrapped) = self.find_fit(aligned_size, align)?;
        let reserved = if wrapped {
            self.capacity - self.write + aligned_size
        } else {
            offset - self.write + aligned_size
        };
        let end = (offset + aligned_size) % self.capacity;

        self.records.push_back(AllocationRecord {
            offset,
            size,
            aligned_size,
            tag,
            end,
        });
        self.write = end;

        self.stats.allocations += 1;
        self.stats.bytes_requested += size as u64;
        self.stats.bytes_reserved += reserved as u64;
        if wrapped {
            self.stats.wraps += 1;
        }

        trace!(offset, size, aligned_size, %tag, wrapped, "sub-allocated upload region");
        Some(offset)
    }

    /// One reclamation step. Every successful return has freed at least one
    /// record, so the retry loop in `sub_allocate` is bounded by the number
    /// of outstanding records.
    fn make_room<Q>(&mut self, queue: &Q, size: usize, align: usize) -> Result<(), AllocError>
    where
        Q: ExecutionQueue + ?Sized,
    {
        if self.reclaim(queue.last_retired_tag()) > 0 {
            return Ok(());
        }

        // An empty ring fits anything up to capacity, so reaching this with
        // no records means the request itself is unsatisfiable.
        let oldest = self
            .records
            .front()
            .map(|record| record.tag)
            .ok_or(AllocError::ExceedsCapacity {
                requested: size,
                align,
                capacity: self.capacity,
            })?;

        debug!(
            %oldest,
            size,
            free = self.free_size(),
            outstanding = self.records.len(),
            "upload ring full, waiting for GPU"
        );
        self.stats.waits += 1;

        metrics! { self.stalls.begin(); }
        let waited = queue.wait_until_retired(oldest);
        metrics! { self.stalls.end(); }
        waited?;

        if self.reclaim(queue.last_retired_tag()) == 0 {
            return Err(AllocError::NoProgress { tag: oldest });
        }
        Ok(())
    }
}
