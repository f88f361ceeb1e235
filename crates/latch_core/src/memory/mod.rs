//! Memory management utilities
//!
//! Transient upload memory for the renderer. A [`RingAllocator`] hands out
//! byte offsets from one fixed block; every allocation is stamped with the
//! [`Tag`] of the GPU work that will read it and is reclaimed, oldest first,
//! once the [`ExecutionQueue`] reports that tag as retired. When the ring is
//! full the allocator blocks on the queue instead of failing.
//!
//! ```ignore
//! use latch_core::memory::{FenceQueue, UploadHeap, UploadSettings};
//!
//! let settings = UploadSettings::default();
//! let mut heap = UploadHeap::from_settings(&settings, FenceQueue::new())?;
//! let region = heap.allocate_initialized(16, &vertex_bytes)?;
//! // record a copy from `region.offset()`, submit, retire the tag later
//! ```

mod backend;
mod error;
mod frame;
mod heap;
mod queue;
mod record;
mod ring;
mod settings;
mod tag;

pub use backend::{HostBlock, MemoryBackend};
pub use error::{AllocError, BackendError, QueueError};
pub use frame::FrameTracker;
pub use heap::{UploadHeap, UploadRegion};
pub use queue::{ExecutionQueue, FenceQueue, ImmediateQueue};
pub use record::AllocationRecord;
pub use ring::{RingAllocator, RingStats};
pub use settings::{SettingsError, UploadSettings};
pub use tag::Tag;

/// Round `value` up to a multiple of `align` (a power of two).
/// Returns `None` on overflow.
#[inline]
pub(crate) fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

#[cfg(test)]
mod tests {
    use super::align_up;

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(0, 64), Some(0));
        assert_eq!(align_up(1, 64), Some(64));
        assert_eq!(align_up(64, 64), Some(64));
        assert_eq!(align_up(65, 16), Some(80));
        assert_eq!(align_up(usize::MAX, 16), None);
    }
}
