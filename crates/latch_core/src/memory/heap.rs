use super::{
    AllocError, BackendError, ExecutionQueue, FrameTracker, HostBlock, MemoryBackend,
    RingAllocator, Tag, UploadSettings,
};
use std::ops::{Deref, DerefMut};
use tracing::{info, warn};

/// Writable view of a freshly allocated upload region.
///
/// Valid until the GPU work carrying `tag` retires; the borrow ends at the
/// next call into the heap.
#[derive(Debug)]
pub struct UploadRegion<'a> {
    offset: usize,
    tag: Tag,
    bytes: &'a mut [u8],
}

impl<'a> UploadRegion<'a> {
    /// Byte offset of the region inside the backing block.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn into_slice(self) -> &'a mut [u8] {
        self.bytes
    }
}

impl Deref for UploadRegion<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl DerefMut for UploadRegion<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.bytes
    }
}

/// Transient upload heap: a ring allocator over a backend block, tagged by
/// an execution queue.
pub struct UploadHeap<B: MemoryBackend, Q: ExecutionQueue> {
    backend: B,
    queue: Q,
    ring: RingAllocator,
    frame: FrameTracker,
    default_alignment: usize,
}

impl<Q: ExecutionQueue> UploadHeap<HostBlock, Q> {
    /// Build a heap over a host block sized by `settings`.
    pub fn from_settings(settings: &UploadSettings, queue: Q) -> Result<Self, BackendError> {
        let block = HostBlock::new(settings.capacity, settings.base_alignment)?;
        let mut heap = Self::new(block, queue).with_frame_budget(settings.frame_budget);
        heap.default_alignment = settings.default_alignment.min(settings.base_alignment);
        Ok(heap)
    }
}

impl<B: MemoryBackend, Q: ExecutionQueue> UploadHeap<B, Q> {
    pub fn new(backend: B, queue: Q) -> Self {
        let capacity = backend.capacity();
        info!(capacity, alignment = backend.alignment(), "upload heap created");
        Self {
            ring: RingAllocator::new(capacity),
            frame: FrameTracker::new(None),
            default_alignment: backend.alignment().min(16),
            backend,
            queue,
        }
    }

    pub fn with_frame_budget(mut self, budget: Option<usize>) -> Self {
        self.frame = FrameTracker::new(budget);
        self
    }

    /// Reserve `size` bytes aligned to `align`, waiting on the GPU if the
    /// ring is full.
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<UploadRegion<'_>, AllocError> {
        let base_align = self.backend.alignment();
        if align.is_power_of_two() && align > base_align {
            return Err(AllocError::AlignmentExceedsBase {
                align,
                base: base_align,
            });
        }

        let tag = self.queue.next_tag();
        let offset = self.ring.sub_allocate(&self.queue, tag, size, align)?;
        self.frame.record_allocation(size);

        // SAFETY: the ring keeps [offset, offset + size) inside the block and
        // disjoint from every other outstanding region; `&mut self` keeps
        // this the only live view into it.
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(self.backend.base().as_ptr().add(offset), size)
        };
        Ok(UploadRegion { offset, tag, bytes })
    }

    /// Allocate and copy `data` into the region before returning it.
    pub fn allocate_initialized(
        &mut self,
        align: usize,
        data: &[u8],
    ) -> Result<UploadRegion<'_>, AllocError> {
        let mut region = self.allocate(data.len(), align)?;
        region.copy_from_slice(data);
        Ok(region)
    }

    /// Copy a slice of plain-old-data values, aligned to at least `T`.
    pub fn allocate_pod<T: bytemuck::Pod>(
        &mut self,
        align: usize,
        data: &[T],
    ) -> Result<UploadRegion<'_>, AllocError> {
        let align = align.max(std::mem::align_of::<T>());
        self.allocate_initialized(align, bytemuck::cast_slice(data))
    }

    /// Frame boundary: reclaim whatever the GPU already finished without
    /// blocking, and close the frame's byte count.
    pub fn begin_frame(&mut self) -> usize {
        let uploaded = self.frame.reset_frame();
        if self.frame.is_over_budget(uploaded) {
            warn!(
                uploaded,
                budget = self.frame.budget().unwrap_or_default(),
                "frame exceeded upload budget"
            );
        }
        self.ring.reclaim(self.queue.last_retired_tag())
    }

    pub fn default_alignment(&self) -> usize {
        self.default_alignment
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame.frame_allocations()
    }

    pub fn frame_tracker(&self) -> &FrameTracker {
        &self.frame
    }

    pub fn ring(&self) -> &RingAllocator {
        &self.ring
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Read back `len` bytes at `offset`, e.g. to hand them to a copy call.
    pub fn bytes_at(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        if end > self.backend.capacity() {
            return None;
        }
        // SAFETY: range checked against the block; shared borrow of self
        // excludes any live UploadRegion.
        Some(unsafe { std::slice::from_raw_parts(self.backend.base().as_ptr().add(offset), len) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ImmediateQueue;

    fn heap(capacity: usize) -> UploadHeap<HostBlock, ImmediateQueue> {
        UploadHeap::new(HostBlock::new(capacity, 256).unwrap(), ImmediateQueue::new())
    }

    #[test]
    fn allocate_initialized_copies_bytes() {
        let mut heap = heap(1024);
        let data = [0xab_u8; 100];
        let offset = {
            let region = heap.allocate_initialized(64, &data).unwrap();
            assert_eq!(&region[..], &data[..]);
            region.offset()
        };
        assert_eq!(heap.bytes_at(offset, 100).unwrap(), &data[..]);
        assert_eq!(heap.frame_bytes(), 100);
    }

    #[test]
    fn allocations_take_the_queue_next_tag() {
        let mut heap = heap(1024);
        let expected = heap.queue().submit().next();
        let region = heap.allocate(32, 16).unwrap();
        assert_eq!(region.tag(), expected);
    }

    #[test]
    fn pod_slices_respect_type_alignment() {
        let mut heap = heap(1024);
        heap.allocate(3, 1).unwrap();
        let region = heap.allocate_pod(1, &[1.0_f32, 2.0, 3.0]).unwrap();
        assert_eq!(region.offset() % std::mem::align_of::<f32>(), 0);
        assert_eq!(region.len(), 12);
        assert_eq!(bytemuck::cast_slice::<u8, f32>(&region), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn alignment_beyond_base_is_rejected() {
        let mut heap = heap(4096);
        let err = heap.allocate(16, 512).unwrap_err();
        assert!(matches!(err, AllocError::AlignmentExceedsBase { align: 512, base: 256 }));
    }

    #[test]
    fn begin_frame_reclaims_retired_work() {
        let mut heap = heap(1024);
        let tag = heap.allocate(512, 64).unwrap().tag();
        heap.queue().submit();
        heap.allocate(256, 64).unwrap();

        heap.queue().retire(tag);
        assert_eq!(heap.begin_frame(), 1);
        assert_eq!(heap.frame_bytes(), 0);
        assert_eq!(heap.frame_tracker().peak_frame(), 768);
        assert_eq!(heap.ring().outstanding_len(), 1);
    }

    #[test]
    fn full_heap_waits_for_oldest_submission() {
        let mut heap = heap(1024);
        for _ in 0..2 {
            heap.allocate(512, 64).unwrap();
            heap.queue().submit();
        }
        let region = heap.allocate(64, 64).unwrap();
        assert_eq!(region.offset(), 0);
        assert_eq!(heap.queue().waits(), vec![Tag::new(1)]);
    }

    #[test]
    fn from_settings_applies_budget_and_alignment() {
        let settings = UploadSettings {
            capacity: 8192,
            base_alignment: 512,
            default_alignment: 64,
            frame_budget: Some(100),
            wait_timeout_ms: None,
        };
        let heap = UploadHeap::from_settings(&settings, ImmediateQueue::new()).unwrap();
        assert_eq!(heap.ring().capacity(), 8192);
        assert_eq!(heap.default_alignment(), 64);
        assert_eq!(heap.frame_tracker().budget(), Some(100));
    }
}
