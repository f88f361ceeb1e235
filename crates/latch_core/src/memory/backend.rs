use super::BackendError;
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use tracing::debug;

/// Owner of the block the upload ring carves up.
///
/// # Safety
///
/// `base()` must point to `capacity()` bytes that stay valid, writable and
/// unaliased by anything but the ring's regions for the lifetime of the
/// backend, and must be aligned to `alignment()`. The block is released on
/// drop.
pub unsafe trait MemoryBackend {
    fn base(&self) -> NonNull<u8>;
    fn capacity(&self) -> usize;
    /// Alignment of `base()`. Requests aligned beyond this cannot be honoured.
    fn alignment(&self) -> usize;
}

/// Zeroed block in host memory.
pub struct HostBlock {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl HostBlock {
    pub fn new(capacity: usize, alignment: usize) -> Result<Self, BackendError> {
        if capacity == 0 {
            return Err(BackendError::ZeroCapacity);
        }
        if !alignment.is_power_of_two() {
            return Err(BackendError::InvalidAlignment { align: alignment });
        }
        let layout = Layout::from_size_align(capacity, alignment)?;

        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(BackendError::OutOfMemory { capacity })?;

        debug!(capacity, alignment, "allocated host upload block");
        Ok(Self { ptr, layout })
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr covers layout.size() initialized (zeroed) bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for HostBlock {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated with exactly this layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// SAFETY: HostBlock uniquely owns its allocation.
unsafe impl Send for HostBlock {}

// SAFETY: the block lives until drop and is only handed out through the ring.
unsafe impl MemoryBackend for HostBlock {
    fn base(&self) -> NonNull<u8> {
        self.ptr
    }

    fn capacity(&self) -> usize {
        self.layout.size()
    }

    fn alignment(&self) -> usize {
        self.layout.align()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_block_is_zeroed_and_aligned() {
        let block = HostBlock::new(4096, 256).unwrap();
        assert_eq!(block.capacity(), 4096);
        assert_eq!(block.alignment(), 256);
        assert_eq!(block.base().as_ptr() as usize % 256, 0);
        assert!(block.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn host_block_rejects_bad_layouts() {
        assert!(matches!(HostBlock::new(0, 16), Err(BackendError::ZeroCapacity)));
        assert!(matches!(
            HostBlock::new(64, 24),
            Err(BackendError::InvalidAlignment { align: 24 })
        ));
        assert!(matches!(
            HostBlock::new(usize::MAX, 4096),
            Err(BackendError::Layout(_))
        ));
    }
}
