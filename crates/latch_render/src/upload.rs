//! GPU-driven execution queue for the upload ring

use latch_core::memory::{ExecutionQueue, FenceQueue, QueueError, Tag};
use std::sync::Arc;
use tracing::trace;

/// Execution queue backed by a `wgpu::Queue`.
///
/// Each [`submit`](Self::submit) claims a tag and registers a completion
/// callback that retires it. Callbacks only run while the device is polled,
/// so waiting polls the device instead of sleeping on the fence.
pub struct WgpuQueue {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    fence: Arc<FenceQueue>,
}

impl WgpuQueue {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            fence: Arc::new(FenceQueue::new()),
        }
    }

    /// Submit command buffers as one unit of work and return its tag.
    pub fn submit<I>(&self, command_buffers: I) -> Tag
    where
        I: IntoIterator<Item = wgpu::CommandBuffer>,
    {
        let tag = self.fence.submit();
        self.queue.submit(command_buffers);

        let fence = Arc::clone(&self.fence);
        self.queue.on_submitted_work_done(move || fence.retire(tag));
        trace!(%tag, "submitted GPU work");
        tag
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl ExecutionQueue for WgpuQueue {
    fn next_tag(&self) -> Tag {
        self.fence.next_tag()
    }

    fn last_retired_tag(&self) -> Tag {
        // let finished work run its callbacks
        let _ = self.device.poll(wgpu::Maintain::Poll);
        self.fence.last_retired_tag()
    }

    fn wait_until_retired(&self, tag: Tag) -> Result<(), QueueError> {
        if self.fence.is_retired(tag) {
            return Ok(());
        }
        let next = self.fence.next_tag();
        if tag >= next {
            return Err(QueueError::NotSubmitted { tag, next });
        }

        let _ = self.device.poll(wgpu::Maintain::Wait);
        let retired = self.fence.last_retired_tag();
        if retired >= tag {
            Ok(())
        } else {
            Err(QueueError::Stalled { tag, retired })
        }
    }
}
