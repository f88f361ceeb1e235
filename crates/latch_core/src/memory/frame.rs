/// Per-frame upload tracker with an optional byte budget
#[derive(Debug, Clone, Default)]
pub struct FrameTracker {
    frame_allocations: usize,
    peak_frame: usize,
    frames: u64,
    budget: Option<usize>,
}

impl FrameTracker {
    pub fn new(budget: Option<usize>) -> Self {
        Self {
            budget,
            ..Self::default()
        }
    }

    pub fn record_allocation(&mut self, size: usize) {
        self.frame_allocations += size;
    }

    /// Close the current frame and return the bytes it allocated.
    pub fn reset_frame(&mut self) -> usize {
        let finished = std::mem::take(&mut self.frame_allocations);
        self.peak_frame = self.peak_frame.max(finished);
        self.frames += 1;
        finished
    }

    pub fn frame_allocations(&self) -> usize {
        self.frame_allocations
    }

    pub fn peak_frame(&self) -> usize {
        self.peak_frame.max(self.frame_allocations)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn budget(&self) -> Option<usize> {
        self.budget
    }

    pub fn is_over_budget(&self, bytes: usize) -> bool {
        self.budget.is_some_and(|budget| bytes > budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_frames_and_peak() {
        let mut tracker = FrameTracker::new(Some(100));
        tracker.record_allocation(60);
        tracker.record_allocation(60);
        assert_eq!(tracker.frame_allocations(), 120);
        assert!(tracker.is_over_budget(tracker.frame_allocations()));

        assert_eq!(tracker.reset_frame(), 120);
        tracker.record_allocation(10);
        assert_eq!(tracker.reset_frame(), 10);
        assert_eq!(tracker.peak_frame(), 120);
        assert_eq!(tracker.frames(), 2);
    }

    #[test]
    fn no_budget_is_never_exceeded() {
        let tracker = FrameTracker::new(None);
        assert!(!tracker.is_over_budget(usize::MAX));
    }
}
