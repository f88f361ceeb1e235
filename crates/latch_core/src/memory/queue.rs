//! Execution queue seam: who hands out tags and who retires them.

use super::{QueueError, Tag};
use parking_lot::{Condvar, Mutex};
use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Source of completion tags for submitted GPU work.
///
/// Tags retire strictly in submission order, so `last_retired_tag` is
/// monotonic non-decreasing.
pub trait ExecutionQueue {
    /// Tag the next submission will carry.
    fn next_tag(&self) -> Tag;

    /// Highest tag whose work the consumer has fully finished.
    fn last_retired_tag(&self) -> Tag;

    /// Block the calling thread until `last_retired_tag() >= tag`.
    fn wait_until_retired(&self, tag: Tag) -> Result<(), QueueError>;

    fn is_retired(&self, tag: Tag) -> bool {
        self.last_retired_tag() >= tag
    }
}

impl<Q: ExecutionQueue + ?Sized> ExecutionQueue for &Q {
    fn next_tag(&self) -> Tag {
        (**self).next_tag()
    }

    fn last_retired_tag(&self) -> Tag {
        (**self).last_retired_tag()
    }

    fn wait_until_retired(&self, tag: Tag) -> Result<(), QueueError> {
        (**self).wait_until_retired(tag)
    }
}

impl<Q: ExecutionQueue + ?Sized> ExecutionQueue for Arc<Q> {
    fn next_tag(&self) -> Tag {
        (**self).next_tag()
    }

    fn last_retired_tag(&self) -> Tag {
        (**self).last_retired_tag()
    }

    fn wait_until_retired(&self, tag: Tag) -> Result<(), QueueError> {
        (**self).wait_until_retired(tag)
    }
}

#[derive(Debug)]
struct FenceState {
    next: Tag,
    retired: Tag,
}

/// Thread-safe tag fence.
///
/// The producer calls [`submit`](Self::submit) for each unit of work; the
/// consumer side (another thread, or a GPU completion callback) calls
/// [`retire`](Self::retire). Waiting on a tag that was never submitted fails
/// instead of blocking forever.
#[derive(Debug)]
pub struct FenceQueue {
    state: Mutex<FenceState>,
    retired: Condvar,
    timeout: Option<Duration>,
}

impl FenceQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FenceState {
                next: Tag::FIRST,
                retired: Tag::NONE,
            }),
            retired: Condvar::new(),
            timeout: None,
        }
    }

    /// Give up on a wait after `timeout` with [`QueueError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Claim the next tag for a submission.
    pub fn submit(&self) -> Tag {
        let mut state = self.state.lock();
        let tag = state.next;
        state.next = tag.next();
        tag
    }

    /// Mark every tag up to and including `tag` as finished.
    pub fn retire(&self, tag: Tag) {
        let mut state = self.state.lock();
        debug_assert!(tag < state.next, "retired tag {tag} before it was submitted");
        if tag > state.retired {
            state.retired = tag;
            drop(state);
            trace!(%tag, "fence retired");
            self.retired.notify_all();
        }
    }
}

impl Default for FenceQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionQueue for FenceQueue {
    fn next_tag(&self) -> Tag {
        self.state.lock().next
    }

    fn last_retired_tag(&self) -> Tag {
        self.state.lock().retired
    }

    fn wait_until_retired(&self, tag: Tag) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if state.retired >= tag {
            return Ok(());
        }
        if tag >= state.next {
            return Err(QueueError::NotSubmitted {
                tag,
                next: state.next,
            });
        }

        let started = Instant::now();
        while state.retired < tag {
            match self.timeout {
                Some(timeout) => {
                    let result = self.retired.wait_until(&mut state, started + timeout);
                    if result.timed_out() && state.retired < tag {
                        return Err(QueueError::Timeout {
                            tag,
                            retired: state.retired,
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                }
                None => self.retired.wait(&mut state),
            }
        }
        Ok(())
    }
}

/// Single-threaded queue whose consumer catches up on demand.
///
/// `wait_until_retired` retires everything up to the requested tag at once
/// and remembers the tag it was asked for. Suits CPU-only upload paths and
/// deterministic tests.
#[derive(Debug)]
pub struct ImmediateQueue {
    next: Cell<Tag>,
    retired: Cell<Tag>,
    waits: RefCell<Vec<Tag>>,
}

impl ImmediateQueue {
    pub fn new() -> Self {
        Self {
            next: Cell::new(Tag::FIRST),
            retired: Cell::new(Tag::NONE),
            waits: RefCell::new(Vec::new()),
        }
    }

    pub fn submit(&self) -> Tag {
        let tag = self.next.get();
        self.next.set(tag.next());
        tag
    }

    pub fn retire(&self, tag: Tag) {
        if tag > self.retired.get() {
            self.retired.set(tag);
        }
    }

    /// Tags the allocator blocked on, in order.
    pub fn waits(&self) -> Vec<Tag> {
        self.waits.borrow().clone()
    }
}

impl Default for ImmediateQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionQueue for ImmediateQueue {
    fn next_tag(&self) -> Tag {
        self.next.get()
    }

    fn last_retired_tag(&self) -> Tag {
        self.retired.get()
    }

    fn wait_until_retired(&self, tag: Tag) -> Result<(), QueueError> {
        if self.retired.get() >= tag {
            return Ok(());
        }
        if tag >= self.next.get() {
            return Err(QueueError::NotSubmitted {
                tag,
                next: self.next.get(),
            });
        }
        self.waits.borrow_mut().push(tag);
        self.retire(tag);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fence_hands_out_increasing_tags() {
        let fence = FenceQueue::new();
        assert_eq!(fence.next_tag(), Tag::FIRST);
        let a = fence.submit();
        let b = fence.submit();
        assert!(a < b);
        assert_eq!(fence.next_tag(), b.next());
        assert_eq!(fence.last_retired_tag(), Tag::NONE);
    }

    #[test]
    fn fence_retire_is_monotonic() {
        let fence = FenceQueue::new();
        let a = fence.submit();
        let b = fence.submit();
        fence.retire(b);
        fence.retire(a);
        assert_eq!(fence.last_retired_tag(), b);
        assert!(fence.is_retired(a));
    }

    #[test]
    fn fence_wakes_waiter_from_another_thread() {
        let fence = Arc::new(FenceQueue::new());
        let tag = fence.submit();

        let consumer = {
            let fence = Arc::clone(&fence);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                fence.retire(tag);
            })
        };

        fence.wait_until_retired(tag).unwrap();
        assert!(fence.is_retired(tag));
        consumer.join().unwrap();
    }

    #[test]
    fn fence_refuses_to_wait_on_unsubmitted_tag() {
        let fence = FenceQueue::new();
        let err = fence.wait_until_retired(Tag::new(3)).unwrap_err();
        assert_eq!(
            err,
            QueueError::NotSubmitted {
                tag: Tag::new(3),
                next: Tag::FIRST
            }
        );
    }

    #[test]
    fn fence_wait_times_out() {
        let fence = FenceQueue::new().with_timeout(Duration::from_millis(10));
        let tag = fence.submit();
        let err = fence.wait_until_retired(tag).unwrap_err();
        assert!(matches!(err, QueueError::Timeout { retired: Tag::NONE, .. }));
    }

    #[test]
    fn immediate_queue_catches_up_on_wait() {
        let queue = ImmediateQueue::new();
        let a = queue.submit();
        let b = queue.submit();
        queue.wait_until_retired(a).unwrap();
        assert_eq!(queue.last_retired_tag(), a);
        assert!(!queue.is_retired(b));

        // already retired, not recorded again
        queue.wait_until_retired(a).unwrap();
        assert_eq!(queue.waits(), vec![a]);
    }

    #[test]
    fn references_and_arcs_are_queues() {
        fn retired<Q: ExecutionQueue>(queue: Q) -> Tag {
            queue.last_retired_tag()
        }
        let fence = Arc::new(FenceQueue::new());
        assert_eq!(retired(&*fence), Tag::NONE);
        assert_eq!(retired(Arc::clone(&fence)), Tag::NONE);
    }
}
