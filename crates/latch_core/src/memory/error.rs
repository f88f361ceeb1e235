use super::Tag;
use thiserror::Error;

/// Errors surfaced by the upload ring.
///
/// Running out of free space is never an error: the ring waits on the
/// execution queue instead. Everything here is either a request that can
/// never be satisfied or a broken queue contract.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("request of {requested} bytes (align {align}) can never fit a {capacity}-byte ring")]
    ExceedsCapacity {
        requested: usize,
        align: usize,
        capacity: usize,
    },

    #[error("alignment {align} is not a non-zero power of two")]
    InvalidAlignment { align: usize },

    #[error("alignment {align} exceeds the backing block alignment {base}")]
    AlignmentExceedsBase { align: usize, base: usize },

    #[error("tag {tag} is older than the newest outstanding tag {newest}")]
    TagRegression { tag: Tag, newest: Tag },

    #[error("waited for tag {tag} but nothing was reclaimed")]
    NoProgress { tag: Tag },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl AllocError {
    /// True when the request can never succeed regardless of how much
    /// GPU work retires.
    pub fn is_impossible(&self) -> bool {
        matches!(self, AllocError::ExceedsCapacity { .. })
    }
}

/// Errors reported by an [`ExecutionQueue`](super::ExecutionQueue) wait.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("tag {tag} was never submitted (next tag is {next})")]
    NotSubmitted { tag: Tag, next: Tag },

    #[error("timed out after {waited_ms} ms waiting for tag {tag} (last retired {retired})")]
    Timeout { tag: Tag, retired: Tag, waited_ms: u64 },

    #[error("consumer went idle before tag {tag} retired (last retired {retired})")]
    Stalled { tag: Tag, retired: Tag },
}

/// Errors creating the backing block.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backing block capacity must be non-zero")]
    ZeroCapacity,

    #[error("backing block alignment {align} is not a power of two")]
    InvalidAlignment { align: usize },

    #[error("backing block layout rejected: {0}")]
    Layout(#[from] std::alloc::LayoutError),

    #[error("failed to allocate {capacity} bytes for the backing block")]
    OutOfMemory { capacity: usize },
}
