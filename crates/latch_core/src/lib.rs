//! Latch Engine Core
//!
//! Contains the fundamental engine-side memory systems:
//! - Transient upload ring (CPU-written, GPU-read, reclaimed by completion tag)
//! - Execution queue and memory backend seams
//! - Upload heap settings

pub mod memory;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
