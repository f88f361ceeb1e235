//! Timing for producer stalls (time spent blocked on the consumer)

use super::ring_buffer::RingBuffer;
use std::time::{Duration, Instant};

pub struct WaitTimer {
    started: Option<Instant>,
    recent: RingBuffer<Duration>,
    total: Duration,
    count: u64,
}

impl WaitTimer {
    pub fn new(capacity: usize) -> Self {
        Self {
            started: None,
            recent: RingBuffer::new(capacity),
            total: Duration::ZERO,
            count: 0,
        }
    }

    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Close the current wait. Calling `end` without `begin` records nothing.
    pub fn end(&mut self) {
        if let Some(started) = self.started.take() {
            let elapsed = started.elapsed();
            self.recent.push(elapsed);
            self.total += elapsed;
            self.count += 1;
        }
    }

    pub fn wait_count(&self) -> u64 {
        self.count
    }

    pub fn total_wait_ms(&self) -> f64 {
        self.total.as_secs_f64() * 1000.0
    }

    pub fn average_wait_ms(&self) -> f64 {
        self.recent.average().as_secs_f64() * 1000.0
    }

    pub fn max_wait_ms(&self) -> f64 {
        self.recent.min_max().1.as_secs_f64() * 1000.0
    }
}

impl Default for WaitTimer {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_without_begin_is_ignored() {
        let mut timer = WaitTimer::new(4);
        timer.end();
        assert_eq!(timer.wait_count(), 0);

        timer.begin();
        timer.end();
        assert_eq!(timer.wait_count(), 1);
        assert!(timer.total_wait_ms() >= 0.0);
    }
}
