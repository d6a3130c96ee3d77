use std::time::Instant;

use crate::circular_queue::CircularQueue;

/// Frames-per-second readout computed from the time between displayed frames.
///
/// With a window of one interval the readout is the instantaneous rate
/// `1 / (t1 - t0)`; wider windows average the last `window` intervals.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    origin: Instant,
    prev: Option<f64>,
    intervals: CircularQueue<f64>,
}

impl FpsCounter {
    pub fn new(window: usize) -> Self {
        Self {
            origin: Instant::now(),
            prev: None,
            intervals: CircularQueue::with_capacity(window),
        }
    }

    pub fn reset(&mut self) {
        self.prev = None;
        self.intervals.clear();
    }

    /// Records a display happening now.
    pub fn tick(&mut self) -> u32 {
        let now = self.origin.elapsed().as_secs_f64();
        self.tick_at(now)
    }

    /// Records a display at `ts` seconds and returns the rounded rate.
    ///
    /// The first tick has nothing to compare with and reads 0. Ticks whose
    /// timestamp does not advance add no interval.
    pub fn tick_at(&mut self, ts: f64) -> u32 {
        if let Some(prev) = self.prev.replace(ts) {
            let dt = ts - prev;
            if dt > 0.0 {
                self.intervals.push(dt);
            }
        }

        self.current()
    }

    pub fn current(&self) -> u32 {
        if self.intervals.is_empty() {
            return 0;
        }

        let total: f64 = self.intervals.iter().sum();
        let fps = self.intervals.len() as f64 / total;

        fps.round().min(u32::MAX as f64) as u32
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_second_interval_reads_two() {
        let mut fps = FpsCounter::default();

        assert_eq!(fps.tick_at(0.0), 0);
        assert_eq!(fps.tick_at(0.5), 2);
    }

    #[test]
    fn instantaneous_rate_follows_last_interval() {
        let mut fps = FpsCounter::new(1);

        fps.tick_at(0.0);
        fps.tick_at(0.1);
        assert_eq!(fps.current(), 10);
        assert_eq!(fps.tick_at(0.35), 4);
    }

    #[test]
    fn window_averages_intervals() {
        let mut fps = FpsCounter::new(3);

        fps.tick_at(0.0);
        fps.tick_at(0.1);
        fps.tick_at(0.2);
        assert_eq!(fps.tick_at(0.6), 5);
    }

    #[test]
    fn stalled_clock_does_not_divide_by_zero() {
        let mut fps = FpsCounter::default();

        fps.tick_at(1.0);
        assert_eq!(fps.tick_at(1.0), 0);

        fps.reset();
        assert_eq!(fps.current(), 0);
    }
}
