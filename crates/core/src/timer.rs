//! High-resolution timer and frame-rate reporting.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Get the total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts frames over fixed reporting windows.
///
/// Feed it the running frame number once per tick; whenever more than
/// `interval` has passed since the last report it yields the number of
/// frames rendered in that window.
#[derive(Debug)]
pub struct FpsCounter {
    interval: Duration,
    last_report: Instant,
    last_frame_reported: u64,
    last_fps: u64,
}

impl FpsCounter {
    /// Creates a counter that reports once per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_report: Instant::now(),
            last_frame_reported: 0,
            last_fps: 0,
        }
    }

    /// Records the current frame number, returning a new FPS value when a
    /// reporting window has just closed.
    pub fn update(&mut self, frame_number: u64) -> Option<u64> {
        self.update_at(frame_number, Instant::now())
    }

    fn update_at(&mut self, frame_number: u64, now: Instant) -> Option<u64> {
        if now.duration_since(self.last_report) <= self.interval {
            return None;
        }

        self.last_fps = frame_number.saturating_sub(self.last_frame_reported);
        self.last_frame_reported = frame_number;
        self.last_report = now;
        Some(self.last_fps)
    }

    /// The most recently reported frame rate.
    #[inline]
    pub fn last_fps(&self) -> u64 {
        self.last_fps
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_counter_reports_after_interval() {
        let mut counter = FpsCounter::new(Duration::from_secs(1));
        let start = counter.last_report;

        assert_eq!(counter.update_at(30, start + Duration::from_millis(500)), None);
        assert_eq!(
            counter.update_at(120, start + Duration::from_millis(1001)),
            Some(120)
        );
        assert_eq!(counter.last_fps(), 120);
    }

    #[test]
    fn test_fps_counter_counts_frames_per_window() {
        let mut counter = FpsCounter::new(Duration::from_secs(1));
        let start = counter.last_report;

        counter.update_at(100, start + Duration::from_millis(1100));
        let second = counter.update_at(160, start + Duration::from_millis(2200));
        assert_eq!(second, Some(60));
    }

    #[test]
    fn test_timer_tick_is_monotonic() {
        let mut timer = Timer::new();
        let first = timer.tick();
        let second = timer.tick();
        assert!(timer.elapsed() >= first + second);
    }
}
