//! Windowed throughput estimate.

use std::time::{Duration, Instant};

/// Default recompute window.
pub const DEFAULT_FPS_WINDOW: Duration = Duration::from_millis(500);

/// Frames-per-second over fixed, non-overlapping windows.
///
/// Each frame bumps a counter. Once the current window has lasted at least
/// `window`, the rate becomes `count / elapsed`, the counter resets and a new
/// window starts at that frame. Memory use is constant.
#[derive(Debug, Clone)]
pub struct ThroughputStats {
    frames_since_window: u32,
    window_start: Instant,
    current_fps: f64,
    total_frames: u64,
    window: Duration,
}

impl ThroughputStats {
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    /// Start the first window at an explicit instant.
    pub fn starting_at(window: Duration, start: Instant) -> Self {
        Self {
            frames_since_window: 0,
            window_start: start,
            current_fps: 0.0,
            total_frames: 0,
            window,
        }
    }

    /// Record one frame now.
    pub fn record_frame(&mut self) -> Option<f64> {
        self.record_frame_at(Instant::now())
    }

    /// Record one frame at `now`.
    ///
    /// Returns the new rate when a window boundary was crossed.
    pub fn record_frame_at(&mut self, now: Instant) -> Option<f64> {
        self.frames_since_window += 1;
        self.total_frames += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window || elapsed.is_zero() {
            return None;
        }

        self.current_fps = self.frames_since_window as f64 / elapsed.as_secs_f64();
        self.frames_since_window = 0;
        self.window_start = now;
        Some(self.current_fps)
    }

    /// Reset counters for a new run.
    pub fn reset(&mut self) {
        *self = Self::new(self.window);
    }

    pub fn current_fps(&self) -> f64 {
        self.current_fps
    }

    pub fn frames_since_window(&self) -> u32 {
        self.frames_since_window
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for ThroughputStats {
    fn default() -> Self {
        Self::new(DEFAULT_FPS_WINDOW)
    }
}
