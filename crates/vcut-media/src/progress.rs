//! FFmpeg progress parsing.

use std::time::Duration;

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Output position reached by this pass.
    pub fn out_time(&self) -> Duration {
        Duration::from_millis(self.out_time_ms.max(0) as u64)
    }
}

/// Position of one encoding pass on the job's overall timeline.
///
/// A job that renders several outputs accumulates time across passes; the
/// offset is where this pass starts and the expected total is the sum of all
/// planned passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineProgress {
    pub offset: Duration,
    pub expected_total: Duration,
}

impl TimelineProgress {
    pub fn new(offset: Duration, expected_total: Duration) -> Self {
        Self {
            offset,
            expected_total,
        }
    }

    /// Absolute position after `progress` within this pass.
    pub fn position(&self, progress: &FfmpegProgress) -> Duration {
        self.offset + progress.out_time()
    }

    /// Overall completion in percent, `None` if the total is unknown.
    pub fn percentage(&self, progress: &FfmpegProgress) -> Option<f64> {
        if self.expected_total.is_zero() {
            return None;
        }
        let done = self.position(progress).as_secs_f64();
        Some((done / self.expected_total.as_secs_f64() * 100.0).min(100.0))
    }
}
