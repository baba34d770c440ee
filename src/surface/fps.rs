use std::time::{Duration, Instant};

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Counts presented frames and reports a rate once per elapsed second.
#[derive(Debug, Default)]
pub struct FrameCounter {
    window_start: Option<Instant>,
    frames: u32,
    last: u32,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame. Returns the measured rate when a full second has
    /// elapsed since the last report.
    pub fn tick(&mut self, now: Instant) -> Option<u32> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed < REPORT_INTERVAL {
            return None;
        }

        let fps = (self.frames as f64 / elapsed.as_secs_f64()).round() as u32;
        self.last = fps;
        self.frames = 0;
        self.window_start = Some(now);
        Some(fps)
    }

    /// Last reported rate (0 before the first report).
    pub fn fps(&self) -> u32 {
        self.last
    }
}
