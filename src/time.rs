use std::time::{Duration, Instant};

/// Longest frame step fed to the camera.
const MAX_DELTA: Duration = Duration::from_millis(250);

pub struct Time {
    last: Instant,
    delta: Duration,
    frames: u64,
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self { last: now, delta: Duration::ZERO, frames: 0 }
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = (now - self.last).min(MAX_DELTA);
        self.last = now;
        self.frames += 1;
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}
