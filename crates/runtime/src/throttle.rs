/// Frame-count rate limiter.
///
/// `tick` returns `true` on the first frame and then once every `interval`
/// frames. Counting is in frames rather than wall-clock time so a replayed
/// frame sequence makes the same decisions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameThrottle {
    interval: u32,
    countdown: u32,
}

impl FrameThrottle {
    /// An interval of 0 behaves like 1 (run every frame).
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            countdown: 0,
        }
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn tick(&mut self) -> bool {
        if self.countdown == 0 {
            self.countdown = self.interval - 1;
            true
        } else {
            self.countdown -= 1;
            false
        }
    }

    /// Makes the next `tick` fire.
    pub fn force(&mut self) {
        self.countdown = 0;
    }
}
