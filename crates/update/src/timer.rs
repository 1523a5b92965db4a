/// Accumulates elapsed milliseconds until an interval has passed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntervalTimer {
    interval: u32,
    current: u32,
}

impl IntervalTimer {
    pub fn new(interval: u32) -> Self {
        Self {
            interval,
            current: 0,
        }
    }

    pub fn update(&mut self, diff: u32) {
        self.current = self.current.saturating_add(diff);
    }

    pub fn passed(&self) -> bool {
        self.current >= self.interval
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn set_interval(&mut self, interval: u32) {
        self.interval = interval;
    }

    /// Back to zero, dropping any overshoot.
    pub fn reset(&mut self) {
        self.current = 0;
    }
}
