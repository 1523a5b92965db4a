use std::collections::VecDeque;
use std::time::Duration;

/// Measurements from the last completed update pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Base maps advanced.
    pub maps: usize,
    /// Milliseconds handed to each map.
    pub diff: u32,
    pub primary_time: Duration,
    pub delayed_time: Duration,
}

impl PassStats {
    pub fn total_time(&self) -> Duration {
        self.primary_time + self.delayed_time
    }
}

/// The most recent passes, oldest first. Older passes fall off once
/// `capacity` is reached.
#[derive(Debug)]
pub struct PassHistory {
    passes: VecDeque<PassStats>,
    capacity: usize,
}

impl PassHistory {
    /// `capacity` is clamped to at least one pass.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            passes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, pass: PassStats) {
        if self.passes.len() == self.capacity {
            self.passes.pop_front();
        }
        self.passes.push_back(pass);
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PassStats> {
        self.passes.iter()
    }

    pub fn mean_primary(&self) -> Duration {
        self.mean(|p| p.primary_time)
    }

    pub fn mean_delayed(&self) -> Duration {
        self.mean(|p| p.delayed_time)
    }

    /// Pass with the longest combined phase time.
    pub fn slowest(&self) -> Option<&PassStats> {
        self.passes.iter().max_by_key(|p| p.total_time())
    }

    fn mean(&self, phase: impl Fn(&PassStats) -> Duration) -> Duration {
        if self.passes.is_empty() {
            return Duration::ZERO;
        }
        self.passes.iter().map(phase).sum::<Duration>() / self.passes.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(maps: usize, primary_ms: u64, delayed_ms: u64) -> PassStats {
        PassStats {
            maps,
            diff: 10,
            primary_time: Duration::from_millis(primary_ms),
            delayed_time: Duration::from_millis(delayed_ms),
        }
    }

    #[test]
    fn empty_history_reports_zero() {
        let history = PassHistory::new(4);
        assert!(history.is_empty());
        assert_eq!(history.mean_primary(), Duration::ZERO);
        assert_eq!(history.mean_delayed(), Duration::ZERO);
        assert!(history.slowest().is_none());
    }

    #[test]
    fn phases_are_averaged_separately() {
        let mut history = PassHistory::new(8);
        history.record(pass(3, 10, 2));
        history.record(pass(3, 20, 4));
        assert_eq!(history.mean_primary(), Duration::from_millis(15));
        assert_eq!(history.mean_delayed(), Duration::from_millis(3));
    }

    #[test]
    fn oldest_pass_falls_off() {
        let mut history = PassHistory::new(2);
        history.record(pass(1, 50, 50));
        history.record(pass(2, 10, 1));
        history.record(pass(3, 30, 1));

        assert_eq!(history.len(), 2);
        let maps: Vec<usize> = history.iter().map(|p| p.maps).collect();
        assert_eq!(maps, vec![2, 3]);
        assert_eq!(history.slowest().map(|p| p.maps), Some(3));
    }

    #[test]
    fn zero_capacity_keeps_one_pass() {
        let mut history = PassHistory::new(0);
        history.record(pass(1, 7, 0));
        history.record(pass(2, 9, 0));
        assert_eq!(history.len(), 1);
        assert_eq!(history.mean_primary(), Duration::from_millis(9));
    }

    #[test]
    fn pass_total_sums_phases() {
        assert_eq!(pass(3, 4, 1).total_time(), Duration::from_millis(5));
    }
}
