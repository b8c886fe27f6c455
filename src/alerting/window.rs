use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Ordered timestamps of the lines a frequency rule has counted.
///
/// The window is anchored at the newest timestamp seen. Lines normally arrive
/// in order and are appended; a late line is inserted at its sorted position,
/// so trimming from the front stays correct for merged sources.
#[derive(Debug, Clone)]
pub struct FrequencyWindow {
    window_seconds: u64,
    timestamps: VecDeque<DateTime<Utc>>,
}

impl FrequencyWindow {
    pub fn new(window_seconds: u64) -> Self {
        Self {
            window_seconds,
            timestamps: VecDeque::new(),
        }
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Records a qualifying line and returns how many lines remain in the window.
    pub fn record(&mut self, at: DateTime<Utc>) -> usize {
        match self.timestamps.back() {
            Some(newest) if at < *newest => {
                let idx = self.timestamps.partition_point(|t| *t <= at);
                self.timestamps.insert(idx, at);
            }
            _ => self.timestamps.push_back(at),
        }

        if let Some(newest) = self.timestamps.back().copied() {
            self.evict(newest);
        }
        self.timestamps.len()
    }

    /// Drops every timestamp whose age relative to `now` is at least the window.
    pub fn evict(&mut self, now: DateTime<Utc>) {
        let window = Duration::try_seconds(i64::try_from(self.window_seconds).unwrap_or(i64::MAX))
            .unwrap_or(Duration::MAX);
        while let Some(front) = self.timestamps.front() {
            if now - *front >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.timestamps.front().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_counts_lines_inside_window() {
        let mut window = FrequencyWindow::new(60);
        assert_eq!(window.record(at(0)), 1);
        assert_eq!(window.record(at(10)), 2);
        assert_eq!(window.record(at(20)), 3);
        // t=0 and t=10 are 70s and 60s old: both out.
        assert_eq!(window.record(at(70)), 2);
        assert_eq!(window.oldest(), Some(at(20)));
    }

    #[test]
    fn test_boundary_age_is_evicted() {
        let mut window = FrequencyWindow::new(60);
        window.record(at(0));
        assert_eq!(window.record(at(59)), 2);
        assert_eq!(window.record(at(60)), 2);
    }

    #[test]
    fn test_late_line_is_inserted_in_order() {
        let mut window = FrequencyWindow::new(60);
        window.record(at(10));
        window.record(at(30));
        assert_eq!(window.record(at(20)), 3);
        assert_eq!(window.oldest(), Some(at(10)));
        // Evicting at t=75 drops t=10 only, which requires sorted order.
        window.evict(at(75));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_late_line_outside_window_is_dropped() {
        let mut window = FrequencyWindow::new(60);
        window.record(at(100));
        assert_eq!(window.record(at(5)), 1);
        assert_eq!(window.oldest(), Some(at(100)));
    }
}
