//! Fill level and overflow bookkeeping shared by both ring buffers.

use std::time::{Duration, Instant};

use log::{debug, error};

/// Usage (percent) above which fill changes are logged.
pub const USAGE_THRESHOLD: usize = 70;

/// Usage is reported in steps of this many percent.
const USAGE_STEP: usize = 10;

/// Minimum time between two overflow reports.
pub const OVERFLOW_REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct BufferStats {
    label: &'static str,
    capacity: usize,
    peak: usize,
    last_percent: usize,
    overflow_count: u64,
    overflow_bytes: u64,
    last_overflow_report: Option<Instant>,
}

impl BufferStats {
    pub fn new(label: &'static str, capacity: usize) -> Self {
        Self {
            label,
            capacity,
            peak: 0,
            last_percent: 0,
            overflow_count: 0,
            overflow_bytes: 0,
            last_overflow_report: None,
        }
    }

    /// Record the current fill level in bytes.
    ///
    /// Returns the quantised usage when it was logged: while rising at or
    /// above the threshold, or when falling back below it.
    pub fn update(&mut self, fill: usize) -> Option<usize> {
        self.peak = self.peak.max(fill);

        let percent = self.percent_of(fill) / USAGE_STEP * USAGE_STEP;
        if percent == self.last_percent {
            return None;
        }
        let rising = percent >= USAGE_THRESHOLD && percent > self.last_percent;
        let falling = percent < USAGE_THRESHOLD && self.last_percent >= USAGE_THRESHOLD;
        if rising || falling {
            debug!("[{}] Buffer usage: {}%", self.label, percent);
            self.last_percent = percent;
            return Some(percent);
        }
        None
    }

    /// Highest fill level seen, in bytes.
    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn peak_percent(&self) -> usize {
        self.percent_of(self.peak)
    }

    /// Account for `bytes` that did not fit. Returns whether a report was logged.
    pub fn report_overflow(&mut self, bytes: usize) -> bool {
        self.report_overflow_at(bytes, Instant::now())
    }

    fn report_overflow_at(&mut self, bytes: usize, now: Instant) -> bool {
        self.overflow_count += 1;
        self.overflow_bytes += bytes as u64;

        let due = self
            .last_overflow_report
            .map_or(true, |last| now.duration_since(last) >= OVERFLOW_REPORT_INTERVAL);
        if !due {
            return false;
        }
        error!(
            "[{}] {} buffer overflow{} ({} bytes dropped)",
            self.label,
            self.overflow_count,
            if self.overflow_count > 1 { "s" } else { "" },
            self.overflow_bytes
        );
        self.overflow_count = 0;
        self.overflow_bytes = 0;
        self.last_overflow_report = Some(now);
        true
    }

    /// Overflows (count, bytes) not yet reported.
    pub fn pending_overflows(&self) -> (u64, u64) {
        (self.overflow_count, self.overflow_bytes)
    }

    fn percent_of(&self, fill: usize) -> usize {
        fill * 100 / self.capacity.saturating_sub(1).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_logged_above_threshold_only() {
        let mut stats = BufferStats::new("Test", 101);
        assert_eq!(stats.update(30), None);
        assert_eq!(stats.update(65), None);
        assert_eq!(stats.update(72), Some(70));
        assert_eq!(stats.update(79), None);
        assert_eq!(stats.update(85), Some(80));
        // Falling while still above the threshold is not reported.
        assert_eq!(stats.update(75), None);
        assert_eq!(stats.update(40), Some(40));
        assert_eq!(stats.update(20), None);
        assert_eq!(stats.peak(), 85);
        assert_eq!(stats.peak_percent(), 85);
    }

    #[test]
    fn test_overflow_reports_rate_limited() {
        let mut stats = BufferStats::new("Test", 1000);
        let t0 = Instant::now();

        assert!(stats.report_overflow_at(10, t0));
        assert_eq!(stats.pending_overflows(), (0, 0));

        assert!(!stats.report_overflow_at(20, t0 + Duration::from_secs(1)));
        assert!(!stats.report_overflow_at(30, t0 + Duration::from_secs(4)));
        assert_eq!(stats.pending_overflows(), (2, 50));

        assert!(stats.report_overflow_at(5, t0 + Duration::from_secs(5)));
        assert_eq!(stats.pending_overflows(), (0, 0));
    }
}
