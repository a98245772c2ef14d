use std::time::Duration;

use crate::probe::{CpuTimes, Timespec};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Whole microseconds elapsed from `start` to `end`.
///
/// A negative nanosecond difference borrows one second.
pub(crate) fn delta_micros(end: Timespec, start: Timespec) -> i64 {
    let mut nanos = end.nanos - start.nanos;
    let mut secs = end.secs.saturating_sub(start.secs);

    if nanos < 0 {
        nanos += NANOS_PER_SEC;
        secs = secs.saturating_sub(1);
    }

    secs.saturating_mul(1_000_000).saturating_add(nanos / 1_000)
}

/// CPU utilisation over one sampling window, in percent of one core.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct CpuPercentages {
    pub user: f64,
    pub system: f64,
}

/// Turns cumulative CPU times into per-window percentages.
#[derive(Debug)]
pub(crate) struct CpuSampler {
    usage: CpuTimes,
    at: Timespec,
}

impl CpuSampler {
    pub fn new(usage: CpuTimes, at: Timespec) -> Self {
        Self { usage, at }
    }

    /// Computes utilisation since the previous sample and makes this one the new baseline.
    ///
    /// Returns `None`, keeping the previous baseline, when no time has elapsed.
    #[allow(clippy::cast_precision_loss)]
    pub fn sample(&mut self, usage: CpuTimes, at: Timespec) -> Option<CpuPercentages> {
        let elapsed = delta_micros(at, self.at);
        if elapsed <= 0 {
            return None;
        }

        let percentage = |current: Duration, previous: Duration| {
            current.saturating_sub(previous).as_micros() as f64 / elapsed as f64 * 100.0
        };
        let percentages = CpuPercentages {
            user: percentage(usage.user, self.usage.user),
            system: percentage(usage.system, self.usage.system),
        };

        self.usage = usage;
        self.at = at;
        Some(percentages)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use approx::assert_relative_eq;

    use super::{delta_micros, CpuSampler};
    use crate::probe::{CpuTimes, Timespec};

    #[test]
    fn delta_without_borrow() {
        assert_eq!(delta_micros(Timespec::new(3, 500_000), Timespec::new(1, 0)), 2_000_500);
    }

    #[test]
    fn delta_borrows_a_second() {
        let start = Timespec::new(1, 999_999_900);
        let end = Timespec::new(2, 200_100);
        assert_eq!(delta_micros(end, start), 200);
    }

    #[test]
    fn delta_truncates_sub_microsecond() {
        assert_eq!(delta_micros(Timespec::new(0, 1_999), Timespec::new(0, 0)), 1);
    }

    #[test]
    fn percentages() {
        let mut sampler = CpuSampler::new(CpuTimes::default(), Timespec::new(10, 0));
        let usage = CpuTimes { user: Duration::from_millis(500), system: Duration::from_millis(250) };

        let sample = sampler.sample(usage, Timespec::new(11, 0)).unwrap();
        assert_relative_eq!(sample.user, 50.0);
        assert_relative_eq!(sample.system, 25.0);

        let usage = CpuTimes { user: Duration::from_millis(600), system: Duration::from_millis(250) };
        let sample = sampler.sample(usage, Timespec::new(12, 0)).unwrap();
        assert_relative_eq!(sample.user, 10.0);
        assert_relative_eq!(sample.system, 0.0);
    }

    #[test]
    fn empty_window_keeps_baseline() {
        let mut sampler = CpuSampler::new(CpuTimes::default(), Timespec::new(5, 0));
        let usage = CpuTimes { user: Duration::from_millis(100), system: Duration::ZERO };

        assert_eq!(sampler.sample(usage, Timespec::new(5, 0)), None);

        let sample = sampler.sample(usage, Timespec::new(6, 0)).unwrap();
        assert_relative_eq!(sample.user, 10.0);
    }
}
