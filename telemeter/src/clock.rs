use std::time::{SystemTime, UNIX_EPOCH};

use quanta::{Clock, Instant};

/// Wall-clock time in milliseconds since the Unix epoch.
///
/// The epoch offset is read once when the clock is created; afterwards time advances with the
/// underlying [`quanta::Clock`], so a mocked clock drives wall time deterministically in tests.
#[derive(Clone, Debug)]
pub struct WallClock {
    clock: Clock,
    anchor: Instant,
    anchor_millis: u64,
}

impl WallClock {
    /// Creates a wall clock backed by the system's monotonic clock.
    pub fn new() -> Self {
        Self::from_clock(Clock::new())
    }

    /// Creates a wall clock backed by the given clock.
    pub fn from_clock(clock: Clock) -> Self {
        let anchor = clock.now();
        let anchor_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));

        Self { clock, anchor, anchor_millis }
    }

    /// Milliseconds since the Unix epoch.
    pub fn now_millis(&self) -> u64 {
        let elapsed = self.clock.now().saturating_duration_since(self.anchor);
        let elapsed = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.anchor_millis.saturating_add(elapsed)
    }

    /// The underlying monotonic clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use quanta::Clock;

    use super::WallClock;

    #[test]
    fn advances_with_mock() {
        let (clock, mock) = Clock::mock();
        let wall = WallClock::from_clock(clock);

        let start = wall.now_millis();
        assert!(start > 0);

        mock.increment(Duration::from_millis(1500));
        assert_eq!(wall.now_millis() - start, 1500);
    }
}
