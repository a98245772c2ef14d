use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    atomics::AtomicU64,
    clock::WallClock,
    scheduler::{Scheduler, Task},
    Gauge,
};

/// Default interval between age gauge refreshes.
pub const DEFAULT_AGE_UPDATE_INTERVAL: Duration = Duration::from_secs(30);

struct AgeState {
    gauge: Gauge,
    last_updated: AtomicU64,
    clock: WallClock,
}

impl AgeState {
    fn refresh(&self) {
        let now = self.clock.now_millis();
        let last_updated = self.last_updated.load(Ordering::Acquire);
        #[allow(clippy::cast_precision_loss)]
        let elapsed = (now as f64 - last_updated as f64) / 1000.0;
        self.gauge.set(elapsed);
    }
}

/// A gauge reporting the seconds elapsed since an event last happened.
///
/// The gauge starts at zero and is recomputed on a fixed interval, as well as every time
/// [`update`](AgeGauge::update) is called.  Refreshing continues after every clone has been
/// dropped; call [`close`](AgeGauge::close) to stop it.
#[derive(Clone)]
pub struct AgeGauge {
    state: Arc<AgeState>,
    task: Arc<Mutex<Option<Task>>>,
}

impl AgeGauge {
    pub(crate) fn new(gauge: Gauge, clock: WallClock, scheduler: &Scheduler, interval: Duration) -> Self {
        let state = Arc::new(AgeState {
            gauge,
            last_updated: AtomicU64::new(clock.now_millis()),
            clock,
        });
        state.gauge.set(0.0);

        let ticking = Arc::clone(&state);
        let task = scheduler.spawn_repeating("age-gauge", interval, move || ticking.refresh());

        Self { state, task: Arc::new(Mutex::new(Some(task))) }
    }

    /// Last value written to the gauge, in seconds.
    ///
    /// Does not force a recompute.
    pub fn value(&self) -> f64 {
        self.state.gauge.value()
    }

    /// Marks the event as having happened now.
    pub fn update(&self) {
        self.update_at(self.state.clock.now_millis());
    }

    /// Marks the event as having happened at `timestamp_millis`, milliseconds since the Unix epoch.
    ///
    /// The gauge is recomputed immediately.
    pub fn update_at(&self, timestamp_millis: u64) {
        self.state.last_updated.store(timestamp_millis, Ordering::Release);
        self.state.refresh();
    }

    /// When the event last happened, in milliseconds since the Unix epoch.
    pub fn last_updated(&self) -> u64 {
        self.state.last_updated.load(Ordering::Acquire)
    }

    /// Stops refreshing the gauge.
    ///
    /// The gauge keeps its last value.  Explicit updates still write to it.  Safe to call more than
    /// once, from any clone.
    pub fn close(&self) {
        if let Some(task) = self.task.lock().take() {
            task.cancel();
        }
    }

    /// Returns `true` once the gauge stopped refreshing: [`close`](AgeGauge::close) was called, or
    /// the runtime it was refreshed on shut down.
    pub fn is_closed(&self) -> bool {
        self.task.lock().as_ref().map_or(true, Task::is_finished)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use approx::assert_relative_eq;
    use quanta::Clock;

    use super::AgeGauge;
    use crate::{atomics::AtomicU64, clock::WallClock, scheduler::Scheduler, Gauge};

    fn age_gauge(interval: Duration) -> (AgeGauge, Arc<quanta::Mock>) {
        let (clock, mock) = Clock::mock();
        let gauge = Gauge::from_arc(Arc::new(AtomicU64::new(0)));
        let scheduler = Scheduler::current().unwrap();
        (AgeGauge::new(gauge, WallClock::from_clock(clock), &scheduler, interval), mock)
    }

    async fn advance(mock: &quanta::Mock, by: Duration) {
        mock.increment(by);
        tokio::time::sleep(by).await;
    }

    // Ticks compute against the mock clock, which jumps ahead before tokio time advances, so
    // every tick inside an `advance` observes the final mock time.

    #[tokio::test(start_paused = true)]
    async fn starts_at_zero_and_ticks() {
        let (age, mock) = age_gauge(Duration::from_secs(1));
        assert_relative_eq!(age.value(), 0.0);

        advance(&mock, Duration::from_millis(999)).await;
        assert_relative_eq!(age.value(), 0.0);

        advance(&mock, Duration::from_millis(501)).await;
        assert_relative_eq!(age.value(), 1.5);

        advance(&mock, Duration::from_secs(2)).await;
        assert_relative_eq!(age.value(), 3.5);
        age.close();
    }

    #[tokio::test(start_paused = true)]
    async fn update_resets_immediately() {
        let (age, mock) = age_gauge(Duration::from_secs(1));
        advance(&mock, Duration::from_millis(5500)).await;
        assert_relative_eq!(age.value(), 5.5);

        age.update();
        assert_relative_eq!(age.value(), 0.0);

        let at = age.last_updated() - 2_000;
        age.update_at(at);
        assert_relative_eq!(age.value(), 2.0);
        assert_eq!(age.last_updated(), at);
        age.close();
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_refreshing() {
        let (age, mock) = age_gauge(Duration::from_secs(1));
        advance(&mock, Duration::from_millis(1500)).await;
        assert_relative_eq!(age.value(), 1.5);

        let clone = age.clone();
        clone.close();
        assert!(age.is_closed());
        age.close();

        advance(&mock, Duration::from_secs(10)).await;
        assert_relative_eq!(age.value(), 1.5);

        age.update();
        assert_relative_eq!(age.value(), 0.0);
    }
}
