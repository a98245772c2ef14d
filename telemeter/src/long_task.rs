use std::{
    collections::HashMap,
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use parking_lot::Mutex;
use quanta::{Clock, Instant};

use crate::{
    atomics::AtomicU64,
    scheduler::{Scheduler, Task},
    Gauge,
};

/// Tag key distinguishing the gauges a long task timer publishes.
pub const STATISTIC_TAG: &str = "statistic";

struct LongTaskState {
    clock: Clock,
    next_task: AtomicU64,
    running: Mutex<HashMap<u64, Instant>>,
    active_tasks: Gauge,
    duration: Gauge,
}

impl LongTaskState {
    fn totals(&self) -> (usize, Duration) {
        let now = self.clock.now();
        let running = self.running.lock();
        let duration = running.values().map(|started| now.saturating_duration_since(*started)).sum();
        (running.len(), duration)
    }

    #[allow(clippy::cast_precision_loss)]
    fn refresh(&self) {
        let (active, duration) = self.totals();
        self.active_tasks.set(active as f64);
        self.duration.set(duration.as_secs_f64());
    }
}

/// Tracks tasks that take a long time, while they are still running.
///
/// Where a [`Timer`](crate::Timer) only learns about a task once it completes, a long task timer
/// reports on tasks in flight.  It publishes two gauges under its identity:
///
/// - `statistic=activeTasks`: the number of tasks started and not yet stopped.
/// - `statistic=duration`: the sum of their running times, in seconds.
///
/// Both are recomputed on the facade's update interval and on every start and stop.  Refreshing
/// continues after every clone has been dropped; call [`close`](LongTaskTimer::close) to stop it.
#[derive(Clone)]
pub struct LongTaskTimer {
    state: Arc<LongTaskState>,
    task: Arc<Mutex<Option<Task>>>,
}

impl LongTaskTimer {
    pub(crate) fn new(
        active_tasks: Gauge,
        duration: Gauge,
        clock: Clock,
        scheduler: &Scheduler,
        interval: Duration,
    ) -> Self {
        let state = Arc::new(LongTaskState {
            clock,
            next_task: AtomicU64::new(0),
            running: Mutex::new(HashMap::new()),
            active_tasks,
            duration,
        });
        state.refresh();

        let ticking = Arc::clone(&state);
        let task = scheduler.spawn_repeating("long-task-timer", interval, move || ticking.refresh());

        Self { state, task: Arc::new(Mutex::new(Some(task))) }
    }

    /// Starts tracking a task, returning the identifier to [`stop`](LongTaskTimer::stop) it with.
    pub fn start(&self) -> u64 {
        let task = self.state.next_task.fetch_add(1, Ordering::Relaxed);
        let _ = self.state.running.lock().insert(task, self.state.clock.now());
        self.state.refresh();
        task
    }

    /// Stops tracking `task`, returning how long it ran.
    ///
    /// Returns `None` if the task is unknown or was already stopped.
    pub fn stop(&self, task: u64) -> Option<Duration> {
        let started = self.state.running.lock().remove(&task)?;
        let elapsed = self.state.clock.now().saturating_duration_since(started);
        self.state.refresh();
        Some(elapsed)
    }

    /// Number of tasks currently running.
    pub fn active_tasks(&self) -> usize {
        self.state.running.lock().len()
    }

    /// Sum of the running times of every task currently running.
    pub fn duration(&self) -> Duration {
        self.state.totals().1
    }

    /// Stops refreshing the gauges.
    ///
    /// Starting and stopping tasks still updates them.  Safe to call more than once, from any
    /// clone.
    pub fn close(&self) {
        if let Some(task) = self.task.lock().take() {
            task.cancel();
        }
    }

    /// Returns `true` once the gauges stopped refreshing: [`close`](LongTaskTimer::close) was
    /// called, or the runtime they were refreshed on shut down.
    pub fn is_closed(&self) -> bool {
        self.task.lock().as_ref().map_or(true, Task::is_finished)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use approx::assert_relative_eq;
    use quanta::Clock;

    use super::LongTaskTimer;
    use crate::{atomics::AtomicU64, scheduler::Scheduler, Gauge};

    struct Fixture {
        timer: LongTaskTimer,
        active_tasks: Gauge,
        duration: Gauge,
        mock: Arc<quanta::Mock>,
    }

    fn fixture(interval: Duration) -> Fixture {
        let (clock, mock) = Clock::mock();
        let active_tasks = Gauge::from_arc(Arc::new(AtomicU64::new(0)));
        let duration = Gauge::from_arc(Arc::new(AtomicU64::new(0)));
        let scheduler = Scheduler::current().unwrap();
        let timer =
            LongTaskTimer::new(active_tasks.clone(), duration.clone(), clock, &scheduler, interval);
        Fixture { timer, active_tasks, duration, mock }
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop() {
        let Fixture { timer, active_tasks, mock, .. } = fixture(Duration::from_secs(1));

        let first = timer.start();
        let second = timer.start();
        assert_ne!(first, second);
        assert_eq!(timer.active_tasks(), 2);
        assert_relative_eq!(active_tasks.value(), 2.0);

        mock.increment(Duration::from_millis(1500));
        assert_eq!(timer.duration(), Duration::from_secs(3));
        assert_eq!(timer.stop(first), Some(Duration::from_millis(1500)));
        assert_eq!(timer.stop(first), None);
        assert_eq!(timer.active_tasks(), 1);
        assert_relative_eq!(active_tasks.value(), 1.0);

        assert!(timer.stop(second).is_some());
        assert_eq!(timer.duration(), Duration::ZERO);
        assert_relative_eq!(active_tasks.value(), 0.0);
        timer.close();
    }

    #[tokio::test(start_paused = true)]
    async fn duration_refreshes_on_interval() {
        let Fixture { timer, duration, mock, .. } = fixture(Duration::from_secs(1));
        let _task = timer.start();

        mock.increment(Duration::from_millis(2500));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_relative_eq!(duration.value(), 2.5);

        timer.close();
        assert!(timer.is_closed());
        mock.increment(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_relative_eq!(duration.value(), 2.5);
    }
}
