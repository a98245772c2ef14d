use std::time::Duration;

use quanta::Clock;
use tokio::task;

/// Measures how long the scheduler takes to run this task again after it yields.
///
/// The task yields once to start from a fresh scheduling slot, then measures the time from that
/// point until it is polled again after a second yield.  A busy runtime makes the second yield
/// wait behind every other runnable task.
pub(crate) async fn scheduler_delay(clock: &Clock) -> Duration {
    task::yield_now().await;
    let start = clock.now();
    task::yield_now().await;
    clock.now().saturating_duration_since(start)
}
