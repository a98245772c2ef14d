//! Recurring background work.
//!
//! Every recurring job runs as a Tokio task owned by the component that spawned it, through the
//! [`Task`] handle returned at spawn time.
use std::{
    future::Future,
    io,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    thread,
    time::Duration,
};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::{
    runtime::{self, Handle},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

static BACKGROUND: OnceCell<Handle> = OnceCell::new();

const BACKGROUND_THREAD_NAME: &str = "telemeter-scheduler";

/// Spawns recurring work onto a Tokio runtime.
#[derive(Clone, Debug)]
pub struct Scheduler {
    handle: Handle,
}

impl Scheduler {
    /// Creates a scheduler that spawns onto the given runtime.
    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates a scheduler for the ambient runtime, or the background runtime outside of one.
    ///
    /// Work spawned this way stops when the ambient runtime shuts down.
    pub fn current() -> io::Result<Self> {
        match Handle::try_current() {
            Ok(handle) => Ok(Self { handle }),
            Err(_) => Self::background(),
        }
    }

    /// Creates a scheduler for the shared background runtime.
    ///
    /// A single-threaded runtime is started on a dedicated thread the first time this is called,
    /// and lives for the rest of the process.
    pub fn background() -> io::Result<Self> {
        let handle = BACKGROUND.get_or_try_init(start_background_runtime)?.clone();
        Ok(Self { handle })
    }

    /// Spawns a future whose side effects are applied through `gate`.
    ///
    /// `job` receives the [`Gate`] tied to the returned [`Task`]; once the task is cancelled the
    /// gate refuses to run anything else.
    pub fn spawn_gated<J, F>(&self, job: J) -> Task
    where
        J: FnOnce(Gate) -> F,
        F: Future<Output = ()> + Send + 'static,
    {
        let gate = Gate::default();
        let future = job(gate.clone());
        let handle = self.handle.spawn(future);

        Task { handle, gate }
    }

    /// Runs `tick` every `period`, starting one period from now.
    ///
    /// A panicking tick is logged and the schedule carries on.  Ticks that fall behind are delayed
    /// rather than bunched up.
    pub fn spawn_repeating<F>(&self, name: &'static str, period: Duration, mut tick: F) -> Task
    where
        F: FnMut() + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));

        self.spawn_gated(move |gate| async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let _ = interval.tick().await;
                let outcome = gate.run(|| catch_unwind(AssertUnwindSafe(&mut tick)));
                match outcome {
                    None => break,
                    Some(Err(_)) => warn!(task = name, "recurring task panicked, continuing on the next tick"),
                    Some(Ok(())) => {}
                }
            }
        })
    }
}

fn start_background_runtime() -> io::Result<Handle> {
    let runtime = runtime::Builder::new_current_thread().enable_time().build()?;
    let handle = runtime.handle().clone();

    thread::Builder::new()
        .name(BACKGROUND_THREAD_NAME.to_owned())
        .spawn(move || runtime.block_on(std::future::pending::<()>()))?;

    debug!(thread = BACKGROUND_THREAD_NAME, "started background scheduler");
    Ok(handle)
}

/// Serializes a task's side effects against its cancellation.
///
/// Once [`Task::cancel`] returns, no closure passed to [`Gate::run`] is running or will run.
#[derive(Clone, Debug, Default)]
pub struct Gate {
    cancelled: Arc<Mutex<bool>>,
}

impl Gate {
    /// Runs `f` unless the owning task has been cancelled.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let cancelled = self.cancelled.lock();
        if *cancelled {
            None
        } else {
            Some(f())
        }
    }

    /// Returns `true` once the owning task has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock()
    }

    fn cancel(&self) {
        *self.cancelled.lock() = true;
    }
}

/// Handle to scheduled work.
///
/// Dropping a `Task` does not stop it; call [`Task::cancel`].
#[derive(Debug)]
pub struct Task {
    handle: JoinHandle<()>,
    gate: Gate,
}

impl Task {
    /// Stops the task.
    ///
    /// Safe to call more than once.  Any side effect in progress on another thread finishes
    /// before this returns.
    pub fn cancel(&self) {
        self.gate.cancel();
        self.handle.abort();
    }

    /// Returns `true` once the task has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.gate.is_cancelled()
    }

    /// Returns `true` once the task no longer runs: it was cancelled, or its runtime shut down.
    pub fn is_finished(&self) -> bool {
        self.is_cancelled() || self.handle.is_finished()
    }
}
