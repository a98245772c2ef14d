use std::{
    io,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use quanta::Clock;
use telemeter::{
    scheduler::{Scheduler, Task},
    Error, Gauge, IntoTagValue, Tags, Telemeter, Timer,
};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::{
    cpu::{CpuPercentages, CpuSampler},
    latency::scheduler_delay,
    names::{metric_name, to_camel_case},
    probe::{FileDescriptors, HeapSpace, MemoryUsage, Probe, Statistic},
    SystemProbe,
};

/// Default interval between memory and CPU samples.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Interval between scheduler latency probes.
pub const LATENCY_PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Builder for [`ProcessMetrics`].
#[must_use]
pub struct ProcessMetricsBuilder {
    refresh_interval: Duration,
    latency_interval: Duration,
    tags: Tags,
    probe: Option<Arc<dyn Probe>>,
}

impl ProcessMetricsBuilder {
    /// Creates a new [`ProcessMetricsBuilder`] with default values.
    pub fn new() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            latency_interval: LATENCY_PROBE_INTERVAL,
            tags: Tags::new(),
            probe: None,
        }
    }

    /// Sets the interval [`ProcessMetrics::start`] samples memory and CPU at.
    ///
    /// Defaults to 30 seconds.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Sets the interval between scheduler latency probes.
    ///
    /// Defaults to 500 milliseconds.
    pub fn latency_interval(mut self, interval: Duration) -> Self {
        self.latency_interval = interval;
        self
    }

    /// Adds a tag to every metric published.
    ///
    /// Gauges tagged with an `id` of their own, CPU usage and address space regions, keep that
    /// `id` over one added here.
    pub fn add_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: IntoTagValue,
    {
        let _ = self.tags.insert(key, value);
        self
    }

    /// Sets the probe statistics are read from.
    ///
    /// Defaults to [`SystemProbe`].
    pub fn probe<P>(mut self, probe: P) -> Self
    where
        P: Probe + 'static,
    {
        self.probe = Some(Arc::new(probe));
        self
    }

    /// Builds the observer, publishing through `telemeter`.
    ///
    /// Which optional capabilities the probe supports is decided here, once.  Nothing is sampled
    /// periodically until [`ProcessMetrics::start`] is called.
    ///
    /// # Errors
    ///
    /// In strict mode, fails if the tags are malformed.
    pub fn build(self, telemeter: &Telemeter) -> Result<ProcessMetrics, Error> {
        let telemeter = telemeter.scope(self.tags);
        let probe = self.probe.unwrap_or_else(|| Arc::new(SystemProbe::new()));
        let gauge = |statistic: &str, tags: Tags| telemeter.gauge(&metric_name(statistic), tags);

        let cpu = match probe.cpu_usage() {
            Some(usage) => Some(CpuGauges {
                user: gauge("cpu_usage", Tags::new().with("id", "user"))?,
                system: gauge("cpu_usage", Tags::new().with("id", "system"))?,
                sampler: Mutex::new(CpuSampler::new(usage, probe.now())),
            }),
            None => {
                debug!("cpu usage is not available, skipping cpu gauges");
                None
            }
        };

        let heap_spaces = probe.heap_spaces().is_some();
        if !heap_spaces {
            debug!("heap space statistics are not available, skipping heap space gauges");
        }

        let file_descriptors = match probe.file_descriptors() {
            Some(_) => Some(DescriptorGauges {
                open: gauge("open_file_descriptors", Tags::new())?,
                max: gauge("max_file_descriptors", Tags::new())?,
            }),
            None => {
                debug!("file descriptors are not available, skipping descriptor gauges");
                None
            }
        };

        let rss = gauge("rss", Tags::new())?;
        let heap_total = gauge("heap_total", Tags::new())?;
        let heap_used = gauge("heap_used", Tags::new())?;
        let external = gauge("external", Tags::new())?;
        let event_loop = telemeter.timer(&metric_name("event_loop"), Tags::new())?;
        let event_loop_lag = telemeter.timer(&metric_name("event_loop_lag"), Tags::new())?;
        let clock = telemeter.wall_clock().clock().clone();

        let inner = Inner {
            telemeter,
            probe,
            clock,
            memory_unsupported: AtomicBool::new(false),
            rss,
            heap_total,
            heap_used,
            external,
            cpu,
            heap_spaces,
            file_descriptors,
            event_loop,
            event_loop_lag,
        };

        Ok(ProcessMetrics {
            inner: Arc::new(inner),
            refresh_interval: self.refresh_interval,
            latency_interval: self.latency_interval,
            tasks: Mutex::new(None),
        })
    }
}

impl Default for ProcessMetricsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct CpuGauges {
    user: Gauge,
    system: Gauge,
    sampler: Mutex<CpuSampler>,
}

struct DescriptorGauges {
    open: Gauge,
    max: Gauge,
}

/// Everything one refresh writes, gathered before any gauge is touched.
struct Sample {
    memory: Option<MemoryUsage>,
    cpu: Option<CpuPercentages>,
    heap: Vec<Statistic>,
    spaces: Vec<HeapSpace>,
    file_descriptors: Option<FileDescriptors>,
}

struct Inner {
    telemeter: Telemeter,
    probe: Arc<dyn Probe>,
    clock: Clock,
    memory_unsupported: AtomicBool,
    rss: Gauge,
    heap_total: Gauge,
    heap_used: Gauge,
    external: Gauge,
    cpu: Option<CpuGauges>,
    heap_spaces: bool,
    file_descriptors: Option<DescriptorGauges>,
    event_loop: Timer,
    event_loop_lag: Timer,
}

impl Inner {
    /// Gathers a sample.  A failed memory read leaves the memory figures out of the sample and
    /// is returned next to it.
    fn sample(&self) -> (Sample, io::Result<()>) {
        let (memory, heap) = self.probe.memory();
        let (memory, outcome) = match memory {
            Ok(memory) => (Some(memory), Ok(())),
            Err(e) if e.kind() == io::ErrorKind::Unsupported => {
                if !self.memory_unsupported.swap(true, Ordering::Relaxed) {
                    debug!("memory usage is not available, skipping memory gauges");
                }
                (None, Ok(()))
            }
            Err(e) => (None, Err(e)),
        };
        let cpu = self.cpu.as_ref().and_then(|cpu| {
            let usage = self.probe.cpu_usage()?;
            cpu.sampler.lock().sample(usage, self.probe.now())
        });
        let spaces =
            if self.heap_spaces { self.probe.heap_spaces().unwrap_or_default() } else { Vec::new() };
        let file_descriptors =
            self.file_descriptors.as_ref().and_then(|_| self.probe.file_descriptors());

        (Sample { memory, cpu, heap, spaces, file_descriptors }, outcome)
    }

    #[allow(clippy::cast_precision_loss)]
    fn apply(&self, sample: Sample) {
        if let Some(memory) = sample.memory {
            self.rss.set(memory.rss as f64);
            self.heap_total.set(memory.heap_total as f64);
            self.heap_used.set(memory.heap_used as f64);
            self.external.set(memory.external as f64);
        }

        if let (Some(gauges), Some(cpu)) = (&self.cpu, sample.cpu) {
            gauges.user.set(cpu.user);
            gauges.system.set(cpu.system);
        }

        for statistic in &sample.heap {
            self.set(statistic, Tags::new());
        }

        for space in &sample.spaces {
            let id = to_camel_case(&space.name);
            for statistic in &space.statistics {
                self.set(statistic, Tags::new().with("id", id.as_str()));
            }
        }

        if let (Some(gauges), Some(descriptors)) = (&self.file_descriptors, sample.file_descriptors) {
            gauges.open.set(descriptors.open as f64);
            if let Some(max) = descriptors.max {
                gauges.max.set(max as f64);
            }
        }
    }

    fn set(&self, statistic: &Statistic, tags: Tags) {
        match self.telemeter.gauge(&metric_name(&statistic.name), tags) {
            Ok(gauge) => gauge.set(statistic.value),
            Err(e) => warn!(error = %e, "skipping process statistic"),
        }
    }

    fn refresh(&self) -> io::Result<()> {
        let (sample, memory) = self.sample();
        self.apply(sample);
        memory
    }

    fn record_latency(&self, delay: Duration, lag: Duration) {
        self.event_loop.record(delay);
        self.event_loop_lag.record(lag);
    }
}

struct Tasks {
    refresh: Task,
    latency: Task,
}

impl Tasks {
    fn cancel(&self) {
        self.refresh.cancel();
        self.latency.cancel();
    }

    fn is_finished(&self) -> bool {
        self.refresh.is_finished() || self.latency.is_finished()
    }
}

/// Publishes statistics about the current process.
///
/// Once [started](ProcessMetrics::start), memory, CPU and file descriptor gauges are refreshed on
/// a coarse interval, and the scheduler's responsiveness is probed every 500 milliseconds:
///
/// - `process.rss`, `process.heapTotal`, `process.heapUsed` and `process.external`, in bytes.
/// - `process.cpuUsage`, tagged `id=user` and `id=system`, in percent of one core over the last
///   refresh interval.
/// - one `process.<statistic>` gauge per process-wide memory statistic, and per address space
///   region tagged with `id=<region>`.
/// - `process.openFileDescriptors` and `process.maxFileDescriptors`.
/// - `process.eventLoop`, a timer measuring how long a task waits to be polled again after
///   yielding, and `process.eventLoopLag`, how late each probe fired.
///
/// Capabilities the probe does not support are skipped.  Dropping a `ProcessMetrics` stops it.
pub struct ProcessMetrics {
    inner: Arc<Inner>,
    refresh_interval: Duration,
    latency_interval: Duration,
    tasks: Mutex<Option<Tasks>>,
}

impl ProcessMetrics {
    /// Creates a [`ProcessMetricsBuilder`].
    pub fn builder() -> ProcessMetricsBuilder {
        ProcessMetricsBuilder::new()
    }

    /// Starts sampling at the configured refresh interval.
    ///
    /// # Errors
    ///
    /// Fails if the background scheduler cannot be started.
    pub fn start(&self) -> Result<(), Error> {
        self.start_with_interval(self.refresh_interval)
    }

    /// Starts sampling every `refresh_interval`.
    ///
    /// Samples are taken on the facade's runtime, so they outlive a short-lived runtime `start`
    /// was called from.  Latency probes measure the runtime `start` is called from, unless the
    /// facade was given one.  One latency probe runs immediately.  Calling this while already
    /// running restarts both schedules.
    ///
    /// # Errors
    ///
    /// Fails if the background scheduler cannot be started.
    pub fn start_with_interval(&self, refresh_interval: Duration) -> Result<(), Error> {
        let scheduler = self.inner.telemeter.scheduler()?;
        let observed = self.inner.telemeter.current_scheduler()?;

        let mut tasks = self.tasks.lock();
        if let Some(previous) = tasks.take() {
            previous.cancel();
        }

        let refreshing = Arc::clone(&self.inner);
        let refresh = scheduler.spawn_repeating("process-refresh", refresh_interval, move || {
            if let Err(e) = refreshing.refresh() {
                warn!(error = %e, "failed to sample process statistics");
            }
        });
        let latency = spawn_latency_probe(&observed, Arc::clone(&self.inner), self.latency_interval);
        *tasks = Some(Tasks { refresh, latency });

        debug!(?refresh_interval, latency_interval = ?self.latency_interval, "started process metrics");
        Ok(())
    }

    /// Stops sampling.
    ///
    /// Gauges keep their last values.  No gauge or timer is written by the schedules once this
    /// returns.  Safe to call more than once.
    pub fn stop(&self) {
        if let Some(tasks) = self.tasks.lock().take() {
            tasks.cancel();
            debug!("stopped process metrics");
        }
    }

    /// Returns `true` between [`start`](ProcessMetrics::start) and [`stop`](ProcessMetrics::stop),
    /// as long as the runtimes the schedules were spawned on are still running.
    pub fn is_running(&self) -> bool {
        self.tasks.lock().as_ref().map_or(false, |tasks| !tasks.is_finished())
    }

    /// Samples memory, CPU and file descriptors now, whether or not the observer is running.
    ///
    /// # Errors
    ///
    /// Fails if memory usage cannot be read.  Every other statistic is still written, and the
    /// memory gauges keep their last values.  A platform that does not report memory usage at
    /// all is not an error.
    pub fn refresh(&self) -> io::Result<()> {
        self.inner.refresh()
    }
}

impl Drop for ProcessMetrics {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_latency_probe(scheduler: &Scheduler, inner: Arc<Inner>, period: Duration) -> Task {
    let period = period.max(Duration::from_millis(1));

    scheduler.spawn_gated(move |gate| async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let scheduled = interval.tick().await;
            let lag = Instant::now().saturating_duration_since(scheduled);
            let delay = scheduler_delay(&inner.clock).await;

            let outcome = gate.run(|| catch_unwind(AssertUnwindSafe(|| inner.record_latency(delay, lag))));
            match outcome {
                None => break,
                Some(Err(_)) => warn!("latency probe panicked, continuing on the next tick"),
                Some(Ok(())) => {}
            }
        }
    })
}
