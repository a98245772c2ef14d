use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexSet;
use telemeter::{
    Backend, Counter, CounterFn, DistributionSummary, DistributionSummaryFn, DoubleCounter,
    DoubleCounterFn, Gauge, GaugeFn, Id, Timer, TimerFn,
};

use crate::{kind::CompositeKey, registry::Registry, MetricKind, Snapshotter};

/// Tag key added to exported measurements to say which statistic of the metric they carry.
pub use telemeter::STATISTIC_TAG;

/// A single exported value.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    /// Identity of the value: the metric's identity plus a `statistic` tag.
    pub id: Id,
    /// The value itself.  Durations are expressed in seconds.
    pub value: f64,
}

/// An in-memory backend.
///
/// Metrics live in a sharded [`Registry`] of atomics.  Callers can take snapshots of raw values at
/// any time through a [`Snapshotter`], or flatten everything into [`Measurement`]s, the shape a
/// periodic exporter would publish.
///
/// Cloning is cheap, and clones share the same metrics.
#[derive(Clone)]
pub struct MemoryBackend {
    registry: Arc<Registry>,
    seen: Option<Arc<Mutex<IndexSet<CompositeKey>>>>,
}

impl MemoryBackend {
    /// Creates a new `MemoryBackend` that remembers the order metrics were created in.
    pub fn new() -> Self {
        Self::with_ordering(true)
    }

    /// Creates a new `MemoryBackend` with ordering enabled or disabled.
    ///
    /// When ordering is enabled, any snapshotter derived from this backend will iterate the
    /// collected metrics in order of when the metric was first created.  If ordering is disabled,
    /// snapshots are sorted instead.
    pub fn with_ordering(ordered: bool) -> Self {
        let seen = if ordered { Some(Arc::new(Mutex::new(IndexSet::new()))) } else { None };
        Self { registry: Arc::new(Registry::atomic()), seen }
    }

    /// Gets a `Snapshotter` attached to this backend.
    pub fn snapshotter(&self) -> Snapshotter {
        Snapshotter { registry: Arc::clone(&self.registry), seen: self.seen.clone() }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Flattens every metric into statistic-tagged measurements, sorted by identity.
    ///
    /// - counters and floating-point counters: `count`
    /// - gauges: `gauge`, unless the gauge's identity already names its statistic, as the gauges
    ///   of a long task timer do
    /// - max gauges: `max`
    /// - timers: `count`, `totalTime` and `max`, in seconds
    /// - distribution summaries: `count`, `totalAmount` and `max`
    #[allow(clippy::cast_precision_loss)]
    pub fn measurements(&self) -> Vec<Measurement> {
        let mut measurements = Vec::new();
        let mut push = |id: &Id, statistic: &str, value: f64| {
            measurements.push(Measurement { id: id.with_tag(STATISTIC_TAG, statistic), value });
        };

        self.registry.visit_counters(|id, counter| push(id, "count", counter.count() as f64));
        self.registry.visit_double_counters(|id, counter| push(id, "count", counter.count()));
        self.registry.visit_gauges(|id, gauge| {
            let statistic = id.tags().get(STATISTIC_TAG).unwrap_or("gauge");
            push(id, statistic, gauge.value());
        });
        self.registry.visit_max_gauges(|id, gauge| push(id, "max", gauge.value()));
        self.registry.visit_timers(|id, timer| {
            push(id, "count", timer.count() as f64);
            push(id, "totalTime", timer.total_time().as_secs_f64());
            push(id, "max", timer.max_time().as_secs_f64());
        });
        self.registry.visit_distribution_summaries(|id, summary| {
            push(id, "count", summary.count() as f64);
            push(id, "totalAmount", summary.total_amount() as f64);
            push(id, "max", summary.max_amount() as f64);
        });

        measurements.sort_by(|a, b| a.id.cmp(&b.id));
        measurements
    }

    fn register(&self, kind: MetricKind, id: &Id) {
        if let Some(seen) = &self.seen {
            let mut seen = seen.lock().unwrap_or_else(PoisonError::into_inner);
            let key = CompositeKey::new(kind, id.clone());
            if !seen.contains(&key) {
                let _ = seen.insert(key);
            }
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn counter(&self, id: &Id) -> Counter {
        self.register(MetricKind::Counter, id);
        self.registry.get_or_create_counter(id, |c| Counter::from_arc(Arc::clone(c)))
    }

    fn double_counter(&self, id: &Id) -> DoubleCounter {
        self.register(MetricKind::DoubleCounter, id);
        self.registry.get_or_create_double_counter(id, |c| DoubleCounter::from_arc(Arc::clone(c)))
    }

    fn gauge(&self, id: &Id) -> Gauge {
        self.register(MetricKind::Gauge, id);
        self.registry.get_or_create_gauge(id, |g| Gauge::from_arc(Arc::clone(g)))
    }

    fn max_gauge(&self, id: &Id) -> Gauge {
        self.register(MetricKind::MaxGauge, id);
        self.registry.get_or_create_max_gauge(id, |g| Gauge::from_arc(Arc::clone(g)))
    }

    fn timer(&self, id: &Id) -> Timer {
        self.register(MetricKind::Timer, id);
        self.registry.get_or_create_timer(id, |t| Timer::from_arc(Arc::clone(t)))
    }

    fn distribution_summary(&self, id: &Id) -> DistributionSummary {
        self.register(MetricKind::DistributionSummary, id);
        self.registry
            .get_or_create_distribution_summary(id, |s| DistributionSummary::from_arc(Arc::clone(s)))
    }
}
