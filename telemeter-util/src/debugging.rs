use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use indexmap::IndexSet;
use ordered_float::OrderedFloat;
use telemeter::{
    atomics::{AtomicDistributionSummary, AtomicTimer},
    CounterFn, DistributionSummaryFn, DoubleCounterFn, GaugeFn, Id, TimerFn,
};

use crate::{kind::CompositeKey, registry::Registry, MetricKind};

/// A point-in-time value for a metric exposing raw values.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DebugValue {
    /// Counter.
    Counter(u64),
    /// Gauge.
    Gauge(OrderedFloat<f64>),
    /// Timer.
    Timer {
        /// Number of recorded durations.
        count: u64,
        /// Sum of recorded durations.
        total: Duration,
        /// Longest recorded duration.
        max: Duration,
    },
    /// Distribution summary.
    DistributionSummary {
        /// Number of recorded amounts.
        count: u64,
        /// Sum of recorded amounts.
        total: u64,
        /// Largest recorded amount.
        max: u64,
    },
    /// Floating-point counter.
    DoubleCounter(OrderedFloat<f64>),
    /// Max gauge.
    MaxGauge(OrderedFloat<f64>),
}

impl DebugValue {
    pub(crate) fn timer(timer: &AtomicTimer) -> Self {
        DebugValue::Timer { count: timer.count(), total: timer.total_time(), max: timer.max_time() }
    }

    pub(crate) fn distribution_summary(summary: &AtomicDistributionSummary) -> Self {
        DebugValue::DistributionSummary {
            count: summary.count(),
            total: summary.total_amount(),
            max: summary.max_amount(),
        }
    }
}

/// A point-in-time snapshot of all metrics in a [`MemoryBackend`][crate::MemoryBackend].
#[derive(Debug, Default)]
pub struct Snapshot(Vec<(CompositeKey, DebugValue)>);

impl Snapshot {
    /// Converts this snapshot to a mapping of metric data, keyed by the metric key itself.
    pub fn into_hashmap(self) -> HashMap<CompositeKey, DebugValue> {
        self.0.into_iter().collect()
    }

    /// Converts this snapshot to a vector of metric data tuples.
    pub fn into_vec(self) -> Vec<(CompositeKey, DebugValue)> {
        self.0
    }

    /// Looks up the value of one metric.
    pub fn get(&self, kind: MetricKind, id: &Id) -> Option<&DebugValue> {
        self.0
            .iter()
            .find(|(key, _)| key.kind() == kind && key.id() == id)
            .map(|(_, value)| value)
    }

    /// Number of metrics in the snapshot.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the snapshot holds no metrics.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Captures point-in-time snapshots of a [`MemoryBackend`][crate::MemoryBackend].
#[derive(Clone)]
pub struct Snapshotter {
    pub(crate) registry: Arc<Registry>,
    pub(crate) seen: Option<Arc<Mutex<IndexSet<CompositeKey>>>>,
}

impl Snapshotter {
    /// Takes a snapshot of the backend.
    ///
    /// When the backend tracks ordering, metrics appear in the order they were first created.
    /// Otherwise they are sorted by kind and identity.
    pub fn snapshot(&self) -> Snapshot {
        let mut values = HashMap::new();
        self.registry.visit_counters(|id, counter| {
            let key = CompositeKey::new(MetricKind::Counter, id.clone());
            let _ = values.insert(key, DebugValue::Counter(counter.count()));
        });
        self.registry.visit_gauges(|id, gauge| {
            let key = CompositeKey::new(MetricKind::Gauge, id.clone());
            let _ = values.insert(key, DebugValue::Gauge(gauge.value().into()));
        });
        self.registry.visit_timers(|id, timer| {
            let key = CompositeKey::new(MetricKind::Timer, id.clone());
            let _ = values.insert(key, DebugValue::timer(timer));
        });
        self.registry.visit_distribution_summaries(|id, summary| {
            let key = CompositeKey::new(MetricKind::DistributionSummary, id.clone());
            let _ = values.insert(key, DebugValue::distribution_summary(summary));
        });
        self.registry.visit_double_counters(|id, counter| {
            let key = CompositeKey::new(MetricKind::DoubleCounter, id.clone());
            let _ = values.insert(key, DebugValue::DoubleCounter(counter.count().into()));
        });
        self.registry.visit_max_gauges(|id, gauge| {
            let key = CompositeKey::new(MetricKind::MaxGauge, id.clone());
            let _ = values.insert(key, DebugValue::MaxGauge(gauge.value().into()));
        });

        let snapshot = match &self.seen {
            Some(seen) => {
                let seen = seen.lock().unwrap_or_else(PoisonError::into_inner).clone();
                seen.into_iter()
                    .filter_map(|key| values.remove(&key).map(|value| (key, value)))
                    .collect()
            }
            None => {
                let mut snapshot = values.into_iter().collect::<Vec<_>>();
                snapshot.sort_by(|a, b| a.0.cmp(&b.0));
                snapshot
            }
        };

        Snapshot(snapshot)
    }
}
