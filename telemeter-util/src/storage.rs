use std::sync::Arc;

use telemeter::{
    atomics::{
        AtomicDistributionSummary, AtomicDoubleCounter, AtomicMaxGauge, AtomicTimer, AtomicU64,
    },
    CounterFn, DistributionSummaryFn, DoubleCounterFn, GaugeFn, TimerFn,
};

/// Defines the underlying storage for metrics as well as how to create them.
pub trait Storage<K> {
    /// The type used for counters.
    type Counter: CounterFn + Clone;

    /// The type used for gauges.
    type Gauge: GaugeFn + Clone;

    /// The type used for timers.
    type Timer: TimerFn + Clone;

    /// The type used for distribution summaries.
    type DistributionSummary: DistributionSummaryFn + Clone;

    /// The type used for floating-point counters.
    type DoubleCounter: DoubleCounterFn + Clone;

    /// The type used for max gauges.
    type MaxGauge: GaugeFn + Clone;

    /// Creates an empty counter.
    fn counter(&self, key: &K) -> Self::Counter;

    /// Creates an empty gauge.
    fn gauge(&self, key: &K) -> Self::Gauge;

    /// Creates an empty timer.
    fn timer(&self, key: &K) -> Self::Timer;

    /// Creates an empty distribution summary.
    fn distribution_summary(&self, key: &K) -> Self::DistributionSummary;

    /// Creates an empty floating-point counter.
    fn double_counter(&self, key: &K) -> Self::DoubleCounter;

    /// Creates an empty max gauge.
    fn max_gauge(&self, key: &K) -> Self::MaxGauge;
}

/// Atomic metric storage.
///
/// Utilizes atomics for storing the value(s) of a given metric.  Shared access to the actual atomic
/// is handled via `Arc`.
#[derive(Clone, Copy, Debug, Default)]
pub struct AtomicStorage;

impl<K> Storage<K> for AtomicStorage {
    type Counter = Arc<AtomicU64>;
    type Gauge = Arc<AtomicU64>;
    type Timer = Arc<AtomicTimer>;
    type DistributionSummary = Arc<AtomicDistributionSummary>;
    type DoubleCounter = Arc<AtomicDoubleCounter>;
    type MaxGauge = Arc<AtomicMaxGauge>;

    fn counter(&self, _: &K) -> Self::Counter {
        Arc::new(AtomicU64::new(0))
    }

    fn gauge(&self, _: &K) -> Self::Gauge {
        Arc::new(AtomicU64::new(0))
    }

    fn timer(&self, _: &K) -> Self::Timer {
        Arc::new(AtomicTimer::new())
    }

    fn distribution_summary(&self, _: &K) -> Self::DistributionSummary {
        Arc::new(AtomicDistributionSummary::new())
    }

    fn double_counter(&self, _: &K) -> Self::DoubleCounter {
        Arc::new(AtomicDoubleCounter::new())
    }

    fn max_gauge(&self, _: &K) -> Self::MaxGauge {
        Arc::new(AtomicMaxGauge::new())
    }
}
