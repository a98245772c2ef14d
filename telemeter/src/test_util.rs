use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::{
    atomics::{
        AtomicDistributionSummary, AtomicDoubleCounter, AtomicMaxGauge, AtomicTimer, AtomicU64,
    },
    Backend, Counter, DistributionSummary, DoubleCounter, Gauge, Id, Timer,
};

/// A minimal in-memory backend for unit tests.
#[derive(Default)]
pub struct TestBackend {
    counters: Mutex<HashMap<Id, Arc<AtomicU64>>>,
    double_counters: Mutex<HashMap<Id, Arc<AtomicDoubleCounter>>>,
    gauges: Mutex<HashMap<Id, Arc<AtomicU64>>>,
    max_gauges: Mutex<HashMap<Id, Arc<AtomicMaxGauge>>>,
    timers: Mutex<HashMap<Id, Arc<AtomicTimer>>>,
    summaries: Mutex<HashMap<Id, Arc<AtomicDistributionSummary>>>,
}

impl TestBackend {
    pub fn counter_ids(&self) -> Vec<Id> {
        let mut ids = self.counters.lock().keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub fn gauge_ids(&self) -> Vec<Id> {
        let mut ids = self.gauges.lock().keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }
}

impl Backend for TestBackend {
    fn counter(&self, id: &Id) -> Counter {
        Counter::from_arc(Arc::clone(self.counters.lock().entry(id.clone()).or_default()))
    }

    fn double_counter(&self, id: &Id) -> DoubleCounter {
        DoubleCounter::from_arc(Arc::clone(
            self.double_counters.lock().entry(id.clone()).or_default(),
        ))
    }

    fn gauge(&self, id: &Id) -> Gauge {
        Gauge::from_arc(Arc::clone(self.gauges.lock().entry(id.clone()).or_default()))
    }

    fn max_gauge(&self, id: &Id) -> Gauge {
        Gauge::from_arc(Arc::clone(self.max_gauges.lock().entry(id.clone()).or_default()))
    }

    fn timer(&self, id: &Id) -> Timer {
        Timer::from_arc(Arc::clone(self.timers.lock().entry(id.clone()).or_default()))
    }

    fn distribution_summary(&self, id: &Id) -> DistributionSummary {
        DistributionSummary::from_arc(Arc::clone(
            self.summaries.lock().entry(id.clone()).or_default(),
        ))
    }
}
