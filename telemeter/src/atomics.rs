//! Atomic types used for metrics.
//!
//! As the most commonly used types for metrics storage are atomic integers, implementations of
//! the handler traits must be provided in this crate due to Rust's "orphan rules", which disallow a
//! crate from implementing a foreign trait on a foreign type.
//!
//! Further, we always require an atomic integer of a certain size regardless of whether the
//! standard library exposes an atomic integer of that size for the target architecture.
//!
//! As such, the atomic types that we provide handle implementations for are publicly re-exported
//! here for downstream crates to utilize.

use std::{sync::atomic::Ordering, time::Duration};

#[cfg(target_pointer_width = "32")]
pub use portable_atomic::AtomicU64;
#[cfg(not(target_pointer_width = "32"))]
pub use std::sync::atomic::AtomicU64;

use crate::{CounterFn, DistributionSummaryFn, DoubleCounterFn, GaugeFn, TimerFn};

// Canonical quiet NaN: a max gauge nothing has been written to yet.
const UNSET_BITS: u64 = 0x7ff8_0000_0000_0000;

impl CounterFn for AtomicU64 {
    fn increment(&self, value: u64) {
        let _ = self.fetch_add(value, Ordering::Release);
    }

    fn count(&self) -> u64 {
        self.load(Ordering::Acquire)
    }
}

impl GaugeFn for AtomicU64 {
    fn set(&self, value: f64) {
        let _ = self.swap(value.to_bits(), Ordering::AcqRel);
    }

    fn value(&self) -> f64 {
        f64::from_bits(self.load(Ordering::Acquire))
    }
}

/// Atomic floating-point counter storage.
#[derive(Debug, Default)]
pub struct AtomicDoubleCounter(AtomicU64);

impl AtomicDoubleCounter {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DoubleCounterFn for AtomicDoubleCounter {
    fn add(&self, amount: f64) {
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            Some((f64::from_bits(bits) + amount).to_bits())
        });
    }

    fn count(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}

/// Atomic gauge storage keeping the largest value written.
///
/// Reads zero until the first write.  NaN writes are ignored.
#[derive(Debug)]
pub struct AtomicMaxGauge(AtomicU64);

impl AtomicMaxGauge {
    /// Creates a gauge nothing has been written to.
    pub fn new() -> Self {
        Self(AtomicU64::new(UNSET_BITS))
    }
}

impl Default for AtomicMaxGauge {
    fn default() -> Self {
        Self::new()
    }
}

impl GaugeFn for AtomicMaxGauge {
    fn set(&self, value: f64) {
        if value.is_nan() {
            return;
        }
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            let current = f64::from_bits(bits);
            (current.is_nan() || value > current).then(|| value.to_bits())
        });
    }

    fn value(&self) -> f64 {
        let value = f64::from_bits(self.0.load(Ordering::Acquire));
        if value.is_nan() {
            0.0
        } else {
            value
        }
    }
}

/// Atomic timer storage: count, total and maximum, in nanoseconds.
#[derive(Debug, Default)]
pub struct AtomicTimer {
    count: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl AtomicTimer {
    /// Creates an empty timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Longest recorded duration.
    pub fn max_time(&self) -> Duration {
        Duration::from_nanos(self.max_nanos.load(Ordering::Acquire))
    }
}

impl TimerFn for AtomicTimer {
    fn record(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        let _ = self.total_nanos.fetch_add(nanos, Ordering::AcqRel);
        let _ = self.max_nanos.fetch_max(nanos, Ordering::AcqRel);
        let _ = self.count.fetch_add(1, Ordering::Release);
    }

    fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    fn total_time(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Acquire))
    }
}

/// Atomic distribution summary storage: count, total and maximum.
#[derive(Debug, Default)]
pub struct AtomicDistributionSummary {
    count: AtomicU64,
    total: AtomicU64,
    max: AtomicU64,
}

impl AtomicDistributionSummary {
    /// Creates an empty distribution summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest recorded amount.
    pub fn max_amount(&self) -> u64 {
        self.max.load(Ordering::Acquire)
    }
}

impl DistributionSummaryFn for AtomicDistributionSummary {
    fn record(&self, amount: u64) {
        let _ = self.total.fetch_add(amount, Ordering::AcqRel);
        let _ = self.max.fetch_max(amount, Ordering::AcqRel);
        let _ = self.count.fetch_add(1, Ordering::Release);
    }

    fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    fn total_amount(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }
}
