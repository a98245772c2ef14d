use std::{future::Future, sync::Arc, time::Duration};

/// A counter handler.
pub trait CounterFn: Send + Sync {
    /// Increments the counter by the given amount.
    fn increment(&self, value: u64);

    /// Current count.
    fn count(&self) -> u64;
}

/// A floating-point counter handler.
pub trait DoubleCounterFn: Send + Sync {
    /// Adds the given amount to the counter.
    fn add(&self, amount: f64);

    /// Current count.
    fn count(&self) -> f64;
}

/// A gauge handler.
///
/// Gauges are last-value-wins: there is no aggregation across writes.  Handlers backing a max
/// gauge instead keep the largest value written.
pub trait GaugeFn: Send + Sync {
    /// Sets the gauge to the given value.
    fn set(&self, value: f64);

    /// Last value written.
    fn value(&self) -> f64;
}

/// A timer handler.
pub trait TimerFn: Send + Sync {
    /// Records a duration.
    fn record(&self, duration: Duration);

    /// Number of recorded durations.
    fn count(&self) -> u64;

    /// Sum of all recorded durations.
    fn total_time(&self) -> Duration;
}

/// A distribution summary handler.
pub trait DistributionSummaryFn: Send + Sync {
    /// Records an amount.
    fn record(&self, amount: u64);

    /// Number of recorded amounts.
    fn count(&self) -> u64;

    /// Sum of all recorded amounts.
    fn total_amount(&self) -> u64;
}

/// A counter.
#[derive(Clone)]
pub struct Counter {
    inner: Option<Arc<dyn CounterFn>>,
}

/// A counter accepting fractional amounts.
#[derive(Clone)]
pub struct DoubleCounter {
    inner: Option<Arc<dyn DoubleCounterFn>>,
}

/// A gauge.
#[derive(Clone)]
pub struct Gauge {
    inner: Option<Arc<dyn GaugeFn>>,
}

/// A timer.
#[derive(Clone)]
pub struct Timer {
    inner: Option<Arc<dyn TimerFn>>,
}

/// A distribution summary.
#[derive(Clone)]
pub struct DistributionSummary {
    inner: Option<Arc<dyn DistributionSummaryFn>>,
}

impl Counter {
    /// Creates a no-op `Counter` which does nothing.
    ///
    /// Suitable when a handle must be provided that does nothing i.e. a no-op backend.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Creates a `Counter` based on a shared handler.
    pub fn from_arc<F: CounterFn + 'static>(a: Arc<F>) -> Self {
        Self { inner: Some(a) }
    }

    /// Increments the counter by one.
    pub fn increment(&self) {
        self.add(1);
    }

    /// Increments the counter by the given amount.
    pub fn add(&self, amount: u64) {
        if let Some(ref inner) = self.inner {
            inner.increment(amount);
        }
    }

    /// Current count.
    pub fn count(&self) -> u64 {
        self.inner.as_ref().map_or(0, |inner| inner.count())
    }
}

impl DoubleCounter {
    /// Creates a no-op `DoubleCounter` which does nothing.
    ///
    /// Suitable when a handle must be provided that does nothing i.e. a no-op backend.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Creates a `DoubleCounter` based on a shared handler.
    pub fn from_arc<F: DoubleCounterFn + 'static>(a: Arc<F>) -> Self {
        Self { inner: Some(a) }
    }

    /// Increments the counter by one.
    pub fn increment(&self) {
        self.add(1.0);
    }

    /// Adds `amount` to the counter.
    ///
    /// Counters only go up: negative, NaN and infinite amounts are ignored.
    pub fn add(&self, amount: f64) {
        if !(amount.is_finite() && amount > 0.0) {
            return;
        }
        if let Some(ref inner) = self.inner {
            inner.add(amount);
        }
    }

    /// Current count.
    pub fn count(&self) -> f64 {
        self.inner.as_ref().map_or(0.0, |inner| inner.count())
    }
}

impl Gauge {
    /// Creates a no-op `Gauge` which does nothing.
    ///
    /// Suitable when a handle must be provided that does nothing i.e. a no-op backend.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Creates a `Gauge` based on a shared handler.
    pub fn from_arc<F: GaugeFn + 'static>(a: Arc<F>) -> Self {
        Self { inner: Some(a) }
    }

    /// Sets the gauge.
    pub fn set(&self, value: f64) {
        if let Some(ref inner) = self.inner {
            inner.set(value);
        }
    }

    /// Last value written to the gauge.
    pub fn value(&self) -> f64 {
        self.inner.as_ref().map_or(0.0, |inner| inner.value())
    }
}

impl Timer {
    /// Creates a no-op `Timer` which does nothing.
    ///
    /// Suitable when a handle must be provided that does nothing i.e. a no-op backend.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Creates a `Timer` based on a shared handler.
    pub fn from_arc<F: TimerFn + 'static>(a: Arc<F>) -> Self {
        Self { inner: Some(a) }
    }

    /// Records a duration.
    pub fn record(&self, duration: Duration) {
        if let Some(ref inner) = self.inner {
            inner.record(duration);
        }
    }

    /// Runs `f`, recording how long it took.
    pub fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = quanta::Instant::now();
        let result = f();
        self.record(start.elapsed());
        result
    }

    /// Awaits `future`, recording how long it took from its first poll until it completed.
    pub async fn time_async<F>(&self, future: F) -> F::Output
    where
        F: Future,
    {
        let start = quanta::Instant::now();
        let output = future.await;
        self.record(start.elapsed());
        output
    }

    /// Number of recorded durations.
    pub fn count(&self) -> u64 {
        self.inner.as_ref().map_or(0, |inner| inner.count())
    }

    /// Sum of all recorded durations.
    pub fn total_time(&self) -> Duration {
        self.inner.as_ref().map_or(Duration::ZERO, |inner| inner.total_time())
    }
}

impl DistributionSummary {
    /// Creates a no-op `DistributionSummary` which does nothing.
    ///
    /// Suitable when a handle must be provided that does nothing i.e. a no-op backend.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Creates a `DistributionSummary` based on a shared handler.
    pub fn from_arc<F: DistributionSummaryFn + 'static>(a: Arc<F>) -> Self {
        Self { inner: Some(a) }
    }

    /// Records an amount.
    pub fn record(&self, amount: u64) {
        if let Some(ref inner) = self.inner {
            inner.record(amount);
        }
    }

    /// Number of recorded amounts.
    pub fn count(&self) -> u64 {
        self.inner.as_ref().map_or(0, |inner| inner.count())
    }

    /// Sum of all recorded amounts.
    pub fn total_amount(&self) -> u64 {
        self.inner.as_ref().map_or(0, |inner| inner.total_amount())
    }
}

impl<T> CounterFn for Arc<T>
where
    T: CounterFn,
{
    fn increment(&self, value: u64) {
        (**self).increment(value);
    }

    fn count(&self) -> u64 {
        (**self).count()
    }
}

impl<T> DoubleCounterFn for Arc<T>
where
    T: DoubleCounterFn,
{
    fn add(&self, amount: f64) {
        (**self).add(amount);
    }

    fn count(&self) -> f64 {
        (**self).count()
    }
}

impl<T> GaugeFn for Arc<T>
where
    T: GaugeFn,
{
    fn set(&self, value: f64) {
        (**self).set(value);
    }

    fn value(&self) -> f64 {
        (**self).value()
    }
}

impl<T> TimerFn for Arc<T>
where
    T: TimerFn,
{
    fn record(&self, duration: Duration) {
        (**self).record(duration);
    }

    fn count(&self) -> u64 {
        (**self).count()
    }

    fn total_time(&self) -> Duration {
        (**self).total_time()
    }
}

impl<T> DistributionSummaryFn for Arc<T>
where
    T: DistributionSummaryFn,
{
    fn record(&self, amount: u64) {
        (**self).record(amount);
    }

    fn count(&self) -> u64 {
        (**self).count()
    }

    fn total_amount(&self) -> u64 {
        (**self).total_amount()
    }
}

impl<T> From<Arc<T>> for Counter
where
    T: CounterFn + 'static,
{
    fn from(inner: Arc<T>) -> Self {
        Counter::from_arc(inner)
    }
}

impl<T> From<Arc<T>> for DoubleCounter
where
    T: DoubleCounterFn + 'static,
{
    fn from(inner: Arc<T>) -> Self {
        DoubleCounter::from_arc(inner)
    }
}

impl<T> From<Arc<T>> for Gauge
where
    T: GaugeFn + 'static,
{
    fn from(inner: Arc<T>) -> Self {
        Gauge::from_arc(inner)
    }
}

impl<T> From<Arc<T>> for Timer
where
    T: TimerFn + 'static,
{
    fn from(inner: Arc<T>) -> Self {
        Timer::from_arc(inner)
    }
}

impl<T> From<Arc<T>> for DistributionSummary
where
    T: DistributionSummaryFn + 'static,
{
    fn from(inner: Arc<T>) -> Self {
        DistributionSummary::from_arc(inner)
    }
}
