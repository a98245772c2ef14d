use std::{sync::Arc, time::Duration};

use once_cell::sync::OnceCell;

use crate::{
    bucket::duration_nanos, Backend, BucketFunction, Counter, DistributionSummary, Id, Timer,
};

/// Tag key carrying the bucket label.
pub const BUCKET_TAG: &str = "bucket";

/// Lazily resolves one backend metric per bucket.
struct BucketMeter<H> {
    backend: Arc<dyn Backend>,
    id: Id,
    function: BucketFunction,
    handles: Box<[OnceCell<H>]>,
    create: fn(&dyn Backend, &Id) -> H,
}

impl<H> BucketMeter<H> {
    fn new(
        backend: Arc<dyn Backend>,
        id: Id,
        function: BucketFunction,
        create: fn(&dyn Backend, &Id) -> H,
    ) -> Self {
        let handles = (0..function.len()).map(|_| OnceCell::new()).collect();
        Self { backend, id, function, handles, create }
    }

    fn handle(&self, value: u64) -> &H {
        let index = self.function.index(value);
        self.handles[index].get_or_init(|| {
            let id = self.id.with_tag(BUCKET_TAG, self.function.label_at(index));
            (self.create)(&*self.backend, &id)
        })
    }
}

/// A counter fanned out into buckets.
///
/// Each recorded value increments, by one, the counter tagged with the value's bucket.
#[derive(Clone)]
pub struct BucketCounter {
    inner: Arc<BucketMeter<Counter>>,
}

impl BucketCounter {
    pub(crate) fn new(backend: Arc<dyn Backend>, id: Id, function: BucketFunction) -> Self {
        let inner = BucketMeter::new(backend, id, function, |backend, id| backend.counter(id));
        Self { inner: Arc::new(inner) }
    }

    /// Counts one occurrence of `value`.
    pub fn record(&self, value: u64) {
        self.inner.handle(value).increment();
    }

    /// Identity shared by every bucket, without the bucket tag.
    pub fn id(&self) -> &Id {
        &self.inner.id
    }
}

/// A timer fanned out into latency buckets.
#[derive(Clone)]
pub struct BucketTimer {
    inner: Arc<BucketMeter<Timer>>,
}

impl BucketTimer {
    pub(crate) fn new(backend: Arc<dyn Backend>, id: Id, function: BucketFunction) -> Self {
        let inner = BucketMeter::new(backend, id, function, |backend, id| backend.timer(id));
        Self { inner: Arc::new(inner) }
    }

    /// Records `duration` into the timer for its bucket.
    pub fn record(&self, duration: Duration) {
        self.inner.handle(duration_nanos(duration)).record(duration);
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

    /// Identity shared by every bucket, without the bucket tag.
    pub fn id(&self) -> &Id {
        &self.inner.id
    }
}

/// A distribution summary fanned out into buckets.
#[derive(Clone)]
pub struct BucketDistributionSummary {
    inner: Arc<BucketMeter<DistributionSummary>>,
}

impl BucketDistributionSummary {
    pub(crate) fn new(backend: Arc<dyn Backend>, id: Id, function: BucketFunction) -> Self {
        let inner =
            BucketMeter::new(backend, id, function, |backend, id| backend.distribution_summary(id));
        Self { inner: Arc::new(inner) }
    }

    /// Records `amount` into the summary for its bucket.
    pub fn record(&self, amount: u64) {
        self.inner.handle(amount).record(amount);
    }

    /// Identity shared by every bucket, without the bucket tag.
    pub fn id(&self) -> &Id {
        &self.inner.id
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{test_util::TestBackend, Tags};

    fn backend() -> (Arc<TestBackend>, Arc<dyn Backend>) {
        let backend = Arc::new(TestBackend::default());
        let shared: Arc<dyn Backend> = backend.clone();
        (backend, shared)
    }

    #[test]
    fn counter_counts_per_bucket() {
        let (backend, shared) = backend();
        let id = Id::new("payload.size", [("app", "web")]);
        let counter = BucketCounter::new(shared, id, BucketFunction::bytes(1024));

        counter.record(1000);
        counter.record(212);
        counter.record(250);

        let large = Id::new("payload.size", [("app", "web"), ("bucket", "1024_B")]);
        let small = Id::new("payload.size", [("app", "web"), ("bucket", "0256_B")]);
        assert_eq!(backend.counter(&large).count(), 1);
        assert_eq!(backend.counter(&small).count(), 2);
        assert_eq!(backend.counter_ids().len(), 2);
    }

    #[test]
    fn timer_forwards_duration() {
        let (backend, shared) = backend();
        let function = BucketFunction::latency(Duration::from_secs(3));
        let timer = BucketTimer::new(shared, Id::new("request.latency", Tags::new()), function);

        timer.record(Duration::from_secs(1));
        timer.record(Duration::new(1, 200_000));
        timer.record(Duration::from_nanos(212_000));

        let slow = backend.timer(&Id::new("request.latency", [("bucket", "1500ms")]));
        assert_eq!(slow.count(), 2);
        assert_eq!(slow.total_time(), Duration::new(2, 200_000));

        let fast = backend.timer(&Id::new("request.latency", [("bucket", "0375ms")]));
        assert_eq!(fast.count(), 1);
    }

    #[test]
    fn distribution_summary_forwards_amount() {
        let (backend, shared) = backend();
        let function = BucketFunction::decimal(20_000);
        let summary = BucketDistributionSummary::new(shared, Id::new("rows", Tags::new()), function);

        summary.record(15_761);
        summary.record(20_001);

        let in_range = backend.distribution_summary(&Id::new("rows", [("bucket", "20_k")]));
        assert_eq!(in_range.total_amount(), 15_761);

        let large = backend.distribution_summary(&Id::new("rows", [("bucket", "large")]));
        assert_eq!(large.total_amount(), 20_001);
    }

    #[test]
    fn bucket_tag_overrides_caller_tag() {
        let (backend, shared) = backend();
        let id = Id::new("m", [("bucket", "caller")]);
        let counter = BucketCounter::new(shared, id, BucketFunction::decimal(10));
        counter.record(5);

        assert_eq!(backend.counter(&Id::new("m", [("bucket", "10")])).count(), 1);
    }
}
