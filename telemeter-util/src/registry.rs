//! Sharded metric storage.
use std::{
    hash::BuildHasher,
    sync::{PoisonError, RwLock},
    thread,
};

use hashbrown::{hash_map::RawEntryMut, DefaultHashBuilder, HashMap};
use telemeter::Id;

use crate::{AtomicStorage, Storage};

type RegistryHashMap<V> = HashMap<Id, V, DefaultHashBuilder>;

/// One map per shard, all sharing the registry's hasher so precomputed hashes stay valid.
struct Shards<V> {
    shards: Vec<RwLock<RegistryHashMap<V>>>,
    shard_mask: usize,
}

impl<V> Shards<V> {
    fn new(shard_count: usize, hasher: &DefaultHashBuilder) -> Self {
        let shards = (0..shard_count)
            .map(|_| RwLock::new(RegistryHashMap::with_hasher(hasher.clone())))
            .collect();

        Self { shards, shard_mask: shard_count - 1 }
    }

    #[inline]
    fn shard(&self, hash: u64) -> &RwLock<RegistryHashMap<V>> {
        // The shard count is a power of two, so masking always yields a valid index.
        &self.shards[hash as usize & self.shard_mask]
    }

    fn get_or_create<C, O, R>(&self, hash: u64, id: &Id, create: C, op: O) -> R
    where
        C: FnOnce(&Id) -> V,
        O: FnOnce(&V) -> R,
    {
        let shard = self.shard(hash);

        // Try and get the handle if it exists, running our operation if we succeed.
        let shard_read = shard.read().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, v)) = shard_read.raw_entry().from_key_hashed_nocheck(hash, id) {
            return op(v);
        }
        drop(shard_read);

        // Switch to write guard and insert the handle first.
        let mut shard_write = shard.write().unwrap_or_else(PoisonError::into_inner);
        let (_, v) = shard_write
            .raw_entry_mut()
            .from_key_hashed_nocheck(hash, id)
            .or_insert_with(|| (id.clone(), create(id)));
        op(v)
    }

    fn delete(&self, hash: u64, id: &Id) -> bool {
        let mut shard_write = self.shard(hash).write().unwrap_or_else(PoisonError::into_inner);
        match shard_write.raw_entry_mut().from_key_hashed_nocheck(hash, id) {
            RawEntryMut::Occupied(entry) => {
                let _ = entry.remove_entry();
                true
            }
            RawEntryMut::Vacant(_) => false,
        }
    }

    fn visit<F>(&self, mut collect: F)
    where
        F: FnMut(&Id, &V),
    {
        for subshard in &self.shards {
            let shard_read = subshard.read().unwrap_or_else(PoisonError::into_inner);
            for (id, value) in shard_read.iter() {
                collect(id, value);
            }
        }
    }

    fn clear(&self) {
        for shard in &self.shards {
            shard.write().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }

    fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }
}

/// A metric registry.
///
/// `Registry` maintains a central listing of metrics mapped by [`Id`], with the metrics themselves
/// stored in the objects returned by `S`.  Asking for the same identity twice returns the same
/// storage, which is what makes backend creation idempotent.
///
/// ## Performance
///
/// `Registry` is optimized for reads: each metric kind is split into shards, each behind its own
/// read/write lock, and a write lock is only taken the first time an identity is seen.
pub struct Registry<S = AtomicStorage>
where
    S: Storage<Id>,
{
    counters: Shards<S::Counter>,
    gauges: Shards<S::Gauge>,
    timers: Shards<S::Timer>,
    distribution_summaries: Shards<S::DistributionSummary>,
    double_counters: Shards<S::DoubleCounter>,
    max_gauges: Shards<S::MaxGauge>,
    hasher: DefaultHashBuilder,
    storage: S,
}

impl Registry<AtomicStorage> {
    /// Creates a new `Registry` using atomic storage.
    pub fn atomic() -> Self {
        Self::new(AtomicStorage)
    }
}

impl<S> Registry<S>
where
    S: Storage<Id>,
{
    /// Creates a new `Registry`.
    pub fn new(storage: S) -> Self {
        let parallelism = thread::available_parallelism().map_or(1, |n| n.get());
        let shard_count = parallelism.next_power_of_two();
        let hasher = DefaultHashBuilder::default();

        Self {
            counters: Shards::new(shard_count, &hasher),
            gauges: Shards::new(shard_count, &hasher),
            timers: Shards::new(shard_count, &hasher),
            distribution_summaries: Shards::new(shard_count, &hasher),
            double_counters: Shards::new(shard_count, &hasher),
            max_gauges: Shards::new(shard_count, &hasher),
            hasher,
            storage,
        }
    }

    #[inline]
    fn hash(&self, id: &Id) -> u64 {
        self.hasher.hash_one(id)
    }

    /// Gets or creates the counter for `id`, then runs `op` on it.
    pub fn get_or_create_counter<O, V>(&self, id: &Id, op: O) -> V
    where
        O: FnOnce(&S::Counter) -> V,
    {
        self.counters.get_or_create(self.hash(id), id, |id| self.storage.counter(id), op)
    }

    /// Gets or creates the gauge for `id`, then runs `op` on it.
    pub fn get_or_create_gauge<O, V>(&self, id: &Id, op: O) -> V
    where
        O: FnOnce(&S::Gauge) -> V,
    {
        self.gauges.get_or_create(self.hash(id), id, |id| self.storage.gauge(id), op)
    }

    /// Gets or creates the timer for `id`, then runs `op` on it.
    pub fn get_or_create_timer<O, V>(&self, id: &Id, op: O) -> V
    where
        O: FnOnce(&S::Timer) -> V,
    {
        self.timers.get_or_create(self.hash(id), id, |id| self.storage.timer(id), op)
    }

    /// Gets or creates the distribution summary for `id`, then runs `op` on it.
    pub fn get_or_create_distribution_summary<O, V>(&self, id: &Id, op: O) -> V
    where
        O: FnOnce(&S::DistributionSummary) -> V,
    {
        self.distribution_summaries.get_or_create(
            self.hash(id),
            id,
            |id| self.storage.distribution_summary(id),
            op,
        )
    }

    /// Gets or creates the floating-point counter for `id`, then runs `op` on it.
    pub fn get_or_create_double_counter<O, V>(&self, id: &Id, op: O) -> V
    where
        O: FnOnce(&S::DoubleCounter) -> V,
    {
        self.double_counters.get_or_create(
            self.hash(id),
            id,
            |id| self.storage.double_counter(id),
            op,
        )
    }

    /// Gets or creates the max gauge for `id`, then runs `op` on it.
    pub fn get_or_create_max_gauge<O, V>(&self, id: &Id, op: O) -> V
    where
        O: FnOnce(&S::MaxGauge) -> V,
    {
        self.max_gauges.get_or_create(self.hash(id), id, |id| self.storage.max_gauge(id), op)
    }

    /// Deletes a counter from the registry.
    ///
    /// Returns `true` if the counter existed and was removed, `false` otherwise.
    pub fn delete_counter(&self, id: &Id) -> bool {
        self.counters.delete(self.hash(id), id)
    }

    /// Deletes a gauge from the registry.
    ///
    /// Returns `true` if the gauge existed and was removed, `false` otherwise.
    pub fn delete_gauge(&self, id: &Id) -> bool {
        self.gauges.delete(self.hash(id), id)
    }

    /// Deletes a timer from the registry.
    ///
    /// Returns `true` if the timer existed and was removed, `false` otherwise.
    pub fn delete_timer(&self, id: &Id) -> bool {
        self.timers.delete(self.hash(id), id)
    }

    /// Deletes a distribution summary from the registry.
    ///
    /// Returns `true` if the distribution summary existed and was removed, `false` otherwise.
    pub fn delete_distribution_summary(&self, id: &Id) -> bool {
        self.distribution_summaries.delete(self.hash(id), id)
    }

    /// Deletes a floating-point counter from the registry.
    ///
    /// Returns `true` if the counter existed and was removed, `false` otherwise.
    pub fn delete_double_counter(&self, id: &Id) -> bool {
        self.double_counters.delete(self.hash(id), id)
    }

    /// Deletes a max gauge from the registry.
    ///
    /// Returns `true` if the gauge existed and was removed, `false` otherwise.
    pub fn delete_max_gauge(&self, id: &Id) -> bool {
        self.max_gauges.delete(self.hash(id), id)
    }

    /// Visits every counter stored in this registry.
    ///
    /// This operation does not lock the entire registry, but proceeds directly through the
    /// "subshards" that are kept internally.  As a result, all subshards will be visited, but a
    /// metric that existed at the exact moment that `visit_counters` was called may not actually be
    /// observed if it is deleted before that subshard is reached.  Likewise, a metric that is added
    /// after the call to `visit_counters`, but before `visit_counters` finishes, may also not be
    /// observed.
    pub fn visit_counters<F>(&self, collect: F)
    where
        F: FnMut(&Id, &S::Counter),
    {
        self.counters.visit(collect);
    }

    /// Visits every gauge stored in this registry.
    ///
    /// Same consistency as [`visit_counters`](Registry::visit_counters).
    pub fn visit_gauges<F>(&self, collect: F)
    where
        F: FnMut(&Id, &S::Gauge),
    {
        self.gauges.visit(collect);
    }

    /// Visits every timer stored in this registry.
    ///
    /// Same consistency as [`visit_counters`](Registry::visit_counters).
    pub fn visit_timers<F>(&self, collect: F)
    where
        F: FnMut(&Id, &S::Timer),
    {
        self.timers.visit(collect);
    }

    /// Visits every distribution summary stored in this registry.
    ///
    /// Same consistency as [`visit_counters`](Registry::visit_counters).
    pub fn visit_distribution_summaries<F>(&self, collect: F)
    where
        F: FnMut(&Id, &S::DistributionSummary),
    {
        self.distribution_summaries.visit(collect);
    }

    /// Visits every floating-point counter stored in this registry.
    ///
    /// Same consistency as [`visit_counters`](Registry::visit_counters).
    pub fn visit_double_counters<F>(&self, collect: F)
    where
        F: FnMut(&Id, &S::DoubleCounter),
    {
        self.double_counters.visit(collect);
    }

    /// Visits every max gauge stored in this registry.
    ///
    /// Same consistency as [`visit_counters`](Registry::visit_counters).
    pub fn visit_max_gauges<F>(&self, collect: F)
    where
        F: FnMut(&Id, &S::MaxGauge),
    {
        self.max_gauges.visit(collect);
    }

    /// Removes all metrics from the registry.
    ///
    /// This operation is eventually consistent: metrics will be removed piecemeal, and this method
    /// does not ensure that callers will see the registry as entirely empty at any given point.
    pub fn clear(&self) {
        self.counters.clear();
        self.gauges.clear();
        self.timers.clear();
        self.distribution_summaries.clear();
        self.double_counters.clear();
        self.max_gauges.clear();
    }

    /// Number of metrics, of every kind, currently stored.
    pub fn len(&self) -> usize {
        self.counters.len()
            + self.gauges.len()
            + self.timers.len()
            + self.distribution_summaries.len()
            + self.double_counters.len()
            + self.max_gauges.len()
    }

    /// Returns `true` if no metrics are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use telemeter::{CounterFn, DoubleCounterFn, GaugeFn, Id, Tags, TimerFn};

    use super::Registry;

    #[test]
    fn get_or_create_is_idempotent() {
        let registry = Registry::atomic();
        let id = Id::new("requests", [("status", "200")]);

        let first = registry.get_or_create_counter(&id, Arc::clone);
        let second = registry.get_or_create_counter(&id, Arc::clone);
        first.increment(1);
        second.increment(2);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.count(), 3);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn kinds_are_distinct() {
        let registry = Registry::atomic();
        let id = Id::new("shared", Tags::new());

        registry.get_or_create_counter(&id, |c| c.increment(5));
        registry.get_or_create_gauge(&id, |g| g.set(1.5));
        registry.get_or_create_timer(&id, |t| t.record(Duration::from_millis(10)));
        registry.get_or_create_double_counter(&id, |c| c.add(0.5));
        registry.get_or_create_max_gauge(&id, |g| g.set(0.5));

        assert_eq!(registry.get_or_create_counter(&id, |c| c.count()), 5);
        assert_eq!(registry.get_or_create_gauge(&id, |g| g.value()), 1.5);
        assert_eq!(registry.get_or_create_timer(&id, |t| t.count()), 1);
        assert_eq!(registry.get_or_create_double_counter(&id, |c| c.count()), 0.5);
        assert_eq!(registry.get_or_create_max_gauge(&id, |g| g.value()), 0.5);
        assert_eq!(registry.len(), 5);

        assert!(registry.delete_max_gauge(&id));
        assert!(!registry.delete_double_counter(&Id::new("missing", Tags::new())));
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn delete_and_clear() {
        let registry = Registry::atomic();
        let a = Id::new("a", Tags::new());
        let b = Id::new("b", Tags::new());

        registry.get_or_create_gauge(&a, |_| ());
        registry.get_or_create_gauge(&b, |_| ());
        assert!(registry.delete_gauge(&a));
        assert!(!registry.delete_gauge(&a));

        let mut seen = Vec::new();
        registry.visit_gauges(|id, _| seen.push(id.clone()));
        assert_eq!(seen, vec![b]);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_creation_converges() {
        let registry = Arc::new(Registry::atomic());

        let handles = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..100 {
                        let id = Id::new("hits", [("shard", format!("{}", i % 10))]);
                        registry.get_or_create_counter(&id, |c| c.increment(1));
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut total = 0;
        registry.visit_counters(|_, c| total += c.count());
        assert_eq!(total, 800);
        assert_eq!(registry.len(), 10);
    }
}
