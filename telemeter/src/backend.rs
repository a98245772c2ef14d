use crate::{Counter, DistributionSummary, DoubleCounter, Gauge, Id, Timer};

/// A metrics backend.
///
/// The backend owns the aggregate state of every metric.  Creation is idempotent: asking for the
/// same [`Id`] twice must return handles to the same underlying aggregate, so that a mutation made
/// through one handle is observed through the other.
///
/// Backends are shared between threads and must provide their own internal synchronization.
pub trait Backend: Send + Sync {
    /// Gets or creates a counter.
    fn counter(&self, id: &Id) -> Counter;

    /// Gets or creates a floating-point counter.
    fn double_counter(&self, id: &Id) -> DoubleCounter;

    /// Gets or creates a gauge.
    fn gauge(&self, id: &Id) -> Gauge;

    /// Gets or creates a gauge keeping the largest value written to it.
    ///
    /// Max gauges are distinct from gauges sharing their identity.
    fn max_gauge(&self, id: &Id) -> Gauge;

    /// Gets or creates a timer.
    fn timer(&self, id: &Id) -> Timer;

    /// Gets or creates a distribution summary.
    fn distribution_summary(&self, id: &Id) -> DistributionSummary;
}

// Blanket implementations.
macro_rules! impl_backend {
    ($inner_ty:ident, $ptr_ty:ty) => {
        impl<$inner_ty> $crate::Backend for $ptr_ty
        where
            $inner_ty: $crate::Backend + ?Sized,
        {
            fn counter(&self, id: &$crate::Id) -> $crate::Counter {
                std::ops::Deref::deref(self).counter(id)
            }

            fn double_counter(&self, id: &$crate::Id) -> $crate::DoubleCounter {
                std::ops::Deref::deref(self).double_counter(id)
            }

            fn gauge(&self, id: &$crate::Id) -> $crate::Gauge {
                std::ops::Deref::deref(self).gauge(id)
            }

            fn max_gauge(&self, id: &$crate::Id) -> $crate::Gauge {
                std::ops::Deref::deref(self).max_gauge(id)
            }

            fn timer(&self, id: &$crate::Id) -> $crate::Timer {
                std::ops::Deref::deref(self).timer(id)
            }

            fn distribution_summary(&self, id: &$crate::Id) -> $crate::DistributionSummary {
                std::ops::Deref::deref(self).distribution_summary(id)
            }
        }
    };
}

impl_backend!(T, &T);
impl_backend!(T, std::boxed::Box<T>);
impl_backend!(T, std::sync::Arc<T>);

/// A no-op backend that hands out no-op handles.
///
/// Used by libraries that are instrumented but have not been given a real backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopBackend;

impl Backend for NoopBackend {
    fn counter(&self, _id: &Id) -> Counter {
        Counter::noop()
    }

    fn double_counter(&self, _id: &Id) -> DoubleCounter {
        DoubleCounter::noop()
    }

    fn gauge(&self, _id: &Id) -> Gauge {
        Gauge::noop()
    }

    fn max_gauge(&self, _id: &Id) -> Gauge {
        Gauge::noop()
    }

    fn timer(&self, _id: &Id) -> Timer {
        Timer::noop()
    }

    fn distribution_summary(&self, _id: &Id) -> DistributionSummary {
        DistributionSummary::noop()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Backend, NoopBackend};
    use crate::{test_util::TestBackend, Id, Tags};

    #[test]
    fn blanket_impls_delegate() {
        let backend = Arc::new(TestBackend::default());
        let id = Id::new("requests", Tags::new());

        let boxed: Box<dyn Backend> = Box::new(Arc::clone(&backend));
        boxed.counter(&id).increment();
        (&*backend).counter(&id).increment();

        assert_eq!(backend.counter(&id).count(), 2);
    }

    #[test]
    fn noop() {
        let id = Id::new("requests", Tags::new());
        let counter = NoopBackend.counter(&id);
        counter.increment();
        assert_eq!(counter.count(), 0);
    }
}
