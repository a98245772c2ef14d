use telemeter::Id;

/// Metric kind.
///
/// Defines the kind, or type, of a metric.  Follows the metric types of `telemeter`:
/// - counters
/// - gauges
/// - timers
/// - distribution summaries
/// - floating-point counters
/// - max gauges
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum MetricKind {
    /// Counter type.
    Counter,
    /// Gauge type.
    Gauge,
    /// Timer type.
    Timer,
    /// Distribution summary type.
    DistributionSummary,
    /// Floating-point counter type.
    DoubleCounter,
    /// Max gauge type.
    MaxGauge,
}

/// A metric identity paired with its kind.
///
/// The same [`Id`] may be used by metrics of different kinds, and these are distinct metrics.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct CompositeKey(MetricKind, Id);

impl CompositeKey {
    /// Creates a new `CompositeKey`.
    pub const fn new(kind: MetricKind, id: Id) -> CompositeKey {
        CompositeKey(kind, id)
    }

    /// Gets the inner kind.
    pub fn kind(&self) -> MetricKind {
        self.0
    }

    /// Gets the inner identity.
    pub fn id(&self) -> &Id {
        &self.1
    }

    /// Takes the individual pieces of this `CompositeKey`.
    pub fn into_parts(self) -> (MetricKind, Id) {
        (self.0, self.1)
    }
}
