use std::{fmt, io, sync::Arc, time::Duration};

use tracing::debug;

use crate::{
    age::AgeGauge,
    long_task::{LongTaskTimer, STATISTIC_TAG},
    clock::WallClock,
    scheduler::Scheduler,
    settings::Settings,
    validation::{validate, ValidationError, ValidationIssue},
    Backend, BucketCounter, BucketDistributionSummary, BucketFunction, BucketTimer, Counter,
    DistributionSummary, DoubleCounter, Error, Gauge, Id, Tags, TelemeterBuilder, Timer,
};

/// The instrumentation facade.
///
/// A `Telemeter` validates metric identities, merges its scope tags into them and hands creation
/// off to a [`Backend`].  Clones and scopes share the same backend and settings, so toggling strict
/// mode on one is seen by all of them.
#[derive(Clone)]
pub struct Telemeter {
    backend: Arc<dyn Backend>,
    settings: Arc<Settings>,
    common_tags: Tags,
}

impl Telemeter {
    /// Creates a facade over `backend` with default settings.
    pub fn new<B>(backend: B) -> Self
    where
        B: Backend + 'static,
    {
        TelemeterBuilder::new().build(backend)
    }

    /// Creates a [`TelemeterBuilder`].
    pub fn builder() -> TelemeterBuilder {
        TelemeterBuilder::new()
    }

    pub(crate) fn from_parts(
        backend: Arc<dyn Backend>,
        settings: Arc<Settings>,
        common_tags: Tags,
    ) -> Self {
        Self { backend, settings, common_tags }
    }

    /// Returns a facade whose metrics carry `tags` in addition to this facade's own.
    ///
    /// Tags passed when creating a metric win over scope tags, and a nested scope's tags win over
    /// its parent's.
    #[must_use]
    pub fn scope<T>(&self, tags: T) -> Self
    where
        T: Into<Tags>,
    {
        Self {
            backend: Arc::clone(&self.backend),
            settings: Arc::clone(&self.settings),
            common_tags: self.common_tags.merged(&tags.into()),
        }
    }

    /// Tags merged into every metric created through this facade.
    pub fn common_tags(&self) -> &Tags {
        &self.common_tags
    }

    /// Enables or disables strict mode for this facade, its clones and its scopes.
    pub fn set_strict_mode(&self, strict: bool) {
        if self.settings.strict() != strict {
            debug!(strict, "toggled strict mode");
        }
        self.settings.set_strict(strict);
    }

    /// Returns `true` if strict mode is enabled.
    pub fn strict_mode(&self) -> bool {
        self.settings.strict()
    }

    /// Sets how often age gauges created from now on recompute their value.
    pub fn set_age_update_interval(&self, interval: Duration) {
        self.settings.set_age_update_interval(interval);
    }

    /// How often newly created age gauges recompute their value.
    pub fn age_update_interval(&self) -> Duration {
        self.settings.age_update_interval()
    }

    /// The wall clock used for timestamps.
    pub fn wall_clock(&self) -> &WallClock {
        self.settings.clock()
    }

    /// The backend metrics are created in.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Resolves the scheduler recurring work is spawned onto: the configured runtime, else the
    /// background runtime.
    pub fn scheduler(&self) -> io::Result<Scheduler> {
        self.settings.scheduler()
    }

    /// Resolves a scheduler for work that observes the caller's runtime: the configured runtime,
    /// else the current one, else the background runtime.
    ///
    /// Work spawned onto the current runtime stops when it shuts down.
    pub fn current_scheduler(&self) -> io::Result<Scheduler> {
        self.settings.current_scheduler()
    }

    /// Validates a name and tags, after merging in scope tags, returning every issue found.
    ///
    /// This never fails and ignores strict mode; it exists for tooling and tests.
    pub fn validate_name_and_tags<T>(&self, name: &str, tags: T) -> Vec<ValidationIssue>
    where
        T: Into<Tags>,
    {
        validate(name, &self.common_tags.merged(&tags.into()))
    }

    fn id<T>(&self, name: &str, tags: T) -> Result<Id, ValidationError>
    where
        T: Into<Tags>,
    {
        let tags = self.common_tags.merged(&tags.into());
        self.settings.check(name, &tags)?;
        Ok(Id::new(name, tags))
    }

    /// Gets or creates a counter.
    ///
    /// # Errors
    ///
    /// Fails only in strict mode, when the name or tags are malformed.
    pub fn counter<T>(&self, name: &str, tags: T) -> Result<Counter, ValidationError>
    where
        T: Into<Tags>,
    {
        let id = self.id(name, tags)?;
        Ok(self.backend.counter(&id))
    }

    /// Gets or creates a gauge.
    ///
    /// # Errors
    ///
    /// Fails only in strict mode, when the name or tags are malformed.
    pub fn gauge<T>(&self, name: &str, tags: T) -> Result<Gauge, ValidationError>
    where
        T: Into<Tags>,
    {
        let id = self.id(name, tags)?;
        Ok(self.backend.gauge(&id))
    }

    /// Gets or creates a counter accepting fractional amounts.
    ///
    /// # Errors
    ///
    /// Fails only in strict mode, when the name or tags are malformed.
    pub fn double_counter<T>(&self, name: &str, tags: T) -> Result<DoubleCounter, ValidationError>
    where
        T: Into<Tags>,
    {
        let id = self.id(name, tags)?;
        Ok(self.backend.double_counter(&id))
    }

    /// Gets or creates a gauge keeping the largest value written to it.
    ///
    /// # Errors
    ///
    /// Fails only in strict mode, when the name or tags are malformed.
    pub fn max_gauge<T>(&self, name: &str, tags: T) -> Result<Gauge, ValidationError>
    where
        T: Into<Tags>,
    {
        let id = self.id(name, tags)?;
        Ok(self.backend.max_gauge(&id))
    }

    /// Gets or creates a timer.
    ///
    /// # Errors
    ///
    /// Fails only in strict mode, when the name or tags are malformed.
    pub fn timer<T>(&self, name: &str, tags: T) -> Result<Timer, ValidationError>
    where
        T: Into<Tags>,
    {
        let id = self.id(name, tags)?;
        Ok(self.backend.timer(&id))
    }

    /// Gets or creates a distribution summary.
    ///
    /// # Errors
    ///
    /// Fails only in strict mode, when the name or tags are malformed.
    pub fn distribution_summary<T>(
        &self,
        name: &str,
        tags: T,
    ) -> Result<DistributionSummary, ValidationError>
    where
        T: Into<Tags>,
    {
        let id = self.id(name, tags)?;
        Ok(self.backend.distribution_summary(&id))
    }

    /// Creates a counter fanned out by `function`.
    ///
    /// # Errors
    ///
    /// Fails only in strict mode, when the name or tags are malformed.
    pub fn bucket_counter<T>(
        &self,
        name: &str,
        tags: T,
        function: BucketFunction,
    ) -> Result<BucketCounter, ValidationError>
    where
        T: Into<Tags>,
    {
        let id = self.id(name, tags)?;
        Ok(BucketCounter::new(Arc::clone(&self.backend), id, function))
    }

    /// Creates a timer fanned out by `function`.
    ///
    /// # Errors
    ///
    /// Fails only in strict mode, when the name or tags are malformed.
    pub fn bucket_timer<T>(
        &self,
        name: &str,
        tags: T,
        function: BucketFunction,
    ) -> Result<BucketTimer, ValidationError>
    where
        T: Into<Tags>,
    {
        let id = self.id(name, tags)?;
        Ok(BucketTimer::new(Arc::clone(&self.backend), id, function))
    }

    /// Creates a distribution summary fanned out by `function`.
    ///
    /// # Errors
    ///
    /// Fails only in strict mode, when the name or tags are malformed.
    pub fn bucket_distribution_summary<T>(
        &self,
        name: &str,
        tags: T,
        function: BucketFunction,
    ) -> Result<BucketDistributionSummary, ValidationError>
    where
        T: Into<Tags>,
    {
        let id = self.id(name, tags)?;
        Ok(BucketDistributionSummary::new(Arc::clone(&self.backend), id, function))
    }

    /// Creates an age gauge, reporting seconds since the last call to [`AgeGauge::update`].
    ///
    /// # Errors
    ///
    /// Fails in strict mode when the name or tags are malformed, or when no runtime is available
    /// and the background runtime cannot be started.
    pub fn age<T>(&self, name: &str, tags: T) -> Result<AgeGauge, Error>
    where
        T: Into<Tags>,
    {
        let id = self.id(name, tags)?;
        let scheduler = self.scheduler()?;
        let gauge = self.backend.gauge(&id);

        Ok(AgeGauge::new(
            gauge,
            self.settings.clock().clone(),
            &scheduler,
            self.settings.age_update_interval(),
        ))
    }

    /// Creates a long task timer, refreshed on the same interval as age gauges.
    ///
    /// Its gauges carry the caller's tags plus a [`STATISTIC_TAG`] naming what they report.
    ///
    /// # Errors
    ///
    /// Fails in strict mode when the name or tags are malformed, or when no runtime is available
    /// and the background runtime cannot be started.
    pub fn long_task_timer<T>(&self, name: &str, tags: T) -> Result<LongTaskTimer, Error>
    where
        T: Into<Tags>,
    {
        let id = self.id(name, tags)?;
        let scheduler = self.scheduler()?;
        let active_tasks = self.backend.gauge(&id.with_tag(STATISTIC_TAG, "activeTasks"));
        let duration = self.backend.gauge(&id.with_tag(STATISTIC_TAG, "duration"));

        Ok(LongTaskTimer::new(
            active_tasks,
            duration,
            self.settings.clock().clock().clone(),
            &scheduler,
            self.settings.age_update_interval(),
        ))
    }
}

impl fmt::Debug for Telemeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemeter")
            .field("common_tags", &self.common_tags)
            .field("strict", &self.settings.strict())
            .finish_non_exhaustive()
    }
}
