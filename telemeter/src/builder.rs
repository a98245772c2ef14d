use std::{sync::Arc, time::Duration};

use quanta::Clock;
use tokio::runtime::Handle;

use crate::{
    age::DEFAULT_AGE_UPDATE_INTERVAL, clock::WallClock, settings::Settings, Backend, IntoTagValue,
    Tags, Telemeter,
};

/// Builder for creating and configuring a [`Telemeter`].
#[derive(Debug)]
pub struct TelemeterBuilder {
    strict: bool,
    age_update_interval: Duration,
    clock: Option<Clock>,
    runtime: Option<Handle>,
    common_tags: Tags,
}

impl TelemeterBuilder {
    /// Creates a new [`TelemeterBuilder`] with default values.
    pub fn new() -> Self {
        Self {
            strict: false,
            age_update_interval: DEFAULT_AGE_UPDATE_INTERVAL,
            clock: None,
            runtime: None,
            common_tags: Tags::new(),
        }
    }

    /// Enables or disables strict mode.
    ///
    /// In strict mode, metric creation fails with a validation error when the name or tags are
    /// malformed.  Otherwise, identities are not validated at all.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn strict_mode(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Sets how often age gauges and long task timers recompute their values.
    ///
    /// Defaults to 30 seconds.
    #[must_use]
    pub fn age_update_interval(mut self, interval: Duration) -> Self {
        self.age_update_interval = interval;
        self
    }

    /// Sets the clock used for wall-clock timestamps.
    ///
    /// Mostly useful with [`Clock::mock`] in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the runtime recurring work is spawned onto.
    ///
    /// When unset, recurring work runs on a shared single-threaded runtime on a dedicated thread,
    /// which lives for the rest of the process.  Work spawned onto an explicit runtime stops when
    /// that runtime shuts down; [`AgeGauge::is_closed`](crate::AgeGauge::is_closed) then reports
    /// `true`.
    #[must_use]
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Adds a tag applied to every metric created through the facade.
    ///
    /// An absent value is ignored.
    #[must_use]
    pub fn add_common_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: IntoTagValue,
    {
        let _ = self.common_tags.insert(key, value);
        self
    }

    /// Builds the facade on top of `backend`.
    pub fn build<B>(self, backend: B) -> Telemeter
    where
        B: Backend + 'static,
    {
        let clock = self.clock.map_or_else(WallClock::new, WallClock::from_clock);
        let settings = Settings::new(self.strict, self.age_update_interval, clock, self.runtime);

        Telemeter::from_parts(Arc::new(backend), Arc::new(settings), self.common_tags)
    }
}

impl Default for TelemeterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
