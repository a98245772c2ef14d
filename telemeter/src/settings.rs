use std::{
    io,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use tokio::runtime::Handle;

use crate::{
    atomics::AtomicU64,
    clock::WallClock,
    scheduler::Scheduler,
    validation::{validate, ValidationError},
    Tags,
};

/// Configuration shared by a root [`Telemeter`][crate::Telemeter] and every scope derived from it.
#[derive(Debug)]
pub(crate) struct Settings {
    strict: AtomicBool,
    age_update_interval_ms: AtomicU64,
    clock: WallClock,
    runtime: Option<Handle>,
}

impl Settings {
    pub(crate) fn new(
        strict: bool,
        age_update_interval: Duration,
        clock: WallClock,
        runtime: Option<Handle>,
    ) -> Self {
        Self {
            strict: AtomicBool::new(strict),
            age_update_interval_ms: AtomicU64::new(duration_millis(age_update_interval)),
            clock,
            runtime,
        }
    }

    pub(crate) fn strict(&self) -> bool {
        self.strict.load(Ordering::Relaxed)
    }

    pub(crate) fn set_strict(&self, strict: bool) {
        self.strict.store(strict, Ordering::Relaxed);
    }

    pub(crate) fn age_update_interval(&self) -> Duration {
        Duration::from_millis(self.age_update_interval_ms.load(Ordering::Relaxed))
    }

    pub(crate) fn set_age_update_interval(&self, interval: Duration) {
        self.age_update_interval_ms.store(duration_millis(interval), Ordering::Relaxed);
    }

    pub(crate) fn clock(&self) -> &WallClock {
        &self.clock
    }

    /// Recurring work runs on the configured runtime, else on the background runtime, so it
    /// outlives any short-lived runtime it happened to be created on.
    pub(crate) fn scheduler(&self) -> io::Result<Scheduler> {
        match &self.runtime {
            Some(handle) => Ok(Scheduler::from_handle(handle.clone())),
            None => Scheduler::background(),
        }
    }

    /// Work that measures the caller's runtime runs on the configured runtime, else on the
    /// current one.
    pub(crate) fn current_scheduler(&self) -> io::Result<Scheduler> {
        match &self.runtime {
            Some(handle) => Ok(Scheduler::from_handle(handle.clone())),
            None => Scheduler::current(),
        }
    }

    /// Enforces validation before a metric is created.
    ///
    /// Outside strict mode nothing is checked and every identity passes through as-is.
    pub(crate) fn check(&self, name: &str, tags: &Tags) -> Result<(), ValidationError> {
        if !self.strict() {
            return Ok(());
        }

        let issues = validate(name, tags);
        if issues.iter().any(|issue| issue.is_error()) {
            return Err(ValidationError::new(name, tags, issues));
        }
        Ok(())
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
