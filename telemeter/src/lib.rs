//! A process-local metrics instrumentation facade.
//!
//! `telemeter` sits between application code and a metrics [`Backend`].  Application code asks a
//! [`Telemeter`] for counters, gauges, timers and distribution summaries identified by a name plus
//! a set of tags; the facade validates the identity, merges in the tags of the current scope and
//! hands creation off to the backend, which owns the aggregate state.
//!
//! # Identities
//!
//! A metric is identified by its [`Id`]: a name and a [`Tags`] set.  Tag order is irrelevant, and
//! creating the same identity twice yields handles to the same aggregate.
//!
//! Tag values may be absent: a `None` value is dropped when the tag set is built.  An empty string
//! is a real value, and a malformed one.
//!
//! # Validation
//!
//! [`validate`] checks an identity against structural rules (non-empty name and tags, key and value
//! length limits, a cap of 20 user tags, the reserved `telemeter.` namespace) and flags characters
//! that a downstream transport will percent-encode.  Issues are either errors or warnings.
//!
//! Whether errors block metric creation depends on strict mode:
//!
//! - in strict mode, creating a metric with any error-level issue fails with a [`ValidationError`]
//!   listing every issue found.
//! - otherwise (the default) identities are not validated, and are passed to the backend as-is.
//!
//! ```
//! use telemeter::{NoopBackend, Tags, Telemeter};
//!
//! let telemeter = Telemeter::builder().strict_mode(true).build(NoopBackend);
//! assert!(telemeter.counter("", Tags::new()).is_err());
//!
//! telemeter.set_strict_mode(false);
//! assert!(telemeter.counter("", Tags::new()).is_ok());
//! ```
//!
//! # Scopes
//!
//! [`Telemeter::scope`] returns a facade that merges extra tags underneath the tags passed at
//! creation time.  Scopes nest, the nearest scope winning on conflicting keys.
//!
//! # Buckets
//!
//! A [`BucketFunction`] maps a value to one of a handful of labels: power-of-two byte sizes,
//! power-of-ten magnitudes, or sub-divisions of a maximum latency.  Bucketed meters record into the
//! metric whose tags are the caller's plus `bucket=<label>`:
//!
//! ```
//! use std::time::Duration;
//!
//! use telemeter::{BucketFunction, NoopBackend, Telemeter};
//!
//! let telemeter = Telemeter::new(NoopBackend);
//! let function = BucketFunction::latency(Duration::from_secs(3));
//! assert_eq!(function.label_duration(Duration::from_millis(212)), "0375ms");
//!
//! let latency = telemeter.bucket_timer("request.latency", [("app", "web")], function).unwrap();
//! latency.record(Duration::from_millis(212));
//! ```
//!
//! # Age gauges
//!
//! An [`AgeGauge`] reports the seconds elapsed since an event last happened, recomputed on a fixed
//! interval.  Recurring work runs on Tokio: the runtime given to
//! [`TelemeterBuilder::with_runtime`] when there is one, otherwise a small background runtime
//! started on first use.
//!
//! # Other meters
//!
//! Besides the four basic meter types, a facade creates [`DoubleCounter`]s for fractional counts,
//! max gauges keeping the largest value written, and [`LongTaskTimer`]s reporting on tasks while
//! they are still running.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod age;
pub use self::age::{AgeGauge, DEFAULT_AGE_UPDATE_INTERVAL};

pub mod atomics;

mod backend;
pub use self::backend::{Backend, NoopBackend};

mod bucket;
pub use self::bucket::{BucketFunction, BucketFunctionError, LatencyBias, OVERFLOW_LABEL};

mod bucketed;
pub use self::bucketed::{BucketCounter, BucketDistributionSummary, BucketTimer, BUCKET_TAG};

mod builder;
pub use self::builder::TelemeterBuilder;

mod clock;
pub use self::clock::WallClock;

mod error;
pub use self::error::Error;

mod handles;
pub use self::handles::{
    Counter, CounterFn, DistributionSummary, DistributionSummaryFn, DoubleCounter, DoubleCounterFn,
    Gauge, GaugeFn, Timer, TimerFn,
};

mod long_task;
pub use self::long_task::{LongTaskTimer, STATISTIC_TAG};

pub mod scheduler;

mod settings;

mod tags;
pub use self::tags::{Id, IntoTagValue, Tags};

mod telemeter;
pub use self::telemeter::Telemeter;

pub mod validation;
pub use self::validation::{validate, ValidationError, ValidationIssue};

#[cfg(test)]
mod test_util;
