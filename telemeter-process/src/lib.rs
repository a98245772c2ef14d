//! Process self-observation for [`telemeter`].
//!
//! [`ProcessMetrics`] periodically samples the current process and publishes what it finds as
//! gauges and timers prefixed with `process.`:
//!
//! - memory: resident set size, data segment size, anonymous and file-backed resident memory.
//! - CPU: user and system time as a percentage of one core over each refresh window.
//! - address space: process-wide memory statistics, and the same per region of the address space.
//! - file descriptors: open and maximum.
//! - scheduler latency: how long a task waits to be polled again after yielding to the Tokio
//!   scheduler, probed every 500 milliseconds.
//!
//! Statistics are read through a [`Probe`].  [`SystemProbe`] reads them from the operating system;
//! capabilities a platform lacks are detected once and skipped.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use telemeter::{NoopBackend, Telemeter};
//! use telemeter_process::ProcessMetrics;
//!
//! # fn main() -> Result<(), telemeter::Error> {
//! let telemeter = Telemeter::new(NoopBackend);
//! let metrics = ProcessMetrics::builder()
//!     .refresh_interval(Duration::from_secs(10))
//!     .add_tag("app", "worker")
//!     .build(&telemeter)?;
//!
//! metrics.start()?;
//! // ...
//! metrics.stop();
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod cpu;
mod latency;

pub mod names;

mod observer;
pub use self::observer::{
    ProcessMetrics, ProcessMetricsBuilder, DEFAULT_REFRESH_INTERVAL, LATENCY_PROBE_INTERVAL,
};

mod probe;
pub use self::probe::{
    CpuTimes, FileDescriptors, HeapSpace, MemoryUsage, Probe, Statistic, Timespec,
};

mod system;
pub use self::system::SystemProbe;
