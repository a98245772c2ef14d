use std::{io, time::Duration};

/// Memory held by the process, in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Resident set size.
    pub rss: u64,
    /// Size of the data segment, heap included.
    pub heap_total: u64,
    /// Resident anonymous memory.
    pub heap_used: u64,
    /// Resident memory backed by files or shared memory.
    pub external: u64,
}

/// Cumulative CPU time consumed by the process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuTimes {
    /// Time spent in user mode.
    pub user: Duration,
    /// Time spent in kernel mode.
    pub system: Duration,
}

/// A monotonic timestamp split into seconds and nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timespec {
    /// Whole seconds.
    pub secs: i64,
    /// Nanoseconds past `secs`, below one billion.
    pub nanos: i64,
}

impl Timespec {
    /// Creates a timestamp.
    pub const fn new(secs: i64, nanos: i64) -> Self {
        Self { secs, nanos }
    }
}

impl From<Duration> for Timespec {
    fn from(duration: Duration) -> Self {
        Self {
            secs: i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
            nanos: i64::from(duration.subsec_nanos()),
        }
    }
}

/// A named statistic.
///
/// Names are snake_case; they are turned into metric names by
/// [`metric_name`](crate::names::metric_name).
#[derive(Clone, Debug, PartialEq)]
pub struct Statistic {
    /// Snake-case statistic name.
    pub name: String,
    /// Current value.
    pub value: f64,
}

impl Statistic {
    /// Creates a statistic.
    pub fn new<N>(name: N, value: f64) -> Self
    where
        N: Into<String>,
    {
        Self { name: name.into(), value }
    }
}

/// Statistics for one region of the address space.
#[derive(Clone, Debug, PartialEq)]
pub struct HeapSpace {
    /// Snake-case name of the region.
    pub name: String,
    /// Statistics for the region.
    pub statistics: Vec<Statistic>,
}

/// Open and maximum file descriptors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileDescriptors {
    /// Descriptors currently open.
    pub open: u64,
    /// Soft limit, or `None` when unlimited.
    pub max: Option<u64>,
}

/// Source of process introspection data.
///
/// Optional capabilities return `None` when the platform cannot provide them.  Support is probed
/// once, when [`ProcessMetrics`](crate::ProcessMetrics) is built, and unsupported capabilities are
/// skipped from then on.
pub trait Probe: Send + Sync {
    /// Current memory usage.
    fn memory_usage(&self) -> io::Result<MemoryUsage>;

    /// Cumulative CPU time, if the platform reports it.
    fn cpu_usage(&self) -> Option<CpuTimes>;

    /// Process-wide memory statistics.
    fn heap_statistics(&self) -> Vec<Statistic>;

    /// Memory usage and the process-wide statistics, read together.
    ///
    /// The statistics are returned even when memory usage cannot be read.  Probes whose two
    /// figures share a source should override this to read it once.
    fn memory(&self) -> (io::Result<MemoryUsage>, Vec<Statistic>) {
        (self.memory_usage(), self.heap_statistics())
    }

    /// Per-region memory statistics, if the platform reports them.
    fn heap_spaces(&self) -> Option<Vec<HeapSpace>>;

    /// File descriptor usage, if the platform reports it.
    fn file_descriptors(&self) -> Option<FileDescriptors>;

    /// Current monotonic time.
    fn now(&self) -> Timespec;
}
