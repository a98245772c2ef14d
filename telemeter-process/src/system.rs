//! A [`Probe`] backed by the operating system.
//!
//! On Linux, memory figures come from `/proc/self/status`, address space regions from
//! `/proc/self/smaps` and open descriptors from `/proc/self/fd`.  CPU times and the descriptor
//! limit come from `getrusage(2)` and `getrlimit(2)` on every Unix.  Other platforms report no
//! memory usage and none of the optional capabilities.
use std::{collections::BTreeMap, io, time::Duration};

use quanta::{Clock, Instant};

use crate::probe::{CpuTimes, FileDescriptors, HeapSpace, MemoryUsage, Probe, Statistic, Timespec};

/// `/proc/self/status` fields published as process-wide statistics.
const STATUS_STATISTICS: &[(&str, &str)] = &[
    ("VmSize", "total_virtual_size"),
    ("VmPeak", "peak_virtual_size"),
    ("VmHWM", "peak_resident_size"),
    ("VmData", "data_size"),
    ("VmStk", "stack_size"),
    ("VmExe", "text_size"),
    ("VmLib", "shared_library_size"),
    ("VmPTE", "page_table_size"),
    ("VmSwap", "swapped_size"),
];

/// `/proc/self/smaps` fields summed per region, and the statistic each one becomes.
const SMAPS_STATISTICS: &[(&str, &str)] =
    &[("Size", "space_size"), ("Rss", "space_used_size"), ("Swap", "space_swapped_size")];

/// Probe reading the current process's own statistics.
#[derive(Clone, Debug)]
pub struct SystemProbe {
    clock: Clock,
    started: Instant,
}

impl SystemProbe {
    /// Creates a probe for the current process.
    pub fn new() -> Self {
        let clock = Clock::new();
        let started = clock.now();
        Self { clock, started }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for SystemProbe {
    fn memory_usage(&self) -> io::Result<MemoryUsage> {
        platform::memory_usage()
    }

    fn cpu_usage(&self) -> Option<CpuTimes> {
        platform::cpu_usage()
    }

    fn heap_statistics(&self) -> Vec<Statistic> {
        platform::heap_statistics()
    }

    fn memory(&self) -> (io::Result<MemoryUsage>, Vec<Statistic>) {
        platform::memory()
    }

    fn heap_spaces(&self) -> Option<Vec<HeapSpace>> {
        platform::heap_spaces()
    }

    fn file_descriptors(&self) -> Option<FileDescriptors> {
        platform::file_descriptors()
    }

    fn now(&self) -> Timespec {
        self.clock.now().saturating_duration_since(self.started).into()
    }
}

/// Parses `Key: value [kB]` lines, converting kilobytes to bytes.
fn parse_status(contents: &str) -> BTreeMap<&str, u64> {
    let mut fields = BTreeMap::new();

    for line in contents.lines() {
        let Some((key, rest)) = line.split_once(':') else { continue };
        let mut parts = rest.split_whitespace();
        let Some(value) = parts.next().and_then(|v| v.parse::<u64>().ok()) else { continue };

        let value = match parts.next() {
            Some("kB") => value.saturating_mul(1024),
            None => value,
            Some(_) => continue,
        };
        let _ = fields.insert(key.trim(), value);
    }

    fields
}

fn memory_from_status(status: &BTreeMap<&str, u64>) -> io::Result<MemoryUsage> {
    let field = |key: &str| status.get(key).copied().unwrap_or(0);
    let rss = status
        .get("VmRSS")
        .copied()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "VmRSS missing from status"))?;

    Ok(MemoryUsage {
        rss,
        heap_total: field("VmData"),
        heap_used: field("RssAnon"),
        external: field("RssFile").saturating_add(field("RssShmem")),
    })
}

#[allow(clippy::cast_precision_loss)]
fn statistics_from_status(status: &BTreeMap<&str, u64>) -> Vec<Statistic> {
    STATUS_STATISTICS
        .iter()
        .filter_map(|(key, name)| status.get(key).map(|value| Statistic::new(*name, *value as f64)))
        .collect()
}

/// Memory usage and process-wide statistics from one parse of `status`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn memory_and_statistics(contents: &str) -> (io::Result<MemoryUsage>, Vec<Statistic>) {
    let status = parse_status(contents);
    (memory_from_status(&status), statistics_from_status(&status))
}

fn is_mapping_header(token: &str) -> bool {
    token.contains('-') && token.chars().all(|c| c == '-' || c.is_ascii_hexdigit())
}

fn classify_region(path: Option<&str>) -> &'static str {
    match path {
        None => "anonymous",
        Some("[heap]") => "heap",
        Some(path) if path.starts_with("[stack") => "stack",
        Some(path) if path.starts_with('[') => "special",
        Some(_) => "file_backed",
    }
}

/// Sums `smaps` fields per region kind.
#[allow(clippy::cast_precision_loss)]
fn parse_smaps(contents: &str) -> Vec<HeapSpace> {
    let mut regions: BTreeMap<&'static str, Vec<u64>> = BTreeMap::new();
    let mut current = None;

    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let Some(first) = fields.next() else { continue };

        if let Some(key) = first.strip_suffix(':') {
            let Some(region) = current else { continue };
            let Some(index) = SMAPS_STATISTICS.iter().position(|(field, _)| *field == key) else {
                continue;
            };
            let Some(kb) = fields.next().and_then(|v| v.parse::<u64>().ok()) else { continue };

            let totals: &mut Vec<u64> =
                regions.entry(region).or_insert_with(|| vec![0; SMAPS_STATISTICS.len()]);
            totals[index] = totals[index].saturating_add(kb.saturating_mul(1024));
        } else if is_mapping_header(first) {
            // perms, offset, dev and inode precede the optional path.
            current = Some(classify_region(fields.nth(4)));
        }
    }

    regions
        .into_iter()
        .map(|(name, totals)| HeapSpace {
            name: name.to_owned(),
            statistics: SMAPS_STATISTICS
                .iter()
                .zip(totals)
                .map(|((_, statistic), value)| Statistic::new(*statistic, value as f64))
                .collect(),
        })
        .collect()
}

#[cfg(unix)]
fn timeval_duration(secs: i64, micros: i64) -> Duration {
    let secs = u64::try_from(secs).unwrap_or(0);
    let micros = u64::try_from(micros).unwrap_or(0);
    Duration::from_secs(secs) + Duration::from_micros(micros)
}

#[cfg(target_os = "linux")]
mod platform {
    use std::{fs, io};

    use super::{
        memory_and_statistics, memory_from_status, parse_smaps, parse_status, statistics_from_status,
    };
    use crate::probe::{CpuTimes, FileDescriptors, HeapSpace, MemoryUsage, Statistic};

    const STATUS: &str = "/proc/self/status";

    pub(super) fn memory_usage() -> io::Result<MemoryUsage> {
        let status = fs::read_to_string(STATUS)?;
        memory_from_status(&parse_status(&status))
    }

    pub(super) fn heap_statistics() -> Vec<Statistic> {
        fs::read_to_string(STATUS)
            .map(|status| statistics_from_status(&parse_status(&status)))
            .unwrap_or_default()
    }

    pub(super) fn memory() -> (io::Result<MemoryUsage>, Vec<Statistic>) {
        match fs::read_to_string(STATUS) {
            Ok(status) => memory_and_statistics(&status),
            Err(e) => (Err(e), Vec::new()),
        }
    }

    pub(super) fn heap_spaces() -> Option<Vec<HeapSpace>> {
        fs::read_to_string("/proc/self/smaps").ok().map(|smaps| parse_smaps(&smaps))
    }

    pub(super) fn file_descriptors() -> Option<FileDescriptors> {
        let entries = fs::read_dir("/proc/self/fd").ok()?.count();
        // The listing includes the descriptor `read_dir` itself holds open.
        let open = u64::try_from(entries).unwrap_or(u64::MAX).saturating_sub(1);
        Some(FileDescriptors { open, max: super::unix::max_file_descriptors() })
    }

    pub(super) fn cpu_usage() -> Option<CpuTimes> {
        super::unix::cpu_usage()
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
mod platform {
    use std::io;

    use crate::probe::{CpuTimes, FileDescriptors, HeapSpace, MemoryUsage, Statistic};

    pub(super) fn memory_usage() -> io::Result<MemoryUsage> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "memory usage is only read on Linux"))
    }

    pub(super) fn heap_statistics() -> Vec<Statistic> {
        Vec::new()
    }

    pub(super) fn memory() -> (io::Result<MemoryUsage>, Vec<Statistic>) {
        (memory_usage(), heap_statistics())
    }

    pub(super) fn heap_spaces() -> Option<Vec<HeapSpace>> {
        None
    }

    pub(super) fn file_descriptors() -> Option<FileDescriptors> {
        None
    }

    pub(super) fn cpu_usage() -> Option<CpuTimes> {
        super::unix::cpu_usage()
    }
}

#[cfg(not(unix))]
mod platform {
    use std::io;

    use crate::probe::{CpuTimes, FileDescriptors, HeapSpace, MemoryUsage, Statistic};

    pub(super) fn memory_usage() -> io::Result<MemoryUsage> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "memory usage is only read on Linux"))
    }

    pub(super) fn heap_statistics() -> Vec<Statistic> {
        Vec::new()
    }

    pub(super) fn memory() -> (io::Result<MemoryUsage>, Vec<Statistic>) {
        (memory_usage(), heap_statistics())
    }

    pub(super) fn heap_spaces() -> Option<Vec<HeapSpace>> {
        None
    }

    pub(super) fn file_descriptors() -> Option<FileDescriptors> {
        None
    }

    pub(super) fn cpu_usage() -> Option<CpuTimes> {
        None
    }
}

#[cfg(unix)]
mod unix {
    use std::mem::MaybeUninit;

    use super::timeval_duration;
    use crate::probe::CpuTimes;

    #[allow(clippy::useless_conversion)]
    pub(super) fn cpu_usage() -> Option<CpuTimes> {
        let mut usage = MaybeUninit::<libc::rusage>::uninit();
        // SAFETY: `usage` points to writable memory large enough for a `rusage`, which
        // `getrusage` fully initializes when it returns zero.
        let usage = unsafe {
            if libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) != 0 {
                return None;
            }
            usage.assume_init()
        };

        Some(CpuTimes {
            user: timeval_duration(usage.ru_utime.tv_sec.into(), usage.ru_utime.tv_usec.into()),
            system: timeval_duration(usage.ru_stime.tv_sec.into(), usage.ru_stime.tv_usec.into()),
        })
    }

    #[allow(clippy::useless_conversion)]
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    pub(super) fn max_file_descriptors() -> Option<u64> {
        let mut limit = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
        // SAFETY: `limit` is a valid, writable `rlimit` for the duration of the call.
        if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } != 0 {
            return None;
        }
        if limit.rlim_cur == libc::RLIM_INFINITY {
            return None;
        }
        u64::try_from(limit.rlim_cur).ok()
    }
}
