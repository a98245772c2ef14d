//! Bucket functions: map a measured value onto one of a small, fixed set of labels.
//!
//! Labels within one function share a fixed width and suffix, so sorting them as strings sorts
//! them numerically.
use std::{fmt, sync::Arc, time::Duration};

use thiserror::Error;

const BINARY_SUFFIXES: [&str; 7] = ["_B", "_KB", "_MB", "_GB", "_TB", "_PB", "_EB"];
const DECIMAL_SUFFIXES: [&str; 7] = ["", "_k", "_M", "_G", "_T", "_P", "_E"];

/// Label used by decimal bucket functions for values above the maximum.
pub const OVERFLOW_LABEL: &str = "large";

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;
const NANOS_PER_MIN: u64 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u64 = 60 * NANOS_PER_MIN;
const NANOS_PER_DAY: u64 = 24 * NANOS_PER_HOUR;

// (exclusive upper bound for the maximum, unit, width, suffix)
const TIME_FORMATS: [(u64, u64, usize, &str); 27] = [
    (10, 1, 1, "ns"),
    (100, 1, 2, "ns"),
    (NANOS_PER_MICRO, 1, 3, "ns"),
    (8 * NANOS_PER_MICRO, 1, 4, "ns"),
    (10 * NANOS_PER_MICRO, NANOS_PER_MICRO, 1, "us"),
    (100 * NANOS_PER_MICRO, NANOS_PER_MICRO, 2, "us"),
    (NANOS_PER_MILLI, NANOS_PER_MICRO, 3, "us"),
    (8 * NANOS_PER_MILLI, NANOS_PER_MICRO, 4, "us"),
    (10 * NANOS_PER_MILLI, NANOS_PER_MILLI, 1, "ms"),
    (100 * NANOS_PER_MILLI, NANOS_PER_MILLI, 2, "ms"),
    (NANOS_PER_SEC, NANOS_PER_MILLI, 3, "ms"),
    (8 * NANOS_PER_SEC, NANOS_PER_MILLI, 4, "ms"),
    (10 * NANOS_PER_SEC, NANOS_PER_SEC, 1, "s"),
    (100 * NANOS_PER_SEC, NANOS_PER_SEC, 2, "s"),
    (8 * NANOS_PER_MIN, NANOS_PER_SEC, 3, "s"),
    (10 * NANOS_PER_MIN, NANOS_PER_MIN, 1, "min"),
    (100 * NANOS_PER_MIN, NANOS_PER_MIN, 2, "min"),
    (8 * NANOS_PER_HOUR, NANOS_PER_MIN, 3, "min"),
    (10 * NANOS_PER_HOUR, NANOS_PER_HOUR, 1, "h"),
    (100 * NANOS_PER_HOUR, NANOS_PER_HOUR, 2, "h"),
    (8 * NANOS_PER_DAY, NANOS_PER_HOUR, 3, "h"),
    (10 * NANOS_PER_DAY, NANOS_PER_DAY, 1, "d"),
    (100 * NANOS_PER_DAY, NANOS_PER_DAY, 2, "d"),
    (1_000 * NANOS_PER_DAY, NANOS_PER_DAY, 3, "d"),
    (10_000 * NANOS_PER_DAY, NANOS_PER_DAY, 4, "d"),
    (100_000 * NANOS_PER_DAY, NANOS_PER_DAY, 5, "d"),
    (u64::MAX, NANOS_PER_DAY, 6, "d"),
];

/// Errors that can occur when parsing a bucket function definition.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BucketFunctionError {
    /// The function name is not known.
    #[error("unknown bucket function '{0}'")]
    UnknownFunction(String),

    /// A duration-based function was given no time unit.
    #[error("bucket function '{0}' requires a time unit")]
    MissingUnit(String),

    /// The time unit is not known.
    #[error("unknown time unit '{0}' (expected one of ns, us, ms, s, min, h)")]
    UnknownUnit(String),
}

/// How latency buckets are spread across `[0, max]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LatencyBias {
    /// Finer buckets near zero: `max/8`, `max/4`, `max/2`, `max`.
    #[default]
    Fast,
    /// Evenly spaced buckets: `max/4`, `max/2`, `3max/4`, `max`.
    Uniform,
    /// Finer buckets near the maximum: `max/2`, `3max/4`, `7max/8`, `max`.
    Slow,
}

impl LatencyBias {
    fn fractions(self) -> [(u64, u64); 4] {
        match self {
            LatencyBias::Fast => [(1, 8), (1, 4), (1, 2), (1, 1)],
            LatencyBias::Uniform => [(1, 4), (1, 2), (3, 4), (1, 1)],
            LatencyBias::Slow => [(1, 2), (3, 4), (7, 8), (1, 1)],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Bucket {
    upper: u64,
    label: String,
}

/// Maps values to bucket labels.
///
/// A value falls into the first bucket whose upper bound is greater than or equal to it.  Values
/// above the last bound either saturate into the last bucket, or, for decimal functions, map to
/// [`OVERFLOW_LABEL`].
///
/// Cloning is cheap: the bucket table is shared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketFunction {
    buckets: Arc<[Bucket]>,
    overflow: Option<Arc<str>>,
}

impl BucketFunction {
    /// Power-of-two byte-size buckets up to `max` bytes.
    ///
    /// The label unit is the largest power of 1024 that keeps `max` below 10000 units, e.g. a
    /// maximum of 1024 yields `0001_B` .. `0512_B`, `1024_B`.  Values above `max` fall into the last
    /// bucket.
    pub fn bytes(max: u64) -> Self {
        let (unit, suffix) = scale(max, 1024, &BINARY_SUFFIXES);
        let width = digits(max / unit);

        let mut uppers = Vec::new();
        let mut upper = unit;
        while upper < max {
            uppers.push(upper);
            match upper.checked_mul(2) {
                Some(next) => upper = next,
                None => break,
            }
        }
        uppers.push(max);

        Self::from_uppers(&uppers, |upper| format!("{:0width$}{suffix}", upper / unit), None)
    }

    /// Power-of-ten buckets up to `max`, with values above `max` labeled `large`.
    ///
    /// A maximum of 20000 yields `01_k`, `10_k`, `20_k` and `large`.
    pub fn decimal(max: u64) -> Self {
        let (unit, suffix) = scale(max, 1000, &DECIMAL_SUFFIXES);
        let width = digits(max / unit);

        let mut uppers = Vec::new();
        let mut upper = unit;
        while upper < max {
            uppers.push(upper);
            match upper.checked_mul(10) {
                Some(next) => upper = next,
                None => break,
            }
        }
        uppers.push(max);

        Self::from_uppers(
            &uppers,
            |upper| format!("{:0width$}{suffix}", upper / unit),
            Some(OVERFLOW_LABEL),
        )
    }

    /// Latency buckets up to `max`, biased towards fast responses.
    pub fn latency(max: Duration) -> Self {
        Self::latency_biased(max, LatencyBias::default())
    }

    /// Latency buckets up to `max`, spread according to `bias`.
    ///
    /// Labels carry a time unit chosen from the magnitude of `max`: a 3 second maximum with the
    /// default bias yields `0375ms`, `0750ms`, `1500ms` and `3000ms`.  Values above `max` fall into
    /// the last bucket.
    pub fn latency_biased(max: Duration, bias: LatencyBias) -> Self {
        let max = duration_nanos(max);

        let mut uppers: Vec<u64> = Vec::with_capacity(4);
        for (numerator, denominator) in bias.fractions() {
            let upper = u128::from(max) * u128::from(numerator) / u128::from(denominator);
            let upper = u64::try_from(upper).unwrap_or(max);
            if uppers.last() != Some(&upper) {
                uppers.push(upper);
            }
        }

        let (unit, width, suffix) = time_format(max);
        Self::from_uppers(&uppers, |upper| format!("{:0width$}{suffix}", upper / unit), None)
    }

    /// Builds a bucket function from a definition such as `("latency", 3, Some("s"))`.
    ///
    /// Known functions are `bytes`, `decimal`, `latency`, `latencyUniform`, `latencyBiasSlow`,
    /// `age` and `ageBiasOld`.  The duration-based ones require a unit: `ns`, `us`, `ms`, `s`, `min`
    /// or `h`.  The unit is ignored for `bytes` and `decimal`.
    pub fn parse(function: &str, value: u64, unit: Option<&str>) -> Result<Self, BucketFunctionError> {
        let bias = match function {
            "bytes" => return Ok(Self::bytes(value)),
            "decimal" => return Ok(Self::decimal(value)),
            "latency" | "age" => LatencyBias::Fast,
            "latencyUniform" => LatencyBias::Uniform,
            "latencyBiasSlow" | "ageBiasOld" => LatencyBias::Slow,
            other => return Err(BucketFunctionError::UnknownFunction(other.to_owned())),
        };

        let unit = unit.ok_or_else(|| BucketFunctionError::MissingUnit(function.to_owned()))?;
        let max = parse_duration(value, unit)?;
        Ok(Self::latency_biased(max, bias))
    }

    fn from_uppers<F>(uppers: &[u64], format: F, overflow: Option<&str>) -> Self
    where
        F: Fn(u64) -> String,
    {
        let mut buckets: Vec<Bucket> = Vec::with_capacity(uppers.len());
        for &upper in uppers {
            let label = format(upper);
            // Bounds that truncate to the same label collapse into the wider bucket.
            match buckets.last_mut() {
                Some(last) if last.label == label => last.upper = upper,
                _ => buckets.push(Bucket { upper, label }),
            }
        }

        Self { buckets: buckets.into(), overflow: overflow.map(Into::into) }
    }

    /// Number of distinct labels this function can produce.
    pub fn len(&self) -> usize {
        self.buckets.len() + usize::from(self.overflow.is_some())
    }

    /// Always `false`: every bucket function has at least one bucket.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the bucket `value` falls into, in `0..self.len()`.
    pub fn index(&self, value: u64) -> usize {
        let index = self.buckets.partition_point(|bucket| bucket.upper < value);
        if index < self.buckets.len() || self.overflow.is_some() {
            index
        } else {
            self.buckets.len() - 1
        }
    }

    /// Label of the bucket at `index`.
    ///
    /// Indexes past the end resolve to the overflow label, or to the last bucket.
    pub fn label_at(&self, index: usize) -> &str {
        match self.buckets.get(index) {
            Some(bucket) => &bucket.label,
            None => match &self.overflow {
                Some(overflow) => overflow,
                None => self.buckets.last().map_or("", |bucket| bucket.label.as_str()),
            },
        }
    }

    /// Label for `value`.
    pub fn label(&self, value: u64) -> &str {
        self.label_at(self.index(value))
    }

    /// Label for a duration, measured in nanoseconds.
    pub fn label_duration(&self, duration: Duration) -> &str {
        self.label(duration_nanos(duration))
    }

    /// All labels, in ascending order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.buckets
            .iter()
            .map(|bucket| bucket.label.as_str())
            .chain(self.overflow.as_deref())
    }
}

impl fmt::Display for BucketFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, label) in self.labels().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(label)?;
        }
        f.write_str("]")
    }
}

pub(crate) fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn scale(max: u64, base: u64, suffixes: &[&'static str]) -> (u64, &'static str) {
    let mut unit = 1;
    let mut i = 0;
    while max / unit >= 10_000 && i + 1 < suffixes.len() {
        unit *= base;
        i += 1;
    }
    (unit, suffixes[i])
}

fn digits(mut n: u64) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

fn time_format(max_nanos: u64) -> (u64, usize, &'static str) {
    TIME_FORMATS
        .iter()
        .find(|(bound, ..)| max_nanos < *bound)
        .map_or((NANOS_PER_DAY, 6, "d"), |&(_, unit, width, suffix)| (unit, width, suffix))
}

fn parse_duration(value: u64, unit: &str) -> Result<Duration, BucketFunctionError> {
    let nanos_per_unit = match unit {
        "ns" => 1,
        "us" => NANOS_PER_MICRO,
        "ms" => NANOS_PER_MILLI,
        "s" => NANOS_PER_SEC,
        "min" => NANOS_PER_MIN,
        "h" => NANOS_PER_HOUR,
        other => return Err(BucketFunctionError::UnknownUnit(other.to_owned())),
    };
    Ok(Duration::from_nanos(value.saturating_mul(nanos_per_unit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bytes() {
        let f = BucketFunction::bytes(1024);
        assert_eq!(f.label(1000), "1024_B");
        assert_eq!(f.label(212), "0256_B");
        assert_eq!(f.label(0), "0001_B");
        assert_eq!(f.label(1024), "1024_B");
        assert_eq!(f.label(4096), "1024_B");
        assert_eq!(f.len(), 11);
    }

    #[test]
    fn bytes_scales_units() {
        let f = BucketFunction::bytes(1024 * 1024);
        assert_eq!(f.label(1), "0001_KB");
        assert_eq!(f.label(3000), "0004_KB");
        assert_eq!(f.label(1024 * 1024), "1024_KB");

        let f = BucketFunction::bytes(8 * 1024 * 1024 * 1024);
        assert_eq!(f.label(8 * 1024 * 1024 * 1024), "8192_MB");
    }

    #[test]
    fn decimal() {
        let f = BucketFunction::decimal(20_000);
        assert_eq!(f.label(15_761), "20_k");
        assert_eq!(f.label(12_030), "20_k");
        assert_eq!(f.label(20_000), "20_k");
        assert_eq!(f.label(20_001), "large");
        assert_eq!(f.label(9_000), "10_k");
        assert_eq!(f.label(0), "01_k");
        assert_eq!(f.labels().collect::<Vec<_>>(), ["01_k", "10_k", "20_k", "large"]);
    }

    #[test]
    fn decimal_without_scaling() {
        let f = BucketFunction::decimal(500);
        assert_eq!(f.labels().collect::<Vec<_>>(), ["001", "010", "100", "500", "large"]);
    }

    #[test]
    fn latency() {
        let f = BucketFunction::latency(Duration::from_secs(3));
        assert_eq!(f.labels().collect::<Vec<_>>(), ["0375ms", "0750ms", "1500ms", "3000ms"]);
        assert_eq!(f.label_duration(Duration::from_secs(1)), "1500ms");
        assert_eq!(f.label_duration(Duration::new(1, 200_000)), "1500ms");
        assert_eq!(f.label_duration(Duration::from_nanos(212_000)), "0375ms");
        assert_eq!(f.label_duration(Duration::ZERO), "0375ms");
        assert_eq!(f.label_duration(Duration::from_secs(60)), "3000ms");
    }

    #[test]
    fn latency_bias() {
        let max = Duration::from_secs(3);
        let uniform = BucketFunction::latency_biased(max, LatencyBias::Uniform);
        assert_eq!(uniform.labels().collect::<Vec<_>>(), ["0750ms", "1500ms", "2250ms", "3000ms"]);

        let slow = BucketFunction::latency_biased(max, LatencyBias::Slow);
        assert_eq!(slow.labels().collect::<Vec<_>>(), ["1500ms", "2250ms", "2625ms", "3000ms"]);
    }

    #[test]
    fn latency_units() {
        let f = BucketFunction::latency(Duration::from_millis(100));
        assert_eq!(f.labels().collect::<Vec<_>>(), ["012ms", "025ms", "050ms", "100ms"]);

        let f = BucketFunction::latency(Duration::from_secs(60));
        assert_eq!(f.labels().collect::<Vec<_>>(), ["07s", "15s", "30s", "60s"]);
    }

    #[test]
    fn latency_tiny_max_dedupes() {
        let f = BucketFunction::latency(Duration::from_nanos(2));
        assert_eq!(f.labels().collect::<Vec<_>>(), ["0ns", "1ns", "2ns"]);
    }

    #[test]
    fn parse() {
        let f = BucketFunction::parse("latency", 3, Some("s")).unwrap();
        assert_eq!(f, BucketFunction::latency(Duration::from_secs(3)));

        let f = BucketFunction::parse("ageBiasOld", 2, Some("min")).unwrap();
        assert_eq!(f, BucketFunction::latency_biased(Duration::from_secs(120), LatencyBias::Slow));

        let f = BucketFunction::parse("bytes", 1024, None).unwrap();
        assert_eq!(f, BucketFunction::bytes(1024));

        assert_eq!(
            BucketFunction::parse("percentile", 1, None),
            Err(BucketFunctionError::UnknownFunction("percentile".to_owned()))
        );
        assert_eq!(
            BucketFunction::parse("age", 1, None),
            Err(BucketFunctionError::MissingUnit("age".to_owned()))
        );
        assert_eq!(
            BucketFunction::parse("latency", 1, Some("fortnight")),
            Err(BucketFunctionError::UnknownUnit("fortnight".to_owned()))
        );
    }

    fn sorted_labels(f: &BucketFunction) -> bool {
        let labels = f.labels().collect::<Vec<_>>();
        labels.windows(2).all(|w| w[0] < w[1])
    }

    proptest! {
        #[test]
        fn labels_sort_lexicographically(max in 1u64..u64::MAX) {
            prop_assert!(sorted_labels(&BucketFunction::bytes(max)));
            prop_assert!(sorted_labels(&BucketFunction::decimal(max)));
            prop_assert!(sorted_labels(&BucketFunction::latency(Duration::from_nanos(max))));
        }

        #[test]
        fn index_is_monotonic(max in 1u64..1_000_000_000_000, a in any::<u64>(), b in any::<u64>()) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            for f in [
                BucketFunction::bytes(max),
                BucketFunction::decimal(max),
                BucketFunction::latency_biased(Duration::from_nanos(max), LatencyBias::Slow),
            ] {
                prop_assert!(f.index(lo) <= f.index(hi));
                prop_assert!(f.index(hi) < f.len());
            }
        }
    }
}
