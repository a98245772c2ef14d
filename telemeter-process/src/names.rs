//! Metric naming for process statistics.

/// Prefix of every metric published by [`ProcessMetrics`](crate::ProcessMetrics).
pub const PREFIX: &str = "process.";

/// Converts a snake_case name to camelCase.
///
/// Only an underscore followed by a lowercase ASCII letter is folded; any other underscore is
/// kept as is.
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();

    while let Some(c) = chars.next() {
        match chars.peek() {
            Some(next) if c == '_' && next.is_ascii_lowercase() => {
                out.push(next.to_ascii_uppercase());
                let _ = chars.next();
            }
            _ => out.push(c),
        }
    }

    out
}

/// Metric name for a snake_case statistic: [`PREFIX`] followed by its camelCase form.
pub fn metric_name(statistic: &str) -> String {
    format!("{PREFIX}{}", to_camel_case(statistic))
}

#[cfg(test)]
mod tests {
    use super::{metric_name, to_camel_case};

    #[test]
    fn camel_case() {
        assert_eq!(to_camel_case("total_heap_size"), "totalHeapSize");
        assert_eq!(to_camel_case("rss"), "rss");
        assert_eq!(to_camel_case("file_backed"), "fileBacked");
        assert_eq!(to_camel_case(""), "");
    }

    #[test]
    fn only_lowercase_letters_fold() {
        assert_eq!(to_camel_case("a__b"), "a_B");
        assert_eq!(to_camel_case("space_1"), "space_1");
        assert_eq!(to_camel_case("trailing_"), "trailing_");
        assert_eq!(to_camel_case("upper_Case"), "upper_Case");
    }

    #[test]
    fn prefixed() {
        assert_eq!(metric_name("heap_total"), "process.heapTotal");
        assert_eq!(metric_name("space_used_size"), "process.spaceUsedSize");
    }
}
