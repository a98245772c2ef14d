//! Structural validation of metric names and tags.
//!
//! [`validate`] is a pure function: it runs every check and returns the full list of issues, so
//! tooling can report everything wrong with an identity at once.  Whether issues block metric
//! creation is decided by the caller (see [`Telemeter::set_strict_mode`][crate::Telemeter::set_strict_mode]).
use std::fmt;

use thiserror::Error;

use crate::Tags;

/// Maximum length, in bytes, of a tag key.
pub const MAX_KEY_LENGTH: usize = 60;

/// Maximum length, in bytes, of a tag value.
pub const MAX_VALUE_LENGTH: usize = 120;

/// Maximum number of user tags, counting the metric name as one.
pub const MAX_USER_TAGS: usize = 20;

/// Tag keys starting with this prefix are reserved for tags injected by the library itself.
pub const RESERVED_PREFIX: &str = "telemeter.";

/// Severity of a validation issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    /// Blocks metric creation in strict mode.
    Error,
    /// Advisory only.
    Warn,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => f.write_str("ERROR"),
            Level::Warn => f.write_str("WARN"),
        }
    }
}

/// A single problem found while validating a metric identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValidationIssue {
    level: Level,
    description: String,
}

impl ValidationIssue {
    /// Creates an error-level issue.
    pub fn error(description: impl Into<String>) -> Self {
        Self { level: Level::Error, description: description.into() }
    }

    /// Creates a warning-level issue.
    pub fn warn(description: impl Into<String>) -> Self {
        Self { level: Level::Warn, description: description.into() }
    }

    /// Severity of the issue.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns `true` if this issue blocks metric creation in strict mode.
    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.description)
    }
}

/// A metric identity was rejected in strict mode.
///
/// The message lists the offending name and tags followed by every issue found, one per line.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
    name: String,
    tags: Tags,
    issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub(crate) fn new(name: &str, tags: &Tags, issues: Vec<ValidationIssue>) -> Self {
        let mut message = format!("[name:'{name}', tags:{tags}]:");
        for issue in &issues {
            message.push_str("\n\t");
            message.push_str(&issue.to_string());
        }

        Self { message, name: name.to_owned(), tags: tags.clone(), issues }
    }

    /// Name of the rejected metric.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags of the rejected metric.
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Every issue found, errors and warnings alike.
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }
}

/// Validates a metric name and its tags.
///
/// All checks run; nothing short-circuits after the first failure.  Issues are returned in this
/// order: empty name, per-tag emptiness and length checks, tag count, reserved namespace, then
/// percent-encoding warnings.
pub fn validate(name: &str, tags: &Tags) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if name.is_empty() {
        issues.push(ValidationIssue::error("'name' cannot be empty"));
    }

    for (key, value) in tags.iter() {
        if key.is_empty() {
            issues.push(ValidationIssue::error("tag keys cannot be empty"));
        }
        if value.is_empty() {
            issues.push(ValidationIssue::error(format!("tag value for key '{key}' cannot be empty")));
        }
        if key.len() > MAX_KEY_LENGTH {
            issues.push(ValidationIssue::error(format!(
                "tag key '{key}' exceeds length limits ({} > {MAX_KEY_LENGTH})",
                key.len()
            )));
        }
        if value.len() > MAX_VALUE_LENGTH {
            issues.push(ValidationIssue::error(format!(
                "tag value '{value}' for key '{key}' exceeds length limits ({} > {MAX_VALUE_LENGTH})",
                value.len()
            )));
        }
    }

    // The name occupies one of the user tag slots.
    let user_tags = tags.len() + 1;
    if user_tags > MAX_USER_TAGS {
        issues.push(ValidationIssue::error(format!(
            "too many user tags: {user_tags} tags detected (including the name), limit is {MAX_USER_TAGS}"
        )));
    }

    for (key, _) in tags.iter() {
        if key.starts_with(RESERVED_PREFIX) {
            issues.push(ValidationIssue::error(format!(
                "tag key '{key}' uses the reserved namespace '{RESERVED_PREFIX}'"
            )));
        }
    }

    if !is_unreserved(name) {
        issues.push(ValidationIssue::warn(format!(
            "name '{name}' contains characters that will be percent-encoded"
        )));
    }
    for (key, value) in tags.iter() {
        if !is_unreserved(key) {
            issues.push(ValidationIssue::warn(format!(
                "tag key '{key}' contains characters that will be percent-encoded"
            )));
        }
        if !is_unreserved(value) {
            issues.push(ValidationIssue::warn(format!(
                "tag value '{value}' for key '{key}' contains characters that will be percent-encoded"
            )));
        }
    }

    issues
}

fn is_unreserved(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '~' | '^'))
}
