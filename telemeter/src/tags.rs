//! Metric identity: a name plus an unordered set of key/value tags.
use std::{
    borrow::Cow,
    collections::{btree_map, BTreeMap},
    fmt,
};

/// Converts a value into an optional tag value.
///
/// Returning `None` marks the tag as absent: it is dropped when the tag set is built and never
/// reaches validation.  An empty string is *not* absent, and is reported as an error by the
/// validator.
pub trait IntoTagValue {
    /// Converts `self` into a tag value, or `None` if the tag should be dropped.
    fn into_tag_value(self) -> Option<String>;
}

impl IntoTagValue for &str {
    fn into_tag_value(self) -> Option<String> {
        Some(self.to_owned())
    }
}

impl IntoTagValue for String {
    fn into_tag_value(self) -> Option<String> {
        Some(self)
    }
}

impl IntoTagValue for &String {
    fn into_tag_value(self) -> Option<String> {
        Some(self.clone())
    }
}

impl IntoTagValue for Cow<'_, str> {
    fn into_tag_value(self) -> Option<String> {
        Some(self.into_owned())
    }
}

impl<T> IntoTagValue for Option<T>
where
    T: IntoTagValue,
{
    fn into_tag_value(self) -> Option<String> {
        self.and_then(IntoTagValue::into_tag_value)
    }
}

/// A set of tags.
///
/// Tags are kept sorted by key, so two tag sets built from the same pairs in a different order
/// compare, hash and display identically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// Creates an empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag, returning the updated set.
    ///
    /// An absent value leaves the set untouched.
    #[must_use]
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: IntoTagValue,
    {
        self.insert(key, value);
        self
    }

    /// Inserts a tag, returning the value previously stored under the same key.
    ///
    /// An absent value is ignored and returns `None`.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<String>
    where
        K: Into<String>,
        V: IntoTagValue,
    {
        let value = value.into_tag_value()?;
        self.0.insert(key.into(), value)
    }

    /// Gets the value of the given tag key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns `true` if the tag key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Removes a tag, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the tags in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merges `overrides` on top of these tags.
    ///
    /// On a key collision the value from `overrides` wins.
    #[must_use]
    pub fn merged(&self, overrides: &Tags) -> Tags {
        if overrides.is_empty() {
            return self.clone();
        }

        let mut merged = self.clone();
        merged.0.extend(overrides.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

impl<K, V> Extend<(K, V)> for Tags
where
    K: Into<String>,
    V: IntoTagValue,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Tags
where
    K: Into<String>,
    V: IntoTagValue,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Tags::new();
        tags.extend(iter);
        tags
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Tags
where
    K: Into<String>,
    V: IntoTagValue,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K, V> From<Vec<(K, V)>> for Tags
where
    K: Into<String>,
    V: IntoTagValue,
{
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<&Tags> for Tags {
    fn from(tags: &Tags) -> Self {
        tags.clone()
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

/// Identity of a metric: its name and the fully-merged tag set.
///
/// Two metrics with equal identities refer to the same aggregate in a backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id {
    name: String,
    tags: Tags,
}

impl Id {
    /// Creates an identity from a name and tags.
    pub fn new<N, T>(name: N, tags: T) -> Self
    where
        N: Into<String>,
        T: Into<Tags>,
    {
        Self { name: name.into(), tags: tags.into() }
    }

    /// Name of the metric.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags of the metric.
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Returns a copy of this identity with an extra tag, replacing any tag with the same key.
    #[must_use]
    pub fn with_tag<K, V>(&self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: IntoTagValue,
    {
        Self { name: self.name.clone(), tags: self.tags.clone().with(key, value) }
    }

    /// Returns a copy of this identity with `tags` merged over its own.
    #[must_use]
    pub fn with_tags(&self, tags: &Tags) -> Self {
        Self { name: self.name.clone(), tags: self.tags.merged(tags) }
    }

    /// Consumes the identity, returning the name and tags.
    pub fn into_parts(self) -> (String, Tags) {
        (self.name, self.tags)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tags.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}{}", self.name, self.tags)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_values_are_dropped() {
        let tags = Tags::new().with("present", "yes").with("absent", None::<&str>);
        assert_eq!(tags.len(), 1);
        assert!(!tags.contains_key("absent"));

        let tags = Tags::from([("a", Some("1")), ("b", None)]);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.get("a"), Some("1"));
    }

    #[test]
    fn empty_values_are_kept() {
        let tags = Tags::new().with("empty", "");
        assert_eq!(tags.get("empty"), Some(""));
    }

    #[test]
    fn order_does_not_matter() {
        let first = Tags::from([("a", "1"), ("b", "2")]);
        let second = Tags::from([("b", "2"), ("a", "1")]);
        assert_eq!(first, second);
        assert_eq!(Id::new("m", first), Id::new("m", second));
    }

    #[test]
    fn merged_prefers_overrides() {
        let base = Tags::from([("app", "web"), ("region", "us-east-1")]);
        let overrides = Tags::from([("region", "eu-west-1"), ("status", "200")]);
        let merged = base.merged(&overrides);

        assert_eq!(merged.get("app"), Some("web"));
        assert_eq!(merged.get("region"), Some("eu-west-1"));
        assert_eq!(merged.get("status"), Some("200"));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn display() {
        let id = Id::new("requests", [("status", "200"), ("method", "GET")]);
        assert_eq!(id.to_string(), "requests{method=GET, status=200}");
        assert_eq!(Id::new("bare", Tags::new()).to_string(), "bare");
    }

    #[test]
    fn with_tag_replaces_existing() {
        let id = Id::new("m", [("bucket", "old")]);
        let updated = id.with_tag("bucket", "new");
        assert_eq!(updated.tags().get("bucket"), Some("new"));
        assert_eq!(id.tags().get("bucket"), Some("old"));
    }
}
