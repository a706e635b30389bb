//! Attribute filters and LDAP search filter rendering.
//!
//! A migration run selects entries with a list of [`AttributeFilter`]s combined with logical AND,
//! typically one `objectClass` equality per configured object class. [`SearchFilter`] renders
//! that list into an RFC 4515 filter string for the wire, and [`AttributeFilter::matches`]
//! evaluates it in memory.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entry::Entry;

/// Comparison applied by an [`AttributeFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum FilterOperator {
    /// `(attr=value)`
    Equals,
    /// `(!(attr=value))`
    NotEquals,
    /// `(attr>=value)`
    GreaterOrEqual,
    /// `(attr<=value)`
    LessOrEqual,
    /// `(attr~=value)`
    Approx,
    /// `(attr=*)`; the comparison value is ignored.
    Present,
    /// `(attr=*value*)`
    Substring,
}

/// Single attribute comparison used to build a directory search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFilter {
    /// Attribute to compare.
    pub attribute: String,
    /// Comparison value (unescaped).
    pub value: String,
    /// Comparison operator.
    pub operator: FilterOperator,
}

impl AttributeFilter {
    /// Creates a new filter.
    #[must_use]
    pub fn new(
        attribute: impl Into<String>,
        value: impl Into<String>,
        operator: FilterOperator,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
            operator,
        }
    }

    /// Shorthand for an equality filter.
    #[must_use]
    pub fn equals(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(attribute, value, FilterOperator::Equals)
    }

    /// Equality filter on `objectClass`.
    #[must_use]
    pub fn object_class(value: impl Into<String>) -> Self {
        Self::equals("objectClass", value)
    }

    /// Evaluates the filter against an entry.
    ///
    /// Attribute names and values compare case-insensitively, the default matching rule for
    /// the directory string syntax.
    #[must_use]
    pub fn matches(&self, entry: &Entry) -> bool {
        let values = entry.values(&self.attribute).unwrap_or_default();
        let wanted = self.value.to_ascii_lowercase();
        let mut lowered = values.iter().map(|value| value.to_ascii_lowercase());

        match self.operator {
            FilterOperator::Equals | FilterOperator::Approx => lowered.any(|v| v == wanted),
            FilterOperator::NotEquals => lowered.all(|v| v != wanted),
            FilterOperator::GreaterOrEqual => lowered.any(|v| v >= wanted),
            FilterOperator::LessOrEqual => lowered.any(|v| v <= wanted),
            FilterOperator::Present => !values.is_empty(),
            FilterOperator::Substring => lowered.any(|v| v.contains(&wanted)),
        }
    }
}

impl fmt::Display for AttributeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attribute = &self.attribute;
        let value = escape_filter_value(&self.value);
        match self.operator {
            FilterOperator::Equals => write!(f, "({attribute}={value})"),
            FilterOperator::NotEquals => write!(f, "(!({attribute}={value}))"),
            FilterOperator::GreaterOrEqual => write!(f, "({attribute}>={value})"),
            FilterOperator::LessOrEqual => write!(f, "({attribute}<={value})"),
            FilterOperator::Approx => write!(f, "({attribute}~={value})"),
            FilterOperator::Present => write!(f, "({attribute}=*)"),
            FilterOperator::Substring => write!(f, "({attribute}=*{value}*)"),
        }
    }
}

/// Builder for a conjunction of attribute filters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    filters: Vec<AttributeFilter>,
}

impl SearchFilter {
    /// Create a new, empty filter (matches every entry).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One `objectClass` equality per class, combined with AND.
    #[must_use]
    pub fn object_classes<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filters: classes.into_iter().map(AttributeFilter::object_class).collect(),
        }
    }

    /// Append a filter.
    pub fn push(&mut self, filter: AttributeFilter) {
        self.filters.push(filter);
    }

    /// Borrow the collected filters.
    #[must_use]
    pub fn filters(&self) -> &[AttributeFilter] {
        &self.filters
    }

    /// Return the collected filters.
    #[must_use]
    pub fn into_filters(self) -> Vec<AttributeFilter> {
        self.filters
    }

    /// Returns true if no filters have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Returns true if the entry satisfies every filter.
    #[must_use]
    pub fn matches(&self, entry: &Entry) -> bool {
        self.filters.iter().all(|filter| filter.matches(entry))
    }
}

impl From<Vec<AttributeFilter>> for SearchFilter {
    fn from(filters: Vec<AttributeFilter>) -> Self {
        Self { filters }
    }
}

impl From<&[AttributeFilter]> for SearchFilter {
    fn from(filters: &[AttributeFilter]) -> Self {
        Self {
            filters: filters.to_vec(),
        }
    }
}

impl fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.filters.as_slice() {
            [] => f.write_str("(objectClass=*)"),
            [single] => write!(f, "{single}"),
            many => {
                f.write_str("(&")?;
                for filter in many {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Escapes special characters in a filter assertion value (RFC 4515).
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_single_and_conjunction() {
        let single = SearchFilter::object_classes(["user"]);
        assert_eq!(single.to_string(), "(objectClass=user)");

        let both = SearchFilter::object_classes(["top", "person"]);
        assert_eq!(both.to_string(), "(&(objectClass=top)(objectClass=person))");

        assert_eq!(SearchFilter::new().to_string(), "(objectClass=*)");
    }

    #[test]
    fn renders_every_operator() {
        let cases = [
            (FilterOperator::NotEquals, "(!(uid=bob))"),
            (FilterOperator::GreaterOrEqual, "(uid>=bob)"),
            (FilterOperator::LessOrEqual, "(uid<=bob)"),
            (FilterOperator::Approx, "(uid~=bob)"),
            (FilterOperator::Present, "(uid=*)"),
            (FilterOperator::Substring, "(uid=*bob*)"),
        ];
        for (operator, expected) in cases {
            assert_eq!(AttributeFilter::new("uid", "bob", operator).to_string(), expected);
        }
    }

    #[test]
    fn escapes_assertion_values() {
        let filter = AttributeFilter::equals("cn", "a*(b)\\c");
        assert_eq!(filter.to_string(), "(cn=a\\2a\\28b\\29\\5cc)");
    }

    #[test]
    fn matches_entries_in_memory() {
        let entry = Entry::new("cn=alice,dc=ad")
            .with_attribute("objectClass", ["top", "Person", "user"])
            .with_attribute("mail", ["alice@x.com"]);

        assert!(AttributeFilter::object_class("person").matches(&entry));
        assert!(!AttributeFilter::object_class("group").matches(&entry));
        assert!(AttributeFilter::new("mail", "", FilterOperator::Present).matches(&entry));
        assert!(!AttributeFilter::new("sn", "", FilterOperator::Present).matches(&entry));
        assert!(AttributeFilter::new("mail", "@X.COM", FilterOperator::Substring).matches(&entry));
        assert!(AttributeFilter::new("objectClass", "group", FilterOperator::NotEquals)
            .matches(&entry));

        let filter = SearchFilter::object_classes(["user", "person"]);
        assert!(filter.matches(&entry));
        assert!(SearchFilter::new().matches(&entry));
    }
}
