//! Directory entries and their attribute maps.
//!
//! Attribute names are case-insensitive in LDAP, so [`AttributeMap`] enforces uniqueness under
//! ASCII case folding while keeping the spelling and position of the first occurrence. Values keep
//! their insertion order. There is no "null" value: a slot either holds a string or does not
//! exist, so copied value lists are always compact.

use serde::{Deserialize, Serialize};

/// A named, ordered multi-value field of a directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    values: Vec<String>,
}

impl Attribute {
    /// Creates an attribute from its name and values.
    #[must_use]
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Attribute name as spelled by the directory that produced it.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute values in source order.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// First value, if any.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    /// Returns true if the attribute carries no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the attribute is called `name` (case-insensitive).
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Lower-cased attribute name, the form used for schema lookups.
    #[must_use]
    pub fn normalized_name(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    /// Consumes the attribute and returns its values.
    #[must_use]
    pub fn into_values(self) -> Vec<String> {
        self.values
    }
}

/// Ordered mapping from case-insensitive attribute name to values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap {
    attributes: Vec<Attribute>,
}

impl AttributeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends values under `name`.
    ///
    /// If an attribute with the same name (case-insensitive) already exists, the values are
    /// appended to it; otherwise a new attribute is added at the end.
    pub fn insert<I, V>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        let values = values.into_iter().map(Into::into);
        match self.attributes.iter_mut().find(|attr| attr.is_named(&name)) {
            Some(existing) => existing.values.extend(values),
            None => self.attributes.push(Attribute {
                name,
                values: values.collect(),
            }),
        }
    }

    /// Adds a whole attribute, merging with an existing one of the same name.
    pub fn push(&mut self, attribute: Attribute) {
        let Attribute { name, values } = attribute;
        self.insert(name, values);
    }

    /// Looks up an attribute by name (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.is_named(name))
    }

    /// Values of the named attribute, if present.
    #[must_use]
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.get(name).map(Attribute::values)
    }

    /// Returns true if the map holds an attribute called `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over attributes in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.attributes.iter()
    }

    /// Attribute names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.attributes.iter().map(Attribute::name)
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true if there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl<'a> IntoIterator for &'a AttributeMap {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.iter()
    }
}

impl IntoIterator for AttributeMap {
    type Item = Attribute;
    type IntoIter = std::vec::IntoIter<Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.into_iter()
    }
}

impl FromIterator<Attribute> for AttributeMap {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        let mut map = Self::new();
        for attribute in iter {
            map.push(attribute);
        }
        map
    }
}

/// A directory entry: its distinguished name plus attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Distinguished name as returned by the directory.
    pub dn: String,
    /// Attribute map.
    pub attributes: AttributeMap,
}

impl Entry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: AttributeMap::new(),
        }
    }

    /// Builder-style helper that adds an attribute.
    #[must_use]
    pub fn with_attribute<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes.insert(name, values);
        self
    }

    /// Borrows the distinguished name.
    #[must_use]
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// First value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes.get(attribute).and_then(Attribute::first)
    }

    /// All values for the attribute.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes.values(attribute)
    }

    /// Iterates over the entry's attributes in stored order.
    pub fn attributes(&self) -> std::slice::Iter<'_, Attribute> {
        self.attributes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_merges_names_case_insensitively() {
        let mut map = AttributeMap::new();
        map.insert("objectClass", ["top", "person"]);
        map.insert("mail", ["a@x.com"]);
        map.insert("OBJECTCLASS", ["user"]);

        assert_eq!(map.len(), 2);
        let names: Vec<&str> = map.names().collect();
        assert_eq!(names, vec!["objectClass", "mail"]);
        assert_eq!(
            map.values("objectclass").unwrap(),
            &["top".to_string(), "person".to_string(), "user".to_string()]
        );
    }

    #[test]
    fn entry_lookups() {
        let entry = Entry::new("cn=alice,ou=users,dc=ad")
            .with_attribute("cn", ["alice"])
            .with_attribute("memberOf", Vec::<String>::new());

        assert_eq!(entry.first("CN"), Some("alice"));
        assert_eq!(entry.first("memberof"), None);
        assert!(entry.values("memberOf").unwrap().is_empty());
        assert!(entry.values("mail").is_none());
        assert_eq!(entry.attributes().count(), 2);
    }

    #[test]
    fn attribute_helpers() {
        let attribute = Attribute::new("givenName", ["Alice"]);
        assert!(attribute.is_named("GIVENNAME"));
        assert_eq!(attribute.normalized_name(), "givenname");
        assert_eq!(attribute.first(), Some("Alice"));
        assert_eq!(attribute.len(), 1);
        assert!(!attribute.is_empty());
    }

    #[test]
    fn collects_from_attributes() {
        let map: AttributeMap = vec![
            Attribute::new("cn", ["a"]),
            Attribute::new("CN", ["b"]),
            Attribute::new("sn", ["c"]),
        ]
        .into_iter()
        .collect();
        assert_eq!(map.len(), 2);
        assert_eq!(map.values("cn").unwrap().len(), 2);
    }
}
