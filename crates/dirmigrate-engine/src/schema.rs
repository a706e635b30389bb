//! Target schema approximation derived from a sample entry.

use dirmigrate_core::Entry;
use std::collections::HashSet;
use tracing::debug;

/// Attribute names and objectClass values the target directory is known to accept.
///
/// Built once per run from the first entry of a target search and shared read-only afterwards.
/// The target schema is assumed to be uniform across the entries that search returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    attribute_names: HashSet<String>,
    object_class_values: HashSet<String>,
}

impl SchemaSnapshot {
    /// Builds a snapshot from the first of `samples`.
    ///
    /// Returns `None` when there is no sample, which callers treat as "no filtering".
    #[must_use]
    pub fn from_samples(samples: &[Entry]) -> Option<Self> {
        let sample = samples.first()?;
        let snapshot = Self::from_entry(sample);
        debug!(
            sample = %sample.dn,
            attributes = snapshot.attribute_names.len(),
            object_classes = snapshot.object_class_values.len(),
            "schema snapshot built"
        );
        Some(snapshot)
    }

    /// Builds a snapshot from a single entry.
    #[must_use]
    pub fn from_entry(entry: &Entry) -> Self {
        let mut snapshot = Self::default();
        for attribute in entry.attributes() {
            snapshot.attribute_names.insert(attribute.normalized_name());
            if attribute.is_named("objectClass") {
                snapshot
                    .object_class_values
                    .extend(attribute.values().iter().cloned());
            }
        }
        snapshot
    }

    /// Returns true if the target accepts the attribute (case-insensitive).
    #[must_use]
    pub fn accepts_attribute(&self, name: &str) -> bool {
        self.attribute_names.contains(&name.to_ascii_lowercase())
    }

    /// Returns true if the target sample carries the objectClass value (case-insensitive).
    #[must_use]
    pub fn accepts_object_class(&self, value: &str) -> bool {
        self.object_class_values
            .iter()
            .any(|known| known.eq_ignore_ascii_case(value))
    }

    /// Lower-cased attribute names.
    #[must_use]
    pub fn attribute_names(&self) -> &HashSet<String> {
        &self.attribute_names
    }

    /// objectClass values exactly as the sample carried them.
    #[must_use]
    pub fn object_class_values(&self) -> &HashSet<String> {
        &self.object_class_values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(dn: &str) -> Entry {
        Entry::new(dn)
            .with_attribute("objectClass", ["top", "inetOrgPerson"])
            .with_attribute("CN", ["sample"])
            .with_attribute("givenName", ["Sam"])
            .with_attribute("seeAlso", Vec::<String>::new())
    }

    #[test]
    fn no_samples_means_no_snapshot() {
        assert!(SchemaSnapshot::from_samples(&[]).is_none());
    }

    #[test]
    fn only_the_first_sample_is_used() {
        let other = Entry::new("cn=other,dc=target").with_attribute("description", ["x"]);
        let snapshot =
            SchemaSnapshot::from_samples(&[person("cn=sample,dc=target"), other]).unwrap();

        assert!(snapshot.accepts_attribute("cn"));
        assert!(snapshot.accepts_attribute("GIVENNAME"));
        assert!(snapshot.accepts_attribute("seealso"));
        assert!(!snapshot.accepts_attribute("description"));
        assert!(snapshot.attribute_names().contains("objectclass"));
    }

    #[test]
    fn object_class_values_are_collected_raw() {
        let snapshot = SchemaSnapshot::from_entry(&person("cn=sample,dc=target"));
        let mut values: Vec<&String> = snapshot.object_class_values().iter().collect();
        values.sort();
        assert_eq!(values, vec!["inetOrgPerson", "top"]);
        assert!(snapshot.accepts_object_class("INETORGPERSON"));
        assert!(!snapshot.accepts_object_class("user"));
    }
}
