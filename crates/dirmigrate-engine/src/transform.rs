//! Source entry to target entry transformation.

use crate::schema::SchemaSnapshot;
use crate::Result;
use dirmigrate_core::{
    Attribute, AttributeMap, DistinguishedName, Entry, Error, RelativeDistinguishedName,
};
use std::collections::HashSet;
use tracing::{debug, trace};

/// How a migrated entry is named: `<prefix attribute>=<its first value>,<suffix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnRule {
    prefix_attribute: String,
    suffix: DistinguishedName,
}

impl DnRule {
    /// Creates a rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the prefix attribute is blank or the suffix is not a DN.
    pub fn new(prefix_attribute: impl Into<String>, suffix: &str) -> Result<Self> {
        let prefix_attribute = prefix_attribute.into().trim().to_string();
        if prefix_attribute.is_empty() {
            return Err(Error::ConfigError(
                "new entry prefix attribute cannot be empty".to_string(),
            ));
        }
        let suffix = DistinguishedName::parse(suffix).map_err(|err| {
            Error::ConfigError(format!("new entry suffix `{suffix}` is not a valid DN: {err}"))
        })?;
        Ok(Self {
            prefix_attribute,
            suffix,
        })
    }

    /// Attribute whose first value names the new entry.
    #[must_use]
    pub fn prefix_attribute(&self) -> &str {
        &self.prefix_attribute
    }

    /// Parent DN of every new entry.
    #[must_use]
    pub fn suffix(&self) -> &DistinguishedName {
        &self.suffix
    }

    /// Builds the DN for a given RDN value.
    #[must_use]
    pub fn derive(&self, value: &str) -> DistinguishedName {
        DistinguishedName::child_of(
            &self.suffix,
            RelativeDistinguishedName::new(self.prefix_attribute.clone(), value),
        )
    }
}

/// Result of transforming one source entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedEntry {
    /// New DN, or `None` when no attribute satisfied the prefix rule.
    pub dn: Option<DistinguishedName>,
    /// Attributes to create the entry with.
    pub attributes: AttributeMap,
}

/// Applies a [`DnRule`] and the attribute filters of a run to source entries.
///
/// An attribute is copied when it has at least one value and, if a schema snapshot is known,
/// the target sample carries it. An optional whitelist narrows that further.
#[derive(Debug, Clone, Copy)]
pub struct EntryTransformer<'a> {
    rule: &'a DnRule,
    schema: Option<&'a SchemaSnapshot>,
    whitelist: Option<&'a HashSet<String>>,
    restrict_object_classes: bool,
}

impl<'a> EntryTransformer<'a> {
    /// Creates a transformer. `schema == None` disables schema filtering.
    #[must_use]
    pub fn new(rule: &'a DnRule, schema: Option<&'a SchemaSnapshot>) -> Self {
        Self {
            rule,
            schema,
            whitelist: None,
            restrict_object_classes: false,
        }
    }

    /// Only copy attributes whose lower-cased name is in `whitelist`.
    #[must_use]
    pub fn with_whitelist(mut self, whitelist: Option<&'a HashSet<String>>) -> Self {
        self.whitelist = whitelist;
        self
    }

    /// Drop objectClass values the schema sample does not carry.
    #[must_use]
    pub fn restrict_object_classes(mut self, restrict: bool) -> Self {
        self.restrict_object_classes = restrict;
        self
    }

    /// Transforms one entry. Never fails; unusable attributes are left out.
    ///
    /// When several attributes could name the entry, the first one in stored order wins.
    /// [`AttributeMap`] keeps names unique case-insensitively, so in practice at most one
    /// attribute matches the prefix rule.
    #[must_use]
    pub fn transform(&self, source: &Entry) -> TransformedEntry {
        let mut dn = None;
        let mut attributes = AttributeMap::new();

        for attribute in source.attributes() {
            if dn.is_none() && attribute.is_named(self.rule.prefix_attribute()) {
                if let Some(first) = attribute.first() {
                    let derived = self.rule.derive(first);
                    debug!(source = %source.dn, dn = %derived, "derived new DN");
                    dn = Some(derived);
                }
            }

            if !self.includes(attribute) {
                trace!(source = %source.dn, attribute = attribute.name(), "attribute dropped");
                continue;
            }

            let values = self.copy_values(attribute);
            if values.is_empty() {
                continue;
            }
            debug!(
                source = %source.dn,
                attribute = attribute.name(),
                values = ?values,
                "copying attribute"
            );
            attributes.insert(attribute.name(), values);
        }

        TransformedEntry { dn, attributes }
    }

    fn includes(&self, attribute: &Attribute) -> bool {
        if attribute.is_empty() {
            return false;
        }
        if let Some(schema) = self.schema {
            if !schema.accepts_attribute(attribute.name()) {
                return false;
            }
        }
        self.whitelist
            .map_or(true, |allowed| allowed.contains(&attribute.normalized_name()))
    }

    fn copy_values(&self, attribute: &Attribute) -> Vec<String> {
        match self.schema {
            Some(schema) if self.restrict_object_classes && attribute.is_named("objectClass") => {
                attribute
                    .values()
                    .iter()
                    .filter(|value| schema.accepts_object_class(value))
                    .cloned()
                    .collect()
            }
            _ => attribute.values().to_vec(),
        }
    }
}

/// Transforms `source` with only the schema filter applied.
#[must_use]
pub fn transform(
    source: &Entry,
    schema: Option<&SchemaSnapshot>,
    rule: &DnRule,
) -> TransformedEntry {
    EntryTransformer::new(rule, schema).transform(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Entry {
        Entry::new("cn=alice,ou=users,dc=ad")
            .with_attribute("cn", ["alice"])
            .with_attribute("mail", ["alice@x.com"])
            .with_attribute("badAttr", ["x"])
    }

    fn people_rule() -> DnRule {
        DnRule::new("cn", "ou=people,dc=target").unwrap()
    }

    fn schema_of(names: &[&str]) -> SchemaSnapshot {
        let mut sample = Entry::new("cn=sample,ou=people,dc=target");
        for name in names {
            sample.attributes.insert(*name, ["v"]);
        }
        SchemaSnapshot::from_entry(&sample)
    }

    #[test]
    fn derives_dn_and_drops_unknown_attributes() {
        let schema = schema_of(&["cn", "mail"]);
        let result = transform(&alice(), Some(&schema), &people_rule());

        assert_eq!(
            result.dn.unwrap().as_str(),
            "cn=alice,ou=people,dc=target"
        );
        let names: Vec<&str> = result.attributes.names().collect();
        assert_eq!(names, vec!["cn", "mail"]);
        assert_eq!(
            result.attributes.values("mail").unwrap(),
            &["alice@x.com".to_string()]
        );
    }

    #[test]
    fn no_schema_copies_every_non_empty_attribute() {
        let entry = alice().with_attribute("memberOf", Vec::<String>::new());
        let result = transform(&entry, None, &people_rule());

        let names: Vec<&str> = result.attributes.names().collect();
        assert_eq!(names, vec!["cn", "mail", "badAttr"]);
    }

    #[test]
    fn empty_attributes_are_dropped_even_when_schema_knows_them() {
        let entry = alice().with_attribute("telephoneNumber", Vec::<String>::new());
        let schema = schema_of(&["cn", "telephoneNumber"]);
        let result = transform(&entry, Some(&schema), &people_rule());
        assert!(!result.attributes.contains("telephoneNumber"));
    }

    #[test]
    fn missing_prefix_attribute_yields_no_dn() {
        let entry = Entry::new("cn=svc,dc=ad").with_attribute("mail", ["svc@x.com"]);
        let result = transform(&entry, None, &people_rule());
        assert!(result.dn.is_none());
        assert!(result.attributes.contains("mail"));

        let empty_prefix = Entry::new("cn=svc,dc=ad").with_attribute("cn", Vec::<String>::new());
        assert!(transform(&empty_prefix, None, &people_rule()).dn.is_none());
    }

    #[test]
    fn prefix_matches_case_insensitively_and_uses_first_value() {
        let entry = Entry::new("cn=x,dc=ad").with_attribute("CN", ["Alice Smith", "alice"]);
        let result = transform(&entry, None, &people_rule());
        assert_eq!(
            result.dn.unwrap().as_str(),
            "cn=Alice Smith,ou=people,dc=target"
        );
    }

    #[test]
    fn dn_derivation_is_independent_of_attribute_order() {
        let forward = Entry::new("cn=a,dc=ad")
            .with_attribute("uid", ["asmith"])
            .with_attribute("cn", ["alice"]);
        let reverse = Entry::new("cn=a,dc=ad")
            .with_attribute("cn", ["alice"])
            .with_attribute("uid", ["asmith"]);

        let rule = people_rule();
        let first = transform(&forward, None, &rule).dn;
        let second = transform(&reverse, None, &rule).dn;
        assert_eq!(first, second);
        assert_eq!(transform(&forward, None, &rule).dn, first);
    }

    #[test]
    fn duplicate_spellings_merge_so_first_value_names_the_entry() {
        // The second spelling merges into the first attribute rather than competing with it.
        let entry = Entry::new("cn=a,dc=ad")
            .with_attribute("cn", ["first"])
            .with_attribute("CN", ["second"]);
        let result = transform(&entry, None, &people_rule());
        assert_eq!(result.dn.unwrap().get("cn"), Some("first"));
        assert_eq!(result.attributes.values("cn").unwrap().len(), 2);
    }

    #[test]
    fn derived_dn_escapes_special_characters() {
        let entry = Entry::new("cn=x,dc=ad").with_attribute("cn", ["Smith, John"]);
        let result = transform(&entry, None, &people_rule());
        assert_eq!(
            result.dn.unwrap().as_str(),
            "cn=Smith\\, John,ou=people,dc=target"
        );
    }

    #[test]
    fn whitelist_narrows_the_copy() {
        let whitelist: HashSet<String> = ["mail".to_string()].into_iter().collect();
        let rule = people_rule();
        let result = EntryTransformer::new(&rule, None)
            .with_whitelist(Some(&whitelist))
            .transform(&alice());

        assert_eq!(result.dn.unwrap().get("cn"), Some("alice"));
        let names: Vec<&str> = result.attributes.names().collect();
        assert_eq!(names, vec!["mail"]);
    }

    #[test]
    fn object_classes_can_be_restricted_to_the_sample() {
        let entry = alice().with_attribute("objectClass", ["top", "person", "user"]);
        let mut sample = Entry::new("cn=sample,dc=target");
        sample.attributes.insert("objectClass", ["top", "Person"]);
        sample.attributes.insert("cn", ["sample"]);
        let schema = SchemaSnapshot::from_entry(&sample);
        let rule = people_rule();

        let restricted = EntryTransformer::new(&rule, Some(&schema))
            .restrict_object_classes(true)
            .transform(&entry);
        assert_eq!(
            restricted.attributes.values("objectClass").unwrap(),
            &["top".to_string(), "person".to_string()]
        );

        let unrestricted = EntryTransformer::new(&rule, Some(&schema)).transform(&entry);
        assert_eq!(unrestricted.attributes.values("objectClass").unwrap().len(), 3);
    }

    #[test]
    fn dn_rule_rejects_bad_input() {
        assert!(matches!(
            DnRule::new("  ", "ou=people,dc=target"),
            Err(Error::ConfigError(_))
        ));
        assert!(matches!(
            DnRule::new("cn", "ou=people,"),
            Err(Error::ConfigError(_))
        ));
    }
}
