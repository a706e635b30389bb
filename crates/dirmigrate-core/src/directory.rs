//! The directory capability consumed by the migration engine.
//!
//! The engine never talks to a network client directly. It goes through [`Directory`], which
//! the LDAP backend implements for real servers and [`MemoryDirectory`] implements in process.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::dn::DistinguishedName;
use crate::entry::{AttributeMap, Entry};
use crate::error::{Error, Result};
use crate::filter::{AttributeFilter, SearchFilter};

/// Abstract directory service: connect, search, create, release.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Short name used in logs and error messages (e.g. `source`, `target`).
    fn name(&self) -> &str;

    /// Establishes the connection used by later operations, if not already open.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be reached or rejects the credentials.
    async fn connect(&self) -> Result<()>;

    /// Searches the subtree below `base_dn` for entries matching every filter.
    ///
    /// `attributes` selects the attributes to return; `None` returns all user attributes.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection or the query fails.
    async fn search(
        &self,
        base_dn: &str,
        filters: &[AttributeFilter],
        attributes: Option<&[String]>,
    ) -> Result<Vec<Entry>>;

    /// Creates a new entry.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory rejects the entry or the connection fails.
    async fn add_entry(&self, dn: &str, attributes: &AttributeMap) -> Result<()>;

    /// Releases pooled connections. Calling it more than once is harmless.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection could not be closed cleanly.
    async fn destroy(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: Vec<Entry>,
    fail_connect: Option<String>,
    fail_search: Option<String>,
    fail_add: HashSet<String>,
    fail_destroy: Option<String>,
    connect_calls: usize,
    destroy_calls: usize,
}

/// In-process directory backed by a lock-protected entry list.
///
/// Useful as a stand-in for either side of a migration. Failures can be injected per operation.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    name: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    /// Creates a directory pre-populated with `entries`.
    #[must_use]
    pub fn with_entries(name: impl Into<String>, entries: Vec<Entry>) -> Self {
        let directory = Self::new(name);
        if let Ok(mut state) = directory.state.lock() {
            state.entries = entries;
        }
        directory
    }

    /// Makes every subsequent connect fail with the given message.
    #[must_use]
    pub fn fail_connect(self, message: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_connect = Some(message.into());
        }
        self
    }

    /// Makes every subsequent destroy fail with the given message.
    #[must_use]
    pub fn fail_destroy(self, message: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_destroy = Some(message.into());
        }
        self
    }

    /// Makes every subsequent search fail with the given message.
    #[must_use]
    pub fn fail_search(self, message: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_search = Some(message.into());
        }
        self
    }

    /// Makes `add_entry` fail for the given DN (compared case-insensitively).
    #[must_use]
    pub fn fail_add_for(self, dn: impl AsRef<str>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_add.insert(dn.as_ref().to_ascii_lowercase());
        }
        self
    }

    /// Snapshot of every stored entry, in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.state
            .lock()
            .map(|state| state.entries.clone())
            .unwrap_or_default()
    }

    /// Looks up a stored entry by DN (case-insensitive).
    #[must_use]
    pub fn get(&self, dn: &str) -> Option<Entry> {
        let wanted = DistinguishedName::parse(dn).ok()?;
        self.state.lock().ok()?.entries.iter().find_map(|entry| {
            DistinguishedName::parse(&entry.dn)
                .ok()
                .filter(|candidate| candidate.same_entry(&wanted))
                .map(|_| entry.clone())
        })
    }

    /// How many times [`Directory::connect`] has been called.
    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.connect_calls)
            .unwrap_or_default()
    }

    /// How many times [`Directory::destroy`] has been called.
    #[must_use]
    pub fn destroy_calls(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.destroy_calls)
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::InternalError(format!("{} directory lock poisoned", self.name)))
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.connect_calls += 1;
        if let Some(message) = &state.fail_connect {
            return Err(Error::directory(&self.name, message.clone()));
        }
        Ok(())
    }

    async fn search(
        &self,
        base_dn: &str,
        filters: &[AttributeFilter],
        attributes: Option<&[String]>,
    ) -> Result<Vec<Entry>> {
        let base = DistinguishedName::parse(base_dn)?;
        let filter = SearchFilter::from(filters);
        let state = self.lock()?;

        if let Some(message) = &state.fail_search {
            return Err(Error::directory(&self.name, message.clone()));
        }

        let found: Vec<Entry> = state
            .entries
            .iter()
            .filter(|entry| {
                DistinguishedName::parse(&entry.dn).is_ok_and(|dn| dn.is_within(&base))
            })
            .filter(|entry| filter.matches(entry))
            .map(|entry| project(entry, attributes))
            .collect();

        debug!(directory = %self.name, base_dn, %filter, found = found.len(), "memory search");
        Ok(found)
    }

    async fn add_entry(&self, dn: &str, attributes: &AttributeMap) -> Result<()> {
        let parsed = DistinguishedName::parse(dn)?;
        let mut state = self.lock()?;

        if state.fail_add.contains(&dn.to_ascii_lowercase()) {
            return Err(Error::directory(
                &self.name,
                format!("add rejected for {dn}"),
            ));
        }

        let exists = state.entries.iter().any(|entry| {
            DistinguishedName::parse(&entry.dn).is_ok_and(|existing| existing.same_entry(&parsed))
        });
        if exists {
            return Err(Error::Conflict(format!("entry {dn} already exists")));
        }

        state.entries.push(Entry {
            dn: parsed.to_string(),
            attributes: attributes.clone(),
        });
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.destroy_calls += 1;
        if let Some(message) = &state.fail_destroy {
            return Err(Error::directory(&self.name, message.clone()));
        }
        Ok(())
    }
}

fn project(entry: &Entry, attributes: Option<&[String]>) -> Entry {
    let Some(wanted) = attributes else {
        return entry.clone();
    };
    Entry {
        dn: entry.dn.clone(),
        attributes: entry
            .attributes()
            .filter(|attr| wanted.iter().any(|name| attr.is_named(name)))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> MemoryDirectory {
        MemoryDirectory::with_entries(
            "source",
            vec![
                Entry::new("cn=alice,ou=users,dc=ad")
                    .with_attribute("objectClass", ["top", "user"])
                    .with_attribute("cn", ["alice"])
                    .with_attribute("mail", ["alice@x.com"]),
                Entry::new("cn=admins,ou=groups,dc=ad")
                    .with_attribute("objectClass", ["top", "group"])
                    .with_attribute("cn", ["admins"]),
                Entry::new("cn=bob,ou=users,dc=elsewhere")
                    .with_attribute("objectClass", ["user"])
                    .with_attribute("cn", ["bob"]),
            ],
        )
    }

    #[tokio::test]
    async fn search_applies_base_and_filters() {
        let directory = people();
        let users = directory
            .search("dc=ad", &[AttributeFilter::object_class("user")], None)
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].dn, "cn=alice,ou=users,dc=ad");

        let everything = directory.search("dc=ad", &[], None).await.unwrap();
        assert_eq!(everything.len(), 2);
    }

    #[tokio::test]
    async fn search_projects_requested_attributes() {
        let directory = people();
        let wanted = vec!["MAIL".to_string()];
        let found = directory
            .search("ou=users,dc=ad", &[], Some(&wanted))
            .await
            .unwrap();
        assert_eq!(found[0].attributes.len(), 1);
        assert_eq!(found[0].first("mail"), Some("alice@x.com"));
    }

    #[tokio::test]
    async fn add_entry_rejects_duplicates_and_injected_failures() {
        let directory = MemoryDirectory::new("target").fail_add_for("cn=broken,dc=target");
        let mut attributes = AttributeMap::new();
        attributes.insert("cn", ["carol"]);

        directory
            .add_entry("cn=carol,dc=target", &attributes)
            .await
            .unwrap();
        let duplicate = directory.add_entry("CN=Carol,DC=target", &attributes).await;
        assert!(matches!(duplicate, Err(Error::Conflict(_))));

        let broken = directory.add_entry("cn=broken,dc=target", &attributes).await;
        assert!(matches!(broken, Err(Error::DirectoryError { .. })));

        assert_eq!(directory.entries().len(), 1);
        assert!(directory.get("cn=CAROL,dc=target").is_some());
    }

    #[tokio::test]
    async fn failing_search_and_idempotent_destroy() {
        let directory = people().fail_search("connection reset");
        let err = directory.search("dc=ad", &[], None).await.unwrap_err();
        assert_eq!(err, Error::directory("source", "connection reset"));

        directory.destroy().await.unwrap();
        directory.destroy().await.unwrap();
        assert_eq!(directory.destroy_calls(), 2);
    }

    #[tokio::test]
    async fn injected_connect_and_destroy_failures() {
        let directory = MemoryDirectory::new("target")
            .fail_connect("connection refused")
            .fail_destroy("unbind failed");

        let err = directory.connect().await.unwrap_err();
        assert_eq!(err, Error::directory("target", "connection refused"));
        assert_eq!(directory.connect_calls(), 1);

        let err = directory.destroy().await.unwrap_err();
        assert_eq!(err, Error::directory("target", "unbind failed"));
        assert_eq!(directory.destroy_calls(), 1);
    }
}
