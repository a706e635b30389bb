//! LDAP directory implementation.

use crate::{config::LdapConfig, Result};
use async_trait::async_trait;
use dirmigrate_core::{AttributeFilter, AttributeMap, Directory, Entry, Error, SearchFilter};
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Requests every user attribute.
const ALL_USER_ATTRIBUTES: &str = "*";

/// `entryAlreadyExists` (RFC 4511).
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<Entry>>;
    async fn add(&mut self, dn: &str, attributes: &AttributeMap) -> Result<()>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

type SessionSlot = Option<Box<dyn LdapSession>>;

/// Directory backed by an LDAP server.
///
/// One bound session is opened by [`Directory::connect`] (or on first use) and reused for every
/// search and add until [`Directory::destroy`] releases it. A session whose operation failed at
/// the connection level or timed out is dropped and reopened on the next call.
pub struct LdapDirectory {
    config: Arc<LdapConfig>,
    connector: Box<dyn LdapConnector>,
    session: Mutex<SessionSlot>,
    scope: SearchScope,
}

impl LdapDirectory {
    /// Creates a directory that uses the real LDAP connector.
    #[must_use]
    pub fn new(config: LdapConfig) -> Self {
        let config = Arc::new(config);
        let connector: Box<dyn LdapConnector> = Box::new(RealLdapConnector::new(config.clone()));
        Self {
            config,
            connector,
            session: Mutex::new(None),
            scope: SearchScope::Subtree,
        }
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_connector(config: LdapConfig, connector: Box<dyn LdapConnector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            session: Mutex::new(None),
            scope: SearchScope::Subtree,
        }
    }

    /// Overrides the search scope (subtree by default).
    #[must_use]
    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Returns the connection configuration.
    #[must_use]
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    async fn open_session(&self) -> Result<Box<dyn LdapSession>> {
        let credentials = self.config.credentials();
        info!(
            directory = %self.config.name(),
            url = %self.config.url(),
            bind_dn = %credentials.bind_dn(),
            "binding to directory"
        );
        let mut session = self
            .execute_with_timeout(self.connector.connect())
            .await?;
        self.execute_with_timeout(
            session.simple_bind(credentials.bind_dn(), credentials.bind_password()),
        )
        .await?;
        Ok(session)
    }

    async fn bound<'s>(&self, slot: &'s mut SessionSlot) -> Result<&'s mut Box<dyn LdapSession>> {
        let session = match slot.take() {
            Some(session) => session,
            None => self.open_session().await?,
        };
        Ok(slot.insert(session))
    }

    fn discard_on_failure<T>(&self, slot: &mut SessionSlot, result: &Result<T>) {
        if matches!(result, Err(Error::DirectoryError { .. } | Error::Timeout(_)))
            && slot.take().is_some()
        {
            warn!(directory = %self.name(), "dropping session after failed operation");
        }
    }

    async fn execute_with_timeout<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        timeout(self.config.operation_timeout(), fut)
            .await
            .map_err(|_| {
                Error::Timeout(format!("{} directory operation timed out", self.config.name()))
            })?
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    fn name(&self) -> &str {
        self.config.name()
    }

    async fn connect(&self) -> Result<()> {
        let mut slot = self.session.lock().await;
        self.bound(&mut slot).await?;
        Ok(())
    }

    async fn search(
        &self,
        base_dn: &str,
        filters: &[AttributeFilter],
        attributes: Option<&[String]>,
    ) -> Result<Vec<Entry>> {
        let filter = SearchFilter::from(filters).to_string();
        let attributes = attributes.map_or_else(
            || vec![ALL_USER_ATTRIBUTES.to_string()],
            <[String]>::to_vec,
        );
        debug!(directory = %self.name(), base_dn, filter = %filter, "searching");

        let mut slot = self.session.lock().await;
        let session = self.bound(&mut slot).await?;
        let result = self
            .execute_with_timeout(session.search(base_dn, self.scope, &filter, &attributes))
            .await;
        self.discard_on_failure(&mut slot, &result);
        let entries = result?;

        info!(directory = %self.name(), base_dn, found = entries.len(), "search completed");
        Ok(entries)
    }

    async fn add_entry(&self, dn: &str, attributes: &AttributeMap) -> Result<()> {
        debug!(directory = %self.name(), dn, attributes = attributes.len(), "adding entry");

        let mut slot = self.session.lock().await;
        let session = self.bound(&mut slot).await?;
        let result = self.execute_with_timeout(session.add(dn, attributes)).await;
        self.discard_on_failure(&mut slot, &result);
        result
    }

    async fn destroy(&self) -> Result<()> {
        let Some(mut session) = self.session.lock().await.take() else {
            return Ok(());
        };
        debug!(directory = %self.name(), "releasing connection");
        self.execute_with_timeout(session.unbind()).await
    }
}

/// Real LDAP connector backed by `ldap3`.
struct RealLdapConnector {
    config: Arc<LdapConfig>,
}

impl RealLdapConnector {
    fn new(config: Arc<LdapConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let name = self.config.name().to_string();
        let settings = build_ldap_settings(&self.config)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, self.config.url())
            .await
            .map_err(|err| map_ldap_error(&name, &err))?;
        ldap3::drive!(conn);
        Ok(Box::new(RealLdapSession { name, inner: ldap }))
    }
}

/// Session over an `ldap3` handle. Timeouts are applied by [`LdapDirectory`].
struct RealLdapSession {
    name: String,
    inner: ldap3::Ldap,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = self
            .inner
            .simple_bind(dn, password)
            .await
            .map_err(|err| map_ldap_error(&self.name, &err))?;
        ensure_success(&self.name, dn, result)
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<Entry>> {
        let result = self
            .inner
            .search(base_dn, scope.into(), filter, attributes.to_vec())
            .await
            .map_err(|err| map_ldap_error(&self.name, &err))?;
        let (entries, _) = result
            .success()
            .map_err(|err| map_ldap_error(&self.name, &err))?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(entry_from_search)
            .collect())
    }

    async fn add(&mut self, dn: &str, attributes: &AttributeMap) -> Result<()> {
        let attrs = attributes
            .iter()
            .map(|attr| {
                (
                    attr.name().to_string(),
                    attr.values().iter().cloned().collect::<HashSet<_>>(),
                )
            })
            .collect::<Vec<_>>();

        let result = self
            .inner
            .add(dn, attrs)
            .await
            .map_err(|err| map_ldap_error(&self.name, &err))?;
        ensure_success(&self.name, dn, result)
    }

    async fn unbind(&mut self) -> Result<()> {
        self.inner
            .unbind()
            .await
            .map_err(|err| map_ldap_error(&self.name, &err))
    }
}

fn build_ldap_settings(config: &LdapConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout());

    if !config.tls_verify() {
        warn!(directory = %config.name(), "TLS certificate verification disabled");
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::ConfigError(format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| Error::ConfigError(format!("failed to load CA certificate: {err}")))?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(directory: &str, err: &ldap3::LdapError) -> Error {
    Error::directory(directory, err.to_string())
}

fn ensure_success(directory: &str, dn: &str, result: ldap3::LdapResult) -> Result<()> {
    if result.rc == RC_ENTRY_ALREADY_EXISTS {
        return Err(Error::Conflict(format!("entry {dn} already exists")));
    }
    result
        .success()
        .map(|_| ())
        .map_err(|err| map_ldap_error(directory, &err))
}

/// Converts a search result into an [`Entry`].
///
/// Attributes are ordered by name so iteration is reproducible across runs. Binary attributes
/// (`objectGUID`, `objectSid`, ...) have no string form and are left out.
fn entry_from_search(entry: SearchEntry) -> Entry {
    if !entry.bin_attrs.is_empty() {
        let mut skipped: Vec<&str> = entry.bin_attrs.keys().map(String::as_str).collect();
        skipped.sort_unstable();
        debug!(dn = %entry.dn, ?skipped, "skipping binary attributes");
    }

    let mut attrs: Vec<(String, Vec<String>)> = entry.attrs.into_iter().collect();
    attrs.sort_by_key(|(name, _)| name.to_ascii_lowercase());

    let mut converted = Entry::new(entry.dn);
    for (name, values) in attrs {
        converted.attributes.insert(name, values);
    }
    converted
}
