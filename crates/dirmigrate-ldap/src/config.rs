//! Connection configuration for an LDAP directory.

use crate::Result;
use dirmigrate_core::config::{
    DirectorySettings, DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_OPERATION_TIMEOUT_SECS,
};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Bind identity and password.
pub struct BindCredentials {
    bind_dn: String,
    password: SecretString,
}

impl BindCredentials {
    /// Creates credentials from a bind identity and password.
    #[must_use]
    pub fn new(bind_dn: impl Into<String>, password: SecretString) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            password,
        }
    }

    /// Get the LDAP bind DN (or principal name).
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// Get the LDAP bind password.
    #[must_use]
    pub fn bind_password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for BindCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindCredentials")
            .field("bind_dn", &self.bind_dn)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Configuration for connecting to one LDAP directory.
#[derive(Debug)]
pub struct LdapConfig {
    name: String,
    url: String,
    credentials: BindCredentials,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
    connection_timeout_secs: u64,
    operation_timeout_secs: u64,
}

impl LdapConfig {
    /// Creates a new configuration.
    ///
    /// `name` labels the directory in logs and errors (e.g. `source`).
    ///
    /// # Errors
    ///
    /// Returns an error if the provided URL is invalid.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        credentials: BindCredentials,
    ) -> Result<Self> {
        let url_string = url.into();
        Url::parse(&url_string)?;

        Ok(Self {
            name: name.into(),
            url: url_string,
            credentials,
            tls_verify: true,
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        })
    }

    /// Builds the configuration from the `[source]` / `[target]` section of a migration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the password cannot be resolved.
    pub fn from_settings(name: impl Into<String>, settings: &DirectorySettings) -> Result<Self> {
        let credentials =
            BindCredentials::new(settings.username.clone(), settings.resolve_password()?);
        let mut config = Self::new(name, settings.url(), credentials)?
            .with_tls_verification(settings.tls_verify)
            .with_connection_timeout_secs(settings.connection_timeout_secs)
            .with_operation_timeout_secs(settings.operation_timeout_secs);
        if let Some(path) = &settings.tls_ca_cert {
            config = config.with_tls_ca_cert(path.clone());
        }
        Ok(config)
    }

    /// Label used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the bind credentials.
    #[must_use]
    pub const fn credentials(&self) -> &BindCredentials {
        &self.credentials
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirmigrate_core::config::NameList;
    use dirmigrate_core::Error;

    fn credentials() -> BindCredentials {
        BindCredentials::new(
            "cn=admin,dc=example,dc=com",
            SecretString::from("secret".to_string()),
        )
    }

    #[test]
    fn builder_overrides() {
        let config = LdapConfig::new("target", "ldaps://ldap.example.com", credentials())
            .unwrap()
            .with_connection_timeout_secs(20)
            .with_operation_timeout_secs(30)
            .with_tls_verification(false);

        assert_eq!(config.name(), "target");
        assert_eq!(config.connection_timeout(), Duration::from_secs(20));
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
        assert!(!config.tls_verify());
        assert_eq!(config.credentials().bind_password(), "secret");
    }

    #[test]
    fn rejects_invalid_url() {
        let result = LdapConfig::new("source", "not a url", credentials());
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn debug_output_redacts_password() {
        let rendered = format!("{:?}", credentials());
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn from_settings_builds_url_and_timeouts() {
        let settings = DirectorySettings {
            host: "ad.corp.example".to_string(),
            port: 636,
            username: "administrator@corp.example".to_string(),
            password: Some("pw".to_string()),
            password_env: None,
            use_ssl: true,
            tls_verify: false,
            tls_ca_cert: Some(PathBuf::from("/etc/ssl/ad-ca.pem")),
            connection_timeout_secs: 5,
            operation_timeout_secs: 120,
            base_dn: "DC=corp,DC=example".to_string(),
            object_classes: NameList::new(["user"]),
        };

        let config = LdapConfig::from_settings("source", &settings).unwrap();
        assert_eq!(config.url(), "ldaps://ad.corp.example:636");
        assert_eq!(config.credentials().bind_dn(), "administrator@corp.example");
        assert_eq!(config.operation_timeout(), Duration::from_secs(120));
        assert_eq!(
            config.tls_ca_cert(),
            Some(&PathBuf::from("/etc/ssl/ad-ca.pem"))
        );
    }
}
