//! Configuration for a migration run.
//!
//! The configuration is a TOML document loaded once at startup and passed by reference to
//! everything that needs it. Any missing or malformed key is fatal.
//!
//! ```toml
//! [source]
//! host = "ad.example.com"
//! port = 636
//! username = "CN=svc-migrate,CN=Users,DC=corp,DC=example"
//! password_env = "AD_PASSWORD"
//! use_ssl = true
//! base_dn = "DC=corp,DC=example"
//! object_classes = "user"
//!
//! [target]
//! host = "ldap.example.com"
//! port = 389
//! username = "cn=admin,dc=example,dc=com"
//! password = "secret"
//! use_ssl = false
//! base_dn = "dc=example,dc=com"
//! object_classes = "inetOrgPerson"
//!
//! [migration]
//! new_entry_prefix_attribute = "cn"
//! new_entry_suffix = "ou=people,dc=example,dc=com"
//! ```

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use validator::Validate;

use crate::dn::DistinguishedName;
use crate::error::{Error, Result};

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Top-level migration configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MigrationConfig {
    /// Directory entries are read from.
    #[validate(nested)]
    pub source: DirectorySettings,

    /// Directory entries are created in.
    #[validate(nested)]
    pub target: DirectorySettings,

    /// Run-wide migration rules.
    #[validate(nested)]
    #[serde(default)]
    pub migration: MigrationSettings,

    /// Per-category overrides, keyed by strategy name (e.g. `users`, `groups`).
    #[serde(default)]
    pub kinds: BTreeMap<String, KindSettings>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl MigrationConfig {
    /// Loads and checks a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the file cannot be read or parsed, or any check fails.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "reading migration configuration");
        let contents = std::fs::read_to_string(path).map_err(|err| {
            Error::ConfigError(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses and checks a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the document is malformed or any check fails.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.check()?;
        debug!(kinds = config.kinds.len(), "configuration loaded");
        Ok(config)
    }

    /// Runs the declarative rules plus the cross-field checks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the first problem found.
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;

        for (label, directory) in [("source", &self.source), ("target", &self.target)] {
            directory.check(label)?;
        }

        if let Some(suffix) = &self.migration.new_entry_suffix {
            parse_dn("migration.new_entry_suffix", suffix)?;
        }
        for (name, kind) in &self.kinds {
            kind.check(name)?;
        }
        Ok(())
    }
}

/// Connection and search parameters for one directory.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DirectorySettings {
    /// Server host name.
    #[validate(length(min = 1))]
    pub host: String,

    /// Server port.
    #[validate(range(min = 1))]
    pub port: u16,

    /// Bind identity (DN or principal name).
    #[validate(length(min = 1))]
    pub username: String,

    /// Bind password, inline.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Name of an environment variable holding the bind password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Connect with `ldaps://` instead of `ldap://`.
    #[serde(default)]
    pub use_ssl: bool,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional path to a custom CA certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert: Option<PathBuf>,

    /// Connection timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Per-operation timeout in seconds
    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,

    /// Search base for this directory.
    #[validate(length(min = 1))]
    pub base_dn: String,

    /// Object classes selecting the entries of the default strategy.
    #[serde(default)]
    pub object_classes: NameList,
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

const fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECS
}

impl DirectorySettings {
    /// Resolves the bind password, preferring the inline value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when neither source yields a password.
    pub fn resolve_password(&self) -> Result<SecretString> {
        if let Some(password) = &self.password {
            return Ok(SecretString::from(password.clone()));
        }
        let var = self.password_env.as_deref().ok_or_else(|| {
            Error::ConfigError(format!(
                "no password or password_env configured for {}",
                self.host
            ))
        })?;
        std::env::var(var)
            .map(SecretString::from)
            .map_err(|_| Error::ConfigError(format!("environment variable `{var}` is not set")))
    }

    /// Connection URL derived from host, port and `use_ssl`.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// Connection timeout as a Duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Operation timeout as a Duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    fn check(&self, label: &str) -> Result<()> {
        if self.password.is_none() && self.password_env.is_none() {
            return Err(Error::ConfigError(format!(
                "{label}: either password or password_env is required"
            )));
        }
        parse_dn(&format!("{label}.base_dn"), &self.base_dn)?;
        url::Url::parse(&self.url())?;
        Ok(())
    }
}

/// Run-wide rules.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MigrationSettings {
    /// Attribute whose first value becomes the RDN of a migrated entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_entry_prefix_attribute: Option<String>,

    /// Parent DN under which migrated entries are created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_entry_suffix: Option<String>,

    /// Entries migrated concurrently (1 = strictly sequential).
    #[validate(range(min = 1, max = 64))]
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Strategies run when none are requested explicitly.
    #[serde(default)]
    pub kinds: Vec<String>,
}

const fn default_concurrency() -> usize {
    1
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            new_entry_prefix_attribute: None,
            new_entry_suffix: None,
            concurrency: default_concurrency(),
            kinds: Vec::new(),
        }
    }
}

/// Overrides for one entry category. Every field falls back to a preset or the run-wide value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KindSettings {
    /// Search base in the source directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_base_dn: Option<String>,
    /// Object classes selecting source entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_object_classes: Option<NameList>,
    /// Search base for the target schema sample.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_base_dn: Option<String>,
    /// Object classes selecting the target schema sample.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_object_classes: Option<NameList>,
    /// RDN attribute for created entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_entry_prefix_attribute: Option<String>,
    /// Parent DN for created entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_entry_suffix: Option<String>,
    /// Only these attributes may be copied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_whitelist: Option<NameList>,
    /// Drop objectClass values the target sample does not carry.
    #[serde(default)]
    pub restrict_object_classes: bool,
}

impl KindSettings {
    fn check(&self, name: &str) -> Result<()> {
        let dns = [
            ("source_base_dn", &self.source_base_dn),
            ("target_base_dn", &self.target_base_dn),
            ("new_entry_suffix", &self.new_entry_suffix),
        ];
        for (field, value) in dns {
            if let Some(value) = value {
                parse_dn(&format!("kinds.{name}.{field}"), value)?;
            }
        }
        if self
            .new_entry_prefix_attribute
            .as_deref()
            .is_some_and(|attr| attr.trim().is_empty())
        {
            return Err(Error::ConfigError(format!(
                "kinds.{name}.new_entry_prefix_attribute cannot be empty"
            )));
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level or `EnvFilter` directive (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// List of names written either as a comma-separated string or as an array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawNameList", into = "Vec<String>")]
pub struct NameList(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNameList {
    Csv(String),
    Items(Vec<String>),
}

impl From<RawNameList> for NameList {
    fn from(raw: RawNameList) -> Self {
        let items = match raw {
            RawNameList::Csv(csv) => csv.split(',').map(str::to_string).collect(),
            RawNameList::Items(items) => items,
        };
        Self::new(items)
    }
}

impl From<NameList> for Vec<String> {
    fn from(list: NameList) -> Self {
        list.0
    }
}

impl NameList {
    /// Builds a list, trimming names and dropping blanks.
    #[must_use]
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            items
                .into_iter()
                .map(|item| item.as_ref().trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        )
    }

    /// Borrow the names.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Returns true if the list holds no names.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn parse_dn(field: &str, value: &str) -> Result<DistinguishedName> {
    DistinguishedName::parse(value)
        .map_err(|err| Error::ConfigError(format!("{field} is not a valid DN: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
        [source]
        host = "ad.example.com"
        port = 636
        username = "administrator@corp.example"
        password = "ad-secret"
        use_ssl = true
        tls_verify = false
        base_dn = "DC=corp,DC=example"
        object_classes = "top, person,user"

        [target]
        host = "ldap.example.com"
        port = 389
        username = "cn=admin,dc=example,dc=com"
        password_env = "DIRMIGRATE_TEST_TARGET_PASSWORD"
        base_dn = "dc=example,dc=com"
        object_classes = ["inetOrgPerson"]

        [migration]
        new_entry_prefix_attribute = "cn"
        new_entry_suffix = "ou=people,dc=example,dc=com"
        kinds = ["users", "groups"]

        [kinds.groups]
        new_entry_suffix = "ou=groups,dc=example,dc=com"
        attribute_whitelist = "cn,member,description"

        [logging]
        level = "debug"
    "#;

    #[test]
    fn parses_full_document() {
        let config = MigrationConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.source.url(), "ldaps://ad.example.com:636");
        assert_eq!(config.target.url(), "ldap://ldap.example.com:389");
        assert!(!config.source.tls_verify);
        assert!(config.target.tls_verify);
        assert_eq!(
            config.source.object_classes.as_slice(),
            &["top", "person", "user"]
        );
        assert_eq!(config.target.object_classes.as_slice(), &["inetOrgPerson"]);
        assert_eq!(
            config.target.operation_timeout(),
            Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS)
        );
        assert_eq!(config.migration.concurrency, 1);
        assert_eq!(config.migration.kinds, vec!["users", "groups"]);
        assert_eq!(
            config.kinds["groups"]
                .attribute_whitelist
                .as_ref()
                .unwrap()
                .as_slice(),
            &["cn", "member", "description"]
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn resolves_inline_password() {
        let config = MigrationConfig::from_toml_str(SAMPLE).unwrap();
        let password = config.source.resolve_password().unwrap();
        assert_eq!(password.expose_secret(), "ad-secret");
    }

    #[test]
    fn missing_env_password_is_a_config_error() {
        let config = MigrationConfig::from_toml_str(SAMPLE).unwrap();
        let err = config.target.resolve_password().unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn passwords_are_not_serialized() {
        let config = MigrationConfig::from_toml_str(SAMPLE).unwrap();
        let json = serde_json::to_string(&config.source).unwrap();
        assert!(!json.contains("ad-secret"));
    }

    #[test]
    fn rejects_malformed_documents() {
        let bad_suffix = SAMPLE.replace(
            "new_entry_suffix = \"ou=people,dc=example,dc=com\"",
            "new_entry_suffix = \"ou=people,\"",
        );
        assert!(matches!(
            MigrationConfig::from_toml_str(&bad_suffix),
            Err(Error::ConfigError(_))
        ));

        let no_password = SAMPLE.replace("password = \"ad-secret\"", "");
        assert!(MigrationConfig::from_toml_str(&no_password).is_err());

        let zero_port = SAMPLE.replace("port = 389", "port = 0");
        assert!(MigrationConfig::from_toml_str(&zero_port).is_err());

        let no_host = SAMPLE.replace("host = \"ldap.example.com\"", "");
        assert!(MigrationConfig::from_toml_str(&no_host).is_err());

        let unknown_kind_key = format!("{SAMPLE}\n[kinds.users]\nsuffix = \"dc=x\"\n");
        assert!(MigrationConfig::from_toml_str(&unknown_kind_key).is_err());
    }

    #[test]
    fn name_list_trims_and_drops_blanks() {
        let list = NameList::new([" cn ", "", "mail"]);
        assert_eq!(list.as_slice(), &["cn", "mail"]);
        assert!(NameList::default().is_empty());
    }
}
