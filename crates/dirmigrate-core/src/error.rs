//! Error types for directory migration.
//!
//! Every crate in the workspace reports failures through [`Error`], so a per-entry failure from
//! the LDAP backend can be stored verbatim in a migration outcome and compared in tests.

use thiserror::Error;

use crate::dn::DistinguishedNameError;

/// Main error type for migration operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Failed to parse a document (report, config fragment)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The directory service rejected or failed an operation
    #[error("Directory error: {directory}: {message}")]
    DirectoryError {
        /// Name of the directory that failed (e.g. `source`, `target`)
        directory: String,
        /// Error message
        message: String,
    },

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed distinguished name
    #[error("Invalid distinguished name: {0}")]
    InvalidDn(String),

    /// The entry already exists in the directory
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Specialized result type for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::DirectoryError { .. } => "DIRECTORY_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidDn(_) => "INVALID_DN",
            Self::Conflict(_) => "CONFLICT",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a [`Error::DirectoryError`] for the named directory.
    #[must_use]
    pub fn directory(directory: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DirectoryError {
            directory: directory.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error should be logged as a serious error.
    ///
    /// Conflicts and malformed DNs concern one entry and are reported at warn level.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::InternalError(_)
                | Self::ConfigError(_)
                | Self::DirectoryError { .. }
                | Self::Timeout(_)
        )
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid directory URL: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<DistinguishedNameError> for Error {
    fn from(err: DistinguishedNameError) -> Self {
        Self::InvalidDn(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_errors_name_the_directory() {
        let err = Error::directory("source", "connection refused");
        assert_eq!(err.error_code(), "DIRECTORY_ERROR");
        assert_eq!(err.to_string(), "Directory error: source: connection refused");
        assert!(err.should_log());
    }

    #[test]
    fn per_entry_errors_are_not_serious() {
        let conflict = Error::Conflict("cn=alice,ou=people,dc=target".to_string());
        assert_eq!(conflict.error_code(), "CONFLICT");
        assert!(!conflict.should_log());
        assert!(!Error::InvalidDn("cn=".to_string()).should_log());
        assert!(Error::Timeout("target add".to_string()).should_log());
    }

    #[test]
    fn conversions_pick_the_matching_variant() {
        let url: Error = url::Url::parse("ldap//missing-colon").unwrap_err().into();
        assert_eq!(url.error_code(), "CONFIG_ERROR");

        let toml: Error = toml::from_str::<toml::Value>("port = ").unwrap_err().into();
        assert_eq!(toml.error_code(), "CONFIG_ERROR");

        let json: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(json.error_code(), "PARSE_ERROR");

        let dn: Error = DistinguishedNameError::UnterminatedEscape.into();
        assert_eq!(
            dn,
            Error::InvalidDn(
                "distinguished name contains an unterminated escape sequence".to_string()
            )
        );
    }
}
