//! LDAP backend for directory migration.
//!
//! This crate implements [`dirmigrate_core::Directory`] on top of `ldap3`, so the same engine can
//! read from Active Directory and write to OpenLDAP (or any other LDAPv3 server).

#![deny(missing_docs)]

mod client;
mod config;

pub use client::{LdapDirectory, SearchScope};
pub use config::{BindCredentials, LdapConfig};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = dirmigrate_core::Result<T>;
