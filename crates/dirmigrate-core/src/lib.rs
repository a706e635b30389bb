//! # dirmigrate-core
//!
//! Core types and utilities for migrating directory-service entries.
//!
//! This crate provides the entry model, search filters, distinguished names, error handling,
//! configuration, and the [`Directory`] capability that the migration engine drives.
//!
//! ## Modules
//!
//! - [`error`] - Error type shared by every crate in the workspace
//! - [`entry`] - Directory entries and case-insensitive attribute maps
//! - [`filter`] - Attribute filters and RFC 4515 filter rendering
//! - [`dn`] - Distinguished name parsing and escaping
//! - [`directory`] - The directory capability trait and an in-memory implementation
//! - [`config`] - File-based migration configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod directory;
pub mod dn;
pub mod entry;
pub mod error;
pub mod filter;

// Re-export commonly used types
pub use directory::{Directory, MemoryDirectory};
pub use dn::{DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use entry::{Attribute, AttributeMap, Entry};
pub use error::{Error, Result};
pub use filter::{AttributeFilter, FilterOperator, SearchFilter};
