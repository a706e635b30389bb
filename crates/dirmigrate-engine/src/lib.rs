//! Entry transformation and migration engine.
//!
//! A run discovers which attributes the target accepts from one sample entry
//! ([`SchemaSnapshot`]), derives a new DN and a filtered attribute set for every source entry
//! ([`EntryTransformer`]), and creates the entries one by one ([`Migrator`]) so that a failing
//! entry is recorded and the batch carries on. [`EntryStrategy`] parameterizes all of it per entry
//! category (users, groups, ...).

#![deny(missing_docs)]

mod driver;
mod outcome;
mod schema;
mod strategy;
mod transform;

pub use driver::Migrator;
pub use outcome::{KindReport, MigrationOutcome, MigrationReport, MigrationSummary, SkipReason};
pub use schema::SchemaSnapshot;
pub use strategy::{EntryKind, EntryStrategy, SearchQuery, StrategyRegistry, DEFAULT_STRATEGY};
pub use transform::{transform, DnRule, EntryTransformer, TransformedEntry};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = dirmigrate_core::Result<T>;
