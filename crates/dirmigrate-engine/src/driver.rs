//! Migration driver: one run over one or more strategies.

use crate::outcome::{KindReport, MigrationOutcome, MigrationReport, MigrationSummary, SkipReason};
use crate::schema::SchemaSnapshot;
use crate::strategy::{EntryStrategy, SearchQuery};
use crate::transform::EntryTransformer;
use crate::Result;
use chrono::Utc;
use dirmigrate_core::{Directory, Entry};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Copies entries from a source directory into a target directory.
///
/// Both directories are connected before the first search, used for the whole run and released
/// by [`Migrator::run`] when it returns, whatever the result.
pub struct Migrator {
    source: Arc<dyn Directory>,
    target: Arc<dyn Directory>,
    concurrency: usize,
}

impl Migrator {
    /// Creates a sequential migrator.
    #[must_use]
    pub fn new(source: Arc<dyn Directory>, target: Arc<dyn Directory>) -> Self {
        Self {
            source,
            target,
            concurrency: 1,
        }
    }

    /// Allows up to `limit` entry creations in flight. Outcomes keep source order.
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// Entries processed concurrently.
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Builds a schema snapshot from the first target entry `query` returns.
    ///
    /// Never fails: a failing search is logged and treated like an empty result.
    pub async fn discover_schema(&self, query: &SearchQuery) -> Option<SchemaSnapshot> {
        match self.target.search(&query.base_dn, &query.filters, None).await {
            Ok(samples) => {
                let snapshot = SchemaSnapshot::from_samples(&samples);
                if snapshot.is_none() {
                    warn!(
                        directory = self.target.name(),
                        base_dn = %query.base_dn,
                        "no sample entry found, attribute filtering disabled"
                    );
                }
                snapshot
            }
            Err(err) => {
                warn!(
                    directory = self.target.name(),
                    base_dn = %query.base_dn,
                    error = %err,
                    "schema discovery failed, attribute filtering disabled"
                );
                None
            }
        }
    }

    /// Migrates every source entry selected by `strategy`.
    ///
    /// Returns one outcome per source entry, in source order. Entry failures are recorded in
    /// their outcome and never abort the batch.
    ///
    /// # Errors
    ///
    /// Returns an error only when the source search fails.
    pub async fn migrate(&self, strategy: &EntryStrategy) -> Result<Vec<MigrationOutcome>> {
        let kind = strategy.name();
        let schema = self.discover_schema(strategy.target_query()).await;

        let query = strategy.source_query();
        let entries = self
            .source
            .search(&query.base_dn, &query.filters, None)
            .await?;
        info!(kind, entries = entries.len(), "migrating entries");

        let transformer = strategy.transformer(schema.as_ref());
        let outcomes: Vec<MigrationOutcome> = stream::iter(entries)
            .map(move |entry| self.migrate_entry(transformer, entry))
            .buffered(self.concurrency)
            .collect()
            .await;

        info!(
            kind,
            summary = %MigrationSummary::from_outcomes(&outcomes),
            "migration finished"
        );
        Ok(outcomes)
    }

    async fn migrate_entry(
        &self,
        transformer: EntryTransformer<'_>,
        entry: Entry,
    ) -> MigrationOutcome {
        let transformed = transformer.transform(&entry);
        let Some(dn) = transformed.dn else {
            warn!(source = %entry.dn, "skipping entry: no derivable DN");
            return MigrationOutcome::Skipped {
                source_dn: entry.dn,
                reason: SkipReason::NoDerivableDn,
            };
        };

        debug!(
            source = %entry.dn,
            dn = %dn,
            attributes = transformed.attributes.len(),
            "creating entry"
        );
        match self.target.add_entry(dn.as_str(), &transformed.attributes).await {
            Ok(()) => {
                info!(source = %entry.dn, dn = %dn, "entry created");
                MigrationOutcome::Created {
                    source_dn: entry.dn,
                    target_dn: dn.into(),
                }
            }
            Err(err) => {
                if err.should_log() {
                    error!(
                        source = %entry.dn,
                        dn = %dn,
                        code = err.error_code(),
                        error = %err,
                        "failed to create entry"
                    );
                } else {
                    warn!(
                        source = %entry.dn,
                        dn = %dn,
                        code = err.error_code(),
                        error = %err,
                        "entry not created"
                    );
                }
                MigrationOutcome::Failed {
                    source_dn: entry.dn,
                    error: err,
                }
            }
        }
    }

    /// Connects both directories, runs `strategies` in order, then releases both directories.
    ///
    /// A release failure does not discard the outcomes; it is kept in
    /// [`MigrationReport::release_error`] and makes the report unclean.
    ///
    /// # Errors
    ///
    /// Returns the connection error when either directory is unreachable, or the first source
    /// search error.
    pub async fn run<'a, I>(&self, strategies: I) -> Result<MigrationReport>
    where
        I: IntoIterator<Item = &'a EntryStrategy>,
    {
        let strategies: Vec<&EntryStrategy> = strategies.into_iter().collect();
        let started_at = Utc::now();

        let migrated = match self.connect().await {
            Ok(()) => self.migrate_all(&strategies).await,
            Err(err) => Err(err),
        };
        let released = self.release().await;
        let kinds = migrated?;

        let report = MigrationReport {
            started_at,
            finished_at: Utc::now(),
            kinds,
            release_error: released.err(),
        };
        info!(summary = %report.summary(), "run complete");
        Ok(report)
    }

    /// Connects the source, then the target.
    ///
    /// # Errors
    ///
    /// Returns the first connection error; the run cannot proceed without both directories.
    pub async fn connect(&self) -> Result<()> {
        for directory in [&self.source, &self.target] {
            if let Err(err) = directory.connect().await {
                error!(directory = directory.name(), error = %err, "failed to connect");
                return Err(err);
            }
        }
        Ok(())
    }

    async fn migrate_all(&self, strategies: &[&EntryStrategy]) -> Result<Vec<KindReport>> {
        let mut kinds = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            match self.migrate(strategy).await {
                Ok(outcomes) => kinds.push(KindReport::new(strategy.name(), outcomes)),
                Err(err) => {
                    error!(kind = strategy.name(), error = %err, "migration aborted");
                    return Err(err);
                }
            }
        }
        Ok(kinds)
    }

    /// Releases both directories, attempting both even if the first fails.
    ///
    /// # Errors
    ///
    /// Returns the first release error.
    pub async fn release(&self) -> Result<()> {
        let mut first_error = None;
        for directory in [&self.source, &self.target] {
            if let Err(err) = directory.destroy().await {
                warn!(directory = directory.name(), error = %err, "failed to release directory");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
