//! Per-entry outcomes and run reports.

use chrono::{DateTime, Utc};
use dirmigrate_core::Error;
use serde::{Serialize, Serializer};
use std::fmt;

/// Why an entry was not migrated without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No attribute supplied a value for the configured prefix attribute.
    NoDerivableDn,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDerivableDn => f.write_str("no derivable DN"),
        }
    }
}

/// What happened to one source entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// The entry was created in the target directory.
    Created {
        /// DN in the source directory.
        source_dn: String,
        /// DN the entry was created under.
        target_dn: String,
    },
    /// The entry was deliberately not migrated.
    Skipped {
        /// DN in the source directory.
        source_dn: String,
        /// Reason for skipping.
        reason: SkipReason,
    },
    /// Creating the entry failed; other entries were unaffected.
    Failed {
        /// DN in the source directory.
        source_dn: String,
        /// Error reported by the target directory.
        #[serde(serialize_with = "serialize_error")]
        error: Error,
    },
}

fn serialize_error<S: Serializer>(error: &Error, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

fn serialize_optional_error<S: Serializer>(
    error: &Option<Error>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.collect_str(error),
        None => serializer.serialize_none(),
    }
}

impl MigrationOutcome {
    /// DN of the source entry this outcome refers to.
    #[must_use]
    pub fn source_dn(&self) -> &str {
        match self {
            Self::Created { source_dn, .. }
            | Self::Skipped { source_dn, .. }
            | Self::Failed { source_dn, .. } => source_dn,
        }
    }

    /// Returns true for [`MigrationOutcome::Created`].
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }

    /// Returns true for [`MigrationOutcome::Failed`].
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created {
                source_dn,
                target_dn,
            } => write!(f, "created  {source_dn} -> {target_dn}"),
            Self::Skipped { source_dn, reason } => write!(f, "skipped  {source_dn} ({reason})"),
            Self::Failed { source_dn, error } => write!(f, "failed   {source_dn}: {error}"),
        }
    }
}

/// Outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    /// Entries created.
    pub created: usize,
    /// Entries skipped.
    pub skipped: usize,
    /// Entries that failed.
    pub failed: usize,
}

impl MigrationSummary {
    /// Tallies a list of outcomes.
    #[must_use]
    pub fn from_outcomes(outcomes: &[MigrationOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut summary, outcome| {
            match outcome {
                MigrationOutcome::Created { .. } => summary.created += 1,
                MigrationOutcome::Skipped { .. } => summary.skipped += 1,
                MigrationOutcome::Failed { .. } => summary.failed += 1,
            }
            summary
        })
    }

    /// Number of entries seen.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.created + self.skipped + self.failed
    }

    /// Returns true when no entry failed.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }

    fn absorb(&mut self, other: Self) {
        self.created += other.created;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl fmt::Display for MigrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} skipped, {} failed",
            self.created, self.skipped, self.failed
        )
    }
}

/// Outcomes of one strategy, in source search order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindReport {
    /// Strategy name.
    pub kind: String,
    /// Counts over `outcomes`.
    pub summary: MigrationSummary,
    /// One outcome per source entry.
    pub outcomes: Vec<MigrationOutcome>,
}

impl KindReport {
    /// Builds a report and its summary.
    #[must_use]
    pub fn new(kind: impl Into<String>, outcomes: Vec<MigrationOutcome>) -> Self {
        Self {
            kind: kind.into(),
            summary: MigrationSummary::from_outcomes(&outcomes),
            outcomes,
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the last strategy finished.
    pub finished_at: DateTime<Utc>,
    /// Per-strategy reports, in the order the strategies ran.
    pub kinds: Vec<KindReport>,
    /// First error raised while releasing the directories, after every strategy ran.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_optional_error"
    )]
    pub release_error: Option<Error>,
}

impl MigrationReport {
    /// Totals across every strategy.
    #[must_use]
    pub fn summary(&self) -> MigrationSummary {
        self.kinds
            .iter()
            .fold(MigrationSummary::default(), |mut total, kind| {
                total.absorb(kind.summary);
                total
            })
    }

    /// Returns true when no entry failed in any strategy and both directories were released.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.release_error.is_none() && self.kinds.iter().all(|kind| kind.summary.is_clean())
    }

    /// Every outcome across strategies, in run order.
    pub fn outcomes(&self) -> impl Iterator<Item = &MigrationOutcome> + '_ {
        self.kinds.iter().flat_map(|kind| kind.outcomes.iter())
    }

    /// Pretty-printed JSON rendering.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseError`] if serialization fails.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes() -> Vec<MigrationOutcome> {
        vec![
            MigrationOutcome::Created {
                source_dn: "cn=alice,dc=ad".to_string(),
                target_dn: "cn=alice,ou=people,dc=target".to_string(),
            },
            MigrationOutcome::Skipped {
                source_dn: "cn=svc,dc=ad".to_string(),
                reason: SkipReason::NoDerivableDn,
            },
            MigrationOutcome::Failed {
                source_dn: "cn=bob,dc=ad".to_string(),
                error: Error::Conflict("cn=bob,ou=people,dc=target".to_string()),
            },
        ]
    }

    #[test]
    fn summary_counts_each_status() {
        let summary = MigrationSummary::from_outcomes(&outcomes());
        assert_eq!(
            summary,
            MigrationSummary {
                created: 1,
                skipped: 1,
                failed: 1
            }
        );
        assert_eq!(summary.total(), 3);
        assert!(!summary.is_clean());
        assert_eq!(summary.to_string(), "1 created, 1 skipped, 1 failed");
    }

    #[test]
    fn outcome_accessors_and_display() {
        let all = outcomes();
        assert_eq!(all[1].source_dn(), "cn=svc,dc=ad");
        assert!(all[0].is_created());
        assert!(all[2].is_failed());
        assert_eq!(all[1].to_string(), "skipped  cn=svc,dc=ad (no derivable DN)");
    }

    #[test]
    fn report_totals_across_kinds() {
        let now = Utc::now();
        let report = MigrationReport {
            started_at: now,
            finished_at: now,
            kinds: vec![
                KindReport::new("users", outcomes()),
                KindReport::new("groups", outcomes()[..1].to_vec()),
            ],
            release_error: None,
        };

        let total = report.summary();
        assert_eq!(total.created, 2);
        assert_eq!(total.failed, 1);
        assert!(!report.is_clean());
        assert_eq!(report.outcomes().count(), 4);
    }

    #[test]
    fn json_renders_errors_as_text() {
        let now = Utc::now();
        let report = MigrationReport {
            started_at: now,
            finished_at: now,
            kinds: vec![KindReport::new("users", outcomes())],
            release_error: None,
        };

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        let rendered = &value["kinds"][0]["outcomes"];
        assert_eq!(rendered[0]["status"], "created");
        assert_eq!(rendered[1]["reason"], "no_derivable_dn");
        assert_eq!(
            rendered[2]["error"],
            "Conflict: cn=bob,ou=people,dc=target"
        );
        assert_eq!(value["kinds"][0]["summary"]["failed"], 1);
        assert!(value.get("release_error").is_none());
    }

    #[test]
    fn release_error_marks_report_unclean() {
        let now = Utc::now();
        let report = MigrationReport {
            started_at: now,
            finished_at: now,
            kinds: vec![KindReport::new("users", outcomes()[..2].to_vec())],
            release_error: Some(Error::directory("target", "unbind failed")),
        };

        assert!(report.summary().is_clean());
        assert!(!report.is_clean());
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(
            value["release_error"],
            "Directory error: target: unbind failed"
        );
    }
}
