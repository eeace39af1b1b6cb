//! Build summary and reporting

use crate::adapters::ingest::IngestSummary;
use crate::core::transform::StoreManifest;
use crate::core::validation::ValidationReport;
use crate::domain::{BuildId, CorridorError, NormalizationStats, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Every rule passed and the build is current
    Published,
    /// The build is current; warning rules failed
    PublishedWithWarnings,
    /// A fatal rule failed; the previous build stays current
    Rejected,
}

impl BuildOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildOutcome::Published => 0,
            BuildOutcome::PublishedWithWarnings => 1,
            BuildOutcome::Rejected => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub build_id: BuildId,
    pub started_at: DateTime<Utc>,
    pub outcome: BuildOutcome,
    /// `None` when ingestion was skipped
    pub ingest: Option<IngestSummary>,
    pub source_stats: BTreeMap<String, NormalizationStats>,
    pub report: ValidationReport,
    /// Manifest of the published build, if it was published
    pub manifest: Option<StoreManifest>,
    pub duration: Duration,
}

impl BuildSummary {
    pub fn is_published(&self) -> bool {
        self.manifest.is_some()
    }

    /// Turns a rejected build into [`CorridorError::DataQualityViolation`]
    pub fn ensure_published(self) -> Result<Self> {
        if self.outcome == BuildOutcome::Rejected {
            return Err(CorridorError::DataQualityViolation {
                fatal_rules: self.report.fatal_rule_ids(),
            });
        }
        Ok(self)
    }

    pub fn log_summary(&self) {
        let rows_out: usize = self.source_stats.values().map(|s| s.rows_out).sum();
        let cast_failures: usize = self
            .source_stats
            .values()
            .map(|s| s.total_cast_failures())
            .sum();

        tracing::info!(
            build_id = %self.build_id,
            outcome = ?self.outcome,
            sources = self.source_stats.len(),
            normalized_rows = rows_out,
            cast_failures = cast_failures,
            rules_passed = self.report.passed(),
            warnings = self.report.warning_count(),
            duration_secs = self.duration.as_secs(),
            "Build completed"
        );

        if self.outcome == BuildOutcome::Rejected {
            tracing::error!(
                build_id = %self.build_id,
                fatal_rules = ?self.report.fatal_rule_ids(),
                "Build rejected; previous aggregated store left in place"
            );
        }
    }
}
