//! Data-quality signals recorded during normalization

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Validation rule severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "warning" => Ok(Severity::Warning),
            "fatal" => Ok(Severity::Fatal),
            other => Err(format!(
                "Invalid severity '{other}'. Must be one of: warning, fatal"
            )),
        }
    }
}

/// A value that could not be coerced to its column's type
///
/// Recovered as null; never aborts normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastFailure {
    pub source_id: String,
    pub column: String,
    pub raw_value: String,
}

/// Per-column cast failure tally
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastFailureSummary {
    pub count: usize,
    pub samples: Vec<String>,
}

const MAX_CAST_SAMPLES: usize = 5;

/// Audit trail of a category or dimension filter
///
/// Lets validation prove the filter excluded the non-canonical series
/// instead of merely down-weighting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterAudit {
    pub source_id: String,
    /// Dimension columns the filter constrained, in order
    pub columns: Vec<String>,
    /// Canonical value per constrained column
    pub kept_values: Vec<String>,
    /// Measure column whose totals were audited
    pub measure: String,
    pub unfiltered_total: f64,
    pub kept_total: f64,
    pub excluded_total: f64,
    /// Distinct dimension combinations that were dropped, joined with `|`
    pub excluded_values: Vec<String>,
    /// Distinct dimension combinations in the snapshot before filtering
    pub observed_values: Vec<String>,
    pub rows_before: usize,
    pub rows_after: usize,
}

impl FilterAudit {
    /// The canonical combination as it appears in `observed_values`
    pub fn canonical_key(&self) -> String {
        self.kept_values.join("|")
    }
}

/// Statistics of one source's normalization run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub source_id: String,
    pub schema_version: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub cast_failures: BTreeMap<String, CastFailureSummary>,
    pub filter_audits: Vec<FilterAudit>,
}

impl NormalizationStats {
    pub fn new(source_id: impl Into<String>, schema_version: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            schema_version: schema_version.into(),
            ..Default::default()
        }
    }

    pub fn record_cast_failure(&mut self, failure: CastFailure) {
        let entry = self.cast_failures.entry(failure.column).or_default();
        entry.count += 1;
        if entry.samples.len() < MAX_CAST_SAMPLES && !entry.samples.contains(&failure.raw_value) {
            entry.samples.push(failure.raw_value);
        }
    }

    pub fn total_cast_failures(&self) -> usize {
        self.cast_failures.values().map(|s| s.count).sum()
    }

    /// Highest per-column failure rate relative to the input row count
    pub fn worst_cast_failure_rate(&self) -> Option<(String, f64)> {
        if self.rows_in == 0 {
            return None;
        }
        self.cast_failures
            .iter()
            .map(|(col, s)| (col.clone(), s.count as f64 / self.rows_in as f64))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}
