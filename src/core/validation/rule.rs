//! Declarative validation rules

use crate::domain::{SemanticType, Severity};

/// What a rule checks
#[derive(Debug, Clone, PartialEq)]
pub enum RuleCheck {
    /// The table was built
    TableExists,
    /// The table holds at least one row
    NonEmpty,
    /// Exact column names and semantic types, in order
    Columns(Vec<(&'static str, SemanticType)>),
    /// Row count inside the table's declared band
    RowBand,
    /// No negative values in the listed columns
    NonNegative(Vec<&'static str>),
    /// Every non-null value lies in [0, 1]
    UnitInterval(&'static str),
    /// Min and max year near the documented coverage
    YearCoverage { min: i64, max: i64, slack: i64 },
    /// Every point lies inside the regional bounding box
    BoundingBox {
        latitude: (f64, f64),
        longitude: (f64, f64),
    },
    /// The aggregated measure agrees with the source filter audit
    FilterTotals { measure: &'static str },
    /// Values of `column` appear in `reference_table.reference_column`
    ReferentialSubset {
        column: &'static str,
        reference_table: &'static str,
        reference_column: &'static str,
    },
    /// No literal sentinel strings in any text cell
    NoSentinel(&'static str),
    /// Key columns hold no nulls
    KeysNotNull(Vec<&'static str>),
    /// The listed tables share at least `min_common` years
    YearOverlap {
        tables: Vec<&'static str>,
        min_common: usize,
    },
    /// Encoded payload stays under the byte limit
    PayloadSize { max_bytes: u64 },
    /// All encoded payloads together stay under the byte limit
    TotalPayloadSize { max_bytes: u64 },
    /// A source's worst per-column cast failure rate stays under the threshold
    CastFailureRate { source_id: &'static str, threshold: f64 },
}

/// Target used by rules that span several tables
pub const ALL_TABLES: &str = "*";

/// One stateless rule, evaluated fresh each run
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRule {
    pub id: String,
    pub target_table: String,
    pub severity: Severity,
    pub check: RuleCheck,
    /// Message with `{table}` and `{detail}` placeholders
    pub message_template: &'static str,
}

impl ValidationRule {
    pub fn new(
        kind: &str,
        target_table: &str,
        severity: Severity,
        check: RuleCheck,
        message_template: &'static str,
    ) -> Self {
        let id = if target_table == ALL_TABLES {
            kind.to_string()
        } else {
            format!("{kind}.{target_table}")
        };
        Self {
            id,
            target_table: target_table.to_string(),
            severity,
            check,
            message_template,
        }
    }

    pub fn render(&self, detail: &str) -> String {
        self.message_template
            .replace("{table}", &self.target_table)
            .replace("{detail}", detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_id_and_render() {
        let rule = ValidationRule::new(
            "non_negative",
            "vmt_trends",
            Severity::Fatal,
            RuleCheck::NonNegative(vec!["vmt"]),
            "{table}: negative values ({detail})",
        );
        assert_eq!(rule.id, "non_negative.vmt_trends");
        assert_eq!(rule.render("vmt: 2 rows"), "vmt_trends: negative values (vmt: 2 rows)");

        let overlap = ValidationRule::new(
            "year_overlap",
            ALL_TABLES,
            Severity::Warning,
            RuleCheck::YearOverlap {
                tables: vec![],
                min_common: 3,
            },
            "{detail}",
        );
        assert_eq!(overlap.id, "year_overlap");
    }
}
