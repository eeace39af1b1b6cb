//! Evaluates the rule catalog against an aggregated snapshot

use super::catalog::rule_catalog;
use super::report::{RuleResult, ValidationReport};
use super::rule::{RuleCheck, ValidationRule};
use crate::config::ValidationConfig;
use crate::core::transform::{AggregatedSnapshot, AggregatedTable};
use crate::domain::{Severity, Value};
use std::collections::BTreeSet;
use std::time::Instant;

/// Relative tolerance when comparing floating totals
const TOTAL_TOLERANCE: f64 = 1e-9;

/// Runs every rule and records every outcome
///
/// Rules never short-circuit one another: a missing table fails each rule
/// that targets it, and the remaining rules still run.
pub fn validate(snapshot: &AggregatedSnapshot, config: &ValidationConfig) -> ValidationReport {
    let started = Instant::now();
    let mut report = ValidationReport::new();

    for rule in rule_catalog(config) {
        let result = evaluate(&rule, snapshot);
        if !result.passed {
            match rule.severity {
                Severity::Fatal => tracing::error!(
                    rule_id = %result.rule_id,
                    detail = %result.detail,
                    "Fatal validation rule failed"
                ),
                Severity::Warning => tracing::warn!(
                    rule_id = %result.rule_id,
                    detail = %result.detail,
                    "Validation warning"
                ),
            }
        }
        report.record(result);
    }

    report.set_duration(started.elapsed().as_millis() as u64);
    tracing::info!(
        rules = report.results.len(),
        passed = report.passed(),
        warnings = report.warning_count(),
        publishable = report.publishable,
        "Validation complete"
    );
    report
}

/// Evaluates a single rule
pub fn evaluate(rule: &ValidationRule, snapshot: &AggregatedSnapshot) -> RuleResult {
    let (passed, detail) = match check(rule, snapshot) {
        Ok(detail) => (true, detail),
        Err(detail) => (false, rule.render(&detail)),
    };
    RuleResult {
        rule_id: rule.id.clone(),
        target_table: rule.target_table.clone(),
        severity: rule.severity,
        passed,
        detail,
    }
}

type CheckResult = std::result::Result<String, String>;

fn table<'a>(
    rule: &ValidationRule,
    snapshot: &'a AggregatedSnapshot,
) -> Result<&'a AggregatedTable, String> {
    snapshot
        .table(&rule.target_table)
        .ok_or_else(|| "table not present".to_string())
}

fn check(rule: &ValidationRule, snapshot: &AggregatedSnapshot) -> CheckResult {
    match &rule.check {
        RuleCheck::TableExists => table(rule, snapshot).map(|_| "table present".to_string()),
        RuleCheck::NonEmpty => {
            let t = table(rule, snapshot)?;
            if t.rows.is_empty() {
                Err("table has no rows".to_string())
            } else {
                Ok(format!("{} rows", t.rows.len()))
            }
        }
        RuleCheck::Columns(expected) => {
            let t = table(rule, snapshot)?;
            let actual: Vec<_> = t
                .columns
                .iter()
                .map(|c| (c.name.as_str(), c.semantic_type))
                .collect();
            let expected: Vec<_> = expected.iter().map(|(n, ty)| (*n, *ty)).collect();
            if actual == expected {
                Ok(format!("{} columns match", actual.len()))
            } else {
                Err(format!(
                    "expected [{}], got [{}]",
                    describe_columns(&expected),
                    describe_columns(&actual)
                ))
            }
        }
        RuleCheck::RowBand => {
            let t = table(rule, snapshot)?;
            if t.row_band.contains(t.rows.len()) {
                Ok(format!("{} rows within {}", t.rows.len(), t.row_band))
            } else {
                Err(format!("{} rows, expected {}", t.rows.len(), t.row_band))
            }
        }
        RuleCheck::NonNegative(columns) => {
            let t = table(rule, snapshot)?;
            let offenders: Vec<String> = columns
                .iter()
                .filter_map(|column| {
                    let negative = t
                        .values(column)
                        .filter(|v| v.as_f64().map_or(false, |x| x < 0.0))
                        .count();
                    (negative > 0).then(|| format!("{column}: {negative} rows"))
                })
                .collect();
            if offenders.is_empty() {
                Ok(format!("{} columns non-negative", columns.len()))
            } else {
                Err(offenders.join(", "))
            }
        }
        RuleCheck::UnitInterval(column) => {
            let t = table(rule, snapshot)?;
            require_column(t, column)?;
            let outside = t
                .values(column)
                .filter_map(Value::as_f64)
                .filter(|x| !(0.0..=1.0).contains(x))
                .count();
            if outside == 0 {
                Ok(format!("{column} within [0, 1]"))
            } else {
                Err(format!("{column}: {outside} rows"))
            }
        }
        RuleCheck::YearCoverage { min, max, slack } => {
            let t = table(rule, snapshot)?;
            let years: Vec<i64> = t.values("year").filter_map(Value::as_i64).collect();
            match (years.iter().min(), years.iter().max()) {
                (Some(&lo), Some(&hi)) if lo <= min + slack && hi >= max - slack => {
                    Ok(format!("{lo}-{hi}"))
                }
                (Some(lo), Some(hi)) => Err(format!("{lo}-{hi}, expected ~{min}-{max}")),
                _ => Err(format!("no years, expected ~{min}-{max}")),
            }
        }
        RuleCheck::BoundingBox {
            latitude,
            longitude,
        } => {
            let t = table(rule, snapshot)?;
            let lat = require_column(t, "latitude")?;
            let lon = require_column(t, "longitude")?;
            let outside = t
                .rows
                .iter()
                .filter(|row| {
                    let inside = |v: &Value, (lo, hi): (f64, f64)| {
                        v.as_f64().map_or(false, |x| x >= lo && x <= hi)
                    };
                    !(inside(&row[lat], *latitude) && inside(&row[lon], *longitude))
                })
                .count();
            if outside == 0 {
                Ok(format!("{} points inside", t.rows.len()))
            } else {
                Err(format!("{outside} points outside"))
            }
        }
        RuleCheck::FilterTotals { measure } => {
            let t = table(rule, snapshot)?;
            require_column(t, measure)?;
            check_filter_totals(t, measure)
        }
        RuleCheck::ReferentialSubset {
            column,
            reference_table,
            reference_column,
        } => {
            let t = table(rule, snapshot)?;
            let reference = snapshot
                .table(reference_table)
                .ok_or_else(|| format!("reference table '{reference_table}' not present"))?;
            require_column(reference, reference_column)?;
            let known: BTreeSet<String> = reference
                .values(reference_column)
                .filter(|v| !v.is_null())
                .map(reference_key)
                .collect();
            let missing: BTreeSet<String> = t
                .values(column)
                .filter(|v| !v.is_null())
                .map(reference_key)
                .filter(|key| !known.contains(key))
                .collect();
            if missing.is_empty() {
                Ok(format!("all {column} values in {reference_table}"))
            } else {
                Err(format!(
                    "{} unknown: {}",
                    missing.len(),
                    missing.into_iter().take(10).collect::<Vec<_>>().join(", ")
                ))
            }
        }
        RuleCheck::NoSentinel(sentinel) => {
            let t = table(rule, snapshot)?;
            let mut hits: Vec<String> = Vec::new();
            for (idx, column) in t.columns.iter().enumerate() {
                let count = t
                    .rows
                    .iter()
                    .filter(|row| row[idx].as_str().map(str::trim) == Some(*sentinel))
                    .count();
                if count > 0 {
                    hits.push(format!("{}: {count} rows", column.name));
                }
            }
            if hits.is_empty() {
                Ok(format!("no '{sentinel}' strings"))
            } else {
                Err(hits.join(", "))
            }
        }
        RuleCheck::KeysNotNull(columns) => {
            let t = table(rule, snapshot)?;
            let mut offenders = Vec::new();
            for column in columns {
                require_column(t, column)?;
                let nulls = t.values(column).filter(|v| v.is_null()).count();
                if nulls > 0 {
                    offenders.push(format!("{column}: {nulls} rows"));
                }
            }
            if offenders.is_empty() {
                Ok(format!("{} key columns populated", columns.len()))
            } else {
                Err(offenders.join(", "))
            }
        }
        RuleCheck::YearOverlap { tables, min_common } => {
            let mut common: Option<BTreeSet<i64>> = None;
            for name in tables {
                let years: BTreeSet<i64> = snapshot
                    .table(name)
                    .ok_or_else(|| format!("table '{name}' not present"))?
                    .values("year")
                    .filter_map(Value::as_i64)
                    .collect();
                common = Some(match common {
                    Some(acc) => acc.intersection(&years).copied().collect(),
                    None => years,
                });
            }
            let common = common.unwrap_or_default();
            let listed = common
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            if common.len() >= *min_common {
                Ok(format!("overlap years: {listed}"))
            } else {
                Err(format!(
                    "{} common years [{listed}], need {min_common}",
                    common.len()
                ))
            }
        }
        RuleCheck::PayloadSize { max_bytes } => {
            let t = table(rule, snapshot)?;
            let bytes = payload_bytes(t)?;
            if bytes < *max_bytes {
                Ok(format_mb(bytes))
            } else {
                Err(format!("{} >= {}", format_mb(bytes), format_mb(*max_bytes)))
            }
        }
        RuleCheck::TotalPayloadSize { max_bytes } => {
            let mut total = 0;
            for t in snapshot.tables.values() {
                total += payload_bytes(t)?;
            }
            if total < *max_bytes {
                Ok(format_mb(total))
            } else {
                Err(format!("{} >= {}", format_mb(total), format_mb(*max_bytes)))
            }
        }
        RuleCheck::CastFailureRate {
            source_id,
            threshold,
        } => {
            let stats = snapshot
                .source_stats
                .get(*source_id)
                .ok_or_else(|| format!("no normalization statistics for '{source_id}'"))?;
            match stats.worst_cast_failure_rate() {
                Some((column, rate)) if rate > *threshold => Err(format!(
                    "{source_id}.{column}: {:.2}% of {} rows (threshold {:.2}%)",
                    rate * 100.0,
                    stats.rows_in,
                    threshold * 100.0
                )),
                Some((column, rate)) => Ok(format!("{source_id}.{column}: {:.2}%", rate * 100.0)),
                None => Ok(format!("{source_id}: no cast failures")),
            }
        }
    }
}

fn require_column(t: &AggregatedTable, column: &str) -> Result<usize, String> {
    t.column_index(column)
        .ok_or_else(|| format!("column '{column}' not present"))
}

fn describe_columns(columns: &[(&str, crate::domain::SemanticType)]) -> String {
    columns
        .iter()
        .map(|(name, ty)| format!("{name}:{ty}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn payload_bytes(t: &AggregatedTable) -> Result<u64, String> {
    t.encode_rows()
        .map(|payload| payload.len() as u64)
        .map_err(|e| e.to_string())
}

/// Identifiers compare the way the route lookup joins them
fn reference_key(value: &Value) -> String {
    match value {
        Value::Text(text) => text.trim().to_string(),
        other => other.to_string(),
    }
}

fn format_mb(bytes: u64) -> String {
    format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOTAL_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Proves a category or slice filter excluded the non-canonical series
fn check_filter_totals(t: &AggregatedTable, measure: &str) -> CheckResult {
    if t.lineage.filter_audits.is_empty() {
        return Err("no filter audit recorded for the source".to_string());
    }
    let aggregated: f64 = t.values(measure).filter_map(Value::as_f64).sum();

    let mut checked = Vec::new();
    for audit in &t.lineage.filter_audits {
        let canonical = audit.canonical_key();
        if !approx_eq(aggregated, audit.kept_total) {
            return Err(format!(
                "{measure} sums to {aggregated}, filter kept {}",
                audit.kept_total
            ));
        }
        let slack = TOTAL_TOLERANCE * audit.unfiltered_total.abs().max(1.0);
        if audit.kept_total > audit.unfiltered_total + slack {
            return Err(format!(
                "kept total {} exceeds unfiltered total {}",
                audit.kept_total, audit.unfiltered_total
            ));
        }
        if audit.excluded_total > 0.0 && audit.kept_total >= audit.unfiltered_total {
            return Err(format!(
                "non-canonical series present ({}) but kept total {} is not below unfiltered {}",
                audit.excluded_values.join(", "),
                audit.kept_total,
                audit.unfiltered_total
            ));
        }
        if audit.rows_before > 0 && !audit.observed_values.contains(&canonical) {
            return Err(format!(
                "canonical value '{canonical}' not present in the snapshot (found: {})",
                audit.observed_values.join(", ")
            ));
        }
        checked.push(format!(
            "{}={canonical}: kept {} of {}",
            audit.columns.join("|"),
            audit.kept_total,
            audit.unfiltered_total
        ));
    }
    Ok(checked.join("; "))
}
