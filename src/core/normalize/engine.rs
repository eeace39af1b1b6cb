//! Applies a [`SourceAdapterSpec`] to a raw snapshot

use super::spec::{BoolMapping, NormalizeStep, RowFilter, SourceAdapterSpec};
use crate::domain::value::{parse_date, parse_float, parse_integer, parse_timestamp};
use crate::domain::{
    CastFailure, Column, CorridorError, FilterAudit, NormalizationStats, RawDataset, Relation,
    Result, SemanticType, SourceId, Value,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// A source after normalization, ready for aggregation
#[derive(Debug, Clone)]
pub struct NormalizedRelation {
    pub source_id: SourceId,
    pub relation: Relation,
    pub stats: NormalizationStats,
    pub fetched_at: DateTime<Utc>,
}

/// Normalizes one raw snapshot
///
/// Pure and deterministic: the same spec applied to the same snapshot always
/// yields the same relation and statistics.
///
/// # Errors
///
/// Returns [`CorridorError::SchemaDrift`] when a required column is absent
/// from the snapshot. Cast failures never error; they become nulls and are
/// counted in the returned statistics.
pub fn normalize(spec: &SourceAdapterSpec, raw: &RawDataset) -> Result<NormalizedRelation> {
    let mut stats = NormalizationStats::new(spec.source_id, raw.schema_version());
    stats.rows_in = raw.rows.len();

    let mut relation = resolve_columns(spec, raw)?;

    for step in &spec.steps {
        apply_step(spec.source_id, step, &mut relation, &mut stats)?;
    }

    stats.rows_out = relation.len();

    tracing::debug!(
        source_id = spec.source_id,
        rows_in = stats.rows_in,
        rows_out = stats.rows_out,
        cast_failures = stats.total_cast_failures(),
        "Source normalized"
    );

    Ok(NormalizedRelation {
        source_id: raw.source_id.clone(),
        relation,
        stats,
        fetched_at: raw.fetched_at,
    })
}

/// Renames aliased columns, prunes unlisted ones and checks for drift
fn resolve_columns(spec: &SourceAdapterSpec, raw: &RawDataset) -> Result<Relation> {
    let mut columns = Vec::with_capacity(spec.columns.len());
    let mut indices = Vec::with_capacity(spec.columns.len());

    for column in &spec.columns {
        let index = column
            .raw_names()
            .into_iter()
            .find_map(|name| raw.column_index(name));

        if index.is_none() && column.required {
            return Err(CorridorError::SchemaDrift {
                source_id: spec.source_id.to_string(),
                column: column.primary_raw_name().to_string(),
            });
        }

        columns.push(Column::new(column.name, SemanticType::Text));
        indices.push(index);
    }

    let rows = raw
        .rows
        .iter()
        .map(|raw_row| {
            indices
                .iter()
                .map(|index| {
                    index
                        .and_then(|i| raw_row.get(i))
                        .and_then(|cell| cell.clone())
                        .map(Value::Text)
                        .unwrap_or(Value::Null)
                })
                .collect()
        })
        .collect();

    Ok(Relation::new(columns, rows))
}

fn column_index(source_id: &str, relation: &Relation, column: &str) -> Result<usize> {
    relation.column_index(column).ok_or_else(|| {
        CorridorError::Transform(format!(
            "adapter for '{source_id}' references unknown column '{column}'"
        ))
    })
}

fn apply_step(
    source_id: &str,
    step: &NormalizeStep,
    relation: &mut Relation,
    stats: &mut NormalizationStats,
) -> Result<()> {
    match step {
        NormalizeStep::NullMarkers(markers) => {
            for cell in relation.rows.iter_mut().flatten() {
                if let Value::Text(text) = cell {
                    if markers.contains(&text.trim()) {
                        *cell = Value::Null;
                    }
                }
            }
        }
        NormalizeStep::Cast { column, to } => {
            let idx = column_index(source_id, relation, column)?;
            for row in relation.rows.iter_mut() {
                let cast = match &row[idx] {
                    Value::Text(text) => match cast_text(text, *to) {
                        Some(value) => value,
                        None => {
                            stats.record_cast_failure(CastFailure {
                                source_id: source_id.to_string(),
                                column: column.to_string(),
                                raw_value: text.clone(),
                            });
                            Value::Null
                        }
                    },
                    other => other.clone(),
                };
                row[idx] = cast;
            }
            relation.columns[idx].semantic_type = *to;
        }
        NormalizeStep::Boolean { column, mapping } => {
            let idx = column_index(source_id, relation, column)?;
            for row in relation.rows.iter_mut() {
                row[idx] = reconstruct_bool(source_id, column, &row[idx], mapping, stats);
            }
            relation.columns[idx].semantic_type = SemanticType::Boolean;
        }
        NormalizeStep::DeriveYear { from, into } => {
            let from_idx = column_index(source_id, relation, from)?;
            let years: Vec<Value> = relation
                .rows
                .iter()
                .map(|row| row[from_idx].year().map(Value::Int).unwrap_or(Value::Null))
                .collect();
            match relation.column_index(into) {
                Some(into_idx) => {
                    for (row, year) in relation.rows.iter_mut().zip(years) {
                        row[into_idx] = year;
                    }
                    relation.columns[into_idx].semantic_type = SemanticType::Integer;
                }
                None => {
                    for (row, year) in relation.rows.iter_mut().zip(years) {
                        row.push(year);
                    }
                    relation
                        .columns
                        .push(Column::new(*into, SemanticType::Integer));
                }
            }
        }
        NormalizeStep::TruncateToMonth(column) => {
            let idx = column_index(source_id, relation, column)?;
            for row in relation.rows.iter_mut() {
                row[idx] = row[idx]
                    .month_start()
                    .map(Value::Date)
                    .unwrap_or(Value::Null);
            }
            relation.columns[idx].semantic_type = SemanticType::Date;
        }
        NormalizeStep::Filter(RowFilter::RequireNonNull(column)) => {
            let idx = column_index(source_id, relation, column)?;
            relation.rows.retain(|row| !row[idx].is_null());
        }
        NormalizeStep::Filter(RowFilter::KeepSlice {
            dimensions,
            measure,
        }) => {
            let audit = keep_slice(source_id, relation, dimensions, measure)?;
            tracing::debug!(
                source_id = source_id,
                kept = %audit.canonical_key(),
                excluded = ?audit.excluded_values,
                unfiltered_total = audit.unfiltered_total,
                kept_total = audit.kept_total,
                "Slice filter applied"
            );
            stats.filter_audits.push(audit);
        }
        NormalizeStep::Drop(columns) => {
            let keep: Vec<bool> = relation
                .columns
                .iter()
                .map(|c| !columns.contains(&c.name.as_str()))
                .collect();
            for row in relation.rows.iter_mut() {
                let mut flags = keep.iter();
                row.retain(|_| *flags.next().unwrap_or(&true));
            }
            let mut flags = keep.iter();
            relation.columns.retain(|_| *flags.next().unwrap_or(&true));
        }
    }
    Ok(())
}

fn cast_text(text: &str, to: SemanticType) -> Option<Value> {
    match to {
        SemanticType::Text => Some(Value::Text(text.to_string())),
        SemanticType::Integer => parse_integer(text).map(Value::Int),
        SemanticType::Float => parse_float(text).map(Value::Float),
        SemanticType::Date => parse_date(text).map(Value::Date),
        SemanticType::Timestamp => parse_timestamp(text).map(Value::Timestamp),
        SemanticType::Boolean => BoolMapping::FLAG.map(text).map(Value::Bool),
    }
}

fn reconstruct_bool(
    source_id: &str,
    column: &str,
    cell: &Value,
    mapping: &BoolMapping,
    stats: &mut NormalizationStats,
) -> Value {
    let absent = || mapping.absent.map(Value::Bool).unwrap_or(Value::Null);
    match cell {
        Value::Null => absent(),
        Value::Bool(b) => Value::Bool(*b),
        Value::Text(text) => match mapping.map(text) {
            Some(b) => Value::Bool(b),
            None => {
                stats.record_cast_failure(CastFailure {
                    source_id: source_id.to_string(),
                    column: column.to_string(),
                    raw_value: text.clone(),
                });
                absent()
            }
        },
        other => {
            stats.record_cast_failure(CastFailure {
                source_id: source_id.to_string(),
                column: column.to_string(),
                raw_value: other.to_string(),
            });
            absent()
        }
    }
}

fn slice_key(row: &[Value], indices: &[usize]) -> String {
    indices
        .iter()
        .map(|&i| match &row[i] {
            Value::Null => "<null>".to_string(),
            Value::Text(text) => text.trim().to_string(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("|")
}

fn keep_slice(
    source_id: &str,
    relation: &mut Relation,
    dimensions: &[(&'static str, &'static str)],
    measure: &str,
) -> Result<FilterAudit> {
    let dim_indices = dimensions
        .iter()
        .map(|(column, _)| column_index(source_id, relation, column))
        .collect::<Result<Vec<_>>>()?;
    let measure_idx = column_index(source_id, relation, measure)?;

    let rows_before = relation.len();
    let mut unfiltered_total = 0.0;
    let mut kept_total = 0.0;
    let mut excluded_values = BTreeSet::new();
    let mut observed_values = BTreeSet::new();

    let rows = std::mem::take(&mut relation.rows);
    let mut kept_rows = Vec::with_capacity(rows.len());

    for row in rows {
        let amount = row[measure_idx].as_f64().unwrap_or(0.0);
        unfiltered_total += amount;

        let matches = dimensions
            .iter()
            .zip(&dim_indices)
            .all(|((_, wanted), &i)| row[i].as_str().map(str::trim) == Some(*wanted));

        let key = slice_key(&row, &dim_indices);
        observed_values.insert(key.clone());
        if matches {
            kept_total += amount;
            kept_rows.push(row);
        } else {
            excluded_values.insert(key);
        }
    }

    relation.rows = kept_rows;

    Ok(FilterAudit {
        source_id: source_id.to_string(),
        columns: dimensions.iter().map(|(c, _)| c.to_string()).collect(),
        kept_values: dimensions.iter().map(|(_, v)| v.to_string()).collect(),
        measure: measure.to_string(),
        unfiltered_total,
        kept_total,
        excluded_total: unfiltered_total - kept_total,
        excluded_values: excluded_values.into_iter().collect(),
        observed_values: observed_values.into_iter().collect(),
        rows_before,
        rows_after: relation.len(),
    })
}
