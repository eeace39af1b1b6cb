//! Executes table definitions against normalized relations

use super::catalog::{
    auxiliary_catalog, table_catalog, ROUTE_REFERENCE, ROUTE_REFERENCE_SOURCE,
};
use super::definition::{
    Lookup, Measure, MeasureColumn, RowBand, SortKey, TableDefinition, TableFilter, TableShape,
};
use super::snapshot::{AggregatedSnapshot, AggregatedTable, Lineage};
use crate::core::normalize::NormalizedRelation;
use crate::domain::{Column, CorridorError, Relation, Result, Row, SemanticType, TableName, Value};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Builds the route reference, all twelve tables and the auxiliary relations
///
/// Every source a table depends on must be present in `relations`;
/// otherwise the build fails before any table is produced.
pub fn build_aggregates(
    relations: &BTreeMap<String, NormalizedRelation>,
    built_at: DateTime<Utc>,
) -> Result<AggregatedSnapshot> {
    let mut snapshot = AggregatedSnapshot {
        source_stats: relations
            .iter()
            .map(|(id, rel)| (id.clone(), rel.stats.clone()))
            .collect(),
        ..Default::default()
    };

    let routes = source(relations, ROUTE_REFERENCE_SOURCE)?;
    let reference = build_route_reference(routes, built_at)?;
    let route_names = route_name_map(&reference);
    snapshot.tables.insert(ROUTE_REFERENCE.to_string(), reference);

    for definition in table_catalog().into_iter().chain(auxiliary_catalog()) {
        let relation = source(relations, definition.source)?;
        let table = build_table(&definition, relation, Some(&route_names), built_at)?;
        tracing::debug!(
            table = definition.name,
            rows = table.rows.len(),
            "Aggregated table built"
        );
        snapshot.tables.insert(definition.name.to_string(), table);
    }

    Ok(snapshot)
}

fn source<'a>(
    relations: &'a BTreeMap<String, NormalizedRelation>,
    source_id: &str,
) -> Result<&'a NormalizedRelation> {
    relations
        .get(source_id)
        .ok_or_else(|| CorridorError::SourceUnavailable {
            source_id: source_id.to_string(),
            reason: "source was not normalized".to_string(),
        })
}

fn lineage_for(relation: &NormalizedRelation) -> Lineage {
    let source_id = relation.source_id.to_string();
    Lineage {
        sources: vec![source_id.clone()],
        fetched_at: BTreeMap::from([(source_id, relation.fetched_at)]),
        filter_audits: relation.stats.filter_audits.clone(),
    }
}

fn column_index(table: &str, relation: &Relation, column: &str) -> Result<usize> {
    relation.column_index(column).ok_or_else(|| {
        CorridorError::Transform(format!(
            "table '{table}' references unknown column '{column}'"
        ))
    })
}

/// Distinct routes with their display name
///
/// When a route is listed more than once, the smallest non-null name wins so
/// the result does not depend on source row order.
pub fn build_route_reference(
    routes: &NormalizedRelation,
    built_at: DateTime<Utc>,
) -> Result<AggregatedTable> {
    let relation = &routes.relation;
    let route_idx = column_index(ROUTE_REFERENCE, relation, "route")?;
    let name_idx = column_index(ROUTE_REFERENCE, relation, "route_name")?;

    let mut names: BTreeMap<String, Option<String>> = BTreeMap::new();
    for row in &relation.rows {
        let Some(route) = row[route_idx].as_str().map(str::trim) else {
            continue;
        };
        let name = row[name_idx].as_str().map(str::to_string);
        let entry = names.entry(route.to_string()).or_insert(None);
        *entry = match (entry.take(), name) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    let rows = names
        .into_iter()
        .map(|(route, name)| vec![Value::Text(route), name.map(Value::Text).unwrap_or(Value::Null)])
        .collect();

    Ok(AggregatedTable {
        name: table_name(ROUTE_REFERENCE)?,
        columns: vec![
            Column::new("route", SemanticType::Text),
            Column::new("route_name", SemanticType::Text),
        ],
        rows,
        lineage: lineage_for(routes),
        built_at,
        row_band: RowBand::at_least(1),
    })
}

fn route_name_map(reference: &AggregatedTable) -> BTreeMap<String, Value> {
    reference
        .rows
        .iter()
        .filter_map(|row| match (&row[0], &row[1]) {
            (Value::Text(route), name) => Some((route.clone(), name.clone())),
            _ => None,
        })
        .collect()
}

fn table_name(name: &str) -> Result<TableName> {
    TableName::new(name).map_err(CorridorError::Transform)
}

/// Builds one table from its definition
pub fn build_table(
    definition: &TableDefinition,
    source: &NormalizedRelation,
    route_names: Option<&BTreeMap<String, Value>>,
    built_at: DateTime<Utc>,
) -> Result<AggregatedTable> {
    let relation = &source.relation;
    let filtered = apply_filters(definition, relation)?;

    let (mut columns, mut rows) = match &definition.shape {
        TableShape::Project(names) => project(definition.name, relation, &filtered, names)?,
        TableShape::Aggregate { group_by, measures } => {
            aggregate(definition.name, relation, &filtered, group_by, measures)?
        }
    };

    if let Some(lookup) = &definition.lookup {
        let names = route_names.ok_or_else(|| {
            CorridorError::Transform(format!(
                "table '{}' needs the route reference relation",
                definition.name
            ))
        })?;
        apply_lookup(definition.name, lookup, names, &mut columns, &mut rows)?;
    }

    sort_rows(definition.name, &definition.order_by, &columns, &mut rows)?;

    Ok(AggregatedTable {
        name: table_name(definition.name)?,
        columns,
        rows,
        lineage: lineage_for(source),
        built_at,
        row_band: definition.row_band,
    })
}

fn apply_filters<'a>(definition: &TableDefinition, relation: &'a Relation) -> Result<Vec<&'a Row>> {
    let mut checks = Vec::with_capacity(definition.filters.len());
    for filter in &definition.filters {
        let column = match filter {
            TableFilter::NotNull(c) => c,
            TableFilter::Between { column, .. } => column,
        };
        checks.push((column_index(definition.name, relation, column)?, *filter));
    }

    Ok(relation
        .rows
        .iter()
        .filter(|row| {
            checks.iter().all(|(idx, filter)| match filter {
                TableFilter::NotNull(_) => !row[*idx].is_null(),
                TableFilter::Between { min, max, .. } => row[*idx]
                    .as_f64()
                    .map_or(false, |v| v >= *min && v <= *max),
            })
        })
        .collect())
}

fn project(
    table: &str,
    relation: &Relation,
    rows: &[&Row],
    names: &[&str],
) -> Result<(Vec<Column>, Vec<Row>)> {
    let indices = names
        .iter()
        .map(|name| column_index(table, relation, name))
        .collect::<Result<Vec<_>>>()?;
    let columns = indices
        .iter()
        .map(|&i| relation.columns[i].clone())
        .collect();
    let rows = rows
        .iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok((columns, rows))
}

fn aggregate(
    table: &str,
    relation: &Relation,
    rows: &[&Row],
    group_by: &[&str],
    measures: &[MeasureColumn],
) -> Result<(Vec<Column>, Vec<Row>)> {
    let key_indices = group_by
        .iter()
        .map(|name| column_index(table, relation, name))
        .collect::<Result<Vec<_>>>()?;

    let mut groups: BTreeMap<Vec<Value>, Vec<&Row>> = BTreeMap::new();
    for row in rows {
        let key = key_indices.iter().map(|&i| row[i].clone()).collect();
        groups.entry(key).or_default().push(row);
    }

    let mut columns: Vec<Column> = key_indices
        .iter()
        .map(|&i| relation.columns[i].clone())
        .collect();
    for m in measures {
        let ty = TableDefinition::measure_type(&m.measure, |c| {
            relation.column(c).map(|col| col.semantic_type)
        });
        columns.push(Column::new(m.name, ty));
    }

    let mut output = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let mut row = key;
        for m in measures {
            let ty = TableDefinition::measure_type(&m.measure, |c| {
                relation.column(c).map(|col| col.semantic_type)
            });
            let value = evaluate(table, relation, &members, &m.measure)?;
            row.push(coerce(value, ty));
        }
        output.push(row);
    }

    Ok((columns, output))
}

/// Raw measure result before output typing
enum Computed {
    Null,
    Number(f64),
    Count(i64),
    IntSum(i64),
}

fn coerce(value: Computed, ty: SemanticType) -> Value {
    match (value, ty) {
        (Computed::Null, _) => Value::Null,
        (Computed::Count(n), _) | (Computed::IntSum(n), SemanticType::Integer) => Value::Int(n),
        (Computed::IntSum(n), _) => Value::Float(n as f64),
        (Computed::Number(x), SemanticType::Integer) => Value::Int(x.round() as i64),
        (Computed::Number(x), _) => Value::Float(x),
    }
}

impl Computed {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Computed::Null => None,
            Computed::Number(x) => Some(*x),
            Computed::Count(n) | Computed::IntSum(n) => Some(*n as f64),
        }
    }
}

fn evaluate(
    table: &str,
    relation: &Relation,
    members: &[&Row],
    measure: &Measure,
) -> Result<Computed> {
    let cells = |column: &str| column_cells(table, relation, members, column);

    Ok(match measure {
        Measure::Count => Computed::Count(members.len() as i64),
        Measure::CountDistinct(column) => {
            let distinct: BTreeSet<&Value> = cells(column)?
                .into_iter()
                .filter(|v| !v.is_null())
                .collect();
            Computed::Count(distinct.len() as i64)
        }
        Measure::CountPositive(column) => Computed::Count(
            cells(column)?
                .into_iter()
                .filter(|v| v.as_f64().map_or(false, |x| x > 0.0))
                .count() as i64,
        ),
        Measure::Sum(column) => {
            let values = cells(column)?;
            let present: Vec<&Value> = values.into_iter().filter(|v| !v.is_null()).collect();
            if present.is_empty() {
                Computed::Null
            } else if present.iter().all(|v| v.as_i64().is_some()) {
                let total = present
                    .iter()
                    .filter_map(|v| v.as_i64())
                    .try_fold(0i64, |acc, n| acc.checked_add(n));
                match total {
                    Some(total) => Computed::IntSum(total),
                    None => {
                        tracing::warn!(
                            table = table,
                            column = column,
                            rows = present.len(),
                            "Integer sum overflowed, summing as float"
                        );
                        Computed::Number(present.iter().filter_map(|v| v.as_f64()).sum())
                    }
                }
            } else {
                Computed::Number(present.iter().filter_map(|v| v.as_f64()).sum())
            }
        }
        Measure::Avg(column) => {
            let numbers: Vec<f64> = cells(column)?.into_iter().filter_map(Value::as_f64).collect();
            if numbers.is_empty() {
                Computed::Null
            } else {
                Computed::Number(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        Measure::Ratio {
            numerator,
            denominator,
        } => {
            let num = evaluate(table, relation, members, numerator)?.as_f64();
            let den = evaluate(table, relation, members, denominator)?.as_f64();
            match (num, den) {
                (Some(n), Some(d)) if d != 0.0 => Computed::Number(n / d),
                _ => Computed::Null,
            }
        }
    })
}

fn column_cells<'a>(
    table: &str,
    relation: &Relation,
    members: &[&'a Row],
    column: &str,
) -> Result<Vec<&'a Value>> {
    let idx = column_index(table, relation, column)?;
    Ok(members.iter().map(|row| &row[idx]).collect())
}

fn apply_lookup(
    table: &str,
    lookup: &Lookup,
    names: &BTreeMap<String, Value>,
    columns: &mut Vec<Column>,
    rows: &mut [Row],
) -> Result<()> {
    let key_idx = columns
        .iter()
        .position(|c| c.name == lookup.key)
        .ok_or_else(|| {
            CorridorError::Transform(format!(
                "table '{table}' has no lookup key column '{}'",
                lookup.key
            ))
        })?;

    columns.insert(key_idx + 1, Column::new(lookup.column, SemanticType::Text));
    for row in rows.iter_mut() {
        let name = row[key_idx]
            .as_str()
            .and_then(|route| names.get(route.trim()))
            .cloned()
            .unwrap_or(Value::Null);
        row.insert(key_idx + 1, name);
    }
    Ok(())
}

fn sort_rows(
    table: &str,
    order_by: &[SortKey],
    columns: &[Column],
    rows: &mut [Row],
) -> Result<()> {
    let keys = order_by
        .iter()
        .map(|key| {
            columns
                .iter()
                .position(|c| c.name == key.column)
                .map(|idx| (idx, key.descending))
                .ok_or_else(|| {
                    CorridorError::Transform(format!(
                        "table '{table}' sorts by unknown column '{}'",
                        key.column
                    ))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    rows.sort_by(|a, b| {
        keys.iter()
            .map(|&(idx, descending)| {
                let ord = a[idx].cmp(&b[idx]);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or_else(|| a.cmp(b))
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::normalize::catalog::{TRAFFIC_COLLISIONS, TRANSIT_RIDERSHIP};
    use crate::core::transform::catalog::{
        table_definition, CITY_COLLISION_TRENDS, RIDERSHIP_BY_ROUTE, RIDERSHIP_TRENDS,
    };
    use crate::domain::{NormalizationStats, SourceId};

    fn normalized(source_id: &str, columns: Vec<Column>, rows: Vec<Row>) -> NormalizedRelation {
        NormalizedRelation {
            source_id: SourceId::new(source_id).unwrap(),
            relation: Relation::new(columns, rows),
            stats: NormalizationStats::new(source_id, "abc"),
            fetched_at: Utc::now(),
        }
    }

    fn ridership() -> NormalizedRelation {
        normalized(
            TRANSIT_RIDERSHIP,
            vec![
                Column::new("year", SemanticType::Integer),
                Column::new("route", SemanticType::Text),
                Column::new("avg_weekday_boardings", SemanticType::Float),
            ],
            vec![
                vec![Value::Int(2021), Value::Text("7".into()), Value::Float(100.0)],
                vec![Value::Int(2020), Value::Text("7".into()), Value::Float(80.0)],
                vec![Value::Int(2021), Value::Text("2".into()), Value::Null],
                vec![Value::Int(2021), Value::Text("2".into()), Value::Float(50.0)],
            ],
        )
    }

    #[test]
    fn test_aggregate_sum_and_count_distinct() {
        let def = table_definition(RIDERSHIP_TRENDS).unwrap();
        let table = build_table(&def, &ridership(), None, Utc::now()).unwrap();
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["year", "total_weekday_boardings", "num_routes"]);
        assert_eq!(
            table.rows,
            vec![
                vec![Value::Int(2020), Value::Float(80.0), Value::Int(1)],
                // The null boarding is excluded from the sum
                vec![Value::Int(2021), Value::Float(150.0), Value::Int(2)],
            ]
        );
    }

    #[test]
    fn test_lookup_inserts_route_name_after_key() {
        let def = table_definition(RIDERSHIP_BY_ROUTE).unwrap();
        let names = BTreeMap::from([("7".to_string(), Value::Text("Downtown".into()))]);
        let table = build_table(&def, &ridership(), Some(&names), Utc::now()).unwrap();
        let columns: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(columns, vec!["year", "route", "route_name", "avg_weekday_boardings"]);
        // Ordered by year then route, full row breaks the tie
        assert_eq!(table.rows[0][0], Value::Int(2020));
        assert_eq!(table.rows[1][1], Value::Text("2".into()));
        assert_eq!(table.rows[1][2], Value::Null);
        assert_eq!(table.rows[1][3], Value::Null);
        assert_eq!(table.rows[3][2], Value::Text("Downtown".into()));
    }

    #[test]
    fn test_integer_sum_overflow_saturates_instead_of_panicking() {
        let def = table_definition(CITY_COLLISION_TRENDS).unwrap();
        let source = normalized(
            TRAFFIC_COLLISIONS,
            vec![
                Column::new("year", SemanticType::Integer),
                Column::new("injured", SemanticType::Integer),
                Column::new("killed", SemanticType::Integer),
            ],
            vec![
                vec![Value::Int(2020), Value::Int(i64::MAX), Value::Int(0)],
                vec![Value::Int(2020), Value::Int(1), Value::Int(0)],
            ],
        );
        let table = build_table(&def, &source, None, Utc::now()).unwrap();
        assert_eq!(table.rows[0][2], Value::Int(i64::MAX));
    }

    #[test]
    fn test_ratio_guards_division_by_zero() {
        let def = table_definition(CITY_COLLISION_TRENDS).unwrap();
        let source = normalized(
            TRAFFIC_COLLISIONS,
            vec![
                Column::new("year", SemanticType::Integer),
                Column::new("injured", SemanticType::Integer),
                Column::new("killed", SemanticType::Integer),
            ],
            vec![
                vec![Value::Int(2020), Value::Int(2), Value::Int(0)],
                vec![Value::Int(2020), Value::Int(0), Value::Int(1)],
                vec![Value::Int(2021), Value::Null, Value::Null],
            ],
        );
        let table = build_table(&def, &source, None, Utc::now()).unwrap();
        assert_eq!(
            table.rows[0],
            vec![Value::Int(2020), Value::Int(2), Value::Int(2), Value::Int(1), Value::Float(0.5)]
        );
        // All-null sums stay null; the rate has a nonzero denominator
        assert_eq!(
            table.rows[1],
            vec![Value::Int(2021), Value::Int(1), Value::Null, Value::Null, Value::Float(0.0)]
        );
    }

    #[test]
    fn test_route_reference_is_order_independent() {
        let routes = |order: &[usize]| {
            let all = [
                vec![Value::Text("7".into()), Value::Text("Zeta".into())],
                vec![Value::Text("7".into()), Value::Text("Alpha".into())],
                vec![Value::Text("9".into()), Value::Null],
            ];
            normalized(
                ROUTE_REFERENCE_SOURCE,
                vec![
                    Column::new("route", SemanticType::Text),
                    Column::new("route_name", SemanticType::Text),
                ],
                order.iter().map(|&i| all[i].clone()).collect(),
            )
        };
        let a = build_route_reference(&routes(&[0, 1, 2]), Utc::now()).unwrap();
        let b = build_route_reference(&routes(&[2, 1, 0]), Utc::now()).unwrap();
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.rows[0], vec![Value::Text("7".into()), Value::Text("Alpha".into())]);
        assert_eq!(a.rows[1], vec![Value::Text("9".into()), Value::Null]);
    }

    #[test]
    fn test_missing_source_is_reported() {
        let relations = BTreeMap::new();
        let err = build_aggregates(&relations, Utc::now()).unwrap_err();
        assert!(matches!(err, CorridorError::SourceUnavailable { .. }));
    }
}
