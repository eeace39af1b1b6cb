//! Executable query plans
//!
//! A plan is the only thing a store backend sees. The SQL rendering and the
//! in-memory evaluation describe the same result: same filter, same order,
//! same row cap.

use super::predicate::{quote_ident, Predicate};
use crate::core::transform::definition::SortKey;
use crate::core::transform::AggregatedTable;
use crate::domain::{Column, CorridorError, QueryError, Result, Row, SemanticType, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// What a plan returns
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// The listed columns, in order
    Columns(Vec<&'static str>),
    /// Distinct non-null values of one column, ascending
    Distinct(&'static str),
    /// One row holding the sum of one column over matching rows
    Sum(&'static str),
}

/// Ordered rows with stable column names
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRows {
    pub view: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl QueryRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as JSON objects keyed by column name
    pub fn to_json(&self) -> serde_json::Value {
        let records = self
            .rows
            .iter()
            .map(|row| {
                let record: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(column, cell)| (column.name.clone(), cell.to_json()))
                    .collect();
                serde_json::Value::Object(record)
            })
            .collect();
        serde_json::Value::Array(records)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// View (or composite helper) the plan was built for
    pub view: String,
    pub table: &'static str,
    pub projection: Projection,
    pub predicate: Predicate,
    pub order_by: Vec<SortKey>,
    pub limit: Option<usize>,
    pub row_budget: usize,
}

impl QueryPlan {
    /// Rows requested from the backend
    ///
    /// One more than the budget when unlimited, so an overflow is detectable.
    pub fn fetch_limit(&self) -> usize {
        let cap = self.row_budget.saturating_add(1);
        self.limit.map_or(cap, |limit| limit.min(cap))
    }

    /// Output columns given the stored table schema
    pub fn output_columns(&self, schema: &[Column]) -> Result<Vec<Column>> {
        let lookup = |name: &str| {
            schema
                .iter()
                .find(|c| c.name == name)
                .cloned()
                .ok_or_else(|| {
                    CorridorError::Database(format!(
                        "table '{}' has no column '{name}'",
                        self.table
                    ))
                })
        };
        match &self.projection {
            Projection::Columns(columns) => columns.iter().map(|c| lookup(c)).collect(),
            Projection::Distinct(column) => Ok(vec![lookup(column)?]),
            Projection::Sum(column) => {
                lookup(column)?;
                Ok(vec![Column::new(*column, SemanticType::Float)])
            }
        }
    }

    /// SQL text and bound parameters
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let table = quote_ident(self.table);
        let predicate = self.predicate.to_sql(1);
        let params = self.predicate.params().into_iter().cloned().collect();

        let sql = match &self.projection {
            Projection::Columns(columns) => {
                let select: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
                let mut order: Vec<String> = self
                    .order_by
                    .iter()
                    .map(|k| {
                        if k.descending {
                            format!("{} DESC NULLS LAST", quote_ident(k.column))
                        } else {
                            format!("{} ASC NULLS FIRST", quote_ident(k.column))
                        }
                    })
                    .collect();
                // Remaining columns break ties deterministically
                order.extend(columns.iter().map(|c| format!("{} ASC NULLS FIRST", quote_ident(c))));
                format!(
                    "SELECT {} FROM {table} WHERE {predicate} ORDER BY {} LIMIT {}",
                    select.join(", "),
                    order.join(", "),
                    self.fetch_limit()
                )
            }
            Projection::Distinct(column) => {
                let column = quote_ident(column);
                format!(
                    "SELECT DISTINCT {column} FROM {table} \
                     WHERE {predicate} AND {column} IS NOT NULL \
                     ORDER BY {column} LIMIT {}",
                    self.fetch_limit()
                )
            }
            Projection::Sum(column) => format!(
                "SELECT CAST(COALESCE(SUM({}), 0) AS DOUBLE PRECISION) \
                 FROM {table} WHERE {predicate}",
                quote_ident(column)
            ),
        };
        (sql, params)
    }

    /// Evaluates the plan against a loaded table
    pub fn execute(&self, table: &AggregatedTable) -> Result<Vec<Row>> {
        let matching = table
            .rows
            .iter()
            .filter(|row| self.predicate.matches(&table.columns, row));

        let index = |name: &str| {
            table.column_index(name).ok_or_else(|| {
                CorridorError::Database(format!("table '{}' has no column '{name}'", self.table))
            })
        };

        let rows = match &self.projection {
            Projection::Columns(columns) => {
                let indexes = columns.iter().map(|c| index(c)).collect::<Result<Vec<_>>>()?;
                let keys = self
                    .order_by
                    .iter()
                    .map(|k| {
                        columns
                            .iter()
                            .position(|c| *c == k.column)
                            .map(|pos| (pos, k.descending))
                            .ok_or_else(|| {
                                CorridorError::Database(format!(
                                    "view '{}' orders by unselected column '{}'",
                                    self.view, k.column
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;

                let mut rows: Vec<Row> = matching
                    .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
                    .collect();
                rows.sort_by(|a, b| {
                    keys.iter()
                        .map(|&(pos, descending)| {
                            let ord = a[pos].cmp(&b[pos]);
                            if descending {
                                ord.reverse()
                            } else {
                                ord
                            }
                        })
                        .find(|ord| *ord != Ordering::Equal)
                        .unwrap_or_else(|| a.cmp(b))
                });
                rows.truncate(self.fetch_limit());
                rows
            }
            Projection::Distinct(column) => {
                let idx = index(column)?;
                matching
                    .map(|row| row[idx].clone())
                    .filter(|v| !v.is_null())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .take(self.fetch_limit())
                    .map(|v| vec![v])
                    .collect()
            }
            Projection::Sum(column) => {
                let idx = index(column)?;
                let total: f64 = matching.filter_map(|row| row[idx].as_f64()).sum();
                vec![vec![Value::Float(total)]]
            }
        };
        Ok(rows)
    }

    /// Rejects results larger than the budget
    pub fn check_budget(&self, rows: Vec<Row>) -> std::result::Result<Vec<Row>, QueryError> {
        if rows.len() > self.row_budget {
            return Err(QueryError::RowBudgetExceeded {
                view: self.view.clone(),
                budget: self.row_budget,
            });
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::predicate::{Comparison, Condition};
    use crate::core::transform::definition::{desc, RowBand};
    use crate::core::transform::Lineage;
    use crate::domain::TableName;
    use chrono::Utc;

    fn vmt_table() -> AggregatedTable {
        let row = |year: i64, peak: &str, freeway: &str, vmt: f64| {
            vec![
                Value::Int(year),
                Value::Text(peak.into()),
                Value::Text(freeway.into()),
                Value::Float(vmt),
            ]
        };
        AggregatedTable {
            name: TableName::new("vmt_trends").unwrap(),
            columns: vec![
                Column::new("year", SemanticType::Integer),
                Column::new("peak", SemanticType::Text),
                Column::new("freeway", SemanticType::Text),
                Column::new("vmt", SemanticType::Float),
            ],
            rows: vec![
                row(2019, "AM", "I-5", 10.0),
                row(2019, "PM", "I-8", 30.0),
                row(2020, "AM", "I-5", 20.0),
                row(2021, "AM", "SR-163", 5.0),
            ],
            lineage: Lineage::default(),
            built_at: Utc::now(),
            row_band: RowBand::at_least(1),
        }
    }

    fn plan(projection: Projection) -> QueryPlan {
        QueryPlan {
            view: "vmt".to_string(),
            table: "vmt_trends",
            projection,
            predicate: Predicate::default().and(Condition {
                column: "peak",
                op: Comparison::Equal,
                value: Value::Text("AM".into()),
            }),
            order_by: vec![desc("vmt")],
            limit: None,
            row_budget: 10,
        }
    }

    #[test]
    fn test_columns_filtered_and_ordered() {
        let rows = plan(Projection::Columns(vec!["year", "vmt"]))
            .execute(&vmt_table())
            .unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(2020), Value::Float(20.0)],
                vec![Value::Int(2019), Value::Float(10.0)],
                vec![Value::Int(2021), Value::Float(5.0)],
            ]
        );
    }

    #[test]
    fn test_distinct_and_sum() {
        let mut distinct = plan(Projection::Distinct("freeway"));
        distinct.order_by.clear();
        let rows = distinct.execute(&vmt_table()).unwrap();
        assert_eq!(
            rows,
            vec![vec![Value::Text("I-5".into())], vec![Value::Text("SR-163".into())]]
        );

        let total = plan(Projection::Sum("vmt")).execute(&vmt_table()).unwrap();
        assert_eq!(total, vec![vec![Value::Float(35.0)]]);
    }

    #[test]
    fn test_budget_overflow_detected() {
        let mut tight = plan(Projection::Columns(vec!["year", "vmt"]));
        tight.row_budget = 2;
        let rows = tight.execute(&vmt_table()).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(matches!(
            tight.check_budget(rows),
            Err(QueryError::RowBudgetExceeded { budget: 2, .. })
        ));
    }

    #[test]
    fn test_sql_rendering() {
        let mut limited = plan(Projection::Columns(vec!["year", "vmt"]));
        limited.limit = Some(5);
        let (sql, params) = limited.to_sql();
        assert_eq!(
            sql,
            "SELECT \"year\", \"vmt\" FROM \"vmt_trends\" WHERE \"peak\" = $1 \
             ORDER BY \"vmt\" DESC NULLS LAST, \"year\" ASC NULLS FIRST, \
             \"vmt\" ASC NULLS FIRST LIMIT 5"
        );
        assert_eq!(params, vec![Value::Text("AM".into())]);
    }
}
