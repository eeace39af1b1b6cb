//! The query service
//!
//! Every read-side consumer goes through [`QueryService::run`] or one of the
//! composite helpers built on it.

use super::plan::{Projection, QueryPlan, QueryRows};
use super::predicate::{build_predicate, Comparison, Condition, Predicate};
use super::views::{view_catalog, view_definition, FilterKey};
use crate::adapters::store::AggregateStore;
use crate::config::QueryConfig;
use crate::core::transform::catalog::{
    COLLISION_SEVERITY, RIDERSHIP_BY_ROUTE, RIDERSHIP_TRENDS, TRAVEL_TIME_TRENDS, VMT_TRENDS,
};
use crate::domain::{QueryError, Result, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// One read-side request; built per call and never shared
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRequest {
    pub view: String,
    pub filters: BTreeMap<String, String>,
    /// Caller's upper bound on returned rows; must not exceed the view budget
    pub expected_row_budget: Option<usize>,
}

impl QueryRequest {
    pub fn new(view: impl Into<String>) -> Self {
        Self {
            view: view.into(),
            ..Default::default()
        }
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }
}

/// Values offered by dashboard filter widgets
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    pub years: Vec<i64>,
    pub routes: Vec<String>,
    pub freeways: Vec<String>,
    pub severities: Vec<String>,
    pub peaks: Vec<String>,
}

/// Headline totals for a year range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub year_min: i64,
    pub year_max: i64,
    pub total_weekday_boardings: f64,
    pub total_vmt: f64,
    pub total_collisions: f64,
    pub fatal_collisions: f64,
}

const OVERVIEW_YEARS: (i64, i64) = (2019, 2024);
const FATAL_SEVERITY: &str = "Fatal";

pub struct QueryService {
    store: Arc<dyn AggregateStore + Send + Sync>,
    config: QueryConfig,
}

impl QueryService {
    pub fn new(store: Arc<dyn AggregateStore + Send + Sync>, config: QueryConfig) -> Self {
        Self { store, config }
    }

    /// Names of every view, in catalog order
    pub fn views() -> Vec<&'static str> {
        view_catalog().into_iter().map(|v| v.name).collect()
    }

    /// Validates a request and builds its plan, without touching the store
    ///
    /// # Errors
    ///
    /// Every [`QueryError`] except `Timeout` is raised here, before any query
    /// text exists.
    pub fn plan(&self, request: &QueryRequest) -> std::result::Result<QueryPlan, QueryError> {
        let view = view_definition(&request.view)
            .ok_or_else(|| QueryError::UnknownView(request.view.clone()))?;
        let predicate = build_predicate(&view, &request.filters)?;

        let mut budget = view.row_budget.min(self.config.max_row_budget);
        if let Some(expected) = request.expected_row_budget {
            if expected > view.row_budget {
                return Err(QueryError::RowBudgetExceeded {
                    view: view.name.to_string(),
                    budget: view.row_budget,
                });
            }
            budget = budget.min(expected);
        }

        Ok(QueryPlan {
            view: view.name.to_string(),
            table: view.table,
            projection: Projection::Columns(view.columns.to_vec()),
            predicate,
            order_by: view.order_by,
            limit: view.limit.map(|limit| limit.min(budget)),
            row_budget: budget,
        })
    }

    /// Runs one view
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] for rejected requests, budget overflow and
    /// timeouts, and `NotPublished` before the first publish.
    pub async fn run(&self, request: &QueryRequest) -> Result<QueryRows> {
        let plan = self.plan(request)?;
        self.execute(plan).await
    }

    /// Executes a plan under the per-call timeout
    async fn execute(&self, plan: QueryPlan) -> Result<QueryRows> {
        let seconds = self.config.timeout_seconds;
        let result = tokio::time::timeout(Duration::from_secs(seconds), self.store.run_query(&plan))
            .await
            .map_err(|_| QueryError::Timeout {
                view: plan.view.clone(),
                seconds,
            })??;

        let rows = plan.check_budget(result.rows)?;
        tracing::debug!(view = %plan.view, rows = rows.len(), "Query completed");
        Ok(QueryRows { rows, ..result })
    }

    fn helper_plan(
        &self,
        name: &str,
        table: &'static str,
        projection: Projection,
        predicate: Predicate,
    ) -> QueryPlan {
        QueryPlan {
            view: name.to_string(),
            table,
            projection,
            predicate,
            order_by: vec![],
            limit: None,
            row_budget: self.config.max_row_budget,
        }
    }

    async fn distinct(&self, table: &'static str, column: &'static str) -> Result<Vec<Value>> {
        let plan = self.helper_plan(
            "filter_options",
            table,
            Projection::Distinct(column),
            Predicate::default(),
        );
        let rows = self.execute(plan).await?;
        Ok(rows.rows.into_iter().filter_map(|mut row| row.pop()).collect())
    }

    async fn sum(
        &self,
        table: &'static str,
        column: &'static str,
        predicate: Predicate,
    ) -> Result<f64> {
        let plan = self.helper_plan("overview", table, Projection::Sum(column), predicate);
        let rows = self.execute(plan).await?;
        Ok(rows
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_f64)
            .unwrap_or(0.0))
    }

    /// Distinct filter values across the published tables
    pub async fn filter_options(&self) -> Result<FilterOptions> {
        let texts = |values: Vec<Value>| -> Vec<String> {
            values
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        };

        let mut years = BTreeSet::new();
        for table in [RIDERSHIP_TRENDS, VMT_TRENDS, COLLISION_SEVERITY] {
            years.extend(self.distinct(table, "year").await?.iter().filter_map(Value::as_i64));
        }

        Ok(FilterOptions {
            years: years.into_iter().collect(),
            routes: texts(self.distinct(RIDERSHIP_BY_ROUTE, "route").await?),
            freeways: texts(self.distinct(VMT_TRENDS, "freeway").await?),
            severities: texts(self.distinct(COLLISION_SEVERITY, "collision_severity").await?),
            peaks: texts(self.distinct(TRAVEL_TIME_TRENDS, "peak").await?),
        })
    }

    /// Headline totals over a year range (defaults to 2019-2024)
    ///
    /// # Errors
    ///
    /// Range values are validated like the `year_min`/`year_max` filters.
    pub async fn overview(
        &self,
        year_min: Option<&str>,
        year_max: Option<&str>,
    ) -> Result<Overview> {
        // Reuse the view filter rules for the year bounds
        let request = QueryRequest::new("ridership_trends")
            .filter(
                FilterKey::YearMin.as_str(),
                year_min.map_or(OVERVIEW_YEARS.0.to_string(), str::to_string),
            )
            .filter(
                FilterKey::YearMax.as_str(),
                year_max.map_or(OVERVIEW_YEARS.1.to_string(), str::to_string),
            );
        let years = self.plan(&request)?.predicate;
        let bound = |i: usize| years.conditions.get(i).and_then(|c| c.value.as_i64());
        let (min, max) = (
            bound(0).unwrap_or(OVERVIEW_YEARS.0),
            bound(1).unwrap_or(OVERVIEW_YEARS.1),
        );

        let fatal = years.clone().and(Condition {
            column: "collision_severity",
            op: Comparison::Equal,
            value: Value::Text(FATAL_SEVERITY.to_string()),
        });

        Ok(Overview {
            year_min: min,
            year_max: max,
            total_weekday_boardings: self
                .sum(RIDERSHIP_TRENDS, "total_weekday_boardings", years.clone())
                .await?,
            total_vmt: self.sum(VMT_TRENDS, "vmt", years.clone()).await?,
            total_collisions: self
                .sum(COLLISION_SEVERITY, "num_collisions", years)
                .await?,
            fatal_collisions: self
                .sum(COLLISION_SEVERITY, "num_collisions", fatal)
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::FileStore;
    use crate::config::FilesystemConfig;
    use crate::core::transform::definition::RowBand;
    use crate::core::transform::{AggregatedSnapshot, AggregatedTable, Lineage};
    use crate::domain::{BuildId, Column, CorridorError, SemanticType, TableName};
    use chrono::Utc;
    use tempfile::TempDir;

    fn table(name: &str, columns: Vec<Column>, rows: Vec<Vec<Value>>) -> AggregatedTable {
        AggregatedTable {
            name: TableName::new(name).unwrap(),
            columns,
            rows,
            lineage: Lineage::default(),
            built_at: Utc::now(),
            row_band: RowBand::at_least(0),
        }
    }

    async fn service(dir: &TempDir) -> QueryService {
        let ridership = table(
            RIDERSHIP_TRENDS,
            vec![
                Column::new("year", SemanticType::Integer),
                Column::new("total_weekday_boardings", SemanticType::Float),
                Column::new("num_routes", SemanticType::Integer),
            ],
            (2017..=2024)
                .map(|y| vec![Value::Int(y), Value::Float(100.0), Value::Int(2)])
                .collect(),
        );
        let severity = table(
            COLLISION_SEVERITY,
            vec![
                Column::new("year", SemanticType::Integer),
                Column::new("collision_severity", SemanticType::Text),
                Column::new("num_collisions", SemanticType::Integer),
            ],
            vec![
                vec![Value::Int(2020), Value::Text("Fatal".into()), Value::Int(3)],
                vec![Value::Int(2020), Value::Text("Injury".into()), Value::Int(40)],
                vec![Value::Int(2010), Value::Text("Fatal".into()), Value::Int(9)],
            ],
        );
        let vmt = table(
            VMT_TRENDS,
            vec![
                Column::new("year", SemanticType::Integer),
                Column::new("peak", SemanticType::Text),
                Column::new("freeway", SemanticType::Text),
                Column::new("vmt", SemanticType::Float),
            ],
            vec![vec![
                Value::Int(2021),
                Value::Text("AM".into()),
                Value::Text("I-5".into()),
                Value::Float(7.5),
            ]],
        );

        let by_route = table(
            RIDERSHIP_BY_ROUTE,
            vec![
                Column::new("year", SemanticType::Integer),
                Column::new("route", SemanticType::Text),
                Column::new("route_name", SemanticType::Text),
                Column::new("avg_weekday_boardings", SemanticType::Float),
            ],
            vec![
                vec![Value::Int(2021), Value::Text("7".into()), Value::Null, Value::Float(1.0)],
                vec![Value::Int(2021), Value::Text("10".into()), Value::Null, Value::Float(2.0)],
            ],
        );
        let travel = table(
            TRAVEL_TIME_TRENDS,
            vec![
                Column::new("year", SemanticType::Integer),
                Column::new("route", SemanticType::Text),
                Column::new("peak", SemanticType::Text),
                Column::new("mean_minutes", SemanticType::Float),
            ],
            vec![
                vec![
                    Value::Int(2021),
                    Value::Text("I-15".into()),
                    Value::Text("PM".into()),
                    Value::Float(20.0),
                ],
                vec![
                    Value::Int(2021),
                    Value::Text("I-15".into()),
                    Value::Text("AM".into()),
                    Value::Float(18.0),
                ],
            ],
        );

        let mut snapshot = AggregatedSnapshot::default();
        for t in [ridership, severity, vmt, by_route, travel] {
            snapshot.tables.insert(t.name.to_string(), t);
        }
        let store = FileStore::new(&FilesystemConfig {
            root: dir.path().display().to_string(),
            retain_generations: 1,
        });
        store
            .publish(&snapshot, &BuildId::generate(Utc::now()), Utc::now())
            .await
            .unwrap();
        QueryService::new(Arc::new(store), QueryConfig::default())
    }

    #[tokio::test]
    async fn test_run_applies_default_years() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        let rows = service.run(&QueryRequest::new("ridership_trends")).await.unwrap();
        let years: Vec<i64> = rows.rows.iter().filter_map(|r| r[0].as_i64()).collect();
        assert_eq!(years, vec![2019, 2020, 2021, 2022, 2023, 2024]);
        assert_eq!(rows.columns[1].name, "total_weekday_boardings");
    }

    #[tokio::test]
    async fn test_rejections_happen_before_the_store() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;

        let err = service.run(&QueryRequest::new("nope")).await.unwrap_err();
        assert!(matches!(err, CorridorError::Query(QueryError::UnknownView(_))));

        let mut greedy = QueryRequest::new("ridership_by_route");
        greedy.expected_row_budget = Some(500);
        let err = service.run(&greedy).await.unwrap_err();
        assert!(matches!(
            err,
            CorridorError::Query(QueryError::RowBudgetExceeded { budget: 20, .. })
        ));
    }

    #[tokio::test]
    async fn test_caller_budget_overflow() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        let mut tight = QueryRequest::new("ridership_trends");
        tight.expected_row_budget = Some(3);
        let err = service.run(&tight).await.unwrap_err();
        assert!(matches!(
            err,
            CorridorError::Query(QueryError::RowBudgetExceeded { budget: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_overview_sums_within_range() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        let overview = service.overview(None, None).await.unwrap();
        assert_eq!(overview.total_weekday_boardings, 600.0);
        assert_eq!(overview.total_vmt, 7.5);
        assert_eq!(overview.total_collisions, 43.0);
        assert_eq!(overview.fatal_collisions, 3.0);
    }

    #[tokio::test]
    async fn test_filter_options_union_years() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        let options = service.filter_options().await.unwrap();
        assert_eq!(options.years.first(), Some(&2010));
        assert_eq!(options.years.last(), Some(&2024));
        assert_eq!(options.routes, vec!["10", "7"]);
        assert_eq!(options.freeways, vec!["I-5"]);
        assert_eq!(options.severities, vec!["Fatal", "Injury"]);
        assert_eq!(options.peaks, vec!["AM", "PM"]);
    }

    #[tokio::test]
    async fn test_unpublished_store_is_refused() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(&FilesystemConfig {
            root: dir.path().display().to_string(),
            retain_generations: 1,
        });
        let service = QueryService::new(Arc::new(store), QueryConfig::default());
        let err = service.run(&QueryRequest::new("vmt")).await.unwrap_err();
        assert!(matches!(err, CorridorError::NotPublished(_)));
    }
}
