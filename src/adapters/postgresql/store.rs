//! PostgreSQL aggregated store
//!
//! Each published table is a regular table named after it, with a leading
//! `_row` ordinal that preserves row order. A publish fills `<table>__staging`
//! tables, then swaps them in and upserts the manifest row inside a single
//! transaction. Reads run in a read-only repeatable-read transaction, so one
//! call never mixes two builds.

use super::client::PostgreSQLClient;
use crate::adapters::store::AggregateStore;
use crate::config::StoreTarget;
use crate::core::query::predicate::quote_ident;
use crate::core::query::{QueryPlan, QueryRows};
use crate::core::transform::{AggregatedSnapshot, AggregatedTable, StoreManifest, TableManifest};
use crate::domain::{BuildId, Column, CorridorError, Result, Row, SemanticType, TableName, Value};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use tokio_postgres::types::ToSql;
use tokio_postgres::IsolationLevel;

const MANIFEST_TABLE: &str = "corridor_manifest";
const ROW_ORDINAL: &str = "_row";

/// Bind parameter ceiling of the PostgreSQL wire protocol
const MAX_PARAMS: usize = 65_535;
const MAX_BATCH_ROWS: usize = 1_000;

type Param = Box<dyn ToSql + Sync + Send>;

pub struct PostgresStore {
    client: PostgreSQLClient,
}

impl PostgresStore {
    pub fn new(client: PostgreSQLClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &PostgreSQLClient {
        &self.client
    }

    /// Opens a read-only repeatable-read transaction on `conn`
    ///
    /// Dropping the transaction rolls it back, so early returns release it.
    async fn begin_read<'c>(
        &self,
        conn: &'c mut deadpool_postgres::Object,
    ) -> Result<deadpool_postgres::Transaction<'c>> {
        let tx = conn
            .build_transaction()
            .read_only(true)
            .isolation_level(IsolationLevel::RepeatableRead)
            .start()
            .await?;
        tx.batch_execute(&format!(
            "SET LOCAL statement_timeout = {}",
            self.client.statement_timeout_ms()
        ))
        .await?;
        Ok(tx)
    }
}

async fn read_manifest(tx: &deadpool_postgres::Transaction<'_>) -> Result<Option<StoreManifest>> {
    let exists: bool = tx
        .query_one(
            &format!("SELECT to_regclass('{MANIFEST_TABLE}') IS NOT NULL"),
            &[],
        )
        .await?
        .try_get(0)?;
    if !exists {
        return Ok(None);
    }
    let row = tx
        .query_opt(
            &format!("SELECT manifest FROM {MANIFEST_TABLE} WHERE id = 1"),
            &[],
        )
        .await?;
    match row {
        Some(row) => {
            let manifest: serde_json::Value = row.try_get(0)?;
            Ok(Some(serde_json::from_value(manifest)?))
        }
        None => Ok(None),
    }
}

async fn require_manifest(tx: &deadpool_postgres::Transaction<'_>) -> Result<StoreManifest> {
    read_manifest(tx)
        .await?
        .ok_or_else(|| CorridorError::NotPublished(format!("table {MANIFEST_TABLE}")))
}

async fn read_table(
    tx: &deadpool_postgres::Transaction<'_>,
    entry: &TableManifest,
    built_at: DateTime<Utc>,
) -> Result<AggregatedTable> {
    let rows = tx.query(&select_table_sql(entry), &[]).await?;
    let rows = rows
        .iter()
        .map(|row| decode_row(row, &entry.columns))
        .collect::<Result<Vec<_>>>()?;
    Ok(AggregatedTable::from_manifest(entry, rows, built_at))
}

pub fn create_table_sql(table: &str, columns: &[Column]) -> String {
    let mut defs = vec![format!("{} BIGINT NOT NULL", quote_ident(ROW_ORDINAL))];
    defs.extend(
        columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.semantic_type.sql_type())),
    );
    format!("CREATE TABLE {} ({})", quote_ident(table), defs.join(", "))
}

/// Multi-row insert for `rows` rows of `columns.len() + 1` parameters each
pub fn insert_sql(table: &str, columns: &[Column], rows: usize) -> String {
    let width = columns.len() + 1;
    let names: Vec<String> = std::iter::once(quote_ident(ROW_ORDINAL))
        .chain(columns.iter().map(|c| quote_ident(&c.name)))
        .collect();
    let tuples: Vec<String> = (0..rows)
        .map(|r| {
            let placeholders: Vec<String> =
                (1..=width).map(|c| format!("${}", r * width + c)).collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table),
        names.join(", "),
        tuples.join(", ")
    )
}

/// Rows per insert so one statement stays under the parameter ceiling
pub fn batch_rows(column_count: usize) -> usize {
    (MAX_PARAMS / (column_count + 1)).clamp(1, MAX_BATCH_ROWS)
}

fn select_table_sql(entry: &TableManifest) -> String {
    let names: Vec<String> = entry.columns.iter().map(|c| quote_ident(&c.name)).collect();
    format!(
        "SELECT {} FROM {} ORDER BY {}",
        names.join(", "),
        quote_ident(entry.name.as_str()),
        quote_ident(ROW_ORDINAL)
    )
}

/// Typed parameter for a cell of a column of type `ty`
fn cell_param(value: &Value, ty: SemanticType) -> Param {
    match ty {
        SemanticType::Integer => Box::new(value.as_i64()),
        SemanticType::Float => Box::new(value.as_f64()),
        SemanticType::Boolean => Box::new(value.as_bool()),
        SemanticType::Text => Box::new(value.as_str().map(str::to_string)),
        SemanticType::Date => Box::new(match value {
            Value::Date(d) => Some(*d),
            _ => None,
        }),
        SemanticType::Timestamp => Box::new(match value {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }),
    }
}

/// Parameter for a predicate value, typed by its own variant
fn predicate_param(value: &Value) -> Param {
    match value {
        Value::Null => Box::new(Option::<String>::None),
        Value::Bool(b) => Box::new(*b),
        Value::Int(i) => Box::new(*i),
        Value::Float(x) => Box::new(*x),
        Value::Text(s) => Box::new(s.clone()),
        Value::Date(d) => Box::new(*d),
        Value::Timestamp(ts) => Box::new(*ts),
    }
}

fn decode_row(row: &tokio_postgres::Row, columns: &[Column]) -> Result<Row> {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = match column.semantic_type {
                SemanticType::Integer => row.try_get::<_, Option<i64>>(i)?.map(Value::Int),
                SemanticType::Float => row.try_get::<_, Option<f64>>(i)?.map(Value::Float),
                SemanticType::Boolean => row.try_get::<_, Option<bool>>(i)?.map(Value::Bool),
                SemanticType::Text => row.try_get::<_, Option<String>>(i)?.map(Value::Text),
                SemanticType::Date => row.try_get::<_, Option<NaiveDate>>(i)?.map(Value::Date),
                SemanticType::Timestamp => row
                    .try_get::<_, Option<NaiveDateTime>>(i)?
                    .map(Value::Timestamp),
            };
            Ok(value.unwrap_or(Value::Null))
        })
        .collect()
}

fn as_refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

async fn write_table(
    tx: &deadpool_postgres::Transaction<'_>,
    staging: &str,
    table: &AggregatedTable,
) -> Result<()> {
    tx.batch_execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(staging)))
        .await?;
    tx.batch_execute(&create_table_sql(staging, &table.columns))
        .await?;

    let per_batch = batch_rows(table.columns.len());
    for (batch_no, chunk) in table.rows.chunks(per_batch).enumerate() {
        let mut params: Vec<Param> = Vec::with_capacity(chunk.len() * (table.columns.len() + 1));
        for (offset, row) in chunk.iter().enumerate() {
            params.push(Box::new((batch_no * per_batch + offset) as i64));
            for (cell, column) in row.iter().zip(&table.columns) {
                params.push(cell_param(cell, column.semantic_type));
            }
        }
        tx.execute(
            &insert_sql(staging, &table.columns, chunk.len()),
            &as_refs(&params),
        )
        .await?;
    }
    Ok(())
}

#[async_trait]
impl AggregateStore for PostgresStore {
    fn backend(&self) -> StoreTarget {
        StoreTarget::PostgreSQL
    }

    fn location(&self) -> String {
        self.client.connection_string_safe()
    }

    async fn publish(
        &self,
        snapshot: &AggregatedSnapshot,
        build_id: &BuildId,
        built_at: DateTime<Utc>,
    ) -> Result<StoreManifest> {
        let manifest = StoreManifest::from_snapshot(build_id.clone(), built_at, snapshot)?;
        let manifest_json = serde_json::to_value(&manifest)?;

        let mut conn = self.client.get_connection().await?;
        let tx = conn.transaction().await?;
        tx.batch_execute(&format!(
            "SET LOCAL statement_timeout = {}",
            self.client.statement_timeout_ms()
        ))
        .await?;
        tx.batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS {MANIFEST_TABLE} (\
                id SMALLINT PRIMARY KEY CHECK (id = 1), \
                build_id TEXT NOT NULL, \
                built_at TIMESTAMPTZ NOT NULL, \
                manifest JSONB NOT NULL)"
        ))
        .await?;

        for (name, table) in &snapshot.tables {
            let staging = TableName::new(name.clone())
                .map_err(CorridorError::Database)?
                .staging_name();
            write_table(&tx, &staging, table).await?;
            tracing::debug!(table = %name, rows = table.rows.len(), "Staging table written");
        }

        // Tables from an earlier build that this build no longer produces go too
        if let Some(previous) = read_manifest(&tx).await? {
            for stale in previous.tables.keys().filter(|t| !snapshot.tables.contains_key(*t)) {
                tx.batch_execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(stale)))
                    .await?;
            }
        }

        for name in snapshot.tables.keys() {
            let staging = TableName::new(name.clone())
                .map_err(CorridorError::Database)?
                .staging_name();
            tx.batch_execute(&format!(
                "DROP TABLE IF EXISTS {table}; ALTER TABLE {staging} RENAME TO {table}",
                table = quote_ident(name),
                staging = quote_ident(&staging),
            ))
            .await?;
        }

        tx.execute(
            &format!(
                "INSERT INTO {MANIFEST_TABLE} (id, build_id, built_at, manifest) \
                 VALUES (1, $1, $2, $3) \
                 ON CONFLICT (id) DO UPDATE SET build_id = EXCLUDED.build_id, \
                 built_at = EXCLUDED.built_at, manifest = EXCLUDED.manifest"
            ),
            &[&build_id.as_str(), &built_at, &manifest_json],
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            build_id = %build_id,
            tables = manifest.tables.len(),
            target = %self.location(),
            "Aggregated store published"
        );
        Ok(manifest)
    }

    async fn current_manifest(&self) -> Result<Option<StoreManifest>> {
        let mut conn = self.client.get_connection().await?;
        let tx = self.begin_read(&mut conn).await?;
        let manifest = read_manifest(&tx).await?;
        tx.rollback().await?;
        Ok(manifest)
    }

    async fn load_table(&self, name: &str) -> Result<AggregatedTable> {
        let mut conn = self.client.get_connection().await?;
        let tx = self.begin_read(&mut conn).await?;
        let manifest = require_manifest(&tx).await?;
        let entry = manifest.tables.get(name).ok_or_else(|| {
            CorridorError::Database(format!(
                "table '{name}' is not part of build {}",
                manifest.build_id
            ))
        })?;
        let table = read_table(&tx, entry, manifest.built_at).await?;
        tx.rollback().await?;
        Ok(table)
    }

    async fn load_snapshot(&self) -> Result<AggregatedSnapshot> {
        let mut conn = self.client.get_connection().await?;
        let tx = self.begin_read(&mut conn).await?;
        let manifest = require_manifest(&tx).await?;
        let mut tables = BTreeMap::new();
        for (name, entry) in &manifest.tables {
            tables.insert(name.clone(), read_table(&tx, entry, manifest.built_at).await?);
        }
        tx.rollback().await?;
        Ok(AggregatedSnapshot {
            tables,
            source_stats: manifest.source_stats,
        })
    }

    async fn run_query(&self, plan: &QueryPlan) -> Result<QueryRows> {
        let mut conn = self.client.get_connection().await?;
        let tx = self.begin_read(&mut conn).await?;
        let manifest = require_manifest(&tx).await?;
        let entry = manifest.tables.get(plan.table).ok_or_else(|| {
            CorridorError::Database(format!(
                "table '{}' is not part of build {}",
                plan.table, manifest.build_id
            ))
        })?;
        let columns = plan.output_columns(&entry.columns)?;
        let (sql, values) = plan.to_sql();
        let params: Vec<Param> = values.iter().map(predicate_param).collect();
        let rows = tx.query(&sql, &as_refs(&params)).await?;
        let rows = rows
            .iter()
            .map(|row| decode_row(row, &columns))
            .collect::<Result<Vec<_>>>()?;
        tx.rollback().await?;
        Ok(QueryRows {
            view: plan.view.clone(),
            columns,
            rows,
        })
    }
}
