//! Built aggregated tables and the manifest describing a published build

use super::definition::RowBand;
use crate::core::checksum::payload_checksum;
use crate::domain::{
    BuildId, Column, CorridorError, FilterAudit, NormalizationStats, Result, Row, TableName,
    Value,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a table's rows came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    pub sources: Vec<String>,
    /// Snapshot time of each contributing raw source
    pub fetched_at: BTreeMap<String, DateTime<Utc>>,
    /// Category and slice filters applied to the contributing sources
    pub filter_audits: Vec<FilterAudit>,
}

/// One built table
#[derive(Debug, Clone)]
pub struct AggregatedTable {
    pub name: TableName,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    pub lineage: Lineage,
    pub built_at: DateTime<Utc>,
    pub row_band: RowBand,
}

impl AggregatedTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Cells of one column, or nothing if the column is absent
    pub fn values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Value> + 'a {
        let idx = self.column_index(name);
        self.rows
            .iter()
            .filter_map(move |row| idx.and_then(|i| row.get(i)))
    }

    /// Canonical payload: one JSON array per row, newline terminated
    ///
    /// Depends only on columns and rows, never on build time, so an
    /// unchanged raw snapshot yields byte-identical payloads.
    pub fn encode_rows(&self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        for row in &self.rows {
            let cells: Vec<serde_json::Value> = row.iter().map(Value::to_json).collect();
            serde_json::to_writer(&mut payload, &cells)?;
            payload.push(b'\n');
        }
        Ok(payload)
    }

    pub fn decode_rows(columns: &[Column], payload: &[u8]) -> Result<Vec<Row>> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| CorridorError::Serialization(format!("payload is not UTF-8: {e}")))?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(line_no, line)| {
                let cells: Vec<serde_json::Value> = serde_json::from_str(line)?;
                if cells.len() != columns.len() {
                    return Err(CorridorError::Serialization(format!(
                        "line {} has {} cells, expected {}",
                        line_no + 1,
                        cells.len(),
                        columns.len()
                    )));
                }
                cells
                    .iter()
                    .zip(columns)
                    .map(|(cell, column)| {
                        Value::from_json(cell, column.semantic_type).map_err(|e| {
                            CorridorError::Serialization(format!("column '{}': {e}", column.name))
                        })
                    })
                    .collect()
            })
            .collect()
    }

    pub fn checksum(&self) -> Result<String> {
        Ok(payload_checksum(&self.encode_rows()?))
    }

    /// Manifest entry for this table
    pub fn describe(&self) -> Result<TableManifest> {
        let payload = self.encode_rows()?;
        Ok(TableManifest {
            name: self.name.clone(),
            columns: self.columns.clone(),
            row_count: self.rows.len(),
            payload_bytes: payload.len() as u64,
            checksum: payload_checksum(&payload),
            row_band: self.row_band,
            lineage: self.lineage.clone(),
        })
    }

    /// Rebuild a table from its manifest entry and stored rows
    pub fn from_manifest(entry: &TableManifest, rows: Vec<Row>, built_at: DateTime<Utc>) -> Self {
        Self {
            name: entry.name.clone(),
            columns: entry.columns.clone(),
            rows,
            lineage: entry.lineage.clone(),
            built_at,
            row_band: entry.row_band,
        }
    }
}

/// Everything one build produces
#[derive(Debug, Clone, Default)]
pub struct AggregatedSnapshot {
    /// The twelve published tables plus the auxiliary relations
    pub tables: BTreeMap<String, AggregatedTable>,
    /// Normalization statistics per source
    pub source_stats: BTreeMap<String, NormalizationStats>,
}

impl AggregatedSnapshot {
    pub fn table(&self, name: &str) -> Option<&AggregatedTable> {
        self.tables.get(name)
    }
}

/// Manifest entry for one stored table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableManifest {
    pub name: TableName,
    pub columns: Vec<Column>,
    pub row_count: usize,
    pub payload_bytes: u64,
    pub checksum: String,
    pub row_band: RowBand,
    pub lineage: Lineage,
}

/// Published build description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreManifest {
    pub build_id: BuildId,
    pub built_at: DateTime<Utc>,
    pub tables: BTreeMap<String, TableManifest>,
    pub source_stats: BTreeMap<String, NormalizationStats>,
}

impl StoreManifest {
    pub fn from_snapshot(
        build_id: BuildId,
        built_at: DateTime<Utc>,
        snapshot: &AggregatedSnapshot,
    ) -> Result<Self> {
        let tables = snapshot
            .tables
            .iter()
            .map(|(name, table)| Ok((name.clone(), table.describe()?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self {
            build_id,
            built_at,
            tables,
            source_stats: snapshot.source_stats.clone(),
        })
    }

    pub fn total_payload_bytes(&self) -> u64 {
        self.tables.values().map(|t| t.payload_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SemanticType;
    use chrono::NaiveDate;

    fn table() -> AggregatedTable {
        AggregatedTable {
            name: TableName::new("youth_pass_trends").unwrap(),
            columns: vec![
                Column::new("month", SemanticType::Date),
                Column::new("total_rides", SemanticType::Float),
                Column::new("num_routes", SemanticType::Integer),
            ],
            rows: vec![
                vec![
                    Value::Date(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()),
                    Value::Float(1000.0),
                    Value::Int(3),
                ],
                vec![
                    Value::Date(NaiveDate::from_ymd_opt(2023, 2, 1).unwrap()),
                    Value::Null,
                    Value::Int(0),
                ],
            ],
            lineage: Lineage::default(),
            built_at: Utc::now(),
            row_band: RowBand::between(1, 99),
        }
    }

    #[test]
    fn test_encode_rows_is_canonical() {
        let payload = table().encode_rows().unwrap();
        assert_eq!(
            String::from_utf8(payload).unwrap(),
            "[\"2023-01-01\",1000.0,3]\n[\"2023-02-01\",null,0]\n"
        );
    }

    #[test]
    fn test_decode_rows_restores_types() {
        let t = table();
        let payload = t.encode_rows().unwrap();
        let rows = AggregatedTable::decode_rows(&t.columns, &payload).unwrap();
        assert_eq!(rows, t.rows);
    }

    #[test]
    fn test_decode_rows_rejects_wrong_width() {
        let t = table();
        let err = AggregatedTable::decode_rows(&t.columns, b"[1,2]\n").unwrap_err();
        assert!(matches!(err, CorridorError::Serialization(_)));
    }

    #[test]
    fn test_checksum_ignores_build_time() {
        let a = table();
        let mut b = table();
        b.built_at = a.built_at + chrono::Duration::hours(1);
        assert_eq!(a.checksum().unwrap(), b.checksum().unwrap());
    }
}
