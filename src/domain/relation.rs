//! Tabular data carried between pipeline stages

use super::ids::SourceId;
use super::value::{SemanticType, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Raw snapshot file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawFormat {
    /// Array of flat JSON records
    Json,
    /// Comma-separated values with a header row
    Csv,
}

impl RawFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RawFormat::Json => "json",
            RawFormat::Csv => "csv",
        }
    }
}

/// One source's raw extract as written by ingestion
///
/// Every cell is untyped text; `None` marks a value that was absent from the
/// record altogether.
#[derive(Debug, Clone)]
pub struct RawDataset {
    pub source_id: SourceId,
    pub format: RawFormat,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub fetched_at: DateTime<Utc>,
}

impl RawDataset {
    /// Implicit schema version: a short digest of the sorted column set
    pub fn schema_version(&self) -> String {
        let mut columns = self.columns.clone();
        columns.sort();
        let digest = Sha256::digest(columns.join("\u{1f}").as_bytes());
        format!("{digest:x}")[..12].to_string()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub semantic_type: SemanticType,
}

impl Column {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
        }
    }
}

pub type Row = Vec<Value>;

/// Typed in-memory relation
#[derive(Debug, Clone, Default)]
pub struct Relation {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl Relation {
    pub fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates the cells of one column, or nothing if the column is absent
    pub fn values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Value> + 'a {
        let idx = self.column_index(name);
        self.rows
            .iter()
            .filter_map(move |row| idx.and_then(|i| row.get(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(columns: &[&str]) -> RawDataset {
        RawDataset {
            source_id: SourceId::new("vmt_pems").unwrap(),
            format: RawFormat::Json,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: vec![],
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_schema_version_ignores_column_order() {
        let a = raw(&["year", "peak", "vmt"]);
        let b = raw(&["vmt", "year", "peak"]);
        let c = raw(&["year", "peak"]);
        assert_eq!(a.schema_version(), b.schema_version());
        assert_ne!(a.schema_version(), c.schema_version());
        assert_eq!(a.schema_version().len(), 12);
    }

    #[test]
    fn test_relation_values() {
        let relation = Relation::new(
            vec![
                Column::new("year", SemanticType::Integer),
                Column::new("vmt", SemanticType::Float),
            ],
            vec![
                vec![Value::Int(2020), Value::Float(1.0)],
                vec![Value::Int(2021), Value::Null],
            ],
        );
        let years: Vec<_> = relation.values("year").cloned().collect();
        assert_eq!(years, vec![Value::Int(2020), Value::Int(2021)]);
        assert_eq!(relation.values("missing").count(), 0);
    }
}
