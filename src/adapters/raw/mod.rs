//! Raw snapshot store
//!
//! One file per source under the raw directory, `<source_id>.json` (an array
//! of flat records) or `<source_id>.csv` (header row), plus an optional
//! `<source_id>.meta.json` sidecar written by ingestion.

use crate::core::normalize::SourceAdapterSpec;
use crate::domain::{CorridorError, RawDataset, RawFormat, Result, SourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Sidecar written next to each downloaded snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMeta {
    pub source_id: String,
    pub fetched_at: DateTime<Utc>,
    pub url: String,
    pub bytes: u64,
}

/// Raw snapshot directory
#[derive(Debug, Clone)]
pub struct RawStore {
    dir: PathBuf,
}

impl RawStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self, source_id: &str, format: RawFormat) -> PathBuf {
        self.dir
            .join(format!("{source_id}.{}", format.extension()))
    }

    pub fn meta_path(&self, source_id: &str) -> PathBuf {
        self.dir.join(format!("{source_id}.meta.json"))
    }

    pub async fn exists(&self, source_id: &str, format: RawFormat) -> bool {
        tokio::fs::try_exists(self.snapshot_path(source_id, format))
            .await
            .unwrap_or(false)
    }

    /// Reads and parses one snapshot
    ///
    /// # Errors
    ///
    /// Returns [`CorridorError::SourceUnavailable`] when the file is missing,
    /// unreadable or not in the expected format.
    pub async fn read(&self, spec: &SourceAdapterSpec) -> Result<RawDataset> {
        let path = self.snapshot_path(spec.source_id, spec.format);
        let unavailable = |reason: String| CorridorError::SourceUnavailable {
            source_id: spec.source_id.to_string(),
            reason,
        };

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| unavailable(format!("cannot read {}: {e}", path.display())))?;

        let (columns, rows) = match spec.format {
            RawFormat::Json => parse_json(&bytes),
            RawFormat::Csv => parse_csv(&bytes),
        }
        .map_err(|e| unavailable(format!("cannot parse {}: {e}", path.display())))?;

        let fetched_at = self.fetched_at(spec.source_id, &path).await;

        tracing::debug!(
            source_id = spec.source_id,
            path = %path.display(),
            rows = rows.len(),
            columns = columns.len(),
            "Raw snapshot loaded"
        );

        Ok(RawDataset {
            source_id: SourceId::new(spec.source_id).map_err(CorridorError::Configuration)?,
            format: spec.format,
            columns,
            rows,
            fetched_at,
        })
    }

    pub async fn read_meta(&self, source_id: &str) -> Option<RawMeta> {
        let bytes = tokio::fs::read(self.meta_path(source_id)).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(source_id = source_id, error = %e, "Ignoring unreadable sidecar");
                None
            }
        }
    }

    /// Sidecar `fetched_at`, falling back to the file modification time
    async fn fetched_at(&self, source_id: &str, path: &Path) -> DateTime<Utc> {
        if let Some(meta) = self.read_meta(source_id).await {
            return meta.fetched_at;
        }
        tokio::fs::metadata(path)
            .await
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Writes a snapshot atomically: temp file, rename, then the sidecar
    pub async fn write_snapshot(
        &self,
        source_id: &str,
        format: RawFormat,
        body: &[u8],
        url: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.snapshot_path(source_id, format);
        let tmp = self
            .dir
            .join(format!(".{source_id}.{}.tmp", format.extension()));
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        let meta = RawMeta {
            source_id: source_id.to_string(),
            fetched_at,
            url: url.to_string(),
            bytes: body.len() as u64,
        };
        tokio::fs::write(self.meta_path(source_id), serde_json::to_vec_pretty(&meta)?).await?;
        Ok(path)
    }
}

type Parsed = (Vec<String>, Vec<Vec<Option<String>>>);

fn cell_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        // Nested values (geometry and the like) are kept as JSON text
        other => Some(other.to_string()),
    }
}

/// Parses an array of flat records
///
/// Columns are the union of keys in first-seen order; keys missing from a
/// record become `None`.
pub fn parse_json(bytes: &[u8]) -> std::result::Result<Parsed, String> {
    let records: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_slice(bytes).map_err(|e| format!("expected an array of objects: {e}"))?;

    let mut columns: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for record in &records {
        for key in record.keys() {
            if !positions.contains_key(key) {
                positions.insert(key.clone(), columns.len());
                columns.push(key.clone());
            }
        }
    }

    let rows = records
        .iter()
        .map(|record| {
            let mut row = vec![None; columns.len()];
            for (key, value) in record {
                if let Some(&idx) = positions.get(key) {
                    row[idx] = cell_text(value);
                }
            }
            row
        })
        .collect();

    Ok((columns, rows))
}

/// Parses CSV with a header row; short records are padded with `None`
pub fn parse_csv(bytes: &[u8]) -> std::result::Result<Parsed, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        let row = (0..columns.len())
            .map(|i| record.get(i).map(str::to_string))
            .collect();
        rows.push(row);
    }
    Ok((columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::normalize::adapter_for;
    use tempfile::TempDir;

    #[test]
    fn test_parse_json_unions_keys() {
        let body = br#"[
            {"year": "2021", "route": "7"},
            {"year": "2022", "geometry": {"type": "Point"}, "boardings": 12.5}
        ]"#;
        let (columns, rows) = parse_json(body).unwrap();
        assert_eq!(columns, vec!["year", "route", "geometry", "boardings"]);
        assert_eq!(rows[0], vec![Some("2021".into()), Some("7".into()), None, None]);
        assert_eq!(rows[1][2].as_deref(), Some(r#"{"type":"Point"}"#));
        assert_eq!(rows[1][3].as_deref(), Some("12.5"));
    }

    #[test]
    fn test_parse_json_rejects_non_array() {
        assert!(parse_json(br#"{"error": "throttled"}"#).is_err());
    }

    #[test]
    fn test_parse_csv() {
        let body = b"street_name,limits,total_count\nMAIN ST,A - B,1200\nELM AVE,,\n";
        let (columns, rows) = parse_csv(body).unwrap();
        assert_eq!(columns, vec!["street_name", "limits", "total_count"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![Some("ELM AVE".into()), Some(String::new()), Some(String::new())]);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_source_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = RawStore::new(dir.path());
        let spec = adapter_for("vmt_pems").unwrap();
        match store.read(&spec).await {
            Err(CorridorError::SourceUnavailable { source_id, .. }) => {
                assert_eq!(source_id, "vmt_pems")
            }
            other => panic!("expected SourceUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_then_read_uses_sidecar_time() {
        let dir = TempDir::new().unwrap();
        let store = RawStore::new(dir.path());
        let fetched_at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        store
            .write_snapshot(
                "vmt_pems",
                RawFormat::Json,
                br#"[{"year":"2020","peak":"AM","freeway":"I-5","vmt":"10"}]"#,
                "http://localhost/resource/kzvf-xgyu.json",
                fetched_at,
            )
            .await
            .unwrap();

        let spec = adapter_for("vmt_pems").unwrap();
        let raw = store.read(&spec).await.unwrap();
        assert_eq!(raw.fetched_at, fetched_at);
        assert_eq!(raw.rows.len(), 1);
        let meta = store.read_meta("vmt_pems").await.unwrap();
        assert_eq!(meta.bytes, 58);
    }
}
