//! Filesystem aggregated store
//!
//! ```text
//! <root>/CURRENT                      build id of the published generation
//! <root>/generations/<build_id>/      manifest.json + <table>.jsonl
//! <root>/staging/<build_id>/          generation being written
//! ```
//!
//! A generation is written under `staging/`, renamed into `generations/`,
//! and published by atomically replacing `CURRENT`.

use super::traits::AggregateStore;
use crate::config::{FilesystemConfig, StoreTarget};
use crate::core::checksum::verify_checksum;
use crate::core::query::{QueryPlan, QueryRows};
use crate::core::transform::{AggregatedSnapshot, AggregatedTable, StoreManifest, TableManifest};
use crate::domain::{BuildId, CorridorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const CURRENT: &str = "CURRENT";
const MANIFEST: &str = "manifest.json";

pub struct FileStore {
    root: PathBuf,
    retain_generations: usize,
}

impl FileStore {
    pub fn new(config: &FilesystemConfig) -> Self {
        Self {
            root: PathBuf::from(&config.root),
            retain_generations: config.retain_generations,
        }
    }

    fn generations_dir(&self) -> PathBuf {
        self.root.join("generations")
    }

    fn generation_dir(&self, build_id: &str) -> PathBuf {
        self.generations_dir().join(build_id)
    }

    fn table_file(dir: &Path, table: &str) -> PathBuf {
        dir.join(format!("{table}.jsonl"))
    }

    /// Build id named by `CURRENT`, read once
    async fn current_build(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.root.join(CURRENT)).await {
            Ok(id) => {
                let id = id.trim().to_string();
                Ok((!id.is_empty()).then_some(id))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_manifest(&self, build_id: &str) -> Result<StoreManifest> {
        let bytes = tokio::fs::read(self.generation_dir(build_id).join(MANIFEST)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Resolves the current generation or fails with `NotPublished`
    async fn resolve(&self) -> Result<(String, StoreManifest)> {
        let build_id = self
            .current_build()
            .await?
            .ok_or_else(|| CorridorError::NotPublished(self.root.display().to_string()))?;
        let manifest = self.read_manifest(&build_id).await?;
        Ok((build_id, manifest))
    }

    async fn read_table(
        &self,
        build_id: &str,
        entry: &TableManifest,
        built_at: DateTime<Utc>,
    ) -> Result<AggregatedTable> {
        let path = Self::table_file(&self.generation_dir(build_id), entry.name.as_str());
        let payload = tokio::fs::read(&path).await?;
        if !verify_checksum(&payload, &entry.checksum) {
            return Err(CorridorError::Database(format!(
                "checksum mismatch for table '{}' in build {build_id}",
                entry.name
            )));
        }
        let rows = AggregatedTable::decode_rows(&entry.columns, &payload)?;
        Ok(AggregatedTable::from_manifest(entry, rows, built_at))
    }

    async fn stage(
        &self,
        dir: &Path,
        snapshot: &AggregatedSnapshot,
        manifest: &StoreManifest,
    ) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        for (name, table) in &snapshot.tables {
            tokio::fs::write(Self::table_file(dir, name), table.encode_rows()?).await?;
        }
        // The manifest goes last: a generation without one is incomplete
        tokio::fs::write(dir.join(MANIFEST), serde_json::to_vec_pretty(manifest)?).await?;
        Ok(())
    }

    async fn load_table_from(
        &self,
        build_id: &str,
        manifest: &StoreManifest,
        name: &str,
    ) -> Result<AggregatedTable> {
        let entry = manifest.tables.get(name).ok_or_else(|| {
            CorridorError::Database(format!("table '{name}' is not part of build {build_id}"))
        })?;
        self.read_table(build_id, entry, manifest.built_at).await
    }

    async fn load_snapshot_from(
        &self,
        build_id: &str,
        manifest: &StoreManifest,
    ) -> Result<AggregatedSnapshot> {
        let mut tables = BTreeMap::new();
        for (name, entry) in &manifest.tables {
            let table = self.read_table(build_id, entry, manifest.built_at).await?;
            tables.insert(name.clone(), table);
        }
        Ok(AggregatedSnapshot {
            tables,
            source_stats: manifest.source_stats.clone(),
        })
    }

    /// True once `CURRENT` names a build other than `build_id`
    async fn superseded(&self, build_id: &str) -> bool {
        matches!(self.current_build().await, Ok(Some(current)) if current != build_id)
    }

    /// Removes generations beyond the retention count
    ///
    /// The new current generation and the one it replaced are always kept, so
    /// a reader that resolved `CURRENT` just before the swap can finish.
    async fn prune(&self, current: &str, previous: Option<&str>) -> Result<()> {
        let mut entries = tokio::fs::read_dir(self.generations_dir()).await?;
        let mut generations = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                generations.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        generations.sort();
        generations.reverse();

        for stale in generations.iter().skip(self.retain_generations) {
            if stale == current || Some(stale.as_str()) == previous {
                continue;
            }
            tokio::fs::remove_dir_all(self.generation_dir(stale)).await?;
            tracing::debug!(build_id = %stale, "Pruned generation");
        }
        Ok(())
    }
}

#[async_trait]
impl AggregateStore for FileStore {
    fn backend(&self) -> StoreTarget {
        StoreTarget::Filesystem
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }

    async fn publish(
        &self,
        snapshot: &AggregatedSnapshot,
        build_id: &BuildId,
        built_at: DateTime<Utc>,
    ) -> Result<StoreManifest> {
        let manifest = StoreManifest::from_snapshot(build_id.clone(), built_at, snapshot)?;
        let staging = self.root.join("staging").join(build_id.as_str());

        if let Err(e) = self.stage(&staging, snapshot, &manifest).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        let previous = self.current_build().await?;
        tokio::fs::create_dir_all(self.generations_dir()).await?;
        let generation = self.generation_dir(build_id.as_str());
        tokio::fs::rename(&staging, &generation).await?;

        let pointer_tmp = self.root.join(format!("{CURRENT}.tmp"));
        tokio::fs::write(&pointer_tmp, build_id.as_str()).await?;
        tokio::fs::rename(&pointer_tmp, self.root.join(CURRENT)).await?;

        tracing::info!(
            build_id = %build_id,
            tables = manifest.tables.len(),
            bytes = manifest.total_payload_bytes(),
            path = %generation.display(),
            "Aggregated store published"
        );

        if let Err(e) = self.prune(build_id.as_str(), previous.as_deref()).await {
            tracing::warn!(error = %e, "Failed to prune old generations");
        }

        Ok(manifest)
    }

    async fn current_manifest(&self) -> Result<Option<StoreManifest>> {
        match self.current_build().await? {
            Some(build_id) => Ok(Some(self.read_manifest(&build_id).await?)),
            None => Ok(None),
        }
    }

    async fn load_table(&self, name: &str) -> Result<AggregatedTable> {
        let (build_id, manifest) = self.resolve().await?;
        let result = self.load_table_from(&build_id, &manifest, name).await;
        if let Err(e) = &result {
            if self.superseded(&build_id).await {
                tracing::debug!(
                    build_id = %build_id,
                    error = %e,
                    "Generation superseded, re-resolving"
                );
                let (build_id, manifest) = self.resolve().await?;
                return self.load_table_from(&build_id, &manifest, name).await;
            }
        }
        result
    }

    async fn load_snapshot(&self) -> Result<AggregatedSnapshot> {
        let (build_id, manifest) = self.resolve().await?;
        let result = self.load_snapshot_from(&build_id, &manifest).await;
        if let Err(e) = &result {
            if self.superseded(&build_id).await {
                tracing::debug!(
                    build_id = %build_id,
                    error = %e,
                    "Generation superseded, re-resolving"
                );
                let (build_id, manifest) = self.resolve().await?;
                return self.load_snapshot_from(&build_id, &manifest).await;
            }
        }
        result
    }

    async fn run_query(&self, plan: &QueryPlan) -> Result<QueryRows> {
        let table = self.load_table(plan.table).await?;
        let columns = plan.output_columns(&table.columns)?;
        let rows = plan.execute(&table)?;
        Ok(QueryRows {
            view: plan.view.clone(),
            columns,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transform::definition::RowBand;
    use crate::core::transform::Lineage;
    use crate::domain::{Column, SemanticType, TableName, Value};
    use tempfile::TempDir;

    fn snapshot(total: f64) -> AggregatedSnapshot {
        let table = AggregatedTable {
            name: TableName::new("ridership_trends").unwrap(),
            columns: vec![
                Column::new("year", SemanticType::Integer),
                Column::new("total_weekday_boardings", SemanticType::Float),
                Column::new("num_routes", SemanticType::Integer),
            ],
            rows: vec![vec![Value::Int(2021), Value::Float(total), Value::Int(4)]],
            lineage: Lineage {
                sources: vec!["transit_ridership".into()],
                ..Default::default()
            },
            built_at: Utc::now(),
            row_band: RowBand::between(1, 50),
        };
        let mut tables = BTreeMap::new();
        tables.insert("ridership_trends".to_string(), table);
        AggregatedSnapshot {
            tables,
            source_stats: BTreeMap::new(),
        }
    }

    fn store(dir: &TempDir, retain: usize) -> FileStore {
        FileStore::new(&FilesystemConfig {
            root: dir.path().display().to_string(),
            retain_generations: retain,
        })
    }

    #[tokio::test]
    async fn test_unpublished_store_is_refused() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 2);
        assert!(store.current_manifest().await.unwrap().is_none());
        assert!(matches!(
            store.load_snapshot().await,
            Err(CorridorError::NotPublished(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 2);
        let build_id = BuildId::from("20240101T000000Z-aaaaaaaa".to_string());
        let manifest = store
            .publish(&snapshot(1500.5), &build_id, Utc::now())
            .await
            .unwrap();
        assert_eq!(manifest.tables["ridership_trends"].row_count, 1);

        let loaded = store.load_table("ridership_trends").await.unwrap();
        assert_eq!(loaded.rows[0][1], Value::Float(1500.5));
        assert_eq!(loaded.lineage.sources, vec!["transit_ridership"]);
        assert!(!dir.path().join("staging").join(build_id.as_str()).exists());
    }

    #[tokio::test]
    async fn test_republish_replaces_and_prunes() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 1);
        let first = BuildId::from("20240101T000000Z-aaaaaaaa".to_string());
        let second = BuildId::from("20240102T000000Z-bbbbbbbb".to_string());
        let third = BuildId::from("20240103T000000Z-cccccccc".to_string());
        store.publish(&snapshot(1.0), &first, Utc::now()).await.unwrap();
        store.publish(&snapshot(2.0), &second, Utc::now()).await.unwrap();
        store.publish(&snapshot(3.0), &third, Utc::now()).await.unwrap();

        let current = store.current_manifest().await.unwrap().unwrap();
        assert_eq!(current.build_id, third);
        assert!(!store.generation_dir(first.as_str()).exists());
        assert!(store.generation_dir(second.as_str()).exists());
        let loaded = store.load_table("ridership_trends").await.unwrap();
        assert_eq!(loaded.rows[0][1], Value::Float(3.0));
    }

    #[tokio::test]
    async fn test_reader_of_replaced_generation_still_reads_it() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 1);
        let first = BuildId::from("20240101T000000Z-aaaaaaaa".to_string());
        let second = BuildId::from("20240102T000000Z-bbbbbbbb".to_string());
        store.publish(&snapshot(1.0), &first, Utc::now()).await.unwrap();

        // Resolved before the second publish swaps CURRENT
        let (held_id, held_manifest) = store.resolve().await.unwrap();
        store.publish(&snapshot(2.0), &second, Utc::now()).await.unwrap();

        let table = store
            .load_table_from(&held_id, &held_manifest, "ridership_trends")
            .await
            .unwrap();
        assert_eq!(table.rows[0][1], Value::Float(1.0));
    }

    #[tokio::test]
    async fn test_superseded_follows_current() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 3);
        let first = BuildId::from("20240101T000000Z-aaaaaaaa".to_string());
        let second = BuildId::from("20240102T000000Z-bbbbbbbb".to_string());
        store.publish(&snapshot(1.0), &first, Utc::now()).await.unwrap();
        store.publish(&snapshot(2.0), &second, Utc::now()).await.unwrap();

        assert!(store.superseded(first.as_str()).await);
        assert!(!store.superseded(second.as_str()).await);
        let snapshot = store.load_snapshot().await.unwrap();
        assert_eq!(snapshot.tables["ridership_trends"].rows[0][1], Value::Float(2.0));
    }

    #[tokio::test]
    async fn test_corrupted_payload_detected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 2);
        let build_id = BuildId::from("20240101T000000Z-aaaaaaaa".to_string());
        store.publish(&snapshot(1.0), &build_id, Utc::now()).await.unwrap();

        let generation = store.generation_dir(build_id.as_str());
        let path = FileStore::table_file(&generation, "ridership_trends");
        std::fs::write(path, "[2021,999.0,4]\n").unwrap();
        assert!(matches!(
            store.load_table("ridership_trends").await,
            Err(CorridorError::Database(_))
        ));
    }
}
