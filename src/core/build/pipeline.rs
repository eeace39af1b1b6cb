//! Build pipeline
//!
//! One build runs ingest (optional), normalize, transform, validate and
//! publish, in that order. Any failure before publishing leaves the
//! previously published store untouched.

use super::lock::BuildLock;
use super::summary::{BuildOutcome, BuildSummary};
use crate::adapters::ingest::{IngestSummary, RawIngestor};
use crate::adapters::raw::RawStore;
use crate::adapters::store::AggregateStore;
use crate::config::CorridorConfig;
use crate::core::normalize::{normalize, source_catalog, NormalizedRelation, SourceAdapterSpec};
use crate::core::transform::{build_aggregates, unbuilt_tables};
use crate::core::validation::validate;
use crate::domain::{BuildId, CorridorError, Result};
use crate::{log_cast_failures, log_stage_complete, log_stage_start};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-run switches set from the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Download every source even if a snapshot is already on disk
    pub force_ingest: bool,
    /// Build from the raw directory as it is
    pub skip_ingest: bool,
}

pub struct BuildPipeline {
    config: CorridorConfig,
    raw: RawStore,
    store: Arc<dyn AggregateStore + Send + Sync>,
}

impl BuildPipeline {
    pub fn new(config: CorridorConfig, store: Arc<dyn AggregateStore + Send + Sync>) -> Self {
        let raw = RawStore::new(&config.paths.raw_dir);
        Self { config, raw, store }
    }

    pub fn raw_store(&self) -> &RawStore {
        &self.raw
    }

    /// Runs one build
    ///
    /// A build rejected by a fatal rule is still `Ok`; its summary carries
    /// [`BuildOutcome::Rejected`].
    ///
    /// # Errors
    ///
    /// - [`CorridorError::BuildInProgress`] if another build holds the lock
    /// - [`CorridorError::BuildAborted`] if a download fails, or a source is
    ///   unavailable or has drifted, naming the tables that could not be built
    /// - store errors raised while publishing
    pub async fn run(&self, options: BuildOptions) -> Result<BuildSummary> {
        let stale_after = Duration::from_secs(self.config.paths.stale_lock_minutes * 60);
        let _lock = BuildLock::acquire(self.raw.dir(), stale_after)?;
        let started = Instant::now();
        let started_at = Utc::now();
        let build_id = BuildId::generate(started_at);

        tracing::info!(
            build_id = %build_id,
            raw_dir = %self.raw.dir().display(),
            store = %self.store.location(),
            "Starting build"
        );

        let ingest = if options.skip_ingest {
            tracing::info!("Ingestion skipped; building from raw snapshots on disk");
            None
        } else {
            let stage = Instant::now();
            log_stage_start!("ingest");
            let ingestor = RawIngestor::new(self.config.ingest.clone(), self.raw.clone())?;
            let summary = ingestor.ingest_all(options.force_ingest).await;
            log_stage_complete!(
                "ingest",
                stage.elapsed(),
                downloaded = summary.downloaded(),
                failed = summary.failed().len()
            );
            ensure_ingested(&summary)?;
            Some(summary)
        };

        let relations = self.normalize_all().await?;

        let stage = Instant::now();
        log_stage_start!("transform");
        let snapshot = build_aggregates(&relations, started_at)?;
        log_stage_complete!("transform", stage.elapsed(), tables = snapshot.tables.len());

        let stage = Instant::now();
        log_stage_start!("validate");
        let report = validate(&snapshot, &self.config.validation);
        log_stage_complete!(
            "validate",
            stage.elapsed(),
            passed = report.passed(),
            warnings = report.warning_count()
        );

        let (outcome, manifest) = if report.publishable {
            let stage = Instant::now();
            log_stage_start!("publish");
            let manifest = self.store.publish(&snapshot, &build_id, started_at).await?;
            log_stage_complete!("publish", stage.elapsed(), tables = manifest.tables.len());
            let outcome = if report.has_warnings() {
                BuildOutcome::PublishedWithWarnings
            } else {
                BuildOutcome::Published
            };
            (outcome, Some(manifest))
        } else {
            (BuildOutcome::Rejected, None)
        };

        let summary = BuildSummary {
            build_id,
            started_at,
            outcome,
            ingest,
            source_stats: snapshot.source_stats,
            report,
            manifest,
            duration: started.elapsed(),
        };
        summary.log_summary();
        Ok(summary)
    }

    /// Normalizes every source, stopping at the first one that fails
    async fn normalize_all(&self) -> Result<BTreeMap<String, NormalizedRelation>> {
        let stage = Instant::now();
        let catalog = source_catalog();
        log_stage_start!("normalize", sources = catalog.len());

        let mut relations = BTreeMap::new();
        for spec in &catalog {
            let normalized = match self.normalize_source(spec).await {
                Ok(normalized) => normalized,
                Err(cause) => {
                    let unbuilt = unbuilt_tables(spec.source_id);
                    tracing::error!(
                        source_id = spec.source_id,
                        error = %cause,
                        unbuilt = ?unbuilt,
                        "Build aborted"
                    );
                    return Err(CorridorError::BuildAborted {
                        cause: Box::new(cause),
                        unbuilt,
                    });
                }
            };
            log_cast_failures!(normalized.stats);
            relations.insert(spec.source_id.to_string(), normalized);
        }

        let rows: usize = relations.values().map(|r| r.stats.rows_out).sum();
        log_stage_complete!("normalize", stage.elapsed(), rows = rows);
        Ok(relations)
    }

    async fn normalize_source(&self, spec: &SourceAdapterSpec) -> Result<NormalizedRelation> {
        let raw = self.raw.read(spec).await?;
        normalize(spec, &raw)
    }
}

/// Refuses to build over snapshots a failed download left stale
fn ensure_ingested(summary: &IngestSummary) -> Result<()> {
    let unavailable = summary.unavailable();
    let Some((source_id, reason)) = unavailable.first() else {
        return Ok(());
    };

    let mut unbuilt: Vec<String> = unavailable
        .iter()
        .flat_map(|(id, _)| unbuilt_tables(id))
        .collect();
    unbuilt.sort();
    unbuilt.dedup();

    tracing::error!(
        failed = ?unavailable.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        unbuilt = ?unbuilt,
        "Build aborted after failed downloads"
    );
    Err(CorridorError::BuildAborted {
        cause: Box::new(CorridorError::SourceUnavailable {
            source_id: source_id.to_string(),
            reason: reason.to_string(),
        }),
        unbuilt,
    })
}
