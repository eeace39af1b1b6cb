//! Build command implementation
//!
//! Runs one full build and publishes it when no fatal rule failed.

use crate::adapters::store::{create_store, AggregateStore};
use crate::config::load_config;
use crate::core::build::{BuildOptions, BuildOutcome, BuildPipeline, BuildSummary};
use crate::domain::{BuildId, CorridorError};
use clap::Args;
use tokio::sync::watch;

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Re-download every source even if a snapshot is already on disk
    #[arg(long, conflicts_with = "skip_ingest")]
    pub force: bool,

    /// Build from the raw directory without downloading anything
    #[arg(long)]
    pub skip_ingest: bool,

    /// Override the raw snapshot directory
    #[arg(long, value_name = "DIR")]
    pub raw_dir: Option<String>,
}

impl BuildArgs {
    /// Execute the build command
    pub async fn execute(
        &self,
        config_path: &str,
        mut shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting build command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("❌ Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        if let Some(raw_dir) = &self.raw_dir {
            tracing::info!(raw_dir = %raw_dir, "Overriding raw directory from CLI");
            config.paths.raw_dir = raw_dir.clone();
        }

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let store = match create_store(&config) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to open aggregated store");
                eprintln!("❌ Failed to open aggregated store: {e}");
                return Ok(e.exit_code());
            }
        };

        let options = BuildOptions {
            force_ingest: self.force,
            skip_ingest: self.skip_ingest,
        };
        let before = current_build(store.as_ref()).await;
        let pipeline = BuildPipeline::new(config, store.clone());

        println!("🚀 Starting build...");
        println!();

        // Dropping the build future releases the lock
        let result = tokio::select! {
            result = pipeline.run(options) => result,
            Ok(()) = shutdown_signal.changed() => {
                let after = current_build(store.as_ref()).await;
                tracing::warn!(
                    before = ?before,
                    current = ?after,
                    "Build interrupted"
                );
                println!("⚠️  {}", interrupted_message(before.as_ref(), after.as_ref()));
                return Ok(5);
            }
        };

        match result {
            Ok(summary) => {
                print_summary(&summary);
                Ok(summary.outcome.exit_code())
            }
            Err(e) => {
                print_failure(&e);
                Ok(e.exit_code())
            }
        }
    }
}

async fn current_build(store: &(dyn AggregateStore + Send + Sync)) -> Option<BuildId> {
    match store.current_manifest().await {
        Ok(manifest) => manifest.map(|m| m.build_id),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read the current manifest");
            None
        }
    }
}

/// What an interrupted build left behind, judged from the current build id
fn interrupted_message(before: Option<&BuildId>, after: Option<&BuildId>) -> String {
    if before == after {
        "Build interrupted; the published store is unchanged".to_string()
    } else {
        match after {
            Some(id) => format!("Build interrupted after publishing; build {id} is current"),
            None => "Build interrupted; no published store found".to_string(),
        }
    }
}

fn print_summary(summary: &BuildSummary) {
    println!("📦 Build {}", summary.build_id);
    println!("  Duration: {:.1}s", summary.duration.as_secs_f64());

    if let Some(ingest) = &summary.ingest {
        println!(
            "  Ingest: {} downloaded, {} failed",
            ingest.downloaded(),
            ingest.failed().len()
        );
        for failed in ingest.failed() {
            println!("    ⚠️  {} ({})", failed.source_id, failed.url);
        }
    }

    println!("  Sources normalized: {}", summary.source_stats.len());
    for stats in summary.source_stats.values() {
        let failures = stats.total_cast_failures();
        if failures > 0 {
            println!(
                "    ⚠️  {}: {failures} value(s) could not be cast",
                stats.source_id
            );
        }
    }
    println!();
    print!("{}", summary.report.format_summary());
    println!();

    match summary.outcome {
        BuildOutcome::Published => println!("✅ Build published"),
        BuildOutcome::PublishedWithWarnings => println!("⚠️  Build published with warnings"),
        BuildOutcome::Rejected => {
            println!("❌ Build rejected; the previous store remains current")
        }
    }
    if let Some(manifest) = &summary.manifest {
        println!(
            "  Tables: {}  Payload: {} bytes",
            manifest.tables.len(),
            manifest.total_payload_bytes()
        );
    }
}

fn print_failure(err: &CorridorError) {
    tracing::error!(error = %err, "Build failed");
    match err {
        CorridorError::BuildAborted { cause, unbuilt } => {
            eprintln!("❌ Build aborted: {cause}");
            if !unbuilt.is_empty() {
                eprintln!("   Tables not built: {}", unbuilt.join(", "));
            }
            eprintln!("   The previously published store is unchanged");
        }
        CorridorError::BuildInProgress(holder) => {
            eprintln!("❌ Another build is already running ({holder})");
        }
        other => eprintln!("❌ Build failed: {other}"),
    }
}
