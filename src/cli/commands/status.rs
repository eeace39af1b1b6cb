//! Status command implementation
//!
//! This module implements the `status` command for displaying the currently
//! published build.

use crate::adapters::store::create_store;
use crate::config::load_config;
use crate::core::transform::StoreManifest;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show only this table
    #[arg(long)]
    pub table: Option<String>,

    /// Print the full manifest as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking published store status");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let store = match create_store(&config) {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to open aggregated store");
                println!("   Error: {e}");
                return Ok(e.exit_code());
            }
        };

        let manifest = match store.current_manifest().await {
            Ok(Some(m)) => m,
            Ok(None) => {
                println!("No published build found at {}.", store.location());
                println!("Run 'corridor build' to publish one.");
                return Ok(0);
            }
            Err(e) => {
                println!("❌ Failed to read the store manifest");
                println!("   Error: {e}");
                return Ok(e.exit_code());
            }
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&manifest)?);
            return Ok(0);
        }

        println!("📊 Published Build");
        println!();
        println!("  Build ID: {}", manifest.build_id);
        println!("  Built at: {}", manifest.built_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("  Store: {} ({})", store.location(), store.backend());
        println!("  Payload: {} bytes", manifest.total_payload_bytes());
        println!();

        if let Some(table) = &self.table {
            if !manifest.tables.contains_key(table) {
                println!("❌ Table '{table}' is not part of this build");
                return Ok(2);
            }
        }

        print_tables(&manifest, self.table.as_deref());
        Ok(0)
    }
}

fn print_tables(manifest: &StoreManifest, only: Option<&str>) {
    println!(
        "{:<26} {:>8} {:>10} {:<18} {}",
        "Table", "Rows", "Bytes", "Checksum", "Sources"
    );
    println!("{}", "-".repeat(100));

    for (name, table) in &manifest.tables {
        if only.is_some_and(|t| t != name) {
            continue;
        }
        let checksum: String = table.checksum.chars().take(16).collect();
        println!(
            "{:<26} {:>8} {:>10} {:<18} {}",
            name,
            table.row_count,
            table.payload_bytes,
            checksum,
            table.lineage.sources.join(", ")
        );

        if only.is_some() {
            for (source, fetched_at) in &table.lineage.fetched_at {
                println!("    {source} snapshot fetched {fetched_at}");
            }
            for audit in &table.lineage.filter_audits {
                println!(
                    "    {} kept {} = {:?}: {} of {} {}",
                    audit.source_id,
                    audit.columns.join("/"),
                    audit.kept_values,
                    audit.kept_total,
                    audit.unfiltered_total,
                    audit.measure
                );
            }
        }
    }
    println!();
}
