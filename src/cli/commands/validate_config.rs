//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Corridor configuration file.

use crate::config::load_config;
use crate::config::StoreTarget;
use clap::Args;
use secrecy::ExposeSecret;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateConfigArgs {}

impl ValidateConfigArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates before returning
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Raw Directory: {}", config.paths.raw_dir);
        println!("  Socrata Portal: {}", config.ingest.socrata_base_url);
        println!("  City File Host: {}", config.ingest.seshat_base_url);
        println!(
            "  Ingest Retries: {} (initial delay {} ms)",
            config.ingest.retry.max_retries, config.ingest.retry.initial_delay_ms
        );

        match config.store_target {
            StoreTarget::Filesystem => {
                println!("  Store Target: filesystem");
                println!("  Store Root: {}", config.filesystem.root);
                println!(
                    "  Retained Generations: {}",
                    config.filesystem.retain_generations
                );
            }
            StoreTarget::PostgreSQL => {
                if let Some(ref pg_config) = config.postgresql {
                    println!("  Store Target: postgresql");
                    println!(
                        "  PostgreSQL Connection: {}",
                        pg_config.connection_string.expose_secret().redacted_url()
                    );
                    println!("  Max Connections: {}", pg_config.max_connections);
                }
            }
        }

        println!(
            "  Cast Failure Policy: {} above {:.1}%",
            config.validation.cast_failure_severity,
            config.validation.cast_failure_threshold * 100.0
        );
        println!(
            "  Query Limits: {}s timeout, {} rows max",
            config.query.timeout_seconds, config.query.max_row_budget
        );
        println!();
        Ok(0)
    }
}
