//! Validate command implementation
//!
//! Re-runs the data quality rules against the currently published store.

use crate::adapters::store::create_store;
use crate::config::load_config;
use crate::core::validation::validate;
use clap::Args;

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl ValidateArgs {
    /// Execute the validate command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Validating published store");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("❌ Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        let store = match create_store(&config) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("❌ Failed to open aggregated store: {e}");
                return Ok(e.exit_code());
            }
        };

        let snapshot = match store.load_snapshot().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load published store");
                eprintln!("❌ {e}");
                return Ok(e.exit_code());
            }
        };

        let report = validate(&snapshot, &config.validation);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", report.format_summary());
        }

        let code = if !report.publishable {
            3
        } else if report.has_warnings() {
            1
        } else {
            0
        };
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unpublished_store_exits_unavailable() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("corridor.toml");
        std::fs::write(
            &config_path,
            format!("[filesystem]\nroot = \"{}\"\n", dir.path().join("store").display()),
        )
        .unwrap();

        let args = ValidateArgs { json: true };
        let code = args.execute(config_path.to_str().unwrap()).await.unwrap();
        assert_eq!(code, 4);
    }
}
