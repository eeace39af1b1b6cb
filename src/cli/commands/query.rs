//! Query command implementation
//!
//! Runs a named view, or one of the composite queries, against the
//! published store.

use crate::adapters::store::create_store;
use crate::config::load_config;
use crate::core::query::{view_catalog, QueryRequest, QueryRows, QueryService};
use crate::domain::{CorridorError, Result};
use clap::{Args, ValueEnum};
use std::collections::BTreeMap;

/// Output format for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

/// Arguments for the query command
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// View to run
    #[arg(required_unless_present_any = ["list", "overview", "filter_options"])]
    pub view: Option<String>,

    /// Filter as key=value (repeatable)
    #[arg(short, long, value_name = "KEY=VALUE")]
    pub filter: Vec<String>,

    /// Fail instead of returning more than this many rows
    #[arg(long, value_name = "ROWS")]
    pub max_rows: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// List the available views and their filters
    #[arg(long)]
    pub list: bool,

    /// Headline totals; accepts year_min/year_max filters
    #[arg(long, conflicts_with = "filter_options")]
    pub overview: bool,

    /// Distinct values for the filter dropdowns
    #[arg(long)]
    pub filter_options: bool,
}

impl QueryArgs {
    /// Execute the query command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        if self.list {
            print_views();
            return Ok(0);
        }

        let filters = match parse_filters(&self.filter) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("❌ {e}");
                return Ok(2);
            }
        };

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
        let service = QueryService::new(store, config.query.clone());

        match self.run(&service, filters).await {
            Ok(()) => Ok(0),
            Err(e) => {
                tracing::error!(error = %e, "Query failed");
                eprintln!("❌ {e}");
                Ok(e.exit_code())
            }
        }
    }

    async fn run(&self, service: &QueryService, filters: BTreeMap<String, String>) -> Result<()> {
        if self.overview {
            let overview = service
                .overview(
                    filters.get("year_min").map(String::as_str),
                    filters.get("year_max").map(String::as_str),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&overview)?);
            return Ok(());
        }

        if self.filter_options {
            let options = service.filter_options().await?;
            println!("{}", serde_json::to_string_pretty(&options)?);
            return Ok(());
        }

        let view = self.view.clone().unwrap_or_default();
        let request = QueryRequest {
            view,
            filters,
            expected_row_budget: self.max_rows,
        };
        let rows = service.run(&request).await?;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows.to_json())?),
            OutputFormat::Table => print_table(&rows),
        }
        Ok(())
    }
}

/// Splits `key=value` arguments; values may themselves contain `=`
fn parse_filters(args: &[String]) -> Result<BTreeMap<String, String>> {
    let mut filters = BTreeMap::new();
    for arg in args {
        let (key, value) = arg.split_once('=').ok_or_else(|| {
            CorridorError::Configuration(format!("filter '{arg}' must be of the form key=value"))
        })?;
        filters.insert(key.trim().to_string(), value.to_string());
    }
    Ok(filters)
}

fn print_views() {
    println!("Available views:");
    println!();
    println!("{:<24} {:<24} {}", "View", "Table", "Filters");
    println!("{}", "-".repeat(80));
    for view in view_catalog() {
        let filters: Vec<&str> = view.filters.iter().map(|(key, _)| key.as_str()).collect();
        println!(
            "{:<24} {:<24} {}",
            view.name,
            view.table,
            if filters.is_empty() {
                "-".to_string()
            } else {
                filters.join(", ")
            }
        );
    }
}

fn print_table(rows: &QueryRows) {
    let cells: Vec<Vec<String>> = rows
        .rows
        .iter()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect();

    let widths: Vec<usize> = rows
        .columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            cells
                .iter()
                .map(|row| row[i].len())
                .chain(std::iter::once(col.name.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<String> = rows
        .columns
        .iter()
        .zip(&widths)
        .map(|(col, w)| format!("{:<w$}", col.name, w = *w))
        .collect();
    println!("{}", header.join("  "));
    println!("{}", "-".repeat(header.join("  ").len()));

    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{cell:<w$}", w = *w))
            .collect();
        println!("{}", line.join("  "));
    }
    println!();
    println!("{} row(s) from view '{}'", rows.len(), rows.view);
}
