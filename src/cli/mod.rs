//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Corridor using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Corridor - San Diego mobility data build and query tool
#[derive(Parser, Debug)]
#[command(name = "corridor")]
#[command(version, about, long_about = None)]
#[command(author = "Corridor Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "corridor.toml", env = "CORRIDOR_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CORRIDOR_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest, normalize, aggregate, validate and publish
    Build(commands::build::BuildArgs),

    /// Re-run the validation rules against the published store
    Validate(commands::validate::ValidateArgs),

    /// Run a named view against the published store
    Query(commands::query::QueryArgs),

    /// Show the published build and its tables
    Status(commands::status::StatusArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate_config::ValidateConfigArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
