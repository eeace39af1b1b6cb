//! Core pipeline logic
//!
//! - [`normalize`] - per-source adapters turning raw snapshots into typed relations
//! - [`transform`] - the aggregated table catalog and its builder
//! - [`validation`] - data quality rules and the publish gate
//! - [`build`] - the end-to-end build with its lock and summary
//! - [`query`] - named views, filter predicates and the query service
//! - [`checksum`] - payload checksums recorded in the store manifest
//!
//! # Example
//!
//! ```rust,no_run
//! use corridor::adapters::store::create_store;
//! use corridor::config::load_config;
//! use corridor::core::build::{BuildOptions, BuildPipeline};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("corridor.toml")?;
//! let store = create_store(&config)?;
//! let pipeline = BuildPipeline::new(config, store);
//!
//! let summary = pipeline.run(BuildOptions::default()).await?;
//! println!("{}", summary.report.format_summary());
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod checksum;
pub mod normalize;
pub mod query;
pub mod transform;
pub mod validation;
