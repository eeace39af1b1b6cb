// Corridor - San Diego mobility data build and query tool
// Copyright (c) 2025 Corridor Contributors
// Licensed under the MIT License

//! # Corridor - San Diego mobility data pipeline
//!
//! Corridor turns public transit, traffic and collision datasets for the San
//! Diego region into a small set of validated, pre-aggregated tables, and
//! serves them through named, parameterized views.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Ingesting** raw snapshots from the regional Socrata portal and the city file host
//! - **Normalizing** each source through a declarative adapter (renames, null
//!   sentinels, casts, boolean reconstruction, canonical slices)
//! - **Aggregating** the normalized relations into the published table catalog
//! - **Validating** the result against data quality rules, and publishing only
//!   when no fatal rule failed
//! - **Querying** the published tables through a fixed view catalog with
//!   bound parameters only
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Normalize, transform, validate, build and query
//! - [`adapters`] - Raw snapshots, HTTP ingestion and the aggregated store backends
//! - [`domain`] - Values, relations, identifiers and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use corridor::adapters::store::create_store;
//! use corridor::config::load_config;
//! use corridor::core::build::{BuildOptions, BuildPipeline};
//! use corridor::core::query::{QueryRequest, QueryService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("corridor.toml")?;
//!     let store = create_store(&config)?;
//!
//!     // Build and publish
//!     let pipeline = BuildPipeline::new(config.clone(), store.clone());
//!     let summary = pipeline.run(BuildOptions::default()).await?.ensure_published()?;
//!     println!("Published build {}", summary.build_id);
//!
//!     // Read it back through a view
//!     let service = QueryService::new(store, config.query);
//!     let request = QueryRequest::new("ridership_by_route").filter("year_min", "2021");
//!     let rows = service.run(&request).await?;
//!     println!("{} routes", rows.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`domain::Result`], carrying a
//! [`domain::CorridorError`]. Read-side rejections are
//! [`domain::QueryError`] values and are raised before any query text exists.
//!
//! ```rust,no_run
//! use corridor::domain::{CorridorError, QueryError};
//!
//! fn describe(err: &CorridorError) -> &'static str {
//!     match err {
//!         CorridorError::Query(QueryError::UnknownFilter(_)) => "bad filter key",
//!         CorridorError::NotPublished(_) => "nothing published yet",
//!         _ => "other",
//!     }
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
