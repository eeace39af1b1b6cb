//! External integrations for Corridor.
//!
//! - [`raw`] - raw snapshot directory (reader and atomic writer)
//! - [`ingest`] - HTTP download of raw snapshots with retry
//! - [`store`] - aggregated store abstraction (trait-based) and filesystem backend
//! - [`postgresql`] - PostgreSQL aggregated store backend
//!
//! # Design Pattern
//!
//! Adapters isolate external dependencies behind small types and traits, so
//! the core only sees [`store::AggregateStore`] and [`raw::RawStore`].
//!
//! ```rust,no_run
//! use corridor::adapters::store::create_store;
//! use corridor::config::load_config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("corridor.toml")?;
//! let store = create_store(&config)?;
//! if let Some(manifest) = store.current_manifest().await? {
//!     println!("published build {}", manifest.build_id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod ingest;
pub mod postgresql;
pub mod raw;
pub mod store;
