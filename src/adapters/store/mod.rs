//! Aggregated store abstraction and backends
//!
//! - [`FileStore`] - generation directories with an atomically swapped pointer
//! - [`crate::adapters::postgresql::PostgresStore`] - tables swapped in one transaction

pub mod factory;
pub mod filesystem;
pub mod traits;

pub use factory::create_store;
pub use filesystem::FileStore;
pub use traits::AggregateStore;
