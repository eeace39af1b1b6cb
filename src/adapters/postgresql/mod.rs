//! PostgreSQL aggregated store backend

pub mod client;
pub mod store;

pub use client::PostgreSQLClient;
pub use store::PostgresStore;
