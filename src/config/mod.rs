//! Configuration management for Corridor.
//!
//! Corridor reads a TOML file (`corridor.toml` by default) with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `CORRIDOR_<SECTION>_<KEY>` environment overrides
//! - Defaults for every setting
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - log level
//! - [`PathsConfig`] - raw snapshot directory
//! - [`IngestConfig`] - download endpoints, timeout and retry policy
//! - [`StoreTarget`] - `filesystem` or `postgresql`
//! - [`FilesystemConfig`] / [`PostgreSQLConfig`] - aggregated store backends
//! - [`ValidationConfig`] - cast failure policy and payload size guards
//! - [`QueryConfig`] - per-call timeout and row budget cap
//! - [`LoggingConfig`] - optional JSON file logging
//!
//! # Example Configuration
//!
//! ```toml
//! store_target = "postgresql"
//!
//! [paths]
//! raw_dir = "data/raw"
//!
//! [postgresql]
//! connection_string = "${CORRIDOR_PG_URL}"
//!
//! [validation]
//! cast_failure_threshold = 0.05
//! cast_failure_severity = "warning"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::load_config;
pub use schema::{
    ApplicationConfig, CorridorConfig, FilesystemConfig, IngestConfig, LoggingConfig, PathsConfig,
    PostgreSQLConfig, QueryConfig, RetryConfig, StoreTarget, ValidationConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
