//! Aggregated store factory
//!
//! Creates the store backend selected by `store_target`.

use super::filesystem::FileStore;
use super::traits::AggregateStore;
use crate::adapters::postgresql::{PostgreSQLClient, PostgresStore};
use crate::config::{CorridorConfig, StoreTarget};
use crate::domain::{CorridorError, Result};
use std::sync::Arc;

/// Create the aggregated store based on the configuration
///
/// # Errors
///
/// Returns a configuration error if the selected backend has no settings or
/// its connection string cannot be parsed.
pub fn create_store(config: &CorridorConfig) -> Result<Arc<dyn AggregateStore + Send + Sync>> {
    match config.store_target {
        StoreTarget::Filesystem => {
            tracing::info!(root = %config.filesystem.root, "Using filesystem aggregated store");
            let store: Arc<dyn AggregateStore + Send + Sync> =
                Arc::new(FileStore::new(&config.filesystem));
            Ok(store)
        }
        StoreTarget::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                CorridorError::Configuration(
                    "postgresql configuration is required when store_target = 'postgresql'"
                        .to_string(),
                )
            })?;

            tracing::info!("Creating PostgreSQL client");
            let client = PostgreSQLClient::new(pg_config.clone())?;
            Ok(Arc::new(PostgresStore::new(client)) as Arc<dyn AggregateStore + Send + Sync>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilesystemConfig;

    #[test]
    fn test_filesystem_store_selected_by_default() {
        let config = CorridorConfig {
            filesystem: FilesystemConfig {
                root: "/tmp/corridor-store".to_string(),
                retain_generations: 2,
            },
            ..Default::default()
        };
        let store = create_store(&config).unwrap();
        assert_eq!(store.backend(), StoreTarget::Filesystem);
        assert_eq!(store.location(), "/tmp/corridor-store");
    }

    #[test]
    fn test_postgresql_without_settings_is_a_configuration_error() {
        let config = CorridorConfig {
            store_target: StoreTarget::PostgreSQL,
            ..Default::default()
        };
        assert!(matches!(
            create_store(&config),
            Err(CorridorError::Configuration(_))
        ));
    }
}
