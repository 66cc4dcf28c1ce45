//! Record store selection

use std::sync::Arc;

use clusterlock_common::ClusterLockError;
use clusterlock_persistence::{MemoryRecordStore, RecordStore, SqlRecordStore, StorageMode};
use tracing::{info, warn};

use crate::model::Configuration;

/// Build the record store selected by `clusterlock.storage.mode`
///
/// The SQL store is health-checked before it is handed out.
pub async fn record_store(
    configuration: &Configuration,
) -> Result<Arc<dyn RecordStore>, ClusterLockError> {
    let mode = configuration.storage_mode()?;
    info!("Storage mode: {}", mode);

    match mode {
        StorageMode::Memory => {
            warn!("Memory storage only excludes jobs within this process; use external_db across nodes");
            Ok(Arc::new(MemoryRecordStore::new()))
        }
        StorageMode::ExternalDb => {
            let db = configuration.database_connection().await?;
            let store = SqlRecordStore::new(db);
            store
                .health_check()
                .await
                .map_err(|e| ClusterLockError::DatabaseError(e.to_string()))?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unset_mode_builds_no_store() {
        let cfg = Configuration::from_args([
            "clusterlock",
            "--config",
            "/nonexistent/clusterlock/application.yml",
        ])
        .unwrap();

        let err = record_store(&cfg).await.err().unwrap();
        assert!(matches!(err, ClusterLockError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_memory_store_on_request() {
        let cfg = Configuration::from_args([
            "clusterlock",
            "--config",
            "/nonexistent/clusterlock/application.yml",
            "--storage",
            "memory",
        ])
        .unwrap();

        let store = record_store(&cfg).await.unwrap();
        assert_eq!(store.storage_mode(), StorageMode::Memory);
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let cfg = Configuration::from_args([
            "clusterlock",
            "--config",
            "/nonexistent/clusterlock/application.yml",
            "--storage",
            "external_db",
            "--db-url",
            "sqlite::memory:",
        ])
        .unwrap();

        let store = record_store(&cfg).await.unwrap();
        assert_eq!(store.storage_mode(), StorageMode::ExternalDb);
    }

    #[tokio::test]
    async fn test_external_db_requires_url() {
        let cfg = Configuration::from_args([
            "clusterlock",
            "--config",
            "/nonexistent/clusterlock/application.yml",
            "--storage",
            "external_db",
        ])
        .unwrap();

        if std::env::var("DATABASE_URL").is_err() {
            let err = record_store(&cfg).await.err().unwrap();
            assert!(matches!(err, ClusterLockError::ConfigError(_)));
        }
    }
}
