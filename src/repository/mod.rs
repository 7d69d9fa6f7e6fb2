//! Admin configuration persistence on top of [`crate::storage`].

pub mod admin_config_repo;
pub mod cache;
pub mod chunking;
pub mod records;

use std::sync::Arc;
use tracing::info;

pub use admin_config_repo::{AdminConfigRepo, AdminConfigRepository};
pub use cache::CachedAdminConfigRepo;

use crate::core::config::{AppConfig, StorageBackendKind};
use crate::storage::{DynamoTableBackend, MemoryTableBackend, TableBackend, TableStorage};

/// Wires the configured backend, store, repository and cache together.
pub async fn build_repository(config: &AppConfig) -> Arc<dyn AdminConfigRepository> {
    let backend: Arc<dyn TableBackend> = match config.storage_backend {
        StorageBackendKind::DynamoDb => Arc::new(
            DynamoTableBackend::from_env(config.dynamodb_endpoint_url.as_deref()).await,
        ),
        StorageBackendKind::Memory => Arc::new(MemoryTableBackend::new()),
    };
    info!(
        backend = ?config.storage_backend,
        table_prefix = %config.table_prefix,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        "Initialized admin configuration repository"
    );

    let storage = TableStorage::new(backend, config.table_prefix.clone());
    Arc::new(CachedAdminConfigRepo::new(
        AdminConfigRepo::new(storage),
        config.cache_ttl,
    ))
}
