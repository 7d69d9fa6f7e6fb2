#![allow(dead_code)]

use std::sync::Arc;

use admin_config::repository::AdminConfigRepo;
use admin_config::repository::records::AllowedUserChunk;
use admin_config::storage::{MemoryTableBackend, TableName, TableRow, TableStorage};
use uuid::Uuid;

pub const TABLE_PREFIX: &str = "test";

/// Repository wired to an in-memory backend the test can inspect.
pub struct Harness {
    pub backend: Arc<MemoryTableBackend>,
    pub storage: TableStorage,
    pub repo: AdminConfigRepo,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_backend(MemoryTableBackend::new())
    }

    pub fn with_backend(backend: MemoryTableBackend) -> Self {
        let backend = Arc::new(backend.with_call_log());
        let storage = TableStorage::new(backend.clone(), TABLE_PREFIX);
        let repo = AdminConfigRepo::new(storage.clone());
        Self {
            backend,
            storage,
            repo,
        }
    }

    pub fn config_table(&self) -> String {
        self.storage.table_name(TableName::AdminConfiguration)
    }

    pub fn chunk_table(&self) -> String {
        self.storage.table_name(TableName::AllowExtendedUser)
    }

    pub fn config_rows(&self) -> Vec<TableRow> {
        self.backend.rows(
            &self.config_table(),
            admin_config::repository::records::ADMIN_CONFIGURATION_PARTITION,
        )
    }

    pub fn chunk_rows(&self, config_id: Uuid) -> Vec<TableRow> {
        self.backend
            .rows(&self.chunk_table(), &config_id.to_string())
    }

    pub fn chunks(&self, config_id: Uuid) -> Vec<AllowedUserChunk> {
        self.chunk_rows(config_id)
            .into_iter()
            .map(|row| row.into_entity().unwrap())
            .collect()
    }
}

pub fn user_ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("U{i:05}")).collect()
}

pub fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}
