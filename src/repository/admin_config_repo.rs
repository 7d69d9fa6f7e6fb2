//! Admin configuration repository.
//!
//! A configuration is persisted as one [`AdminConfigRecord`] plus, in allow-list
//! mode, a set of [`AllowedUserChunk`] rows holding the user ids. Chunk sets are
//! tagged with a generation: writers store the new set first, then point the
//! record at it, then reclaim the generation they observed it pointing at before.
//! Readers only assemble the generation the record points at, so a half-finished
//! write is never visible. A generation no record has pointed away from may
//! belong to a concurrent writer and is never reclaimed.

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::chunking::{USER_ID_DELIMITER, join_user_chunks};
use super::records::{ADMIN_CONFIGURATION_PARTITION, AdminConfigRecord, AllowedUserChunk};
use crate::core::models::AdminConfig;
use crate::errors::{AdminConfigError, StoreError};
use crate::storage::{TableName, TableQuery, TableStorage};

#[async_trait]
pub trait AdminConfigRepository: Send + Sync {
    async fn get_all(&self) -> Result<Vec<AdminConfig>, AdminConfigError>;

    /// First configuration named `config_name`, if any.
    async fn get(&self, config_name: &str) -> Result<Option<AdminConfig>, AdminConfigError> {
        let configs = self.get_all().await?;
        Ok(configs.into_iter().find(|c| c.flag_name == config_name))
    }

    /// Stores `config` under a freshly assigned id and returns it with that id.
    async fn insert(&self, config: AdminConfig) -> Result<AdminConfig, AdminConfigError>;

    /// Replaces an existing configuration; fails if `config.config_id` is unknown.
    async fn update(&self, config: AdminConfig) -> Result<AdminConfig, AdminConfigError>;

    /// Creates or replaces the configuration with `config.config_id`.
    async fn upsert(&self, config: AdminConfig) -> Result<AdminConfig, AdminConfigError>;

    /// Removes the configuration named `config_name` and all of its chunks.
    async fn delete(&self, config_name: &str) -> Result<(), AdminConfigError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordWrite {
    Insert,
    Replace,
    Upsert,
}

pub struct AdminConfigRepo {
    storage: TableStorage,
}

impl AdminConfigRepo {
    #[must_use]
    pub fn new(storage: TableStorage) -> Self {
        Self { storage }
    }

    async fn load_records(&self) -> Result<Vec<AdminConfigRecord>, StoreError> {
        self.storage
            .scan_partition(TableName::AdminConfiguration, ADMIN_CONFIGURATION_PARTITION)
            .await
    }

    async fn load_record(&self, config_id: Uuid) -> Result<Option<AdminConfigRecord>, StoreError> {
        self.storage
            .find_one(
                TableName::AdminConfiguration,
                TableQuery::partition(ADMIN_CONFIGURATION_PARTITION)
                    .with_row_key(config_id.to_string()),
            )
            .await
    }

    async fn load_chunks(&self, config_id: &str) -> Result<Vec<AllowedUserChunk>, StoreError> {
        self.storage
            .scan_partition(TableName::AllowExtendedUser, config_id)
            .await
    }

    async fn assemble(&self, record: AdminConfigRecord) -> Result<AdminConfig, AdminConfigError> {
        if !record.flag_value()?.is_allow_list() {
            return record.into_config(None);
        }

        let generation = record.user_list_generation.as_deref();
        let user_ids: Vec<String> = self
            .load_chunks(&record.config_id)
            .await?
            .iter()
            .filter(|chunk| chunk.belongs_to(generation))
            .flat_map(AllowedUserChunk::user_ids)
            .map(str::to_string)
            .collect();

        record.into_config(Some(user_ids))
    }

    /// Stores the chunk set of `config` under a new generation.
    ///
    /// Returns `None` when the config is not in allow-list mode. An allow-list
    /// config always gets a generation, even with no ids, so stale chunks of an
    /// earlier set can never match it.
    async fn write_chunk_set(
        &self,
        config_id: Uuid,
        config: &AdminConfig,
    ) -> Result<Option<String>, AdminConfigError> {
        if !config.flag_value.is_allow_list() {
            return Ok(None);
        }

        let generation = Uuid::new_v4().to_string();
        let payloads = join_user_chunks(config.allowed_user_ids());
        let chunk_count = payloads.len();

        for payload in payloads {
            let chunk = AllowedUserChunk::new(config_id, Some(&generation), payload);
            if let Err(e) = self
                .storage
                .upsert(TableName::AllowExtendedUser, &chunk)
                .await
            {
                self.discard_generation(config_id, &generation).await;
                return Err(e.into());
            }
        }

        debug!(config_id = %config_id, generation = %generation, chunks = chunk_count, "Wrote user chunk set");
        Ok(Some(generation))
    }

    /// Best-effort removal of a chunk set that no record points at.
    async fn discard_generation(&self, config_id: Uuid, generation: &str) {
        let partition = config_id.to_string();
        let chunks = match self.load_chunks(&partition).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(config_id = %config_id, generation = %generation, error = %e, "Failed to list chunks to discard");
                return;
            }
        };

        for chunk in chunks.iter().filter(|c| c.belongs_to(Some(generation))) {
            if let Err(e) = self.storage.delete(TableName::AllowExtendedUser, chunk).await {
                warn!(config_id = %config_id, row_key = %chunk.row_key, error = %e, "Failed to discard chunk");
            }
        }
    }

    /// Deletes untagged chunks and the chunks of `dead` generations. Failures are
    /// logged; the record written just before names the generation it replaced,
    /// so the next write retries.
    async fn reclaim_chunks(&self, config_id: Uuid, dead: &[&str]) {
        let partition = config_id.to_string();
        let chunks = match self.load_chunks(&partition).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(config_id = %config_id, error = %e, "Failed to list chunks to reclaim");
                return;
            }
        };

        let mut reclaimed = 0usize;
        for chunk in chunks.iter().filter(|c| match c.generation.as_deref() {
            None => true,
            Some(generation) => dead.contains(&generation),
        }) {
            match self.storage.delete(TableName::AllowExtendedUser, chunk).await {
                Ok(()) => reclaimed += 1,
                Err(e) => {
                    warn!(config_id = %config_id, row_key = %chunk.row_key, error = %e, "Failed to reclaim chunk");
                }
            }
        }

        if reclaimed > 0 {
            debug!(config_id = %config_id, reclaimed, "Reclaimed stale user chunks");
        }
    }

    async fn write_config(
        &self,
        config_id: Uuid,
        config: &AdminConfig,
        mode: RecordWrite,
    ) -> Result<(), AdminConfigError> {
        validate_user_ids(config)?;

        let previous = match mode {
            RecordWrite::Insert => None,
            RecordWrite::Replace | RecordWrite::Upsert => self.load_record(config_id).await?,
        };
        if mode == RecordWrite::Replace && previous.is_none() {
            return Err(StoreError::EntityNotFound {
                table: self.storage.table_name(TableName::AdminConfiguration),
                partition_key: ADMIN_CONFIGURATION_PARTITION.to_string(),
                row_key: config_id.to_string(),
            }
            .into());
        }
        // A record without a chunk set passes on whatever it still had pending.
        let superseded = previous.as_ref().and_then(|r| {
            r.user_list_generation
                .clone()
                .or_else(|| r.superseded_generation.clone())
        });

        let generation = self.write_chunk_set(config_id, config).await?;
        let record = AdminConfigRecord::new(config_id, config, generation.clone())
            .with_superseded(superseded.clone());

        let written = match mode {
            RecordWrite::Insert => {
                self.storage
                    .insert(TableName::AdminConfiguration, &record)
                    .await
            }
            RecordWrite::Replace => {
                self.storage
                    .replace(TableName::AdminConfiguration, &record)
                    .await
            }
            RecordWrite::Upsert => {
                self.storage
                    .upsert(TableName::AdminConfiguration, &record)
                    .await
            }
        };

        if let Err(e) = written {
            if let Some(generation) = &generation {
                self.discard_generation(config_id, generation).await;
            }
            return Err(e.into());
        }

        if let Some(previous) = &previous {
            let dead: Vec<&str> = [
                superseded.as_deref(),
                previous.superseded_generation.as_deref(),
            ]
            .into_iter()
            .flatten()
            .collect();
            self.reclaim_chunks(config_id, &dead).await;
        }

        Ok(())
    }

    async fn write_existing(
        &self,
        config: AdminConfig,
        mode: RecordWrite,
    ) -> Result<AdminConfig, AdminConfigError> {
        if config.config_id.is_nil() {
            return Err(AdminConfigError::InvalidConfigId(
                "configId is required".to_string(),
            ));
        }

        self.write_config(config.config_id, &config, mode).await?;
        info!(config_id = %config.config_id, flag_name = %config.flag_name, mode = ?mode, "Stored admin configuration");
        Ok(config)
    }
}

fn validate_user_ids(config: &AdminConfig) -> Result<(), AdminConfigError> {
    match config
        .allowed_user_ids()
        .iter()
        .find(|id| id.contains(USER_ID_DELIMITER))
    {
        Some(id) => Err(AdminConfigError::InvalidUserId(id.clone())),
        None => Ok(()),
    }
}

#[async_trait]
impl AdminConfigRepository for AdminConfigRepo {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_all(&self) -> Result<Vec<AdminConfig>, AdminConfigError> {
        let records = self.load_records().await?;
        let mut configs = Vec::with_capacity(records.len());
        for record in records {
            configs.push(self.assemble(record).await?);
        }
        Ok(configs)
    }

    #[tracing::instrument(level = "debug", skip(self, config), fields(flag_name = %config.flag_name))]
    async fn insert(&self, config: AdminConfig) -> Result<AdminConfig, AdminConfigError> {
        let config_id = Uuid::new_v4();
        self.write_config(config_id, &config, RecordWrite::Insert)
            .await?;

        info!(config_id = %config_id, flag_name = %config.flag_name, "Inserted admin configuration");
        Ok(AdminConfig {
            config_id,
            ..config
        })
    }

    #[tracing::instrument(level = "debug", skip(self, config), fields(config_id = %config.config_id))]
    async fn update(&self, config: AdminConfig) -> Result<AdminConfig, AdminConfigError> {
        self.write_existing(config, RecordWrite::Replace).await
    }

    #[tracing::instrument(level = "debug", skip(self, config), fields(config_id = %config.config_id))]
    async fn upsert(&self, config: AdminConfig) -> Result<AdminConfig, AdminConfigError> {
        self.write_existing(config, RecordWrite::Upsert).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete(&self, config_name: &str) -> Result<(), AdminConfigError> {
        let record = self
            .load_records()
            .await?
            .into_iter()
            .find(|r| r.flag_name == config_name)
            .ok_or_else(|| AdminConfigError::NotFound(config_name.to_string()))?;

        self.storage
            .delete(TableName::AdminConfiguration, &record)
            .await?;

        let chunks = self.load_chunks(&record.config_id).await?;
        for chunk in &chunks {
            self.storage
                .delete(TableName::AllowExtendedUser, chunk)
                .await?;
        }

        info!(config_id = %record.config_id, flag_name = %config_name, chunks = chunks.len(), "Deleted admin configuration");
        Ok(())
    }
}
