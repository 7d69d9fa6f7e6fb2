//! Table entities backing an [`AdminConfig`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chunking::split_user_chunk;
use crate::core::models::{AdminConfig, Allow};
use crate::errors::AdminConfigError;
use crate::storage::TableEntity;

/// Fixed partition holding every configuration record.
pub const ADMIN_CONFIGURATION_PARTITION: &str = "AdminConfiguration";

/// Primary record of a configuration, keyed by its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdminConfigRecord {
    pub partition_key: String,
    pub row_key: String,
    pub config_id: String,
    pub flag_name: String,
    pub flag_value: String,
    #[serde(default)]
    pub flag_description: String,
    /// Generation of the chunk set readers should assemble. `None` on records
    /// written before chunk sets were tagged; those read untagged chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_list_generation: Option<String>,
    /// Generation this record replaced. Its chunks are dead; a write that
    /// failed to reclaim them leaves them for the next writer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_generation: Option<String>,
}

impl AdminConfigRecord {
    #[must_use]
    pub fn new(config_id: Uuid, config: &AdminConfig, generation: Option<String>) -> Self {
        let id = config_id.to_string();
        Self {
            partition_key: ADMIN_CONFIGURATION_PARTITION.to_string(),
            row_key: id.clone(),
            config_id: id,
            flag_name: config.flag_name.clone(),
            flag_value: config.flag_value.to_string(),
            flag_description: config.flag_description.clone(),
            user_list_generation: generation,
            superseded_generation: None,
        }
    }

    #[must_use]
    pub fn with_superseded(mut self, generation: Option<String>) -> Self {
        self.superseded_generation = generation;
        self
    }

    /// # Errors
    ///
    /// Fails with [`AdminConfigError::InvalidFlagValue`] for unknown names.
    pub fn flag_value(&self) -> Result<Allow, AdminConfigError> {
        self.flag_value.parse()
    }

    /// # Errors
    ///
    /// Fails if the stored value or id does not parse.
    pub fn into_config(self, user_ids: Option<Vec<String>>) -> Result<AdminConfig, AdminConfigError> {
        Ok(AdminConfig {
            config_id: Uuid::parse_str(&self.config_id)?,
            flag_value: self.flag_value()?,
            flag_name: self.flag_name,
            flag_description: self.flag_description,
            user_ids,
        })
    }
}

impl TableEntity for AdminConfigRecord {
    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn row_key(&self) -> &str {
        &self.row_key
    }
}

/// One fragment of a configuration's user-id list, stored in the partition
/// named after the owning configuration id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllowedUserChunk {
    pub partition_key: String,
    pub row_key: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
}

impl AllowedUserChunk {
    #[must_use]
    pub fn new(config_id: Uuid, generation: Option<&str>, payload: String) -> Self {
        Self {
            partition_key: config_id.to_string(),
            row_key: Uuid::new_v4().to_string(),
            user_id: payload,
            generation: generation.map(str::to_string),
        }
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        split_user_chunk(&self.user_id)
    }

    #[must_use]
    pub fn belongs_to(&self, generation: Option<&str>) -> bool {
        self.generation.as_deref() == generation
    }
}

impl TableEntity for AllowedUserChunk {
    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn row_key(&self) -> &str {
        &self.row_key
    }
}
