//! Table entities and the backend-neutral row shape they convert to.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::StoreError;

pub const PARTITION_KEY_FIELD: &str = "PartitionKey";
pub const ROW_KEY_FIELD: &str = "RowKey";

/// Logical containers known to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableName {
    AdminConfiguration,
    AllowExtendedUser,
}

impl TableName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TableName::AdminConfiguration => "adminconfiguration",
            TableName::AllowExtendedUser => "allowextendeduser",
        }
    }
}

/// A record addressable by (partition key, row key).
///
/// Implementors serialize their keys under [`PARTITION_KEY_FIELD`] and
/// [`ROW_KEY_FIELD`]; every other field becomes a row property.
pub trait TableEntity: Serialize + DeserializeOwned + Send + Sync {
    fn partition_key(&self) -> &str;
    fn row_key(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub partition_key: String,
    pub row_key: String,
    pub properties: Map<String, Value>,
}

impl TableRow {
    #[must_use]
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            properties: Map::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// # Errors
    ///
    /// Returns an error if the entity does not serialize to a JSON object.
    pub fn from_entity<T: TableEntity>(entity: &T) -> Result<Self, StoreError> {
        let Value::Object(mut properties) = serde_json::to_value(entity)? else {
            return Err(StoreError::Serialization(
                "table entity must serialize to an object".to_string(),
            ));
        };
        properties.remove(PARTITION_KEY_FIELD);
        properties.remove(ROW_KEY_FIELD);

        Ok(Self {
            partition_key: entity.partition_key().to_string(),
            row_key: entity.row_key().to_string(),
            properties,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the row's properties do not match `T`.
    pub fn into_entity<T: TableEntity>(self) -> Result<T, StoreError> {
        let mut object = self.properties;
        object.insert(
            PARTITION_KEY_FIELD.to_string(),
            Value::String(self.partition_key),
        );
        object.insert(ROW_KEY_FIELD.to_string(), Value::String(self.row_key));
        Ok(serde_json::from_value(Value::Object(object))?)
    }
}

/// Range query within a single partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    pub partition_key: String,
    pub row_key: Option<String>,
    pub take: Option<usize>,
}

impl TableQuery {
    #[must_use]
    pub fn partition(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: None,
            take: None,
        }
    }

    #[must_use]
    pub fn with_row_key(mut self, row_key: impl Into<String>) -> Self {
        self.row_key = Some(row_key.into());
        self
    }

    #[must_use]
    pub fn take(mut self, count: usize) -> Self {
        self.take = Some(count);
        self
    }
}

/// Position after the last row of a page; the next page starts strictly after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken {
    pub partition_key: String,
    pub row_key: String,
}

#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub rows: Vec<TableRow>,
    pub continuation: Option<ContinuationToken>,
}
