use thiserror::Error;

/// Failures reported by a table backend or by the store wrapping it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Entity already exists: {table}/{partition_key}/{row_key}")]
    EntityAlreadyExists {
        table: String,
        partition_key: String,
        row_key: String,
    },

    #[error("Entity not found: {table}/{partition_key}/{row_key}")]
    EntityNotFound {
        table: String,
        partition_key: String,
        row_key: String,
    },

    #[error("Storage service error: {0}")]
    Service(String),

    #[error("Failed to (de)serialize table entity: {0}")]
    Serialization(String),
}

impl StoreError {
    #[must_use]
    pub fn is_table_not_found(&self) -> bool {
        matches!(self, StoreError::TableNotFound(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Serialization(error.to_string())
    }
}

// Generic implementation for AWS SDK errors that were not classified by the backend
impl<E, R> From<aws_sdk_dynamodb::error::SdkError<E, R>> for StoreError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    fn from(error: aws_sdk_dynamodb::error::SdkError<E, R>) -> Self {
        StoreError::Service(aws_sdk_dynamodb::error::DisplayErrorContext(error).to_string())
    }
}

#[derive(Debug, Error)]
pub enum AdminConfigError {
    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("Invalid flag value: {0}")]
    InvalidFlagValue(String),

    #[error("Invalid user id {0:?}: user ids must not contain ','")]
    InvalidUserId(String),

    #[error("Admin configuration not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration id: {0}")]
    InvalidConfigId(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<uuid::Error> for AdminConfigError {
    fn from(error: uuid::Error) -> Self {
        AdminConfigError::InvalidConfigId(error.to_string())
    }
}
