use async_trait::async_trait;

use super::entity::{ContinuationToken, QueryPage, TableQuery, TableRow};
use crate::errors::StoreError;

/// Single-item write understood by every backend.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOperation {
    /// Fails with [`StoreError::EntityAlreadyExists`] if the row exists.
    Insert(TableRow),
    /// Fails with [`StoreError::EntityNotFound`] if the row does not exist.
    Replace(TableRow),
    InsertOrReplace(TableRow),
    /// Succeeds whether or not the row exists.
    Delete {
        partition_key: String,
        row_key: String,
    },
}

impl TableOperation {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            TableOperation::Insert(_) => "insert",
            TableOperation::Replace(_) => "replace",
            TableOperation::InsertOrReplace(_) => "insert_or_replace",
            TableOperation::Delete { .. } => "delete",
        }
    }
}

/// Narrow interface to a remote partition/row-keyed table service.
///
/// Every missing-table condition must surface as [`StoreError::TableNotFound`]
/// so the store can provision lazily.
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Fetches one page of `query`, resuming after `continuation` when given.
    async fn query(
        &self,
        table: &str,
        query: &TableQuery,
        continuation: Option<ContinuationToken>,
    ) -> Result<QueryPage, StoreError>;

    async fn execute(&self, table: &str, operation: TableOperation) -> Result<(), StoreError>;

    /// Returns `true` if the table was created by this call.
    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool, StoreError>;
}
