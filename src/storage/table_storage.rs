//! Typed access to a partitioned table service.

use std::sync::Arc;
use tracing::{debug, warn};

use super::backend::{TableBackend, TableOperation};
use super::entity::{TableEntity, TableName, TableQuery, TableRow};
use crate::errors::StoreError;

/// Generic store over a [`TableBackend`].
///
/// Holds only what is needed to address the backend. Writes that hit a missing
/// table provision it and retry once; every other failure is returned as is.
#[derive(Clone)]
pub struct TableStorage {
    backend: Arc<dyn TableBackend>,
    table_prefix: String,
}

impl TableStorage {
    #[must_use]
    pub fn new(backend: Arc<dyn TableBackend>, table_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            table_prefix: table_prefix.into(),
        }
    }

    #[must_use]
    pub fn table_name(&self, table: TableName) -> String {
        format!("{}{}", self.table_prefix, table.as_str())
    }

    /// Returns every row of `partition_key`, following continuation tokens until
    /// the backend reports no more pages. A missing table reads as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if any page fails to load or a row does not decode as `T`.
    pub async fn scan_partition<T: TableEntity>(
        &self,
        table: TableName,
        partition_key: &str,
    ) -> Result<Vec<T>, StoreError> {
        let name = self.table_name(table);
        let query = TableQuery::partition(partition_key);
        let mut results = Vec::new();
        let mut continuation = None;
        let mut pages = 0usize;

        loop {
            let page = match self.backend.query(&name, &query, continuation).await {
                Ok(page) => page,
                Err(StoreError::TableNotFound(_)) if pages == 0 => {
                    debug!(table = %name, "Table does not exist yet; partition is empty");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            };
            pages += 1;

            for row in page.rows {
                results.push(row.into_entity()?);
            }
            continuation = page.continuation;
            if continuation.is_none() {
                break;
            }
        }

        debug!(table = %name, partition_key = %partition_key, pages, rows = results.len(), "Scanned partition");
        Ok(results)
    }

    /// Runs `query` capped to a single result.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row does not decode as `T`.
    pub async fn find_one<T: TableEntity>(
        &self,
        table: TableName,
        query: TableQuery,
    ) -> Result<Option<T>, StoreError> {
        let name = self.table_name(table);
        let query = query.take(1);

        match self.backend.query(&name, &query, None).await {
            Ok(page) => page.rows.into_iter().next().map(TableRow::into_entity).transpose(),
            Err(StoreError::TableNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// # Errors
    ///
    /// Fails with [`StoreError::EntityAlreadyExists`] if the row exists.
    pub async fn insert<T: TableEntity>(&self, table: TableName, entity: &T) -> Result<(), StoreError> {
        let row = TableRow::from_entity(entity)?;
        self.execute(table, TableOperation::Insert(row)).await
    }

    /// # Errors
    ///
    /// Fails with [`StoreError::EntityNotFound`] if the row does not exist.
    pub async fn replace<T: TableEntity>(&self, table: TableName, entity: &T) -> Result<(), StoreError> {
        let row = TableRow::from_entity(entity)?;
        self.execute(table, TableOperation::Replace(row)).await
    }

    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    pub async fn upsert<T: TableEntity>(&self, table: TableName, entity: &T) -> Result<(), StoreError> {
        let row = TableRow::from_entity(entity)?;
        self.execute(table, TableOperation::InsertOrReplace(row)).await
    }

    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    pub async fn delete<T: TableEntity>(&self, table: TableName, entity: &T) -> Result<(), StoreError> {
        self.execute(
            table,
            TableOperation::Delete {
                partition_key: entity.partition_key().to_string(),
                row_key: entity.row_key().to_string(),
            },
        )
        .await
    }

    async fn execute(&self, table: TableName, operation: TableOperation) -> Result<(), StoreError> {
        let name = self.table_name(table);

        match self.backend.execute(&name, operation.clone()).await {
            Err(StoreError::TableNotFound(_)) => {
                warn!(table = %name, operation = operation.kind(), "Table not found; creating it and retrying once");
                self.backend.create_table_if_not_exists(&name).await?;
                self.backend.execute(&name, operation).await
            }
            result => result,
        }
    }
}
