//! In-process table backend.
//!
//! Mirrors the remote contract closely enough to run the service locally and to
//! drive the repository in tests: tables must be created before writes and scans
//! are paginated. Tests opt into a call log with [`MemoryTableBackend::with_call_log`]
//! to assert on access patterns; a long-lived backend records nothing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;

use super::backend::{TableBackend, TableOperation};
use super::entity::{ContinuationToken, QueryPage, TableQuery, TableRow};
use crate::errors::StoreError;

pub const DEFAULT_PAGE_SIZE: usize = 1000;

type Partition = BTreeMap<String, Map<String, Value>>;
type Table = BTreeMap<String, Partition>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryCall {
    pub table: String,
    pub partition_key: String,
}

/// One recorded `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    pub table: String,
    pub kind: &'static str,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Table>,
    query_calls: Vec<QueryCall>,
    write_calls: Vec<WriteCall>,
    created_tables: Vec<String>,
    query_failures: VecDeque<StoreError>,
    /// Scripted outcomes for upcoming writes; `None` lets the write run.
    write_outcomes: VecDeque<Option<StoreError>>,
}

pub struct MemoryTableBackend {
    state: Mutex<State>,
    page_size: usize,
    record_calls: bool,
}

impl Default for MemoryTableBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTableBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: page_size.max(1),
            record_calls: false,
        }
    }

    /// Records every query, write and lazy table creation for later inspection.
    #[must_use]
    pub fn with_call_log(mut self) -> Self {
        self.record_calls = true;
        self
    }

    /// Creates `table` without recording it as a lazy provisioning.
    pub fn create_table(&self, table: &str) {
        self.state.lock().tables.entry(table.to_string()).or_default();
    }

    #[must_use]
    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().tables.contains_key(table)
    }

    /// Rows of one partition in row-key order, bypassing pagination and call logs.
    #[must_use]
    pub fn rows(&self, table: &str, partition_key: &str) -> Vec<TableRow> {
        let state = self.state.lock();
        state
            .tables
            .get(table)
            .and_then(|t| t.get(partition_key))
            .map(|partition| {
                partition
                    .iter()
                    .map(|(row_key, properties)| TableRow {
                        partition_key: partition_key.to_string(),
                        row_key: row_key.clone(),
                        properties: properties.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Writes a row directly, creating the table if needed. Not recorded.
    pub fn put_row(&self, table: &str, row: TableRow) {
        let mut state = self.state.lock();
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .entry(row.partition_key)
            .or_default()
            .insert(row.row_key, row.properties);
    }

    #[must_use]
    pub fn query_count(&self, table: &str, partition_key: &str) -> usize {
        self.state
            .lock()
            .query_calls
            .iter()
            .filter(|c| c.table == table && c.partition_key == partition_key)
            .count()
    }

    #[must_use]
    pub fn write_calls(&self) -> Vec<WriteCall> {
        self.state.lock().write_calls.clone()
    }

    /// Tables provisioned through [`TableBackend::create_table_if_not_exists`].
    #[must_use]
    pub fn created_tables(&self) -> Vec<String> {
        self.state.lock().created_tables.clone()
    }

    pub fn reset_call_log(&self) {
        let mut state = self.state.lock();
        state.query_calls.clear();
        state.write_calls.clear();
        state.created_tables.clear();
    }

    /// The next `query` call fails with `error` instead of running.
    pub fn fail_next_query(&self, error: StoreError) {
        self.state.lock().query_failures.push_back(error);
    }

    /// The next unscripted `execute` call fails with `error` instead of running.
    pub fn fail_next_write(&self, error: StoreError) {
        self.state.lock().write_outcomes.push_back(Some(error));
    }

    /// The next unscripted `execute` call runs normally. Queue these ahead of
    /// [`fail_next_write`](Self::fail_next_write) to fail a later write.
    pub fn pass_next_write(&self) {
        self.state.lock().write_outcomes.push_back(None);
    }
}

fn entity_error(
    table: &str,
    partition_key: &str,
    row_key: &str,
    exists: bool,
) -> StoreError {
    let (table, partition_key, row_key) = (
        table.to_string(),
        partition_key.to_string(),
        row_key.to_string(),
    );
    if exists {
        StoreError::EntityAlreadyExists {
            table,
            partition_key,
            row_key,
        }
    } else {
        StoreError::EntityNotFound {
            table,
            partition_key,
            row_key,
        }
    }
}

#[async_trait]
impl TableBackend for MemoryTableBackend {
    async fn query(
        &self,
        table: &str,
        query: &TableQuery,
        continuation: Option<ContinuationToken>,
    ) -> Result<QueryPage, StoreError> {
        let mut state = self.state.lock();
        if self.record_calls {
            state.query_calls.push(QueryCall {
                table: table.to_string(),
                partition_key: query.partition_key.clone(),
            });
        }
        if let Some(error) = state.query_failures.pop_front() {
            return Err(error);
        }

        let rows = state
            .tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let Some(partition) = rows.get(&query.partition_key) else {
            return Ok(QueryPage::default());
        };

        let lower = match &continuation {
            Some(token) => Bound::Excluded(token.row_key.clone()),
            None => Bound::Unbounded,
        };
        let limit = query.take.map_or(self.page_size, |t| t.min(self.page_size));

        let mut matching = partition
            .range((lower, Bound::Unbounded))
            .filter(|(row_key, _)| query.row_key.as_ref().is_none_or(|rk| rk == *row_key))
            .peekable();

        let mut page = QueryPage::default();
        while page.rows.len() < limit {
            let Some((row_key, properties)) = matching.next() else {
                break;
            };
            page.rows.push(TableRow {
                partition_key: query.partition_key.clone(),
                row_key: row_key.clone(),
                properties: properties.clone(),
            });
        }

        if matching.peek().is_some() {
            page.continuation = page.rows.last().map(|row| ContinuationToken {
                partition_key: row.partition_key.clone(),
                row_key: row.row_key.clone(),
            });
        }

        Ok(page)
    }

    async fn execute(&self, table: &str, operation: TableOperation) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if self.record_calls {
            state.write_calls.push(WriteCall {
                table: table.to_string(),
                kind: operation.kind(),
            });
        }
        if let Some(Some(error)) = state.write_outcomes.pop_front() {
            return Err(error);
        }

        let rows = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        match operation {
            TableOperation::Insert(row) => {
                let partition = rows.entry(row.partition_key.clone()).or_default();
                if partition.contains_key(&row.row_key) {
                    return Err(entity_error(table, &row.partition_key, &row.row_key, true));
                }
                partition.insert(row.row_key, row.properties);
            }
            TableOperation::Replace(row) => {
                let existing = rows
                    .get_mut(&row.partition_key)
                    .and_then(|p| p.get_mut(&row.row_key))
                    .ok_or_else(|| entity_error(table, &row.partition_key, &row.row_key, false))?;
                *existing = row.properties;
            }
            TableOperation::InsertOrReplace(row) => {
                rows.entry(row.partition_key)
                    .or_default()
                    .insert(row.row_key, row.properties);
            }
            TableOperation::Delete {
                partition_key,
                row_key,
            } => {
                if let Some(partition) = rows.get_mut(&partition_key) {
                    partition.remove(&row_key);
                    if partition.is_empty() {
                        rows.remove(&partition_key);
                    }
                }
            }
        }

        Ok(())
    }

    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        if state.tables.contains_key(table) {
            return Ok(false);
        }
        state.tables.insert(table.to_string(), Table::new());
        if self.record_calls {
            state.created_tables.push(table.to_string());
        }
        Ok(true)
    }
}
