//! Partitioned key-value storage: a typed store over pluggable table backends.

pub mod backend;
pub mod dynamo;
pub mod entity;
pub mod memory;
pub mod table_storage;

pub use backend::{TableBackend, TableOperation};
pub use dynamo::DynamoTableBackend;
pub use entity::{ContinuationToken, QueryPage, TableEntity, TableName, TableQuery, TableRow};
pub use memory::MemoryTableBackend;
pub use table_storage::TableStorage;
