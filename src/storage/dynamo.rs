//! DynamoDB implementation of [`TableBackend`].
//!
//! Tables use `PartitionKey` (hash) and `RowKey` (range) string keys; every
//! other row property is stored as a top-level attribute.

use async_trait::async_trait;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType, TableStatus,
};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info};

use super::backend::{TableBackend, TableOperation};
use super::entity::{
    ContinuationToken, PARTITION_KEY_FIELD, QueryPage, ROW_KEY_FIELD, TableQuery, TableRow,
};
use crate::errors::StoreError;

type Item = HashMap<String, AttributeValue>;

/// Poll interval and attempt count while a freshly created table becomes active.
const TABLE_ACTIVE_POLL_MS: u64 = 500;
const TABLE_ACTIVE_MAX_POLLS: usize = 60;

pub struct DynamoTableBackend {
    client: DynamoClient,
}

impl DynamoTableBackend {
    #[must_use]
    pub fn new(client: DynamoClient) -> Self {
        Self { client }
    }

    /// Builds a client from the ambient AWS configuration, optionally pointed at
    /// a custom endpoint such as DynamoDB Local.
    pub async fn from_env(endpoint_url: Option<&str>) -> Self {
        let shared = aws_config::from_env().load().await;
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&shared);
        if let Some(url) = endpoint_url {
            builder = builder.endpoint_url(url);
        }
        Self::new(DynamoClient::from_conf(builder.build()))
    }

    async fn wait_until_active(&self, table: &str) -> Result<(), StoreError> {
        let strategy = FixedInterval::from_millis(TABLE_ACTIVE_POLL_MS).take(TABLE_ACTIVE_MAX_POLLS);

        let client = &self.client;
        Retry::start(strategy, move || async move {
            let out = client
                .describe_table()
                .table_name(table)
                .send()
                .await
                .map_err(StoreError::from)?;
            let status = out.table.and_then(|t| t.table_status);
            if status == Some(TableStatus::Active) {
                Ok(())
            } else {
                debug!(table = %table, status = ?status, "Waiting for table to become active");
                Err(StoreError::Service(format!(
                    "table {table} is not active yet ({status:?})"
                )))
            }
        })
        .await
    }

    async fn put(
        &self,
        table: &str,
        row: TableRow,
        condition: Option<&str>,
    ) -> Result<(), StoreError> {
        let (partition_key, row_key) = (row.partition_key.clone(), row.row_key.clone());
        let mut request = self
            .client
            .put_item()
            .table_name(table)
            .set_item(Some(row_to_item(row)));
        if let Some(condition) = condition {
            request = request
                .condition_expression(condition)
                .expression_attribute_names("#rk", ROW_KEY_FIELD);
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let service = e.as_service_error();
                if service.is_some_and(|s| s.is_resource_not_found_exception()) {
                    return Err(StoreError::TableNotFound(table.to_string()));
                }
                if service.is_some_and(|s| s.is_conditional_check_failed_exception()) {
                    let (table, partition_key, row_key) =
                        (table.to_string(), partition_key, row_key);
                    return Err(if condition == Some(INSERT_CONDITION) {
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
                    });
                }
                Err(StoreError::from(e))
            }
        }
    }
}

const INSERT_CONDITION: &str = "attribute_not_exists(#rk)";
const REPLACE_CONDITION: &str = "attribute_exists(#rk)";

#[async_trait]
impl TableBackend for DynamoTableBackend {
    async fn query(
        &self,
        table: &str,
        query: &TableQuery,
        continuation: Option<ContinuationToken>,
    ) -> Result<QueryPage, StoreError> {
        let mut request = self
            .client
            .query()
            .table_name(table)
            .consistent_read(true)
            .expression_attribute_names("#pk", PARTITION_KEY_FIELD)
            .expression_attribute_values(":pk", AttributeValue::S(query.partition_key.clone()));

        request = match &query.row_key {
            Some(row_key) => request
                .key_condition_expression("#pk = :pk AND #rk = :rk")
                .expression_attribute_names("#rk", ROW_KEY_FIELD)
                .expression_attribute_values(":rk", AttributeValue::S(row_key.clone())),
            None => request.key_condition_expression("#pk = :pk"),
        };
        if let Some(take) = query.take {
            request = request.limit(i32::try_from(take).unwrap_or(i32::MAX));
        }
        if let Some(token) = continuation {
            request = request.set_exclusive_start_key(Some(token_to_key(token)));
        }

        let out = match request.send().await {
            Ok(out) => out,
            Err(e) => {
                if e
                    .as_service_error()
                    .is_some_and(|s| s.is_resource_not_found_exception())
                {
                    return Err(StoreError::TableNotFound(table.to_string()));
                }
                return Err(StoreError::from(e));
            }
        };

        let rows = out
            .items
            .unwrap_or_default()
            .into_iter()
            .map(item_to_row)
            .collect::<Result<Vec<_>, _>>()?;
        let continuation = out.last_evaluated_key.map(key_to_token).transpose()?;

        Ok(QueryPage { rows, continuation })
    }

    async fn execute(&self, table: &str, operation: TableOperation) -> Result<(), StoreError> {
        match operation {
            TableOperation::Insert(row) => self.put(table, row, Some(INSERT_CONDITION)).await,
            TableOperation::Replace(row) => self.put(table, row, Some(REPLACE_CONDITION)).await,
            TableOperation::InsertOrReplace(row) => self.put(table, row, None).await,
            TableOperation::Delete {
                partition_key,
                row_key,
            } => {
                let result = self
                    .client
                    .delete_item()
                    .table_name(table)
                    .key(PARTITION_KEY_FIELD, AttributeValue::S(partition_key))
                    .key(ROW_KEY_FIELD, AttributeValue::S(row_key))
                    .send()
                    .await;
                match result {
                    Ok(_) => Ok(()),
                    Err(e)
                        if e
                            .as_service_error()
                            .is_some_and(|s| s.is_resource_not_found_exception()) =>
                    {
                        Err(StoreError::TableNotFound(table.to_string()))
                    }
                    Err(e) => Err(StoreError::from(e)),
                }
            }
        }
    }

    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool, StoreError> {
        let build_err = |e: aws_sdk_dynamodb::error::BuildError| StoreError::Service(e.to_string());

        let result = self
            .client
            .create_table()
            .table_name(table)
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(PARTITION_KEY_FIELD)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(build_err)?,
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(ROW_KEY_FIELD)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(build_err)?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(PARTITION_KEY_FIELD)
                    .key_type(KeyType::Hash)
                    .build()
                    .map_err(build_err)?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(ROW_KEY_FIELD)
                    .key_type(KeyType::Range)
                    .build()
                    .map_err(build_err)?,
            )
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        let created = match result {
            Ok(_) => {
                info!(table = %table, "Created DynamoDB table");
                true
            }
            // Another writer is already creating it; still wait for it to become usable.
            Err(e)
                if e
                    .as_service_error()
                    .is_some_and(|s| s.is_resource_in_use_exception()) =>
            {
                false
            }
            Err(e) => return Err(StoreError::from(e)),
        };

        self.wait_until_active(table).await?;
        Ok(created)
    }
}

// ============================================================================
// Attribute conversion
// ============================================================================

fn row_to_item(row: TableRow) -> Item {
    let mut item: Item = row
        .properties
        .into_iter()
        .map(|(name, value)| (name, value_to_attribute(value)))
        .collect();
    item.insert(
        PARTITION_KEY_FIELD.to_string(),
        AttributeValue::S(row.partition_key),
    );
    item.insert(ROW_KEY_FIELD.to_string(), AttributeValue::S(row.row_key));
    item
}

fn item_to_row(mut item: Item) -> Result<TableRow, StoreError> {
    let partition_key = take_key(&mut item, PARTITION_KEY_FIELD)?;
    let row_key = take_key(&mut item, ROW_KEY_FIELD)?;
    let properties = item
        .into_iter()
        .map(|(name, value)| attribute_to_value(value).map(|v| (name, v)))
        .collect::<Result<Map<_, _>, _>>()?;

    Ok(TableRow {
        partition_key,
        row_key,
        properties,
    })
}

fn take_key(item: &mut Item, name: &str) -> Result<String, StoreError> {
    match item.remove(name) {
        Some(AttributeValue::S(value)) => Ok(value),
        other => Err(StoreError::Serialization(format!(
            "key attribute {name} missing or not a string: {other:?}"
        ))),
    }
}

fn token_to_key(token: ContinuationToken) -> Item {
    HashMap::from([
        (
            PARTITION_KEY_FIELD.to_string(),
            AttributeValue::S(token.partition_key),
        ),
        (ROW_KEY_FIELD.to_string(), AttributeValue::S(token.row_key)),
    ])
}

fn key_to_token(mut key: Item) -> Result<ContinuationToken, StoreError> {
    Ok(ContinuationToken {
        partition_key: take_key(&mut key, PARTITION_KEY_FIELD)?,
        row_key: take_key(&mut key, ROW_KEY_FIELD)?,
    })
}

fn value_to_attribute(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s),
        Value::Array(values) => {
            AttributeValue::L(values.into_iter().map(value_to_attribute).collect())
        }
        Value::Object(map) => AttributeValue::M(
            map.into_iter()
                .map(|(k, v)| (k, value_to_attribute(v)))
                .collect(),
        ),
    }
}

fn attribute_to_value(attribute: AttributeValue) -> Result<Value, StoreError> {
    Ok(match attribute {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(b),
        AttributeValue::S(s) => Value::String(s),
        AttributeValue::N(n) => serde_json::from_str::<Number>(&n)
            .map(Value::Number)
            .map_err(|e| StoreError::Serialization(format!("number attribute {n}: {e}")))?,
        AttributeValue::L(values) => Value::Array(
            values
                .into_iter()
                .map(attribute_to_value)
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::M(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| attribute_to_value(v).map(|v| (k, v)))
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::Ss(values) => {
            Value::Array(values.into_iter().map(Value::String).collect())
        }
        other => {
            return Err(StoreError::Serialization(format!(
                "unsupported attribute type: {other:?}"
            )));
        }
    })
}
