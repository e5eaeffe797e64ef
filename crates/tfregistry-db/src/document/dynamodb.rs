//! DynamoDB adapter for the document engine
//!
//! Table layout: string hash key `pk`, string range key `sk`, and the
//! attributes `data` (S), `items` (L of S) and `item_keys` (L of S).

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tfregistry_core::StorageKey;
use tracing::{debug, info};

use crate::document::table::{AppendOutcome, Document, DocumentConnector, DocumentTable};
use crate::error::{DbError, DbResult};

const PK: &str = "pk";
const SK: &str = "sk";
const DATA: &str = "data";
const ITEMS: &str = "items";
const ITEM_KEYS: &str = "item_keys";

/// DynamoDB-backed [`DocumentTable`]
#[derive(Clone)]
pub struct DynamoDocumentTable {
    client: Client,
    table: String,
}

impl DynamoDocumentTable {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    fn key(key: &StorageKey) -> HashMap<String, AttributeValue> {
        HashMap::from([
            (PK.to_string(), AttributeValue::S(key.partition.clone())),
            (SK.to_string(), AttributeValue::S(key.sort.clone())),
        ])
    }
}

#[async_trait]
impl DocumentTable for DynamoDocumentTable {
    async fn get(&self, key: &StorageKey) -> DbResult<Option<Document>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .set_key(Some(Self::key(key)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| map_sdk_error("GetItem", e))?;

        output.item.map(|item| decode(&item)).transpose()
    }

    async fn put_if_absent(&self, document: Document) -> DbResult<bool> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(encode(document)))
            .condition_expression("attribute_not_exists(#pk)")
            .expression_attribute_names("#pk", PK)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                Ok(false)
            }
            Err(e) => Err(map_sdk_error("PutItem", e)),
        }
    }

    async fn query(&self, partition: &str) -> DbResult<Vec<Document>> {
        let mut documents = Vec::new();
        let mut start_key = None;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.table)
                .key_condition_expression("#pk = :pk")
                .expression_attribute_names("#pk", PK)
                .expression_attribute_values(":pk", AttributeValue::S(partition.to_string()))
                .consistent_read(true)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| map_sdk_error("Query", e))?;

            for item in output.items() {
                documents.push(decode(item)?);
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        debug!("DynamoDB query {} returned {} documents", partition, documents.len());
        Ok(documents)
    }

    async fn append_unique(
        &self,
        key: &StorageKey,
        item_key: &str,
        item: String,
    ) -> DbResult<AppendOutcome> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .set_key(Some(Self::key(key)))
            .update_expression(
                "SET #items = list_append(#items, :item), #keys = list_append(#keys, :key)",
            )
            .condition_expression("attribute_exists(#pk) AND NOT contains(#keys, :key_value)")
            .expression_attribute_names("#pk", PK)
            .expression_attribute_names("#items", ITEMS)
            .expression_attribute_names("#keys", ITEM_KEYS)
            .expression_attribute_values(":item", AttributeValue::L(vec![AttributeValue::S(item)]))
            .expression_attribute_values(
                ":key",
                AttributeValue::L(vec![AttributeValue::S(item_key.to_string())]),
            )
            .expression_attribute_values(":key_value", AttributeValue::S(item_key.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(AppendOutcome::Appended),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                // condition covers both a missing document and a duplicate key
                match self.get(key).await? {
                    Some(_) => Ok(AppendOutcome::Duplicate),
                    None => Ok(AppendOutcome::Missing),
                }
            }
            Err(e) => Err(map_sdk_error("UpdateItem", e)),
        }
    }

    async fn ping(&self) -> DbResult<()> {
        self.client
            .describe_table()
            .table_name(&self.table)
            .send()
            .await
            .map_err(|e| map_sdk_error("DescribeTable", e))?;
        Ok(())
    }
}

/// Connector that loads AWS configuration from the environment
#[derive(Debug, Clone)]
pub struct DynamoConnector {
    table: String,
}

impl DynamoConnector {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

#[async_trait]
impl DocumentConnector for DynamoConnector {
    async fn connect(&self) -> DbResult<Arc<dyn DocumentTable>> {
        info!("Connecting to DynamoDB table {}", self.table);
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        let table = DynamoDocumentTable::new(Client::new(&config), self.table.clone());
        table.ping().await?;
        Ok(Arc::new(table))
    }
}

fn encode(document: Document) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (PK.to_string(), AttributeValue::S(document.partition)),
        (SK.to_string(), AttributeValue::S(document.sort)),
        (DATA.to_string(), AttributeValue::S(document.data)),
        (
            ITEMS.to_string(),
            AttributeValue::L(document.items.into_iter().map(AttributeValue::S).collect()),
        ),
        (
            ITEM_KEYS.to_string(),
            AttributeValue::L(document.item_keys.into_iter().map(AttributeValue::S).collect()),
        ),
    ])
}

fn decode(item: &HashMap<String, AttributeValue>) -> DbResult<Document> {
    Ok(Document {
        partition: string_attr(item, PK)?,
        sort: string_attr(item, SK)?,
        data: string_attr(item, DATA)?,
        items: list_attr(item, ITEMS)?,
        item_keys: list_attr(item, ITEM_KEYS)?,
    })
}

fn string_attr(item: &HashMap<String, AttributeValue>, name: &str) -> DbResult<String> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| DbError::InvalidData(format!("attribute {} missing or not a string", name)))
}

fn list_attr(item: &HashMap<String, AttributeValue>, name: &str) -> DbResult<Vec<String>> {
    let Some(value) = item.get(name) else {
        return Ok(Vec::new());
    };
    let list = value
        .as_l()
        .map_err(|_| DbError::InvalidData(format!("attribute {} is not a list", name)))?;
    list.iter()
        .map(|v| {
            v.as_s()
                .cloned()
                .map_err(|_| DbError::InvalidData(format!("attribute {} holds a non-string", name)))
        })
        .collect()
}

fn map_sdk_error<E, R>(operation: &str, err: aws_sdk_dynamodb::error::SdkError<E, R>) -> DbError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    use aws_sdk_dynamodb::error::SdkError;

    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            DbError::Connection(format!("DynamoDB {}: {:?}", operation, err))
        }
        SdkError::ServiceError(service) => {
            DbError::Query(format!("DynamoDB {}: {}", operation, service.err()))
        }
        _ => DbError::Internal(format!("DynamoDB {}: {:?}", operation, err)),
    }
}
