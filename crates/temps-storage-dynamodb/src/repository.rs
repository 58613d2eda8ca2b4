use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use temps_storage::{
    Filter, FilterValue, ListOptions, Record, Repository, RepositoryDefinition, Result,
    SortDirection, StorageError,
};
use tracing::{debug, error};
use uuid::Uuid;

use crate::attribute::{item_to_record, json_to_attribute, record_to_item, Item};
use crate::expression::FilterExpression;

/// Number of items deleted per round by `delete_all`
pub const DELETE_BATCH_SIZE: usize = 128;

const ID_FIELD: &str = "id";
const HASH_KEY_PLACEHOLDER: &str = "#pk";

fn remote_error(context: &str, e: impl std::error::Error) -> StorageError {
    StorageError::backend(format!("{}: {}", context, DisplayErrorContext(e)))
}

fn is_put_conditional_check_failed<R>(err: &SdkError<PutItemError, R>) -> bool {
    match err {
        SdkError::ServiceError(service_err) => {
            matches!(
                service_err.err(),
                PutItemError::ConditionalCheckFailedException(_)
            )
        }
        _ => false,
    }
}

fn is_update_conditional_check_failed<R>(err: &SdkError<UpdateItemError, R>) -> bool {
    match err {
        SdkError::ServiceError(service_err) => {
            matches!(
                service_err.err(),
                UpdateItemError::ConditionalCheckFailedException(_)
            )
        }
        _ => false,
    }
}

fn is_delete_conditional_check_failed<R>(err: &SdkError<DeleteItemError, R>) -> bool {
    match err {
        SdkError::ServiceError(service_err) => {
            matches!(
                service_err.err(),
                DeleteItemError::ConditionalCheckFailedException(_)
            )
        }
        _ => false,
    }
}

/// Order JSON values for client-side sorting: numbers numerically, strings
/// lexicographically, booleans false first, missing values last
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            Value::Bool(_) => 2,
            Value::Array(_) => 3,
            Value::Object(_) => 4,
            Value::Null => 5,
        }
    }

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => rank(x).cmp(&rank(y)),
    }
}

/// Number of matches `get_all` has to scan; `None` scans every match.
///
/// Without an ordering only the requested window is needed.
fn scan_window(options: &ListOptions) -> Option<usize> {
    match (&options.order_by, options.limit) {
        (None, limit) if limit > 0 => Some(options.offset.saturating_add(limit)),
        _ => None,
    }
}

/// Whether the filter selects a single partition by an exact hash key value
fn pins_hash_key(filter: &Filter, hash_key: &str) -> bool {
    matches!(filter.get(hash_key), Some(FilterValue::Equals(_)))
}

/// Repository over one DynamoDB table. Reads are scans with a filter
/// expression; writes address items by their hash (and range) key.
pub struct DynamoRepository {
    client: Client,
    definition: RepositoryDefinition,
}

impl DynamoRepository {
    pub fn new(client: Client, definition: RepositoryDefinition) -> Self {
        Self { client, definition }
    }

    fn table_name(&self) -> &str {
        self.definition.name()
    }

    fn expression(&self, filter: &Filter) -> FilterExpression {
        let expression = FilterExpression::from_filter(filter);
        match self.definition.ttl() {
            Some((attribute, _)) => expression.with_ttl(attribute, chrono::Utc::now().timestamp()),
            None => expression,
        }
    }

    /// Scan matching items, stopping once `max` items are collected
    async fn scan(&self, filter: &Filter, max: Option<usize>) -> Result<Vec<Item>> {
        let expression = self.expression(filter);
        let mut items = Vec::new();
        let mut last_evaluated_key = None;

        loop {
            let mut request = self
                .client
                .scan()
                .table_name(self.table_name())
                .set_filter_expression(expression.expression())
                .set_expression_attribute_names(expression.names())
                .set_expression_attribute_values(expression.values());

            if let Some(key) = last_evaluated_key.take() {
                request = request.set_exclusive_start_key(Some(key));
            }

            let response = request.send().await.map_err(|e| {
                error!("Failed to scan {}: {}", self.table_name(), e);
                remote_error("failed to scan table", e)
            })?;

            for item in response.items() {
                items.push(item.clone());
                if max.map_or(false, |max| items.len() >= max) {
                    return Ok(items);
                }
            }

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => {
                    last_evaluated_key = Some(key.clone());
                }
                _ => break,
            }
        }

        Ok(items)
    }

    async fn find_item(&self, filter: &Filter) -> Result<Item> {
        self.scan(filter, Some(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                StorageError::not_found(format!("no record in {} matches", self.table_name()))
            })
    }

    fn hash_key(&self) -> Result<&str> {
        let hash_key = self.definition.hash_key();
        if hash_key.is_empty() {
            return Err(StorageError::invalid_input(format!(
                "hash key is not defined for table {}",
                self.table_name()
            )));
        }
        Ok(hash_key)
    }

    /// Primary key attributes of a stored item
    fn key_of(&self, item: &Item) -> Result<Item> {
        let mut key = HashMap::new();
        for field in [self.definition.hash_key(), self.definition.range_key()] {
            if field.is_empty() {
                continue;
            }
            let value = item.get(field).ok_or_else(|| {
                StorageError::backend(format!(
                    "stored item of {} lacks key attribute {}",
                    self.table_name(),
                    field
                ))
            })?;
            key.insert(field.to_string(), value.clone());
        }
        Ok(key)
    }

    async fn create(&self, mut record: Record) -> Result<Record> {
        let hash_key = self.hash_key()?.to_string();

        if record.get(ID_FIELD).map_or(true, Value::is_null) {
            record.insert(
                ID_FIELD.to_string(),
                Value::String(Uuid::new_v4().to_string()),
            );
        }
        if !record.contains_key(&hash_key) {
            return Err(StorageError::invalid_input(format!(
                "record must carry the hash key {}",
                hash_key
            )));
        }
        if let Some((attribute, seconds)) = self.definition.ttl() {
            let expires_at = chrono::Utc::now().timestamp() + seconds;
            record.insert(attribute.to_string(), Value::from(expires_at));
        }

        self.client
            .put_item()
            .table_name(self.table_name())
            .set_item(Some(record_to_item(&record)))
            .condition_expression(format!("attribute_not_exists({})", HASH_KEY_PLACEHOLDER))
            .expression_attribute_names(HASH_KEY_PLACEHOLDER, &hash_key)
            .send()
            .await
            .map_err(|e| {
                if is_put_conditional_check_failed(&e) {
                    StorageError::already_exists(format!(
                        "record with {} {} already exists",
                        hash_key, record[&hash_key]
                    ))
                } else {
                    remote_error("failed to put item", e)
                }
            })?;
        debug!("Created item in {}", self.table_name());

        Ok(record)
    }

    async fn update(&self, record: Record, filter: &Filter) -> Result<Record> {
        let hash_key = self.hash_key()?.to_string();
        let range_key = self.definition.range_key();

        let existing = self.find_item(filter).await?;
        let key = self.key_of(&existing)?;

        let mut names = HashMap::from([(HASH_KEY_PLACEHOLDER.to_string(), hash_key.clone())]);
        let mut values: HashMap<String, AttributeValue> = HashMap::new();
        let mut assignments = Vec::new();

        for (i, (field, value)) in record
            .iter()
            .filter(|(field, _)| field.as_str() != hash_key && field.as_str() != range_key)
            .enumerate()
        {
            names.insert(format!("#a{}", i), field.clone());
            values.insert(format!(":a{}", i), json_to_attribute(value));
            assignments.push(format!("#a{} = :a{}", i, i));
        }

        if assignments.is_empty() {
            return Ok(item_to_record(&existing));
        }

        let response = self
            .client
            .update_item()
            .table_name(self.table_name())
            .set_key(Some(key))
            .update_expression(format!("SET {}", assignments.join(", ")))
            .condition_expression(format!("attribute_exists({})", HASH_KEY_PLACEHOLDER))
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| {
                if is_update_conditional_check_failed(&e) {
                    StorageError::not_found("record was removed before update")
                } else {
                    remote_error("failed to update item", e)
                }
            })?;

        Ok(response
            .attributes()
            .map(item_to_record)
            .unwrap_or_default())
    }

    async fn delete_item(&self, key: Item) -> Result<()> {
        let hash_key = self.hash_key()?;

        self.client
            .delete_item()
            .table_name(self.table_name())
            .set_key(Some(key))
            .condition_expression(format!("attribute_exists({})", HASH_KEY_PLACEHOLDER))
            .expression_attribute_names(HASH_KEY_PLACEHOLDER, hash_key)
            .send()
            .await
            .map_err(|e| {
                if is_delete_conditional_check_failed(&e) {
                    StorageError::not_found("record already deleted")
                } else {
                    remote_error("failed to delete item", e)
                }
            })?;
        Ok(())
    }
}

#[async_trait]
impl Repository for DynamoRepository {
    fn definition(&self) -> &RepositoryDefinition {
        &self.definition
    }

    async fn get_one(&self, filter: &Filter) -> Result<Record> {
        self.find_item(filter).await.map(|item| item_to_record(&item))
    }

    async fn get_all(&self, filter: &Filter, options: &ListOptions) -> Result<Vec<Record>> {
        let max = scan_window(options);

        let mut records: Vec<Record> = self
            .scan(filter, max)
            .await?
            .iter()
            .map(item_to_record)
            .collect();

        if let Some(field) = &options.order_by {
            records.sort_by(|a, b| {
                let ordering = compare_values(a.get(field), b.get(field));
                match options.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        let limit = if options.limit > 0 {
            options.limit
        } else {
            usize::MAX
        };
        Ok(records
            .into_iter()
            .skip(options.offset)
            .take(limit)
            .collect())
    }

    async fn save(&self, record: Record, filter: Option<&Filter>) -> Result<Record> {
        match filter {
            None => self.create(record).await,
            Some(filter) => self.update(record, filter).await,
        }
    }

    async fn delete_one(&self, filter: &Filter) -> Result<()> {
        let existing = self.find_item(filter).await?;
        let key = self.key_of(&existing)?;
        self.delete_item(key).await
    }

    async fn delete_all(&self, filter: &Filter) -> Result<()> {
        let hash_key = self.hash_key()?;
        if !pins_hash_key(filter, hash_key) {
            return Err(StorageError::invalid_input(format!(
                "filter must match the hash key {} exactly",
                hash_key
            )));
        }

        let mut deleted = 0;
        loop {
            let batch = self.scan(filter, Some(DELETE_BATCH_SIZE)).await?;
            if batch.is_empty() {
                break;
            }
            for item in &batch {
                match self.delete_item(self.key_of(item)?).await {
                    Ok(()) => deleted += 1,
                    // Expired or removed concurrently
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
        }

        debug!("Deleted {} items from {}", deleted, self.table_name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compare_values() {
        assert_eq!(
            compare_values(Some(&json!(2)), Some(&json!(10))),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&json!("b")), Some(&json!("a"))),
            Ordering::Greater
        );
        assert_eq!(compare_values(None, Some(&json!(1))), Ordering::Greater);
        assert_eq!(compare_values(Some(&json!(1)), None), Ordering::Less);
        assert_eq!(
            compare_values(Some(&json!(1)), Some(&json!("1"))),
            Ordering::Less
        );
    }

    #[test]
    fn test_scan_window() {
        assert_eq!(scan_window(&ListOptions::new().offset(5).limit(10)), Some(15));
        assert_eq!(
            scan_window(&ListOptions::new().offset(usize::MAX).limit(10)),
            Some(usize::MAX)
        );
        assert_eq!(scan_window(&ListOptions::new().offset(5)), None);
        assert_eq!(
            scan_window(
                &ListOptions::new()
                    .order_by("age", SortDirection::Ascending)
                    .limit(10)
            ),
            None
        );
    }

    #[test]
    fn test_bulk_delete_requires_exact_hash_key() {
        assert!(pins_hash_key(
            &Filter::new().match_value("email", "a@example.com"),
            "email"
        ));
        assert!(!pins_hash_key(
            &Filter::new().match_pattern("email", "%@example.com"),
            "email"
        ));
        assert!(!pins_hash_key(&Filter::new().match_value("name", "Ann"), "email"));
    }
}
