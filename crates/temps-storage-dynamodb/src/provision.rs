//! Table, global secondary index and TTL provisioning.

use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType,
    Projection, ProjectionType, ProvisionedThroughput, ScalarAttributeType, TableStatus,
    TimeToLiveSpecification, TimeToLiveStatus,
};
use aws_sdk_dynamodb::Client;
use std::time::Duration;
use temps_storage::{RepositoryDefinition, Result, StorageError};
use tracing::{debug, info, warn};

const TABLE_ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(500);
const TABLE_ACTIVE_MAX_POLLS: usize = 120;

/// Everything needed to create a table for a definition
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub table_name: String,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub key_schema: Vec<KeySchemaElement>,
    pub global_secondary_indexes: Vec<GlobalSecondaryIndex>,
    pub billing_mode: BillingMode,
    pub provisioned_throughput: Option<ProvisionedThroughput>,
}

/// Name of the global secondary index over `field`
pub fn gsi_name(field: &str) -> String {
    format!("{}-index", field)
}

fn build_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::backend(format!("invalid table description: {}", e))
}

fn scalar_type(key: &str, attribute_type: &str) -> Result<ScalarAttributeType> {
    match attribute_type {
        "S" => Ok(ScalarAttributeType::S),
        "N" => Ok(ScalarAttributeType::N),
        "B" => Ok(ScalarAttributeType::B),
        other => Err(StorageError::invalid_input(format!(
            "unsupported attribute type '{}' for key {}, expected S, N or B",
            other, key
        ))),
    }
}

fn attribute(name: &str, attribute_type: &str) -> Result<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(scalar_type(name, attribute_type)?)
        .build()
        .map_err(build_error)
}

fn key(name: &str, key_type: KeyType) -> Result<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(build_error)
}

fn throughput(read_capacity: i64, write_capacity: i64) -> Result<ProvisionedThroughput> {
    ProvisionedThroughput::builder()
        .read_capacity_units(read_capacity)
        .write_capacity_units(write_capacity)
        .build()
        .map_err(build_error)
}

/// Derive the table layout from a definition.
///
/// Tables are provisioned when both capacities are positive and on-demand
/// otherwise. Each GSI is keyed by its field, which must be the table's
/// hash or range key.
pub fn table_spec(definition: &RepositoryDefinition) -> Result<TableSpec> {
    let hash_key = definition.hash_key();
    if hash_key.is_empty() {
        return Err(StorageError::invalid_input(format!(
            "hash key is required for table {}",
            definition.name()
        )));
    }
    let range_key = definition.range_key();

    let mut attribute_definitions = vec![attribute(hash_key, definition.hash_key_type())?];
    let mut key_schema = vec![key(hash_key, KeyType::Hash)?];
    if !range_key.is_empty() {
        attribute_definitions.push(attribute(range_key, definition.range_key_type())?);
        key_schema.push(key(range_key, KeyType::Range)?);
    }

    let provisioned = definition.read_capacity() > 0 && definition.write_capacity() > 0;

    let mut fields: Vec<&String> = definition.gsi().keys().collect();
    fields.sort();

    let mut global_secondary_indexes = Vec::with_capacity(fields.len());
    for field in fields {
        if field != hash_key && field != range_key {
            return Err(StorageError::invalid_input(format!(
                "global secondary index field {} must be the hash or range key of {}",
                field,
                definition.name()
            )));
        }

        let mut index = GlobalSecondaryIndex::builder()
            .index_name(gsi_name(field))
            .key_schema(key(field, KeyType::Hash)?)
            .projection(
                Projection::builder()
                    .projection_type(ProjectionType::All)
                    .build(),
            );
        if provisioned {
            let capacity = definition.gsi()[field];
            index = index.provisioned_throughput(throughput(
                capacity.read_capacity,
                capacity.write_capacity,
            )?);
        }
        global_secondary_indexes.push(index.build().map_err(build_error)?);
    }

    let (billing_mode, provisioned_throughput) = if provisioned {
        (
            BillingMode::Provisioned,
            Some(throughput(
                definition.read_capacity(),
                definition.write_capacity(),
            )?),
        )
    } else {
        (BillingMode::PayPerRequest, None)
    };

    Ok(TableSpec {
        table_name: definition.name().to_string(),
        attribute_definitions,
        key_schema,
        global_secondary_indexes,
        billing_mode,
        provisioned_throughput,
    })
}

fn remote_error(context: &str, e: impl std::error::Error) -> StorageError {
    StorageError::backend(format!("{}: {}", context, DisplayErrorContext(e)))
}

pub async fn table_exists(client: &Client, table_name: &str) -> Result<bool> {
    let mut start: Option<String> = None;

    loop {
        let response = client
            .list_tables()
            .set_exclusive_start_table_name(start.take())
            .send()
            .await
            .map_err(|e| remote_error("failed to list tables", e))?;

        if response.table_names().iter().any(|name| name == table_name) {
            return Ok(true);
        }

        match response.last_evaluated_table_name() {
            Some(name) => start = Some(name.to_string()),
            None => return Ok(false),
        }
    }
}

async fn wait_until_active(client: &Client, table_name: &str) -> Result<()> {
    for _ in 0..TABLE_ACTIVE_MAX_POLLS {
        let response = client
            .describe_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| remote_error("failed to describe table", e))?;

        if response.table().and_then(|t| t.table_status()) == Some(&TableStatus::Active) {
            return Ok(());
        }
        tokio::time::sleep(TABLE_ACTIVE_POLL_INTERVAL).await;
    }

    Err(StorageError::backend(format!(
        "table {} did not become active in time",
        table_name
    )))
}

/// Create the table unless it already exists, then wait for it to be active
pub async fn create_table(client: &Client, definition: &RepositoryDefinition) -> Result<()> {
    let spec = table_spec(definition)?;

    if table_exists(client, &spec.table_name).await? {
        debug!("Table {} exists, skipping creation", spec.table_name);
        return Ok(());
    }

    let indexes = spec.global_secondary_indexes;
    let result = client
        .create_table()
        .table_name(&spec.table_name)
        .set_attribute_definitions(Some(spec.attribute_definitions))
        .set_key_schema(Some(spec.key_schema))
        .set_global_secondary_indexes((!indexes.is_empty()).then_some(indexes))
        .billing_mode(spec.billing_mode)
        .set_provisioned_throughput(spec.provisioned_throughput)
        .send()
        .await;

    match result {
        Ok(_) => info!("Created table {}", spec.table_name),
        // Created concurrently by another process
        Err(e)
            if e.as_service_error()
                .map_or(false, |se| se.is_resource_in_use_exception()) =>
        {
            warn!("Table {} was created concurrently", spec.table_name);
        }
        Err(e) => return Err(remote_error("failed to create table", e)),
    }

    wait_until_active(client, &spec.table_name).await
}

/// Enable native expiry on the TTL attribute when the definition asks for it
pub async fn set_ttl(client: &Client, definition: &RepositoryDefinition) -> Result<()> {
    let Some((attribute, _)) = definition.ttl() else {
        return Ok(());
    };
    let table_name = definition.name();

    let response = client
        .describe_time_to_live()
        .table_name(table_name)
        .send()
        .await
        .map_err(|e| remote_error("failed to describe TTL", e))?;

    if let Some(description) = response.time_to_live_description() {
        let active = matches!(
            description.time_to_live_status(),
            Some(TimeToLiveStatus::Enabled) | Some(TimeToLiveStatus::Enabling)
        );
        if active {
            if description.attribute_name() != Some(attribute) {
                warn!(
                    "TTL of table {} is bound to {:?}, not {}",
                    table_name,
                    description.attribute_name(),
                    attribute
                );
            }
            return Ok(());
        }
    }

    let specification = TimeToLiveSpecification::builder()
        .enabled(true)
        .attribute_name(attribute)
        .build()
        .map_err(build_error)?;

    client
        .update_time_to_live()
        .table_name(table_name)
        .time_to_live_specification(specification)
        .send()
        .await
        .map_err(|e| remote_error("failed to enable TTL", e))?;
    info!("Enabled TTL on {}.{}", table_name, attribute);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use temps_storage::GsiCapacity;

    fn capacity(units: i64) -> GsiCapacity {
        GsiCapacity {
            read_capacity: units,
            write_capacity: units,
        }
    }

    #[test]
    fn test_hash_key_is_required() {
        let err = table_spec(&RepositoryDefinition::new("users")).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_on_demand_table() {
        let spec = table_spec(&RepositoryDefinition::new("users").with_hash_key("email")).unwrap();

        assert_eq!(spec.table_name, "users");
        assert_eq!(spec.billing_mode, BillingMode::PayPerRequest);
        assert!(spec.provisioned_throughput.is_none());
        assert_eq!(spec.key_schema.len(), 1);
        assert_eq!(spec.key_schema[0].attribute_name(), "email");
        assert_eq!(spec.key_schema[0].key_type(), &KeyType::Hash);
        assert_eq!(
            spec.attribute_definitions[0].attribute_type(),
            &ScalarAttributeType::S
        );
    }

    #[test]
    fn test_provisioned_table_with_range_key_and_gsi() {
        let definition = RepositoryDefinition::new("sessions")
            .with_hash_key("user")
            .with_range_key("created")
            .with_range_key_type("N")
            .with_capacity(5, 10)
            .with_gsi("created", capacity(2));

        let spec = table_spec(&definition).unwrap();

        assert_eq!(spec.billing_mode, BillingMode::Provisioned);
        let table_throughput = spec.provisioned_throughput.unwrap();
        assert_eq!(table_throughput.read_capacity_units(), 5);
        assert_eq!(table_throughput.write_capacity_units(), 10);

        assert_eq!(spec.key_schema[1].key_type(), &KeyType::Range);
        assert_eq!(
            spec.attribute_definitions[1].attribute_type(),
            &ScalarAttributeType::N
        );

        let index = &spec.global_secondary_indexes[0];
        assert_eq!(index.index_name(), "created-index");
        assert_eq!(index.key_schema()[0].attribute_name(), "created");
        assert_eq!(
            index
                .provisioned_throughput()
                .map(|t| t.read_capacity_units()),
            Some(2)
        );
    }

    #[test]
    fn test_gsi_on_other_field_is_rejected() {
        let definition = RepositoryDefinition::new("users")
            .with_hash_key("email")
            .with_gsi("name", capacity(1));

        assert!(table_spec(&definition).unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_unknown_key_type_is_rejected() {
        let definition = RepositoryDefinition::new("users")
            .with_hash_key("email")
            .with_hash_key_type("X");

        assert!(table_spec(&definition).unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_gsi_capacity_ignored_on_demand() {
        let definition = RepositoryDefinition::new("users")
            .with_hash_key("email")
            .with_gsi("email", capacity(3));

        let spec = table_spec(&definition).unwrap();
        assert!(spec.global_secondary_indexes[0]
            .provisioned_throughput()
            .is_none());
    }
}
