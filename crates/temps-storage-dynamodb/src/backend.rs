use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_dynamodb::config::{Region, SharedCredentialsProvider};
use aws_sdk_dynamodb::Client;
use std::sync::Arc;
use temps_storage::{
    Backend, BackendFactory, DbInfo, Repository, RepositoryBuilder, RepositoryDefinition,
    Result, StorageError,
};
use tracing::debug;

use crate::provision::{create_table, set_ttl};
use crate::repository::DynamoRepository;
use crate::{BACKEND_TYPE, CLIENT_CONTEXT_KEY};

/// Name reported by statically configured credentials
const CREDENTIALS_PROVIDER_NAME: &str = "temps-storage-dynamodb";

/// Static credentials from the configuration, if any.
///
/// Both the key id and the secret must be present together.
fn static_credentials(config: &DbInfo) -> Result<Option<Credentials>> {
    match (&config.aws_access_key_id, &config.aws_secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Some(Credentials::new(
            access_key_id,
            secret_access_key,
            config.aws_session_token.clone(),
            None,
            CREDENTIALS_PROVIDER_NAME,
        ))),
        (None, None) => Ok(None),
        _ => Err(StorageError::invalid_input(
            "aws_access_key_id and aws_secret_access_key must be configured together",
        )),
    }
}

/// Creates the DynamoDB client and builds the `dynamodb` backend
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamoBackendFactory;

#[async_trait]
impl BackendFactory for DynamoBackendFactory {
    async fn build(&self, config: DbInfo) -> Result<Backend> {
        let region = config
            .aws_region
            .clone()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| StorageError::invalid_input("dynamodb backend requires aws_region"))?;

        debug!("Creating DynamoDB client for region: {}", region);

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region));

        match static_credentials(&config)? {
            Some(credentials) => {
                loader = loader.credentials_provider(SharedCredentialsProvider::new(credentials));
            }
            None => {
                if let Some(profile) = &config.aws_profile {
                    loader = loader.profile_name(profile);
                }
            }
        }

        // Custom endpoint, e.g. DynamoDB Local
        if let Some(endpoint) = &config.aws_endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let client = Client::from_conf(aws_sdk_dynamodb::config::Builder::from(&sdk_config).build());

        debug!("DynamoDB client created successfully");

        let backend = Backend::new(BACKEND_TYPE, config, Arc::new(DynamoRepositoryBuilder));
        backend.set_in_context(CLIENT_CONTEXT_KEY, client).await;
        Ok(backend)
    }
}

/// Provisions tables, global secondary indexes and TTL
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamoRepositoryBuilder;

#[async_trait]
impl RepositoryBuilder for DynamoRepositoryBuilder {
    async fn build(
        &self,
        definition: &RepositoryDefinition,
        backend: &Backend,
    ) -> Result<Arc<dyn Repository>> {
        let client = backend
            .get_from_context::<Client>(CLIENT_CONTEXT_KEY)
            .await
            .ok_or_else(|| StorageError::backend("dynamodb client is not initialized"))?;

        create_table(&client, definition).await?;
        set_ttl(&client, definition).await?;

        Ok(Arc::new(DynamoRepository::new(
            (*client).clone(),
            definition.clone(),
        )))
    }
}
