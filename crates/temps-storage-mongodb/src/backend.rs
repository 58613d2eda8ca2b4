use async_trait::async_trait;
use bson::{doc, Document};
use futures::future::BoxFuture;
use mongodb::{
    options::{ClientOptions, Credential, IndexOptions},
    Client, Database, IndexModel,
};
use std::sync::Arc;
use std::time::Duration;
use temps_storage::{
    Backend, BackendFactory, DbInfo, Repository, RepositoryBuilder, RepositoryDefinition,
    Result, StorageError,
};
use tracing::{debug, error, info, warn};

use crate::convert::index_keys;
use crate::error::{is_index_conflict, server_code, NAMESPACE_EXISTS};
use crate::repository::MongoRepository;
use crate::{BACKEND_TYPE, CLIENT_CONTEXT_KEY, DATABASE_CONTEXT_KEY};

/// Connection URI for a configured host
pub fn connection_uri(host: &str) -> String {
    if host.starts_with("mongodb") {
        host.to_string()
    } else {
        format!("mongodb://{}", host)
    }
}

/// Connects to MongoDB and builds the `mongodb` backend
#[derive(Debug, Default, Clone, Copy)]
pub struct MongoBackendFactory;

#[async_trait]
impl BackendFactory for MongoBackendFactory {
    async fn build(&self, config: DbInfo) -> Result<Backend> {
        if config.host.is_empty() {
            return Err(StorageError::invalid_input("mongodb backend requires a host"));
        }
        if config.database.is_empty() {
            return Err(StorageError::invalid_input(
                "mongodb backend requires a database",
            ));
        }

        debug!("Creating MongoDB client for {}", config.connection_string());

        let uri = connection_uri(&config.host);
        let mut options = ClientOptions::parse(uri.as_str())
            .await
            .map_err(|e| {
                error!("Failed to parse MongoDB URL: {}", e);
                StorageError::backend(format!("failed to parse MongoDB URL: {}", e))
            })?;

        if let Some(username) = &config.username {
            options.credential = Some(
                Credential::builder()
                    .username(username.clone())
                    .password(config.password.clone().unwrap_or_default())
                    .source(config.database.clone())
                    .build(),
            );
        }

        let client = Client::with_options(options).map_err(|e| {
            error!("Failed to create MongoDB client: {}", e);
            StorageError::backend(format!("failed to create MongoDB client: {}", e))
        })?;

        let database = client.database(&config.database);
        database.run_command(doc! { "ping": 1 }).await.map_err(|e| {
            error!("Failed to connect to MongoDB: {}", e);
            StorageError::backend(format!("failed to connect to MongoDB: {}", e))
        })?;

        info!("Connected to MongoDB database {}", config.database);

        let shutdown_client = client.clone();
        let backend = Backend::new(BACKEND_TYPE, config, Arc::new(MongoRepositoryBuilder))
            .with_cleanup(move || -> BoxFuture<'static, ()> {
                let client = shutdown_client.clone();
                Box::pin(async move {
                    client.shutdown().await;
                })
            });

        backend.set_in_context(CLIENT_CONTEXT_KEY, client).await;
        backend.set_in_context(DATABASE_CONTEXT_KEY, database).await;

        Ok(backend)
    }
}

/// Provisions collections, indexes and TTL indexes
#[derive(Debug, Default, Clone, Copy)]
pub struct MongoRepositoryBuilder;

impl MongoRepositoryBuilder {
    async fn ensure_collection(&self, database: &Database, name: &str) -> Result<()> {
        let names = database.list_collection_names().await.map_err(|e| {
            error!("Failed to list collections: {}", e);
            StorageError::backend(format!("failed to list collections: {}", e))
        })?;

        if names.iter().any(|n| n == name) {
            debug!("Collection {} exists, skipping creation", name);
            return Ok(());
        }

        match database.create_collection(name).await {
            Ok(()) => {
                info!("Created collection {}", name);
                Ok(())
            }
            // Created concurrently by another process
            Err(e) if server_code(&e) == Some(NAMESPACE_EXISTS) => Ok(()),
            Err(e) => Err(StorageError::backend(format!(
                "failed to create collection {}: {}",
                name, e
            ))),
        }
    }

    async fn create_index(
        &self,
        database: &Database,
        collection: &str,
        keys: Document,
        options: IndexOptions,
    ) -> Result<()> {
        let model = IndexModel::builder()
            .keys(keys.clone())
            .options(options)
            .build();

        match database
            .collection::<Document>(collection)
            .create_index(model)
            .await
        {
            Ok(_) => {
                debug!("Created index {} on {}", keys, collection);
                Ok(())
            }
            Err(e) if is_index_conflict(&e) => {
                warn!(
                    "Index {} on {} conflicts with an existing index, keeping the existing one: {}",
                    keys, collection, e
                );
                Ok(())
            }
            Err(e) => Err(StorageError::backend(format!(
                "failed to create index {} on {}: {}",
                keys, collection, e
            ))),
        }
    }
}

#[async_trait]
impl RepositoryBuilder for MongoRepositoryBuilder {
    async fn build(
        &self,
        definition: &RepositoryDefinition,
        backend: &Backend,
    ) -> Result<Arc<dyn Repository>> {
        let database = backend
            .get_from_context::<Database>(DATABASE_CONTEXT_KEY)
            .await
            .ok_or_else(|| StorageError::backend("mongodb session is not initialized"))?;
        let name = definition.name();

        self.ensure_collection(&database, name).await?;

        for index in definition.indexes() {
            let keys = index_keys(&index.fields)?;
            // _id is always indexed and unique
            if keys.len() == 1 && keys.contains_key("_id") {
                continue;
            }
            let options = IndexOptions::builder().unique(index.unique).build();
            self.create_index(&database, name, keys, options).await?;
        }

        if let Some((attribute, _)) = definition.ttl() {
            let options = IndexOptions::builder()
                .expire_after(Duration::from_secs(0))
                .name(format!("{}_ttl", attribute))
                .build();
            self.create_index(&database, name, doc! { attribute: 1 }, options)
                .await?;
        }

        Ok(Arc::new(MongoRepository::new(
            database.collection::<Document>(name),
            definition.clone(),
        )))
    }
}
