//! Built-in backend registration for temps-storage
//!
//! Registers the `mongodb` and `dynamodb` backends, with their property
//! schemas, on a [`BackendManager`].
//!
//! ```rust,no_run
//! # async fn example() -> temps_storage::Result<()> {
//! let manager = temps_storage_support::load_backend_support("backends.toml").await?;
//! let backend = manager.get_backend("mongodb").await?;
//! backend.define_repositories().await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;
use temps_storage::{BackendManager, BackendsConfig, Result};
use temps_storage_dynamodb::DynamoBackendFactory;
use temps_storage_mongodb::MongoBackendFactory;
use tracing::debug;

/// Register every built-in backend type on `manager`
pub async fn add_supported(manager: &BackendManager) -> Result<()> {
    manager
        .support_backend(
            temps_storage_mongodb::BACKEND_TYPE,
            Arc::new(MongoBackendFactory),
            temps_storage_mongodb::properties_schema()?,
        )
        .await;

    manager
        .support_backend(
            temps_storage_dynamodb::BACKEND_TYPE,
            Arc::new(DynamoBackendFactory),
            temps_storage_dynamodb::properties_schema()?,
        )
        .await;

    debug!("Registered built-in storage backends");
    Ok(())
}

/// Create a manager supporting every built-in backend type
pub async fn new_backend_support(config: BackendsConfig) -> Result<BackendManager> {
    let manager = BackendManager::from_config(config);
    add_supported(&manager).await?;
    Ok(manager)
}

/// Same as [`new_backend_support`], reading the configuration from a file
/// and the environment
pub async fn load_backend_support(path: impl AsRef<Path>) -> Result<BackendManager> {
    new_backend_support(BackendsConfig::load(path)?).await
}
