//! MongoDB implementation of the temps-storage repository contract
//!
//! Each repository maps to one collection of the configured database.
//! Provisioning creates the collection when missing, then its declared
//! indexes and, when TTL is enabled, a TTL index on the expiry attribute.
//!
//! ## Identifiers
//!
//! The caller-facing `id` field is stored as `_id`. By default it holds an
//! ObjectId exchanged as a hex string; with `custom_id` the caller's value is
//! stored verbatim (a UUID is generated when absent).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use temps_storage::{BackendManager, DbInfo, BackendsConfig};
//! use temps_storage_mongodb::{properties_schema, MongoBackendFactory, BACKEND_TYPE};
//!
//! # async fn example() -> temps_storage::Result<()> {
//! let config = BackendsConfig::default()
//!     .with_backend(BACKEND_TYPE, &DbInfo::new("localhost:27017", "app"))?;
//! let manager = BackendManager::from_config(config);
//! manager
//!     .support_backend(BACKEND_TYPE, Arc::new(MongoBackendFactory), properties_schema()?)
//!     .await;
//!
//! let backend = manager.get_backend(BACKEND_TYPE).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod convert;
pub mod error;
pub mod repository;

use serde_json::{json, Value};
use temps_storage::{DbInfo, Result};

pub use backend::{MongoBackendFactory, MongoRepositoryBuilder};
pub use repository::MongoRepository;

/// Backend type name
pub const BACKEND_TYPE: &str = "mongodb";
/// Context key of the shared `mongodb::Client`
pub const CLIENT_CONTEXT_KEY: &str = "client";
/// Context key of the configured `mongodb::Database`
pub const DATABASE_CONTEXT_KEY: &str = "database";

/// Property schema of the `mongodb` backend configuration
pub fn properties_schema() -> Result<Value> {
    let mut schema = serde_json::to_value(schemars::schema_for!(DbInfo))?;
    schema["required"] = json!(["host", "database"]);
    Ok(schema)
}
