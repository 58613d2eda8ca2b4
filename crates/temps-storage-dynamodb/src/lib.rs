//! DynamoDB implementation of the temps-storage repository contract
//!
//! Each repository maps to one table keyed by the definition's hash key
//! (and optional range key). Provisioning creates the table with its global
//! secondary indexes when missing and enables native TTL on the expiry
//! attribute.
//!
//! DynamoDB has no regex operator, so filter patterns are reduced to
//! `begins_with` / `contains` clauses, see [`expression`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use temps_storage::{BackendManager, BackendsConfig, DbInfo, RepositoryDefinition};
//! use temps_storage_dynamodb::{properties_schema, DynamoBackendFactory, BACKEND_TYPE};
//!
//! # async fn example() -> temps_storage::Result<()> {
//! let config = DbInfo::default()
//!     .with_aws_region("us-east-1")
//!     .with_aws_endpoint("http://localhost:8000");
//! let manager = BackendManager::from_config(
//!     BackendsConfig::default().with_backend(BACKEND_TYPE, &config)?,
//! );
//! manager
//!     .support_backend(BACKEND_TYPE, Arc::new(DynamoBackendFactory), properties_schema()?)
//!     .await;
//!
//! let backend = manager.get_backend(BACKEND_TYPE).await?;
//! let users = backend
//!     .define_repository("users", &RepositoryDefinition::new("users").with_hash_key("email"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod attribute;
pub mod backend;
pub mod expression;
pub mod provision;
pub mod repository;

use serde_json::{json, Value};
use temps_storage::{DbInfo, Result};

pub use backend::{DynamoBackendFactory, DynamoRepositoryBuilder};
pub use expression::FilterExpression;
pub use repository::DynamoRepository;

/// Backend type name
pub const BACKEND_TYPE: &str = "dynamodb";
/// Context key of the shared `aws_sdk_dynamodb::Client`
pub const CLIENT_CONTEXT_KEY: &str = "client";

/// Property schema of the `dynamodb` backend configuration
pub fn properties_schema() -> Result<Value> {
    let mut schema = serde_json::to_value(schemars::schema_for!(DbInfo))?;
    schema["required"] = json!(["aws_region"]);
    Ok(schema)
}
