//! # temps-storage
//!
//! Backend-agnostic repositories over heterogeneous storage engines.
//!
//! Callers work with one [`Repository`] contract (get, list, save, delete,
//! wildcard search) while the engine behind it is picked by configuration:
//! - `temps-storage-mongodb` - document store
//! - `temps-storage-dynamodb` - wide-column store
//!
//! ## Architecture
//!
//! - **BackendManager**: maps a backend type to its [`BackendFactory`] and
//!   property schema, and builds at most one [`Backend`] per type
//! - **Backend**: one engine session plus the repositories provisioned on it;
//!   each repository name is provisioned exactly once
//! - **Repository**: CRUD over one collection or table, driven by a
//!   [`Filter`] whose patterns are compiled per engine by [`pattern`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use temps_storage::{BackendManager, Filter, ListOptions, RepositoryDefinition};
//!
//! # async fn example(manager: BackendManager) -> temps_storage::Result<()> {
//! let backend = manager.get_backend("mongodb").await?;
//! let users = backend
//!     .define_repository("users", &RepositoryDefinition::new("users"))
//!     .await?;
//!
//! let filter = Filter::new().match_pattern("email", "%@example.com");
//! let matches = users.get_all(&filter, &ListOptions::new().limit(10)).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod definition;
pub mod error;
pub mod filter;
pub mod manager;
pub mod pattern;
pub mod record;
pub mod repository;
pub mod validation;

pub use backend::{Backend, CleanupFn, RepositoryBuilder};
pub use config::{BackendsConfig, DbInfo};
pub use definition::{GsiCapacity, IndexDefinition, RepositoryDefinition};
pub use error::{is_error_of_type, ErrorClass, Result, StorageError};
pub use filter::{Filter, FilterValue};
pub use manager::{BackendFactory, BackendManager};
pub use pattern::{ConditionOp, PatternCondition};
pub use record::{from_record, to_record, Record};
pub use repository::{ListOptions, Repository, RepositoryExt, SortDirection};
pub use validation::{validate, ValidationResult};
