use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::definition::RepositoryDefinition;
use crate::error::{Result, StorageError};
use crate::filter::Filter;
use crate::record::{from_record, to_record, Record};

/// Sort order for [`Repository::get_all`]
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Ascending => write!(f, "asc"),
            SortDirection::Descending => write!(f, "desc"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(StorageError::invalid_input(format!(
                "unknown sort direction: {}",
                other
            ))),
        }
    }
}

/// Ordering and pagination for [`Repository::get_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Field to sort by; unsorted when `None`
    pub order_by: Option<String>,
    pub direction: SortDirection,
    /// Maximum number of records; `0` means unbounded
    pub limit: usize,
    /// Number of leading matches to skip
    pub offset: usize,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some(field.into());
        self.direction = direction;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Backend-agnostic access to one collection or table.
///
/// Implementations are bound to a single backend and definition for their
/// whole lifetime and keep no state beyond the remote store.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Definition the repository was provisioned from
    fn definition(&self) -> &RepositoryDefinition;

    /// Fetch the first record matching the filter; `NotFound` when none does
    async fn get_one(&self, filter: &Filter) -> Result<Record>;

    /// Fetch every record matching the filter, ordered and paginated
    async fn get_all(&self, filter: &Filter, options: &ListOptions) -> Result<Vec<Record>>;

    /// Create (`filter == None`) or partially update the record matched by
    /// the filter, returning the stored record.
    ///
    /// Create fails with `AlreadyExists` on a primary key conflict, update
    /// fails with `NotFound` when nothing matches.
    async fn save(&self, record: Record, filter: Option<&Filter>) -> Result<Record>;

    /// Delete exactly one matching record; `NotFound` when none does
    async fn delete_one(&self, filter: &Filter) -> Result<()>;

    /// Delete every matching record
    async fn delete_all(&self, filter: &Filter) -> Result<()>;
}

/// Typed access on top of [`Repository`] using the record marshalling helpers
#[async_trait]
pub trait RepositoryExt: Repository {
    async fn get_one_as<T>(&self, filter: &Filter) -> Result<T>
    where
        T: DeserializeOwned + Send,
    {
        let record = self.get_one(filter).await?;
        from_record(&record)
    }

    async fn get_all_as<T>(&self, filter: &Filter, options: &ListOptions) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.get_all(filter, options)
            .await?
            .iter()
            .map(from_record)
            .collect()
    }

    async fn save_as<T>(&self, object: &T, filter: Option<&Filter>) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let record = to_record(object)?;
        let saved = self.save(record, filter).await?;
        from_record(&saved)
    }
}

impl<R: Repository + ?Sized> RepositoryExt for R {}
