//! Declarative description of a logical collection or table.
//!
//! Definitions are forgiving: every optional field reads back as its zero
//! value, and required fields are only enforced by [`RepositoryDefinition::validate`]
//! and the engine-specific checks run when the repository is provisioned.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, StorageError};

/// Default attribute type for wide-column hash and range keys
pub const DEFAULT_KEY_TYPE: &str = "S";

/// Secondary index over an ordered list of fields
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexDefinition {
    /// Indexed fields in order; a leading `-` marks a descending key
    #[serde(alias = "columns", default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDefinition {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unique: true,
            ..Self::new(fields)
        }
    }
}

/// Provisioned throughput of a global secondary index
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GsiCapacity {
    pub read_capacity: i64,
    pub write_capacity: i64,
}

/// Description of a named repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RepositoryDefinition {
    name: String,
    #[serde(default)]
    indexes: Vec<IndexDefinition>,
    #[serde(default)]
    hash_key: Option<String>,
    #[serde(default)]
    hash_key_type: Option<String>,
    #[serde(default)]
    range_key: Option<String>,
    #[serde(default)]
    range_key_type: Option<String>,
    #[serde(default)]
    read_capacity: Option<i64>,
    #[serde(default)]
    write_capacity: Option<i64>,
    #[serde(default)]
    gsi: HashMap<String, GsiCapacity>,
    #[serde(default)]
    enable_ttl: bool,
    #[serde(default)]
    ttl_attribute: Option<String>,
    #[serde(default)]
    ttl_seconds: Option<i64>,
    #[serde(default)]
    custom_id: bool,
}

impl RepositoryDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_hash_key(mut self, field: impl Into<String>) -> Self {
        self.hash_key = Some(field.into());
        self
    }

    pub fn with_hash_key_type(mut self, attribute_type: impl Into<String>) -> Self {
        self.hash_key_type = Some(attribute_type.into());
        self
    }

    pub fn with_range_key(mut self, field: impl Into<String>) -> Self {
        self.range_key = Some(field.into());
        self
    }

    pub fn with_range_key_type(mut self, attribute_type: impl Into<String>) -> Self {
        self.range_key_type = Some(attribute_type.into());
        self
    }

    pub fn with_capacity(mut self, read_capacity: i64, write_capacity: i64) -> Self {
        self.read_capacity = Some(read_capacity);
        self.write_capacity = Some(write_capacity);
        self
    }

    pub fn with_gsi(mut self, field: impl Into<String>, capacity: GsiCapacity) -> Self {
        self.gsi.insert(field.into(), capacity);
        self
    }

    pub fn with_ttl(mut self, attribute: impl Into<String>, seconds: i64) -> Self {
        self.enable_ttl = true;
        self.ttl_attribute = Some(attribute.into());
        self.ttl_seconds = Some(seconds);
        self
    }

    pub fn with_custom_id(mut self, custom_id: bool) -> Self {
        self.custom_id = custom_id;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    pub fn hash_key(&self) -> &str {
        self.hash_key.as_deref().unwrap_or_default()
    }

    /// Attribute type of the hash key, `S` when not declared
    pub fn hash_key_type(&self) -> &str {
        self.hash_key_type.as_deref().unwrap_or(DEFAULT_KEY_TYPE)
    }

    pub fn range_key(&self) -> &str {
        self.range_key.as_deref().unwrap_or_default()
    }

    /// Attribute type of the range key, `S` when not declared
    pub fn range_key_type(&self) -> &str {
        self.range_key_type.as_deref().unwrap_or(DEFAULT_KEY_TYPE)
    }

    pub fn read_capacity(&self) -> i64 {
        self.read_capacity.unwrap_or_default()
    }

    pub fn write_capacity(&self) -> i64 {
        self.write_capacity.unwrap_or_default()
    }

    pub fn gsi(&self) -> &HashMap<String, GsiCapacity> {
        &self.gsi
    }

    pub fn enable_ttl(&self) -> bool {
        self.enable_ttl
    }

    pub fn ttl_attribute(&self) -> &str {
        self.ttl_attribute.as_deref().unwrap_or_default()
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds.unwrap_or_default()
    }

    /// Whether the document store keeps the caller's `id` verbatim instead
    /// of mapping it to a generated object id
    pub fn custom_id(&self) -> bool {
        self.custom_id
    }

    /// TTL attribute when TTL is enabled and fully configured
    pub fn ttl(&self) -> Option<(&str, i64)> {
        if self.enable_ttl && !self.ttl_attribute().is_empty() && self.ttl_seconds() > 0 {
            Some((self.ttl_attribute(), self.ttl_seconds()))
        } else {
            None
        }
    }

    /// Check the engine-independent required fields
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StorageError::invalid_input(
                "repository name is missing and required",
            ));
        }

        if self.enable_ttl {
            if self.ttl_attribute().is_empty() {
                return Err(StorageError::invalid_input(format!(
                    "TTL attribute is required when TTL is enabled for '{}'",
                    self.name
                )));
            }
            if self.ttl_seconds() <= 0 {
                return Err(StorageError::invalid_input(format!(
                    "TTL value is missing and must be greater than zero for '{}'",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tokens_definition() -> RepositoryDefinition {
        RepositoryDefinition::new("tokens")
            .with_index(IndexDefinition::unique(["token"]))
            .with_hash_key("token")
            .with_capacity(5, 5)
            .with_gsi(
                "token",
                GsiCapacity {
                    read_capacity: 2,
                    write_capacity: 2,
                },
            )
            .with_ttl("created_at", 86400)
    }

    #[test]
    fn test_accessors() {
        let def = tokens_definition();

        assert_eq!(def.name(), "tokens");
        assert_eq!(def.indexes().len(), 1);
        assert!(def.indexes()[0].unique);
        assert!(def.enable_ttl());
        assert_eq!(def.ttl_seconds(), 86400);
        assert_eq!(def.ttl_attribute(), "created_at");
        assert_eq!(def.hash_key(), "token");
        assert_eq!(def.hash_key_type(), "S");
        assert_eq!(def.range_key(), "");
        assert_eq!(def.read_capacity(), 5);
        assert_eq!(def.write_capacity(), 5);
        assert_eq!(def.gsi().len(), 1);
        assert_eq!(def.ttl(), Some(("created_at", 86400)));
    }

    #[test]
    fn test_missing_fields_read_as_zero_values() {
        let def: RepositoryDefinition = serde_json::from_value(json!({"name": "users"})).unwrap();

        assert!(def.indexes().is_empty());
        assert_eq!(def.hash_key(), "");
        assert_eq!(def.read_capacity(), 0);
        assert!(!def.enable_ttl());
        assert_eq!(def.ttl_attribute(), "");
        assert_eq!(def.ttl_seconds(), 0);
        assert!(def.gsi().is_empty());
        assert!(def.ttl().is_none());
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_deserialize_full_definition() {
        let def: RepositoryDefinition = serde_json::from_value(json!({
            "name": "tokens",
            "indexes": [{"columns": ["token"], "unique": true}],
            "hash_key": "token",
            "read_capacity": 5,
            "write_capacity": 5,
            "gsi": {"token": {"read_capacity": 2, "write_capacity": 2}},
            "enable_ttl": true,
            "ttl_attribute": "created_at",
            "ttl_seconds": 86400
        }))
        .unwrap();

        assert_eq!(def, tokens_definition());
    }

    #[test]
    fn test_validate() {
        assert!(RepositoryDefinition::new("").validate().unwrap_err().is_invalid_input());

        let mut def = RepositoryDefinition::new("tokens");
        def.enable_ttl = true;
        assert!(def.validate().unwrap_err().is_invalid_input());

        def.ttl_attribute = Some("expires_at".to_string());
        assert!(def.validate().unwrap_err().is_invalid_input());

        def.ttl_seconds = Some(60);
        assert!(def.validate().is_ok());
    }
}
