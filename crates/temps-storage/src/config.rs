//! Backend configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::definition::RepositoryDefinition;
use crate::error::{Result, StorageError};

/// Prefix of environment variables overriding file configuration,
/// e.g. `TEMPS_STORAGE__BACKENDS__MONGODB__HOST`
pub const ENV_PREFIX: &str = "TEMPS_STORAGE";

/// Connection settings of one backend type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DbInfo {
    /// Host (or full connection string) of the document store
    #[serde(default)]
    pub host: String,
    /// Database name
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub aws_region: Option<String>,
    /// Endpoint override, e.g. DynamoDB Local
    #[serde(default)]
    pub aws_endpoint: Option<String>,
    #[serde(default)]
    pub aws_access_key_id: Option<String>,
    #[serde(default)]
    pub aws_secret_access_key: Option<String>,
    #[serde(default)]
    pub aws_session_token: Option<String>,
    /// Named profile from the shared AWS credentials file
    #[serde(default)]
    pub aws_profile: Option<String>,
    /// Repositories to define, keyed by repository name
    #[serde(default)]
    pub collections: HashMap<String, RepositoryDefinition>,
}

impl DbInfo {
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_aws_region(mut self, region: impl Into<String>) -> Self {
        self.aws_region = Some(region.into());
        self
    }

    pub fn with_aws_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.aws_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_aws_keys(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.aws_access_key_id = Some(access_key_id.into());
        self.aws_secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn with_collection(mut self, definition: RepositoryDefinition) -> Self {
        self.collections
            .insert(definition.name().to_string(), definition);
        self
    }

    /// Connection target for display purposes (without secrets)
    pub fn connection_string(&self) -> String {
        let mut parts = Vec::new();

        if let Some(username) = &self.username {
            parts.push(format!("{}@", username));
        }
        if !self.host.is_empty() {
            parts.push(self.host.clone());
        }
        if let Some(region) = &self.aws_region {
            parts.push(region.clone());
        }
        if !self.database.is_empty() {
            parts.push(format!("/{}", self.database));
        }

        parts.join("")
    }
}

/// Raw configuration for every backend type, keyed by backend type name.
///
/// Entries stay untyped until the backend is built so they can be checked
/// against the backend's property schema first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub backends: HashMap<String, Value>,
}

impl BackendsConfig {
    /// Load configuration from a file (format picked from the extension),
    /// with `TEMPS_STORAGE__...` environment variables taking precedence
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| {
                StorageError::invalid_input(format!(
                    "failed to load configuration from {}: {}",
                    path.display(),
                    e
                ))
            })?;

        settings.try_deserialize().map_err(|e| {
            StorageError::invalid_input(format!("invalid backends configuration: {}", e))
        })
    }

    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| StorageError::invalid_input(format!("invalid backends configuration: {}", e)))
    }

    pub fn with_backend(mut self, backend_type: impl Into<String>, config: &DbInfo) -> Result<Self> {
        self.backends
            .insert(backend_type.into(), serde_json::to_value(config)?);
        Ok(self)
    }
}
