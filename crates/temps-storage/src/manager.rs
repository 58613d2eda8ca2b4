use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::config::{BackendsConfig, DbInfo};
use crate::error::{Result, StorageError};
use crate::validation::validate;

/// Builds the backend of one engine type from its configuration
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn build(&self, config: DbInfo) -> Result<Backend>;
}

struct Registration {
    factory: Arc<dyn BackendFactory>,
    properties_schema: Value,
}

/// Registry of backend types, building at most one [`Backend`] per type
pub struct BackendManager {
    registrations: RwLock<HashMap<String, Registration>>,
    configs: RwLock<HashMap<String, Value>>,
    backends: RwLock<HashMap<String, Arc<Backend>>>,
    build_lock: Mutex<()>,
}

impl BackendManager {
    /// Create a manager with raw configuration keyed by backend type
    pub fn new(configs: HashMap<String, Value>) -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
            configs: RwLock::new(configs),
            backends: RwLock::new(HashMap::new()),
            build_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: BackendsConfig) -> Self {
        Self::new(config.backends)
    }

    /// Register (or replace) the factory and property schema of a backend type
    pub async fn support_backend(
        &self,
        backend_type: impl Into<String>,
        factory: Arc<dyn BackendFactory>,
        properties_schema: Value,
    ) {
        let backend_type = backend_type.into();
        let mut registrations = self.registrations.write().await;

        if registrations.contains_key(&backend_type) {
            warn!("Overwriting existing factory for backend: {}", backend_type);
        }

        registrations.insert(
            backend_type.clone(),
            Registration {
                factory,
                properties_schema,
            },
        );
        debug!("Registered factory for backend: {}", backend_type);
    }

    /// Set the raw configuration of a backend type. Takes effect the next
    /// time the backend is built.
    pub async fn configure(&self, backend_type: impl Into<String>, config: Value) {
        self.configs.write().await.insert(backend_type.into(), config);
    }

    /// Registered backend types, sorted
    pub async fn get_supported_backends(&self) -> Vec<String> {
        let mut backends: Vec<String> = self.registrations.read().await.keys().cloned().collect();
        backends.sort();
        backends
    }

    /// Property schema a backend type's configuration must satisfy
    pub async fn get_required_backend_properties(&self, backend_type: &str) -> Result<Value> {
        self.registrations
            .read()
            .await
            .get(backend_type)
            .map(|r| r.properties_schema.clone())
            .ok_or_else(|| unsupported(backend_type))
    }

    /// Return the backend of the given type, building it on first use
    pub async fn get_backend(&self, backend_type: &str) -> Result<Arc<Backend>> {
        if let Some(backend) = self.backends.read().await.get(backend_type) {
            return Ok(backend.clone());
        }

        let (factory, schema) = {
            let registrations = self.registrations.read().await;
            let registration = registrations
                .get(backend_type)
                .ok_or_else(|| unsupported(backend_type))?;
            (
                registration.factory.clone(),
                registration.properties_schema.clone(),
            )
        };

        let _guard = self.build_lock.lock().await;

        if let Some(backend) = self.backends.read().await.get(backend_type) {
            return Ok(backend.clone());
        }

        let raw = self
            .configs
            .read()
            .await
            .get(backend_type)
            .cloned()
            .ok_or_else(|| {
                StorageError::backend(format!("backend not configured: {}", backend_type))
            })?;

        let result = validate(&raw, &schema)?;
        if !result.valid {
            return Err(StorageError::backend(format!(
                "invalid configuration for backend {}: {}",
                backend_type,
                result.errors.join("; ")
            )));
        }

        let config: DbInfo = serde_json::from_value(raw).map_err(|e| {
            StorageError::invalid_input(format!(
                "cannot read configuration of backend {}: {}",
                backend_type, e
            ))
        })?;

        debug!(
            "Building {} backend for {}",
            backend_type,
            config.connection_string()
        );
        let backend = Arc::new(factory.build(config).await?);

        self.backends
            .write()
            .await
            .insert(backend_type.to_string(), backend.clone());
        info!("Backend {} ready", backend_type);

        Ok(backend)
    }

    /// Shut down and forget every built backend
    pub async fn shutdown(&self) {
        let backends: Vec<(String, Arc<Backend>)> =
            self.backends.write().await.drain().collect();

        for (backend_type, backend) in backends {
            debug!("Closing backend: {}", backend_type);
            backend.shutdown().await;
        }
    }
}

impl Default for BackendManager {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

fn unsupported(backend_type: &str) -> StorageError {
    StorageError::invalid_input(format!("backend not supported: {}", backend_type))
}
