use async_trait::async_trait;
use futures::future::BoxFuture;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::DbInfo;
use crate::definition::RepositoryDefinition;
use crate::error::{Result, StorageError};
use crate::repository::Repository;

/// Callback releasing the engine session of a backend
pub type CleanupFn = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Engine-specific provisioning of a repository.
///
/// `build` performs every remote step (table or collection creation,
/// indexes, TTL) and must skip creation when the target already exists.
#[async_trait]
pub trait RepositoryBuilder: Send + Sync {
    async fn build(
        &self,
        definition: &RepositoryDefinition,
        backend: &Backend,
    ) -> Result<Arc<dyn Repository>>;
}

/// One live engine session plus the repositories built on top of it
pub struct Backend {
    backend_type: String,
    config: DbInfo,
    repository_builder: Arc<dyn RepositoryBuilder>,
    repositories: RwLock<HashMap<String, Arc<dyn Repository>>>,
    build_lock: Mutex<()>,
    context: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    cleanup: Option<CleanupFn>,
}

impl Backend {
    pub fn new(
        backend_type: impl Into<String>,
        config: DbInfo,
        repository_builder: Arc<dyn RepositoryBuilder>,
    ) -> Self {
        Self {
            backend_type: backend_type.into(),
            config,
            repository_builder,
            repositories: RwLock::new(HashMap::new()),
            build_lock: Mutex::new(()),
            context: RwLock::new(HashMap::new()),
            cleanup: None,
        }
    }

    /// Register the callback run by [`Backend::shutdown`]
    pub fn with_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    pub fn backend_type(&self) -> &str {
        &self.backend_type
    }

    pub fn config(&self) -> &DbInfo {
        &self.config
    }

    /// Store an engine handle for the repository builder
    pub async fn set_in_context<T>(&self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        let mut context = self.context.write().await;
        context.insert(key.into(), Arc::new(value));
    }

    /// Fetch a context value; `None` when absent or stored with another type
    pub async fn get_from_context<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let context = self.context.read().await;
        let value = context.get(key)?.clone();
        value.downcast::<T>().ok()
    }

    /// Return the repository registered under `name`, provisioning it on
    /// first use. Concurrent callers for the same name share one build.
    ///
    /// `name` must equal `definition.name()`, the table or collection the
    /// builder provisions.
    pub async fn define_repository(
        &self,
        name: &str,
        definition: &RepositoryDefinition,
    ) -> Result<Arc<dyn Repository>> {
        if definition.name() != name {
            return Err(StorageError::invalid_input(format!(
                "repository {} is defined with name {}",
                name,
                definition.name()
            )));
        }

        if let Some(repository) = self.repositories.read().await.get(name) {
            return Ok(repository.clone());
        }

        let _guard = self.build_lock.lock().await;

        // Another caller may have finished the build while we waited
        if let Some(repository) = self.repositories.read().await.get(name) {
            return Ok(repository.clone());
        }

        definition.validate()?;

        debug!(
            "Provisioning repository {} on {} backend",
            name, self.backend_type
        );
        let repository = self
            .repository_builder
            .build(definition, self)
            .await
            .map_err(|e| {
                warn!("Failed to provision repository {}: {}", name, e);
                e
            })?;

        self.repositories
            .write()
            .await
            .insert(name.to_string(), repository.clone());
        info!("Repository {} ready on {} backend", name, self.backend_type);

        Ok(repository)
    }

    /// Define every repository listed under `collections` in the backend
    /// configuration
    pub async fn define_repositories(&self) -> Result<Vec<Arc<dyn Repository>>> {
        let mut names: Vec<&String> = self.config.collections.keys().collect();
        names.sort();

        let mut repositories = Vec::with_capacity(names.len());
        for name in names {
            let definition = &self.config.collections[name];
            repositories.push(self.define_repository(name, definition).await?);
        }
        Ok(repositories)
    }

    /// Look up an already defined repository
    pub async fn get_repository(&self, name: &str) -> Result<Arc<dyn Repository>> {
        self.repositories
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::backend(format!("unknown repository: {}", name)))
    }

    pub async fn repository_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.repositories.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the cleanup callback. The backend must not be used afterwards.
    pub async fn shutdown(&self) {
        debug!("Shutting down {} backend", self.backend_type);
        if let Some(cleanup) = &self.cleanup {
            cleanup().await;
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("backend_type", &self.backend_type)
            .field("target", &self.config.connection_string())
            .finish_non_exhaustive()
    }
}
