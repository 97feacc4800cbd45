//! Backend registry: binds the backend names found in the config to factories.
//!
//! Each role (index, storage, metadata) has its own name → factory table.
//! Factories receive the whole config section so they can read their own
//! parameters. Unknown names fail with `PluginNotFound`.

use crate::catalog::InMemoryCatalog;
use crate::fs::{open_catalog, LocalFsMetadata, LocalFsStorage};
use crate::store::{InMemoryMetadata, InMemoryStorage};
use scitracer_core::config::{ROLE_INDEX, ROLE_METADATA, ROLE_STORAGE};
use scitracer_core::{
    BackendSection, CatalogStore, Config, Error, MetadataBackend, Result, StorageBackend,
};
use std::collections::HashMap;
use std::sync::Arc;

pub type CatalogFactory =
    Box<dyn Fn(&BackendSection) -> Result<Arc<dyn CatalogStore>> + Send + Sync>;
pub type StorageFactory =
    Box<dyn Fn(&BackendSection) -> Result<Arc<dyn StorageBackend>> + Send + Sync>;
pub type MetadataFactory =
    Box<dyn Fn(&BackendSection) -> Result<Arc<dyn MetadataBackend>> + Send + Sync>;

/// The three backends a session runs on.
#[derive(Clone)]
pub struct Backends {
    pub catalog: Arc<dyn CatalogStore>,
    pub storage: Arc<dyn StorageBackend>,
    pub metadata: Arc<dyn MetadataBackend>,
}

impl Backends {
    /// Fresh in-memory backends.
    pub fn in_memory() -> Self {
        Self {
            catalog: Arc::new(InMemoryCatalog::new()),
            storage: Arc::new(InMemoryStorage::new()),
            metadata: Arc::new(InMemoryMetadata::new()),
        }
    }
}

#[derive(Default)]
pub struct BackendRegistry {
    catalogs: HashMap<String, CatalogFactory>,
    storages: HashMap<String, StorageFactory>,
    metadata: HashMap<String, MetadataFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `memory` and `local` backends for every role.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_catalog("memory", |_| Ok(Arc::new(InMemoryCatalog::new())));
        registry.register_catalog("local", |section| {
            Ok(Arc::new(open_catalog(section.param_str("workspace")?)?))
        });
        registry.register_storage("memory", |_| Ok(Arc::new(InMemoryStorage::new())));
        registry.register_storage("local", |section| {
            Ok(Arc::new(LocalFsStorage::new(section.param_str("workspace")?)))
        });
        registry.register_metadata("memory", |_| Ok(Arc::new(InMemoryMetadata::new())));
        registry.register_metadata("local", |section| {
            Ok(Arc::new(LocalFsMetadata::new(section.param_str("workspace")?)))
        });
        registry
    }

    /// Register an index backend. Replaces any existing one with the same name.
    pub fn register_catalog<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&BackendSection) -> Result<Arc<dyn CatalogStore>> + Send + Sync + 'static,
    {
        self.catalogs.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_storage<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&BackendSection) -> Result<Arc<dyn StorageBackend>> + Send + Sync + 'static,
    {
        self.storages.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_metadata<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&BackendSection) -> Result<Arc<dyn MetadataBackend>> + Send + Sync + 'static,
    {
        self.metadata.insert(name.to_string(), Box::new(factory));
    }

    pub fn catalog(&self, section: &BackendSection) -> Result<Arc<dyn CatalogStore>> {
        let factory = self
            .catalogs
            .get(&section.name)
            .ok_or_else(|| Error::plugin_not_found(ROLE_INDEX, &section.name))?;
        factory(section)
    }

    pub fn storage(&self, section: &BackendSection) -> Result<Arc<dyn StorageBackend>> {
        let factory = self
            .storages
            .get(&section.name)
            .ok_or_else(|| Error::plugin_not_found(ROLE_STORAGE, &section.name))?;
        factory(section)
    }

    pub fn metadata(&self, section: &BackendSection) -> Result<Arc<dyn MetadataBackend>> {
        let factory = self
            .metadata
            .get(&section.name)
            .ok_or_else(|| Error::plugin_not_found(ROLE_METADATA, &section.name))?;
        factory(section)
    }

    /// Bind every role of a config.
    pub fn build(&self, config: &Config) -> Result<Backends> {
        let backends = Backends {
            catalog: self.catalog(config.section(ROLE_INDEX)?)?,
            storage: self.storage(config.section(ROLE_STORAGE)?)?,
            metadata: self.metadata(config.section(ROLE_METADATA)?)?,
        };
        tracing::info!(
            index = %config.value(ROLE_INDEX)?,
            storage = %config.value(ROLE_STORAGE)?,
            metadata = %config.value(ROLE_METADATA)?,
            "backends bound"
        );
        Ok(backends)
    }

    /// Registered backend names for a role, sorted.
    pub fn list(&self, role: &str) -> Vec<&str> {
        let mut names: Vec<&str> = match role {
            ROLE_INDEX => self.catalogs.keys().map(String::as_str).collect(),
            ROLE_STORAGE => self.storages.keys().map(String::as_str).collect(),
            ROLE_METADATA => self.metadata.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        };
        names.sort_unstable();
        names
    }
}
