//! In-memory payload storage and metadata store.

use async_trait::async_trait;
use scitracer_core::{
    Dataset, Error, Metadata, MetadataBackend, Payload, Result, StorageBackend, StorageType, Uri,
};
use std::collections::HashMap;
use std::sync::RwLock;

fn poisoned<E: std::fmt::Display>(e: E) -> Error {
    Error::Internal(e.to_string())
}

/// Payloads keyed by uri. Uris look like `mem://<dataset>/<type>/<uuid>`.
#[derive(Default)]
pub struct InMemoryStorage {
    items: RwLock<HashMap<Uri, Payload>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn init_dataset(&self, _dataset: &Dataset) -> Result<()> {
        Ok(())
    }

    async fn create(
        &self,
        dataset: &Dataset,
        storage_type: StorageType,
        payload: Option<&Payload>,
    ) -> Result<Uri> {
        let payload = match payload {
            Some(p) if p.storage_type() != storage_type => {
                return Err(Error::InvalidInput(format!(
                    "payload of type {} cannot be stored as {}",
                    p.storage_type(),
                    storage_type
                )))
            }
            Some(p) => p.clone(),
            None => Payload::empty(storage_type),
        };
        let uri = Uri::new(format!(
            "mem://{}/{}/{}",
            dataset.uri,
            storage_type.as_str().to_lowercase(),
            uuid::Uuid::new_v4()
        ));
        self.items.write().map_err(poisoned)?.insert(uri.clone(), payload);
        Ok(uri)
    }

    async fn write(&self, uri: &Uri, payload: &Payload) -> Result<()> {
        let mut items = self.items.write().map_err(poisoned)?;
        let slot = items
            .get_mut(uri)
            .ok_or_else(|| Error::not_found("payload", uri.as_str()))?;
        *slot = payload.clone();
        Ok(())
    }

    async fn read(&self, uri: &Uri, storage_type: StorageType) -> Result<Payload> {
        let items = self.items.read().map_err(poisoned)?;
        let payload = items
            .get(uri)
            .ok_or_else(|| Error::not_found("payload", uri.as_str()))?;
        if payload.storage_type() != storage_type {
            return Err(Error::InvalidInput(format!(
                "{} holds {}, not {}",
                uri,
                payload.storage_type(),
                storage_type
            )));
        }
        Ok(payload.clone())
    }

    async fn delete(&self, uri: &Uri, _storage_type: StorageType) -> Result<()> {
        self.items
            .write()
            .map_err(poisoned)?
            .remove(uri)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("payload", uri.as_str()))
    }
}

/// JSON documents keyed by uri.
#[derive(Default)]
pub struct InMemoryMetadata {
    docs: RwLock<HashMap<Uri, Metadata>>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataBackend for InMemoryMetadata {
    async fn init_dataset(&self, _dataset: &Dataset) -> Result<()> {
        Ok(())
    }

    async fn create(&self, dataset: &Dataset, content: &Metadata) -> Result<Uri> {
        let uri = Uri::new(format!("mem://{}/metadata/{}", dataset.uri, uuid::Uuid::new_v4()));
        self.docs
            .write()
            .map_err(poisoned)?
            .insert(uri.clone(), content.clone());
        Ok(uri)
    }

    async fn read(&self, uri: &Uri) -> Result<Metadata> {
        self.docs
            .read()
            .map_err(poisoned)?
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::not_found("metadata", uri.as_str()))
    }

    async fn write(&self, uri: &Uri, content: &Metadata) -> Result<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        let doc = docs
            .get_mut(uri)
            .ok_or_else(|| Error::not_found("metadata", uri.as_str()))?;
        *doc = content.clone();
        Ok(())
    }

    async fn delete(&self, uri: &Uri) -> Result<()> {
        self.docs
            .write()
            .map_err(poisoned)?
            .remove(uri)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("metadata", uri.as_str()))
    }
}
