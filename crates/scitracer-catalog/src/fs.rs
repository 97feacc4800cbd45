//! Local filesystem backends.
//!
//! Layout under the workspace:
//!
//! ```text
//! <workspace>/catalog.json
//! <workspace>/<dataset>/data/<uuid>.<type>.json
//! <workspace>/<dataset>/metadata/<uuid>.json
//! ```
//!
//! Uris are the absolute file paths, so a payload can be read back without
//! knowing its dataset. Payload files carry their storage type as the outer key.

use async_trait::async_trait;
use scitracer_core::{
    Dataset, Error, Metadata, MetadataBackend, Payload, Result, StorageBackend, StorageType, Uri,
};
use std::path::{Path, PathBuf};

use crate::catalog::InMemoryCatalog;

pub const CATALOG_FILE: &str = "catalog.json";

/// The `local` index backend: an in-memory catalog snapshotted to `<workspace>/catalog.json`.
pub fn open_catalog(workspace: impl AsRef<Path>) -> Result<InMemoryCatalog> {
    InMemoryCatalog::open(workspace.as_ref().join(CATALOG_FILE))
}

async fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, &content).await?;
    tracing::debug!("wrote {} ({} bytes)", path.display(), content.len());
    Ok(())
}

async fn read_json(kind: &'static str, uri: &Uri) -> Result<serde_json::Value> {
    let path = Path::new(uri.as_str());
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::not_found(kind, uri.as_str()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn remove(kind: &'static str, uri: &Uri) -> Result<()> {
    match tokio::fs::remove_file(uri.as_str()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::not_found(kind, uri.as_str()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Payloads as JSON files.
pub struct LocalFsStorage {
    workspace: PathBuf,
}

impl LocalFsStorage {
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
        }
    }

    fn data_dir(&self, dataset: &Dataset) -> PathBuf {
        self.workspace.join(dataset.uri.as_str()).join("data")
    }
}

#[async_trait]
impl StorageBackend for LocalFsStorage {
    async fn init_dataset(&self, dataset: &Dataset) -> Result<()> {
        tokio::fs::create_dir_all(self.data_dir(dataset)).await?;
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
        let path = self.data_dir(dataset).join(format!(
            "{}.{}.json",
            uuid::Uuid::new_v4(),
            storage_type.as_str().to_lowercase()
        ));
        write_json(&path, &serde_json::to_value(&payload)?).await?;
        Ok(Uri::new(path.display().to_string()))
    }

    async fn write(&self, uri: &Uri, payload: &Payload) -> Result<()> {
        write_json(Path::new(uri.as_str()), &serde_json::to_value(payload)?).await
    }

    async fn read(&self, uri: &Uri, storage_type: StorageType) -> Result<Payload> {
        let value = read_json("payload", uri).await?;
        let payload: Payload = serde_json::from_value(value)?;
        if payload.storage_type() != storage_type {
            return Err(Error::InvalidInput(format!(
                "{} holds {}, not {}",
                uri,
                payload.storage_type(),
                storage_type
            )));
        }
        Ok(payload)
    }

    async fn delete(&self, uri: &Uri, _storage_type: StorageType) -> Result<()> {
        remove("payload", uri).await
    }
}

/// Metadata documents as JSON files.
pub struct LocalFsMetadata {
    workspace: PathBuf,
}

impl LocalFsMetadata {
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
        }
    }

    fn metadata_dir(&self, dataset: &Dataset) -> PathBuf {
        self.workspace.join(dataset.uri.as_str()).join("metadata")
    }
}

#[async_trait]
impl MetadataBackend for LocalFsMetadata {
    async fn init_dataset(&self, dataset: &Dataset) -> Result<()> {
        tokio::fs::create_dir_all(self.metadata_dir(dataset)).await?;
        Ok(())
    }

    async fn create(&self, dataset: &Dataset, content: &Metadata) -> Result<Uri> {
        let path = self
            .metadata_dir(dataset)
            .join(format!("{}.json", uuid::Uuid::new_v4()));
        write_json(&path, &serde_json::Value::Object(content.clone())).await?;
        Ok(Uri::new(path.display().to_string()))
    }

    async fn read(&self, uri: &Uri) -> Result<Metadata> {
        match read_json("metadata", uri).await? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(Error::InvalidInput(format!(
                "{} is not a JSON object: {}",
                uri, other
            ))),
        }
    }

    async fn write(&self, uri: &Uri, content: &Metadata) -> Result<()> {
        write_json(Path::new(uri.as_str()), &serde_json::Value::Object(content.clone())).await
    }

    async fn delete(&self, uri: &Uri) -> Result<()> {
        remove("metadata", uri).await
    }
}
