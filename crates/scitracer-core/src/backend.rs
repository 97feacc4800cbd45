//! Capability traits for the pluggable backends.
//!
//! The catalog indexes datasets, locations and data items with their
//! annotations. Storage holds payloads, metadata holds JSON documents
//! (descriptions and provenance records). A runner executes planned batches.
//! Concrete implementations are bound once at startup and handed to the
//! runtime as trait objects.

use crate::error::Result;
use crate::job::RunPlan;
use crate::manifest::RunManifest;
use crate::payload::{classify, Payload};
use crate::types::{Annotations, DataInfo, Dataset, Location, Metadata, Scalar, StorageType, Uri};
use async_trait::async_trait;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Every dataset known to the catalog.
    async fn datasets(&self) -> Result<Vec<Dataset>>;

    async fn new_dataset(&self, name: &str) -> Result<Dataset>;

    async fn get_dataset(&self, uri: &Uri) -> Result<Dataset>;

    async fn get_description(&self, dataset: &Dataset) -> Result<Option<Metadata>>;

    async fn set_description(&self, dataset: &Dataset, description: &Metadata) -> Result<()>;

    /// Create a location; its id is the next one in the dataset.
    async fn new_location(&self, dataset: &Dataset, annotations: &Annotations) -> Result<Location>;

    /// Locations of a dataset in creation order.
    async fn locations(&self, dataset: &Dataset) -> Result<Vec<Location>>;

    async fn location_annotations_of(&self, location: &Location) -> Result<Annotations>;

    async fn annotate_location(&self, location: &Location, key: &str, value: Scalar) -> Result<()>;

    async fn annotate_data(&self, data: &DataInfo, key: &str, value: Scalar) -> Result<()>;

    async fn create_data(
        &self,
        location: &Location,
        uri: Uri,
        storage_type: StorageType,
        annotations: &Annotations,
        metadata_uri: Option<Uri>,
    ) -> Result<DataInfo>;

    /// The item's own annotations, without those inherited from its location.
    async fn data_annotations_of(&self, data: &DataInfo) -> Result<Annotations>;

    /// Every item of a dataset, by location creation order then item creation order.
    async fn data_items(&self, dataset: &Dataset) -> Result<Vec<DataInfo>>;

    /// Items whose effective annotations are a superset of `query`, in `data_items` order.
    async fn match_data(&self, dataset: &Dataset, query: &Annotations) -> Result<Vec<DataInfo>>;

    /// `match_data` restricted to items held at one of `locations`.
    async fn match_data_at(
        &self,
        dataset: &Dataset,
        query: &Annotations,
        locations: &[Location],
    ) -> Result<Vec<DataInfo>> {
        let items = self.match_data(dataset, query).await?;
        Ok(items
            .into_iter()
            .filter(|item| locations.iter().any(|l| l.key() == item.location.key()))
            .collect())
    }

    /// Locations whose annotations are a superset of `query`, in creation order.
    async fn match_locations(&self, dataset: &Dataset, query: &Annotations)
        -> Result<Vec<Location>>;

    async fn delete_data(&self, data: &DataInfo) -> Result<()>;
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn init_dataset(&self, dataset: &Dataset) -> Result<()>;

    /// Allocate a payload slot. `None` creates an empty placeholder of the given type.
    async fn create(
        &self,
        dataset: &Dataset,
        storage_type: StorageType,
        payload: Option<&Payload>,
    ) -> Result<Uri>;

    async fn write(&self, uri: &Uri, payload: &Payload) -> Result<()>;

    async fn read(&self, uri: &Uri, storage_type: StorageType) -> Result<Payload>;

    async fn delete(&self, uri: &Uri, storage_type: StorageType) -> Result<()>;

    /// Which storage type, if any, this backend would store an untyped value as.
    fn accepts(&self, value: &serde_json::Value) -> Option<StorageType> {
        classify(value)
    }
}

#[async_trait]
pub trait MetadataBackend: Send + Sync {
    async fn init_dataset(&self, dataset: &Dataset) -> Result<()>;

    async fn create(&self, dataset: &Dataset, content: &Metadata) -> Result<Uri>;

    async fn read(&self, uri: &Uri) -> Result<Metadata>;

    async fn write(&self, uri: &Uri, content: &Metadata) -> Result<()>;

    async fn delete(&self, uri: &Uri) -> Result<()>;
}

/// Executes planned batches, in order.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, plan: &RunPlan) -> Result<RunManifest>;
}
