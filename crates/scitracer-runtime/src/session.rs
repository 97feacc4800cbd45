//! Session: the explicit context every operation runs against.
//!
//! Holds the bound catalog, storage and metadata backends. Cheap to clone.

use crate::call::{call, CallWrapper};
use crate::planner::Planner;
use crate::provenance::ProvenanceRecord;
use crate::query::QueryEngine;
use scitracer_core::{
    Annotations, Arg, CatalogStore, DataInfo, Dataset, Error, Input, Job, Location, Metadata,
    MetadataBackend, Payload, Processor, Result, RunManifest, RunPlan, Runner, Scalar,
    StorageBackend, StorageType, Table, Tensor, TensorRegion, Uri,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Where `new_data` puts an item: an existing location, or a fresh one in a dataset.
#[derive(Clone, Copy, Debug)]
pub enum DataTarget<'a> {
    Dataset(&'a Dataset),
    Location(&'a Location),
}

impl<'a> From<&'a Dataset> for DataTarget<'a> {
    fn from(ds: &'a Dataset) -> Self {
        Self::Dataset(ds)
    }
}

impl<'a> From<&'a Location> for DataTarget<'a> {
    fn from(loc: &'a Location) -> Self {
        Self::Location(loc)
    }
}

/// Provenance of an item with its source items resolved against the catalog.
#[derive(Clone, Debug)]
pub struct Lineage {
    pub record: ProvenanceRecord,
    pub sources: Vec<DataInfo>,
}

#[derive(Clone)]
pub struct Session {
    catalog: Arc<dyn CatalogStore>,
    storage: Arc<dyn StorageBackend>,
    metadata: Arc<dyn MetadataBackend>,
}

impl Session {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        storage: Arc<dyn StorageBackend>,
        metadata: Arc<dyn MetadataBackend>,
    ) -> Self {
        Self {
            catalog,
            storage,
            metadata,
        }
    }

    pub fn catalog(&self) -> &dyn CatalogStore {
        self.catalog.as_ref()
    }

    pub fn storage(&self) -> &dyn StorageBackend {
        self.storage.as_ref()
    }

    pub fn metadata(&self) -> &dyn MetadataBackend {
        self.metadata.as_ref()
    }

    // -- datasets ----------------------------------------------------------

    pub async fn datasets(&self) -> Result<Vec<Dataset>> {
        self.catalog.datasets().await
    }

    pub async fn new_dataset(&self, name: &str) -> Result<Dataset> {
        let dataset = self.catalog.new_dataset(name).await?;
        self.storage.init_dataset(&dataset).await?;
        self.metadata.init_dataset(&dataset).await?;
        Ok(dataset)
    }

    pub async fn get_dataset(&self, uri: &Uri) -> Result<Dataset> {
        self.catalog.get_dataset(uri).await
    }

    pub async fn set_description(&self, dataset: &Dataset, description: &Metadata) -> Result<()> {
        self.catalog.set_description(dataset, description).await
    }

    pub async fn get_description(&self, dataset: &Dataset) -> Result<Option<Metadata>> {
        self.catalog.get_description(dataset).await
    }

    // -- locations and annotations -------------------------------------------

    pub async fn new_location(
        &self,
        dataset: &Dataset,
        annotations: &Annotations,
    ) -> Result<Location> {
        self.catalog.new_location(dataset, annotations).await
    }

    pub async fn annotate_location(
        &self,
        location: &Location,
        key: &str,
        value: impl Into<Scalar>,
    ) -> Result<()> {
        self.catalog.annotate_location(location, key, value.into()).await
    }

    pub async fn annotate_data(
        &self,
        data: &DataInfo,
        key: &str,
        value: impl Into<Scalar>,
    ) -> Result<()> {
        self.catalog.annotate_data(data, key, value.into()).await
    }

    // -- data ------------------------------------------------------------------

    /// Index an already stored payload.
    pub async fn new_data_index(
        &self,
        location: &Location,
        uri: Uri,
        storage_type: StorageType,
        annotations: &Annotations,
        metadata_uri: Option<Uri>,
    ) -> Result<DataInfo> {
        self.catalog
            .create_data(location, uri, storage_type, annotations, metadata_uri)
            .await
    }

    /// Store and index a payload.
    ///
    /// A dataset target creates a location annotated with `loc_annotations`;
    /// a location target ignores them. `metadata` is stored alongside when given.
    pub async fn new_data<'a>(
        &self,
        target: impl Into<DataTarget<'a>>,
        payload: &Payload,
        annotations: &Annotations,
        loc_annotations: &Annotations,
        metadata: Option<&Metadata>,
    ) -> Result<DataInfo> {
        let location = match target.into() {
            DataTarget::Location(location) => location.clone(),
            DataTarget::Dataset(dataset) => self.new_location(dataset, loc_annotations).await?,
        };
        self.store_item(
            &location,
            payload.storage_type(),
            Some(payload),
            annotations,
            metadata,
        )
        .await
    }

    /// Store an untyped JSON value, classified by the storage backend.
    pub async fn new_data_from_json<'a>(
        &self,
        target: impl Into<DataTarget<'a>>,
        value: &serde_json::Value,
        annotations: &Annotations,
    ) -> Result<DataInfo> {
        if self.storage.accepts(value).is_none() {
            return Err(Error::UnknownStorageType(format!(
                "storage backend does not accept {}",
                value
            )));
        }
        let payload = Payload::from_json(value)?;
        self.new_data(target, &payload, annotations, &Annotations::new(), None)
            .await
    }

    pub async fn new_tensor(
        &self,
        location: &Location,
        tensor: Tensor,
        annotations: &Annotations,
    ) -> Result<DataInfo> {
        self.new_data(location, &Payload::Array(tensor), annotations, &Annotations::new(), None)
            .await
    }

    pub async fn new_table(
        &self,
        location: &Location,
        table: Table,
        annotations: &Annotations,
    ) -> Result<DataInfo> {
        self.new_data(location, &Payload::Table(table), annotations, &Annotations::new(), None)
            .await
    }

    pub async fn new_value(
        &self,
        location: &Location,
        value: f64,
        annotations: &Annotations,
    ) -> Result<DataInfo> {
        self.new_data(location, &Payload::Value(value), annotations, &Annotations::new(), None)
            .await
    }

    pub async fn new_label(
        &self,
        location: &Location,
        label: &str,
        annotations: &Annotations,
    ) -> Result<DataInfo> {
        self.new_data(location, &Payload::from(label), annotations, &Annotations::new(), None)
            .await
    }

    pub async fn read_data(&self, data: &DataInfo) -> Result<Payload> {
        let payload = self.storage.read(&data.uri, data.storage_type).await?;
        debug!(uri = %data.uri, kind = %data.storage_type, "read");
        Ok(payload)
    }

    pub async fn read_tensor_region(
        &self,
        data: &DataInfo,
        region: &TensorRegion,
    ) -> Result<Tensor> {
        match self.read_data(data).await? {
            Payload::Array(tensor) => region.extract(&tensor),
            other => Err(Error::InvalidInput(format!(
                "{} holds {}, not Array",
                data.uri,
                other.storage_type()
            ))),
        }
    }

    pub async fn write_data(&self, data: &DataInfo, payload: &Payload) -> Result<()> {
        if payload.storage_type() != data.storage_type {
            return Err(Error::InvalidInput(format!(
                "cannot write {} into {} item {}",
                payload.storage_type(),
                data.storage_type,
                data.uri
            )));
        }
        self.storage.write(&data.uri, payload).await?;
        debug!(uri = %data.uri, kind = %data.storage_type, "written");
        Ok(())
    }

    pub async fn read_metadata(&self, data: &DataInfo) -> Result<Option<Metadata>> {
        match &data.metadata_uri {
            Some(uri) => Ok(Some(self.metadata.read(uri).await?)),
            None => Ok(None),
        }
    }

    /// Provenance of `data`, `None` for items not produced by a processor.
    pub async fn lineage(&self, data: &DataInfo) -> Result<Option<Lineage>> {
        let Some(doc) = self.read_metadata(data).await? else {
            return Ok(None);
        };
        let Ok(record) = ProvenanceRecord::from_metadata(&doc) else {
            return Ok(None);
        };
        let items = self.catalog.data_items(data.dataset()).await?;
        let sources = record
            .source_uris()
            .iter()
            .filter_map(|uri| items.iter().find(|d| &d.uri == uri).cloned())
            .collect();
        Ok(Some(Lineage { record, sources }))
    }

    /// Remove an item from storage, metadata and catalog, in that order.
    pub async fn delete_data(&self, data: &DataInfo) -> Result<()> {
        self.storage.delete(&data.uri, data.storage_type).await?;
        if let Some(uri) = &data.metadata_uri {
            self.metadata.delete(uri).await?;
        }
        self.catalog.delete_data(data).await?;
        info!(uri = %data.uri, "data deleted");
        Ok(())
    }

    // -- queries ---------------------------------------------------------------

    pub fn queries(&self) -> QueryEngine<'_> {
        QueryEngine::new(self.catalog.as_ref())
    }

    pub async fn query_single(
        &self,
        dataset: &Dataset,
        queries: &[Annotations],
    ) -> Result<Vec<DataInfo>> {
        self.queries().query_single(dataset, queries).await
    }

    pub async fn query_loc_set(
        &self,
        dataset: &Dataset,
        queries: &[Annotations],
    ) -> Result<Vec<Vec<DataInfo>>> {
        self.queries().query_loc_set(dataset, queries).await
    }

    pub async fn query_group_set(
        &self,
        dataset: &Dataset,
        queries: &[Annotations],
    ) -> Result<Vec<Vec<DataInfo>>> {
        self.queries().query_group_set(dataset, queries).await
    }

    pub async fn query_data(
        &self,
        dataset: &Dataset,
        query: &Annotations,
        locations: Option<&[Location]>,
    ) -> Result<Vec<DataInfo>> {
        self.queries().query_data(dataset, query, locations).await
    }

    // -- processing ------------------------------------------------------------

    pub fn call(&self, processor: Processor) -> CallWrapper<'_> {
        call(self, processor)
    }

    pub async fn plan(&self, dataset: &Dataset, jobs: &[Job]) -> Result<RunPlan> {
        Planner::new(self).plan_run(dataset, jobs).await
    }

    /// Plan every job, then hand the whole plan to `runner`.
    pub async fn run(
        &self,
        dataset: &Dataset,
        jobs: &[Job],
        runner: &dyn Runner,
    ) -> Result<RunManifest> {
        let plan = self.plan(dataset, jobs).await?;
        runner.run(&plan).await
    }

    /// Read every data reference of a resolved input list.
    pub async fn materialize(&self, inputs: &[Input]) -> Result<Vec<Arg>> {
        let mut args = Vec::with_capacity(inputs.len());
        for input in inputs {
            args.push(match input {
                Input::Data(d) => Arg::Data(self.read_data(d).await?),
                Input::Group(group) => {
                    let mut payloads = Vec::with_capacity(group.len());
                    for d in group {
                        payloads.push(self.read_data(d).await?);
                    }
                    Arg::Group(payloads)
                }
                Input::Literal(v) => Arg::Literal(v.clone()),
            });
        }
        Ok(args)
    }

    /// Storage, then metadata, then catalog. A failure after storage succeeded
    /// is reported as `Inconsistent`; nothing is rolled back.
    pub(crate) async fn store_item(
        &self,
        location: &Location,
        storage_type: StorageType,
        payload: Option<&Payload>,
        annotations: &Annotations,
        metadata: Option<&Metadata>,
    ) -> Result<DataInfo> {
        let dataset = &location.dataset;
        let uri = self.storage.create(dataset, storage_type, payload).await?;
        let metadata_uri = match metadata {
            Some(doc) => Some(
                self.metadata
                    .create(dataset, doc)
                    .await
                    .map_err(|e| Error::inconsistent(uri.as_str(), e.to_string()))?,
            ),
            None => None,
        };
        self.catalog
            .create_data(location, uri.clone(), storage_type, annotations, metadata_uri)
            .await
            .map_err(|e| Error::inconsistent(uri.as_str(), e.to_string()))
    }
}
